//! Redis-backed SonicClient implementation.
//!
//! Talks straight to the switch's Redis instance: CONFIG_DB (db 4) for
//! writes and snapshots, STATE_DB (db 6) for session state and the
//! advisory lock, APP_DB (db 0) and ASIC_DB (db 1) for route reads.
//! A scratch database plus SWAPDB gives atomic whole-DB replacement.

use async_trait::async_trait;
use newtron_configdb::{Change, ChangeKind, CompositeEntry, ConfigDbSnapshot, FieldValues};
use newtron_types::{IpAddress, IpPrefix};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{BgpNeighborState, RouteEntry, SonicClient};
use crate::error::{ApplyError, ClientError, ClientResult};
use crate::verify::{VerificationCheck, VerificationResult};

const APPL_DB: i64 = 0;
const ASIC_DB: i64 = 1;
const CONFIG_DB: i64 = 4;
const STATE_DB: i64 = 6;
/// Staging database for atomic replacement via SWAPDB.
const SCRATCH_DB: i64 = 15;

/// The advisory lock key, kept in STATE_DB so whole-CONFIG_DB
/// replacement cannot displace it.
const LOCK_KEY: &str = "NEWTRON_LOCK";

/// CONFIG_DB convention for a row with no fields.
const NULL_FIELD: &str = "NULL";

/// Connection parameters for a switch's Redis instance.
#[derive(Debug, Clone)]
pub struct RedisSonicClientConfig {
    pub host: String,
    pub port: u16,
}

impl RedisSonicClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        RedisSonicClientConfig {
            host: host.into(),
            port,
        }
    }

    fn uri(&self, db: i64) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, db)
    }
}

struct Connections {
    config_db: ConnectionManager,
    state_db: ConnectionManager,
    appl_db: ConnectionManager,
    asic_db: ConnectionManager,
    scratch_db: ConnectionManager,
}

/// The real transport: one client per device.
pub struct RedisSonicClient {
    config: RedisSonicClientConfig,
    conns: Mutex<Option<Connections>>,
    /// The holder identity this client locked with, if any.
    held_as: Mutex<Option<String>>,
}

impl RedisSonicClient {
    pub fn new(config: RedisSonicClientConfig) -> Self {
        RedisSonicClient {
            config,
            conns: Mutex::new(None),
            held_as: Mutex::new(None),
        }
    }

    async fn connect_db(&self, db: i64) -> ClientResult<ConnectionManager> {
        let uri = self.config.uri(db);
        let client = redis::Client::open(uri).map_err(|e| ClientError::redis("open", e))?;
        client
            .get_connection_manager()
            .await
            .map_err(|e| ClientError::redis("connect", e))
    }

    fn config_conn(&self) -> ClientResult<ConnectionManager> {
        self.conns
            .lock()
            .as_ref()
            .map(|c| c.config_db.clone())
            .ok_or(ClientError::NotConnected)
    }

    fn state_conn(&self) -> ClientResult<ConnectionManager> {
        self.conns
            .lock()
            .as_ref()
            .map(|c| c.state_db.clone())
            .ok_or(ClientError::NotConnected)
    }

    fn appl_conn(&self) -> ClientResult<ConnectionManager> {
        self.conns
            .lock()
            .as_ref()
            .map(|c| c.appl_db.clone())
            .ok_or(ClientError::NotConnected)
    }

    fn asic_conn(&self) -> ClientResult<ConnectionManager> {
        self.conns
            .lock()
            .as_ref()
            .map(|c| c.asic_db.clone())
            .ok_or(ClientError::NotConnected)
    }

    fn scratch_conn(&self) -> ClientResult<ConnectionManager> {
        self.conns
            .lock()
            .as_ref()
            .map(|c| c.scratch_db.clone())
            .ok_or(ClientError::NotConnected)
    }

    /// Writes one row, honoring the NULL convention for empty rows.
    async fn write_row(
        conn: &mut ConnectionManager,
        key: &str,
        fields: &FieldValues,
    ) -> ClientResult<()> {
        if fields.is_empty() {
            let _: () = conn
                .hset(key, NULL_FIELD, NULL_FIELD)
                .await
                .map_err(|e| ClientError::redis("hset", e))?;
        } else {
            let pairs: Vec<(&str, &str)> = fields
                .iter()
                .map(|(f, v)| (f.as_str(), v.as_str()))
                .collect();
            let _: () = conn
                .hset_multiple(key, &pairs)
                .await
                .map_err(|e| ClientError::redis("hset", e))?;
        }
        Ok(())
    }

    async fn apply_one(conn: &mut ConnectionManager, change: &Change) -> ClientResult<()> {
        let key = change.redis_key();
        match change.kind {
            ChangeKind::Add => {
                Self::write_row(conn, &key, change.new_fields.as_ref().unwrap_or(&FieldValues::new()))
                    .await
            }
            ChangeKind::Modify => {
                // drop fields present before but absent after
                if let (Some(old), Some(new)) = (&change.old_fields, &change.new_fields) {
                    let stale: Vec<&str> = old
                        .keys()
                        .filter(|f| !new.contains_key(*f))
                        .map(String::as_str)
                        .collect();
                    if !stale.is_empty() {
                        let _: () = conn
                            .hdel(&key, stale)
                            .await
                            .map_err(|e| ClientError::redis("hdel", e))?;
                    }
                }
                Self::write_row(conn, &key, change.new_fields.as_ref().unwrap_or(&FieldValues::new()))
                    .await
            }
            ChangeKind::Delete => {
                let _: () = conn
                    .del(&key)
                    .await
                    .map_err(|e| ClientError::redis("del", e))?;
                Ok(())
            }
        }
    }

    /// Reads one row; distinguishes "absent" from "present with no
    /// fields" via the NULL convention.
    async fn read_row(
        conn: &mut ConnectionManager,
        key: &str,
    ) -> ClientResult<Option<FieldValues>> {
        let raw: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .map_err(|e| ClientError::redis("hgetall", e))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let mut fields = FieldValues::new();
        for (f, v) in raw {
            if f != NULL_FIELD {
                fields.insert(f, v);
            }
        }
        Ok(Some(fields))
    }
}

#[async_trait]
impl SonicClient for RedisSonicClient {
    #[instrument(skip(self), fields(host = %self.config.host))]
    async fn connect(&self) -> ClientResult<()> {
        if self.conns.lock().is_some() {
            return Ok(());
        }

        let config_db = self.connect_db(CONFIG_DB).await?;
        let state_db = self.connect_db(STATE_DB).await?;
        let appl_db = self.connect_db(APPL_DB).await?;
        let asic_db = self.connect_db(ASIC_DB).await?;
        let scratch_db = self.connect_db(SCRATCH_DB).await?;

        *self.conns.lock() = Some(Connections {
            config_db,
            state_db,
            appl_db,
            asic_db,
            scratch_db,
        });

        info!("Connected to device Redis");
        Ok(())
    }

    async fn disconnect(&self) -> ClientResult<()> {
        if self.conns.lock().take().is_some() {
            info!(host = %self.config.host, "Disconnected from device Redis");
        }
        Ok(())
    }

    async fn apply_changes(
        &self,
        token: &CancellationToken,
        changes: &[Change],
    ) -> Result<usize, ApplyError> {
        let total = changes.len();
        let mut conn = self.config_conn().map_err(|source| ApplyError {
            applied: 0,
            total,
            source,
        })?;

        for (applied, change) in changes.iter().enumerate() {
            if token.is_cancelled() {
                return Err(ApplyError {
                    applied,
                    total,
                    source: ClientError::Cancelled,
                });
            }
            debug!(change = %change, "Applying change");
            Self::apply_one(&mut conn, change)
                .await
                .map_err(|source| ApplyError {
                    applied,
                    total,
                    source,
                })?;
        }
        Ok(total)
    }

    #[instrument(skip(self, token, entries), fields(entries = entries.len()))]
    async fn replace_all(
        &self,
        token: &CancellationToken,
        entries: &[CompositeEntry],
    ) -> ClientResult<usize> {
        if token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let mut scratch = self.scratch_conn()?;
        let mut config = self.config_conn()?;

        // stage into scratch, then swap: readers of CONFIG_DB see
        // either all old rows or all new rows
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut scratch)
            .await
            .map_err(|e| ClientError::redis("flushdb", e))?;

        for entry in entries {
            if token.is_cancelled() {
                // nothing swapped yet, CONFIG_DB untouched
                return Err(ClientError::Cancelled);
            }
            Self::write_row(&mut scratch, &entry.redis_key(), &entry.fields).await?;
        }

        let _: () = redis::cmd("SWAPDB")
            .arg(SCRATCH_DB)
            .arg(CONFIG_DB)
            .query_async(&mut config)
            .await
            .map_err(|e| ClientError::redis("swapdb", e))?;

        // scratch now holds the displaced config; drop it
        let flushed: Result<(), redis::RedisError> =
            redis::cmd("FLUSHDB").query_async(&mut scratch).await;
        if let Err(e) = flushed {
            warn!("Failed to flush displaced config from scratch db: {}", e);
        }

        info!(entries = entries.len(), "Replaced CONFIG_DB atomically");
        Ok(entries.len())
    }

    async fn pipeline_set(
        &self,
        token: &CancellationToken,
        entries: &[CompositeEntry],
    ) -> ClientResult<usize> {
        let mut conn = self.config_conn()?;
        let mut written = 0usize;
        for entry in entries {
            if token.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            Self::write_row(&mut conn, &entry.redis_key(), &entry.fields).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn verify_changes(
        &self,
        token: &CancellationToken,
        changes: &[Change],
    ) -> ClientResult<VerificationResult> {
        // fresh connection so verification does not read back pipelined
        // state from the apply connection
        let mut conn = self.connect_db(CONFIG_DB).await?;

        let mut checks = Vec::with_capacity(changes.len());
        for change in changes {
            if token.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let observed = Self::read_row(&mut conn, &change.redis_key()).await?;
            checks.push(VerificationCheck::evaluate(change, observed));
        }
        Ok(VerificationResult { checks })
    }

    async fn lock(&self, holder: &str, ttl_secs: u64) -> ClientResult<bool> {
        let mut conn = self.state_conn()?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(LOCK_KEY)
            .arg(holder)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| ClientError::redis("set", e))?;

        if acquired.is_some() {
            *self.held_as.lock() = Some(holder.to_string());
            info!(holder, ttl_secs, "Acquired device lock");
            Ok(true)
        } else {
            // held by someone; the existing holder may be us (reentrant)
            let current: Option<String> = conn
                .get(LOCK_KEY)
                .await
                .map_err(|e| ClientError::redis("get", e))?;
            if current.as_deref() == Some(holder) {
                *self.held_as.lock() = Some(holder.to_string());
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    async fn unlock(&self) -> ClientResult<()> {
        let Some(holder) = self.held_as.lock().clone() else {
            return Ok(());
        };
        let mut conn = self.state_conn()?;
        let current: Option<String> = conn
            .get(LOCK_KEY)
            .await
            .map_err(|e| ClientError::redis("get", e))?;
        if current.as_deref() == Some(holder.as_str()) {
            let _: () = conn
                .del(LOCK_KEY)
                .await
                .map_err(|e| ClientError::redis("del", e))?;
            info!(holder = %holder, "Released device lock");
        }
        *self.held_as.lock() = None;
        Ok(())
    }

    async fn lock_holder(&self) -> ClientResult<Option<String>> {
        let mut conn = self.state_conn()?;
        conn.get(LOCK_KEY)
            .await
            .map_err(|e| ClientError::redis("get", e))
    }

    async fn config_db_snapshot(&self) -> ClientResult<ConfigDbSnapshot> {
        let mut conn = self.config_conn()?;
        let keys: Vec<String> = conn
            .keys("*")
            .await
            .map_err(|e| ClientError::redis("keys", e))?;

        let mut snapshot = ConfigDbSnapshot::new();
        for key in keys {
            // table rows are "TABLE|key"; anything else is not ours
            let Some((table, row_key)) = key.split_once('|') else {
                continue;
            };
            if let Some(fields) = Self::read_row(&mut conn, &key).await? {
                snapshot.set(table.to_string(), row_key.to_string(), fields);
            }
        }
        debug!(entries = snapshot.entry_count(), "Read CONFIG_DB snapshot");
        Ok(snapshot)
    }

    async fn bgp_neighbor_state(
        &self,
        vrf: &str,
        neighbor: &IpAddress,
    ) -> ClientResult<Option<BgpNeighborState>> {
        let mut conn = self.state_conn()?;
        let key = if vrf == "default" {
            format!("NEIGH_STATE_TABLE|{}", neighbor)
        } else {
            format!("NEIGH_STATE_TABLE|{}|{}", vrf, neighbor)
        };
        let raw: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| ClientError::redis("hgetall", e))?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(BgpNeighborState {
            state: raw.get("state").cloned().unwrap_or_default(),
            uptime_secs: raw.get("uptime").and_then(|v| v.parse().ok()),
        }))
    }

    async fn get_route(
        &self,
        token: &CancellationToken,
        vrf: &str,
        prefix: &IpPrefix,
    ) -> ClientResult<Option<RouteEntry>> {
        if token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let mut conn = self.appl_conn()?;
        // APP_DB uses ':' between table and key
        let key = if vrf == "default" {
            format!("ROUTE_TABLE:{}", prefix)
        } else {
            format!("ROUTE_TABLE:{}:{}", vrf, prefix)
        };
        let raw: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| ClientError::redis("hgetall", e))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let split = |field: &str| -> Vec<String> {
            raw.get(field)
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default()
        };
        Ok(Some(RouteEntry {
            prefix: prefix.to_string(),
            nexthops: split("nexthop"),
            interfaces: split("ifname"),
        }))
    }

    async fn get_route_asic(
        &self,
        token: &CancellationToken,
        prefix: &IpPrefix,
    ) -> ClientResult<Option<RouteEntry>> {
        if token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let mut conn = self.asic_conn()?;
        let pattern = format!("ASIC_STATE:SAI_OBJECT_TYPE_ROUTE_ENTRY*\"{}\"*", prefix);
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| ClientError::redis("keys", e))?;
        if keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(RouteEntry {
            prefix: prefix.to_string(),
            nexthops: Vec::new(),
            interfaces: Vec::new(),
        }))
    }

    async fn save_config(&self, _token: &CancellationToken) -> ClientResult<()> {
        // requires `config save` on the switch CLI, which rides the SSH
        // surface this transport does not carry
        Err(ClientError::Unsupported {
            operation: "save_config",
        })
    }

    async fn reload_config(&self, _token: &CancellationToken) -> ClientResult<()> {
        Err(ClientError::Unsupported {
            operation: "reload_config",
        })
    }

    async fn exec_command(
        &self,
        _token: &CancellationToken,
        _command: &str,
    ) -> ClientResult<String> {
        Err(ClientError::Unsupported {
            operation: "exec_command",
        })
    }
}
