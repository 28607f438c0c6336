//! In-memory SonicClient for tests.
//!
//! Holds a [`ConfigDbSnapshot`] behind a mutex, applies changes the way
//! the Redis transport would, and supports failure injection at a
//! chosen change index so rollback paths can be exercised.

use async_trait::async_trait;
use newtron_configdb::{Change, CompositeEntry, ConfigDbSnapshot, FieldValues};
use newtron_types::{IpAddress, IpPrefix};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::{BgpNeighborState, RouteEntry, SonicClient};
use crate::error::{ApplyError, ClientError, ClientResult};
use crate::verify::{VerificationCheck, VerificationResult};

#[derive(Default)]
struct MockState {
    connected: bool,
    db: ConfigDbSnapshot,
    lock: Option<String>,
    /// Abort apply_changes when it reaches this 0-based change index.
    fail_apply_at: Option<usize>,
    fail_replace: bool,
    calls: Vec<String>,
    save_count: usize,
    reload_count: usize,
    exec_responses: BTreeMap<String, String>,
    bgp_states: BTreeMap<String, BgpNeighborState>,
    routes: BTreeMap<String, RouteEntry>,
}

/// An in-memory device.
///
/// Cloneable via `Arc`; a factory handing the same instance to a Device
/// lets tests inspect what the Device wrote.
#[derive(Default)]
pub struct MockSonicClient {
    state: Mutex<MockState>,
}

impl MockSonicClient {
    pub fn new() -> Arc<Self> {
        Arc::new(MockSonicClient::default())
    }

    /// Seeds one CONFIG_DB row.
    pub fn with_entry(self: &Arc<Self>, table: &str, key: &str, fields: FieldValues) -> Arc<Self> {
        self.state.lock().db.set(table, key, fields);
        Arc::clone(self)
    }

    /// Replaces the whole seeded CONFIG_DB.
    pub fn seed_snapshot(&self, snapshot: ConfigDbSnapshot) {
        self.state.lock().db = snapshot;
    }

    /// Makes the next apply_changes abort when it reaches change
    /// `index` (0-based); entries before it are written.
    pub fn fail_apply_at(&self, index: usize) {
        self.state.lock().fail_apply_at = Some(index);
    }

    /// Clears apply failure injection.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_apply_at = None;
        state.fail_replace = false;
    }

    /// Makes replace_all fail.
    pub fn fail_replace(&self) {
        self.state.lock().fail_replace = true;
    }

    /// Cans a response for exec_command.
    pub fn set_exec_response(&self, command: &str, output: &str) {
        self.state
            .lock()
            .exec_responses
            .insert(command.to_string(), output.to_string());
    }

    /// Seeds a STATE_DB BGP session state.
    pub fn set_bgp_state(&self, vrf: &str, neighbor: &str, state: BgpNeighborState) {
        self.state
            .lock()
            .bgp_states
            .insert(format!("{}|{}", vrf, neighbor), state);
    }

    /// Seeds an APP_DB route.
    pub fn set_route(&self, vrf: &str, prefix: &str, route: RouteEntry) {
        self.state
            .lock()
            .routes
            .insert(format!("{}|{}", vrf, prefix), route);
    }

    /// A copy of the current device CONFIG_DB.
    pub fn db(&self) -> ConfigDbSnapshot {
        self.state.lock().db.clone()
    }

    /// The recorded call log.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().save_count
    }

    pub fn reload_count(&self) -> usize {
        self.state.lock().reload_count
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().calls.push(call.into());
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }
}

#[async_trait]
impl SonicClient for MockSonicClient {
    async fn connect(&self) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.connected = true;
        state.calls.push("connect".to_string());
        Ok(())
    }

    async fn disconnect(&self) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.calls.push("disconnect".to_string());
        Ok(())
    }

    async fn apply_changes(
        &self,
        token: &CancellationToken,
        changes: &[Change],
    ) -> Result<usize, ApplyError> {
        let total = changes.len();
        self.ensure_connected().map_err(|source| ApplyError {
            applied: 0,
            total,
            source,
        })?;
        self.record(format!("apply_changes({})", total));

        for (index, change) in changes.iter().enumerate() {
            if token.is_cancelled() {
                return Err(ApplyError {
                    applied: index,
                    total,
                    source: ClientError::Cancelled,
                });
            }
            let mut state = self.state.lock();
            if state.fail_apply_at == Some(index) {
                return Err(ApplyError {
                    applied: index,
                    total,
                    source: ClientError::Injected(format!("apply failed at change {}", index)),
                });
            }
            state.db.apply_change(change);
        }
        Ok(total)
    }

    async fn replace_all(
        &self,
        _token: &CancellationToken,
        entries: &[CompositeEntry],
    ) -> ClientResult<usize> {
        self.ensure_connected()?;
        self.record(format!("replace_all({})", entries.len()));
        let mut state = self.state.lock();
        if state.fail_replace {
            return Err(ClientError::Injected("replace_all failed".to_string()));
        }
        state.db.replace_with(entries);
        Ok(entries.len())
    }

    async fn pipeline_set(
        &self,
        _token: &CancellationToken,
        entries: &[CompositeEntry],
    ) -> ClientResult<usize> {
        self.ensure_connected()?;
        self.record(format!("pipeline_set({})", entries.len()));
        let mut state = self.state.lock();
        for entry in entries {
            state
                .db
                .set(entry.table.clone(), entry.key.clone(), entry.fields.clone());
        }
        Ok(entries.len())
    }

    async fn verify_changes(
        &self,
        _token: &CancellationToken,
        changes: &[Change],
    ) -> ClientResult<VerificationResult> {
        self.ensure_connected()?;
        self.record(format!("verify_changes({})", changes.len()));
        let state = self.state.lock();
        let checks = changes
            .iter()
            .map(|change| {
                let observed = state.db.get(&change.table, &change.key).cloned();
                VerificationCheck::evaluate(change, observed)
            })
            .collect();
        Ok(VerificationResult { checks })
    }

    async fn lock(&self, holder: &str, _ttl_secs: u64) -> ClientResult<bool> {
        let mut state = self.state.lock();
        match &state.lock {
            Some(current) if current != holder => Ok(false),
            _ => {
                state.lock = Some(holder.to_string());
                Ok(true)
            }
        }
    }

    async fn unlock(&self) -> ClientResult<()> {
        self.state.lock().lock = None;
        Ok(())
    }

    async fn lock_holder(&self) -> ClientResult<Option<String>> {
        Ok(self.state.lock().lock.clone())
    }

    async fn config_db_snapshot(&self) -> ClientResult<ConfigDbSnapshot> {
        self.ensure_connected()?;
        Ok(self.state.lock().db.clone())
    }

    async fn bgp_neighbor_state(
        &self,
        vrf: &str,
        neighbor: &IpAddress,
    ) -> ClientResult<Option<BgpNeighborState>> {
        Ok(self
            .state
            .lock()
            .bgp_states
            .get(&format!("{}|{}", vrf, neighbor))
            .cloned())
    }

    async fn get_route(
        &self,
        _token: &CancellationToken,
        vrf: &str,
        prefix: &IpPrefix,
    ) -> ClientResult<Option<RouteEntry>> {
        Ok(self
            .state
            .lock()
            .routes
            .get(&format!("{}|{}", vrf, prefix))
            .cloned())
    }

    async fn get_route_asic(
        &self,
        _token: &CancellationToken,
        prefix: &IpPrefix,
    ) -> ClientResult<Option<RouteEntry>> {
        Ok(self
            .state
            .lock()
            .routes
            .get(&format!("asic|{}", prefix))
            .cloned())
    }

    async fn save_config(&self, _token: &CancellationToken) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.save_count += 1;
        state.calls.push("save_config".to_string());
        Ok(())
    }

    async fn reload_config(&self, _token: &CancellationToken) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.reload_count += 1;
        state.calls.push("reload_config".to_string());
        Ok(())
    }

    async fn exec_command(
        &self,
        _token: &CancellationToken,
        command: &str,
    ) -> ClientResult<String> {
        self.state
            .lock()
            .exec_responses
            .get(command)
            .cloned()
            .ok_or(ClientError::Unsupported {
                operation: "exec_command",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newtron_configdb::fields;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_apply_and_snapshot() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();

        let token = CancellationToken::new();
        let changes = vec![
            Change::add("VLAN", "Vlan100", fields! {"vlanid" => "100"}),
            Change::add("VLAN_MEMBER", "Vlan100|Ethernet0", fields! {"tagging_mode" => "untagged"}),
        ];
        let applied = client.apply_changes(&token, &changes).await.unwrap();
        assert_eq!(applied, 2);

        let snap = client.config_db_snapshot().await.unwrap();
        assert!(snap.contains("VLAN", "Vlan100"));
        assert!(snap.contains("VLAN_MEMBER", "Vlan100|Ethernet0"));
    }

    #[tokio::test]
    async fn test_apply_requires_connection() {
        let client = MockSonicClient::new();
        let token = CancellationToken::new();
        let err = client
            .apply_changes(&token, &[Change::add("VLAN", "Vlan100", fields! {})])
            .await
            .unwrap_err();
        assert_eq!(err.applied, 0);
        assert!(matches!(err.source, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_fail_injection_reports_partial_count() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        client.fail_apply_at(2);

        let token = CancellationToken::new();
        let changes = vec![
            Change::add("VLAN", "Vlan100", fields! {"vlanid" => "100"}),
            Change::add("VLAN", "Vlan200", fields! {"vlanid" => "200"}),
            Change::add("VLAN", "Vlan300", fields! {"vlanid" => "300"}),
        ];
        let err = client.apply_changes(&token, &changes).await.unwrap_err();
        assert_eq!(err.applied, 2);
        assert_eq!(err.total, 3);

        let snap = client.db();
        assert!(snap.contains("VLAN", "Vlan100"));
        assert!(snap.contains("VLAN", "Vlan200"));
        assert!(!snap.contains("VLAN", "Vlan300"));
    }

    #[tokio::test]
    async fn test_lock_exclusion() {
        let client = MockSonicClient::new();
        assert!(client.lock("alice@host1", 3600).await.unwrap());
        assert!(!client.lock("bob@host2", 3600).await.unwrap());
        // reentrant for the same holder
        assert!(client.lock("alice@host1", 3600).await.unwrap());
        assert_eq!(
            client.lock_holder().await.unwrap().as_deref(),
            Some("alice@host1")
        );

        client.unlock().await.unwrap();
        assert!(client.lock("bob@host2", 3600).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_reads_current_state() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        client.with_entry("VLAN", "Vlan100", fields! {"vlanid" => "100"});

        let token = CancellationToken::new();
        let good = Change::add("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        let bad = Change::add("VLAN", "Vlan200", fields! {"vlanid" => "200"});
        let result = client
            .verify_changes(&token, &[good, bad])
            .await
            .unwrap();
        assert!(!result.passed());
        assert_eq!(result.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        client.with_entry("VLAN", "Vlan100", fields! {"vlanid" => "100"});

        let token = CancellationToken::new();
        let entries = vec![CompositeEntry::new("VRF", "cust", fields! {"vni" => "10001"})];
        client.replace_all(&token, &entries).await.unwrap();

        let snap = client.db();
        assert!(!snap.contains("VLAN", "Vlan100"));
        assert!(snap.contains("VRF", "cust"));
    }
}
