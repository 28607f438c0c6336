//! The SonicClient trait: everything the control plane asks of a
//! switch's management plane.

use async_trait::async_trait;
use newtron_configdb::{Change, CompositeEntry, ConfigDbSnapshot};
use newtron_types::{IpAddress, IpPrefix};
use tokio_util::sync::CancellationToken;

use crate::error::{ApplyError, ClientResult};
use crate::verify::VerificationResult;

/// A BGP session's operational state, read from STATE_DB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpNeighborState {
    /// FRR session state string, e.g. "Established".
    pub state: String,
    /// Seconds the session has been up, when established.
    pub uptime_secs: Option<u64>,
}

impl BgpNeighborState {
    pub fn is_established(&self) -> bool {
        self.state.eq_ignore_ascii_case("established")
    }
}

/// A route read from APP_DB or ASIC_DB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: String,
    pub nexthops: Vec<String>,
    pub interfaces: Vec<String>,
}

/// The transport contract consumed by Device.
///
/// Implementations are shared handles: methods take `&self`, and every
/// potentially blocking call takes a [`CancellationToken`] honored
/// between entries on a best-effort basis. The contract supplies no
/// internal timeouts; deadlines are the caller's concern.
#[async_trait]
pub trait SonicClient: Send + Sync {
    /// Establishes the transport session.
    async fn connect(&self) -> ClientResult<()>;

    /// Tears the session down. Idempotent.
    async fn disconnect(&self) -> ClientResult<()>;

    /// Writes a sequence of changes to CONFIG_DB in declared order,
    /// pipelined. Any failure aborts the batch; the error reports how
    /// many entries were definitely written.
    async fn apply_changes(
        &self,
        token: &CancellationToken,
        changes: &[Change],
    ) -> Result<usize, ApplyError>;

    /// Atomically replaces all CONFIG_DB keys with the given entries;
    /// other readers see either all old rows or all new rows.
    async fn replace_all(
        &self,
        token: &CancellationToken,
        entries: &[CompositeEntry],
    ) -> ClientResult<usize>;

    /// Pipelined SET of entries without a prior flush.
    async fn pipeline_set(
        &self,
        token: &CancellationToken,
        entries: &[CompositeEntry],
    ) -> ClientResult<usize>;

    /// Re-reads the rows a change set touched and compares them to the
    /// expected post-state. Read-only; single-shot, no retries.
    async fn verify_changes(
        &self,
        token: &CancellationToken,
        changes: &[Change],
    ) -> ClientResult<VerificationResult>;

    /// Acquires the advisory device lock for `holder` ("user@host").
    /// Returns false when someone else holds it.
    async fn lock(&self, holder: &str, ttl_secs: u64) -> ClientResult<bool>;

    /// Releases the advisory lock. Idempotent; releasing a lock held by
    /// someone else is a no-op.
    async fn unlock(&self) -> ClientResult<()>;

    /// The current lock holder, if any.
    async fn lock_holder(&self) -> ClientResult<Option<String>>;

    /// A full read of CONFIG_DB as typed rows.
    async fn config_db_snapshot(&self) -> ClientResult<ConfigDbSnapshot>;

    /// Reads a BGP session's state from STATE_DB.
    async fn bgp_neighbor_state(
        &self,
        vrf: &str,
        neighbor: &IpAddress,
    ) -> ClientResult<Option<BgpNeighborState>>;

    /// Reads a route from APP_DB.
    async fn get_route(
        &self,
        token: &CancellationToken,
        vrf: &str,
        prefix: &IpPrefix,
    ) -> ClientResult<Option<RouteEntry>>;

    /// Reads a route from ASIC_DB.
    async fn get_route_asic(
        &self,
        token: &CancellationToken,
        prefix: &IpPrefix,
    ) -> ClientResult<Option<RouteEntry>>;

    /// Persists the running CONFIG_DB (the `config save` hook). Never
    /// sequenced into apply; callers invoke it explicitly.
    async fn save_config(&self, token: &CancellationToken) -> ClientResult<()>;

    /// Reloads configuration from the persisted file.
    async fn reload_config(&self, token: &CancellationToken) -> ClientResult<()>;

    /// Runs a command over the SSH tunnel (used by health checks that
    /// shell out to the routing daemon).
    async fn exec_command(&self, token: &CancellationToken, command: &str) -> ClientResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgp_neighbor_state() {
        let up = BgpNeighborState {
            state: "Established".to_string(),
            uptime_secs: Some(600),
        };
        assert!(up.is_established());

        let down = BgpNeighborState {
            state: "Active".to_string(),
            uptime_secs: None,
        };
        assert!(!down.is_established());
    }
}
