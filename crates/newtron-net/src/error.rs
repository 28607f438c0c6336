//! Errors of the network/device/interface layer.

use newtron_changeset::ChangeError;
use newtron_client::ClientError;
use newtron_generator::GeneratorError;
use newtron_spec::SpecError;
use thiserror::Error;

use crate::composite::MergeConflict;

/// Result type alias for network-layer operations.
pub type NetResult<T> = Result<T, NetError>;

/// Errors raised by Network, Device, and Interface operations.
#[derive(Debug, Error)]
pub enum NetError {
    /// The device must be connected first.
    #[error("device '{device}' is not connected")]
    NotConnected { device: String },

    /// Writes require the advisory lock.
    #[error("device '{device}' is not locked for configuration")]
    NotLocked { device: String },

    /// Another operator holds the lock.
    #[error("device '{device}' is locked by '{holder}'")]
    LockHeld { device: String, holder: String },

    /// The interface does not exist on the device.
    #[error("interface '{interface}' not found on device '{device}'")]
    UnknownInterface { device: String, interface: String },

    /// Services cannot be applied to LAG member ports.
    #[error("interface '{interface}' is a member of {lag}")]
    LagMember { interface: String, lag: String },

    /// The interface already carries a service.
    #[error("interface '{interface}' already has service '{service}' bound")]
    ServiceBound { interface: String, service: String },

    /// The interface has no service to remove.
    #[error("interface '{interface}' has no service bound")]
    NoServiceBound { interface: String },

    /// An EVPN service needs a VTEP and BGP configured first.
    #[error("device '{device}' is missing {missing} required by an EVPN service")]
    EvpnPrereq {
        device: String,
        missing: &'static str,
    },

    /// A BGP neighbor already exists at this address.
    #[error("BGP neighbor {neighbor} already exists in vrf '{vrf}'")]
    DuplicateNeighbor { vrf: String, neighbor: String },

    /// A merge composite collides with existing service bindings.
    #[error("merge refused: {}", format_conflicts(conflicts))]
    MergeConflicts { conflicts: Vec<MergeConflict> },

    /// Post-apply verification found mismatches.
    #[error("verification failed: {}", failures.join("; "))]
    VerificationFailed { failures: Vec<String> },

    /// A caller-supplied value was rejected.
    #[error("invalid {what}: {message}")]
    InvalidInput { what: &'static str, message: String },

    /// A port would overlap lanes already in use.
    #[error("port '{port}' lanes overlap existing port '{existing}'")]
    LaneConflict { port: String, existing: String },

    /// The topology manifest is missing or inconsistent.
    #[error("topology device '{device}': {reason}")]
    TopologyInvalid { device: String, reason: String },

    /// No topology manifest was loaded.
    #[error("no topology manifest loaded")]
    NoTopology,

    /// The network was built in memory and has no spec directory.
    #[error("network has no spec directory to persist to")]
    NoSpecDir,

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Change(#[from] ChangeError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl NetError {
    pub fn invalid_input(what: &'static str, message: impl Into<String>) -> Self {
        NetError::InvalidInput {
            what,
            message: message.into(),
        }
    }
}

fn format_conflicts(conflicts: &[MergeConflict]) -> String {
    use itertools::Itertools;
    conflicts.iter().map(|c| c.to_string()).join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_conflicts_display() {
        let err = NetError::MergeConflicts {
            conflicts: vec![MergeConflict {
                interface: "Ethernet0".to_string(),
                existing_service: "customer-l2".to_string(),
                incoming_service: "tenant-irb".to_string(),
            }],
        };
        let text = err.to_string();
        assert!(text.contains("Ethernet0"));
        assert!(text.contains("customer-l2"));
    }
}
