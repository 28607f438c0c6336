//! Change lifecycle errors.

use newtron_client::ClientError;
use thiserror::Error;

/// Result type alias for change lifecycle operations.
pub type ChangeResult<T> = Result<T, ChangeError>;

/// Errors raised while applying, verifying, or rolling back a change
/// set.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// Transport failure outside the apply loop.
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// Apply stopped partway; `applied` entries were written and the
    /// set's applied_count records them for rollback.
    #[error("applied {applied} of {total} changes before failing: {source}")]
    PartialApply {
        applied: usize,
        total: usize,
        #[source]
        source: ClientError,
    },

    /// Rollback was requested but nothing had been applied.
    #[error("nothing to roll back (no changes applied)")]
    NothingApplied,

    /// Rollback attempted every inverse; these failed. The joined
    /// report gives the operator the complete failure picture.
    #[error("rollback incomplete: {}", errors.join("; "))]
    RollbackFailed { errors: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_failed_joins_errors() {
        let err = ChangeError::RollbackFailed {
            errors: vec![
                "VLAN|Vlan100: injected failure: a".to_string(),
                "VRF|cust: injected failure: b".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("VLAN|Vlan100"));
        assert!(text.contains("VRF|cust"));
    }
}
