//! QoS policy definitions, expanded into the device-wide QoS tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// WRED parameters for one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WredSpec {
    pub min_threshold: u64,
    pub max_threshold: u64,
    /// Drop probability at max threshold, percent.
    pub drop_probability: u8,
}

/// Scheduling and WRED configuration for one egress queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub queue: u8,
    /// DWRR weight; absent means strict priority.
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub wred: Option<WredSpec>,
}

/// A QoS policy: classification maps plus per-queue scheduling.
///
/// Expansion produces DSCP_TO_TC_MAP, TC_TO_QUEUE_MAP, SCHEDULER,
/// WRED_PROFILE, QUEUE, and PORT_QOS_MAP rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosPolicy {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub queues: Vec<QueueSpec>,
    /// DSCP value → traffic class.
    #[serde(default)]
    pub dscp_to_tc: BTreeMap<String, String>,
    /// Traffic class → queue index.
    #[serde(default)]
    pub tc_to_queue: BTreeMap<String, String>,
}

/// Legacy QoS profile: references pre-existing device maps by name
/// instead of defining them. Superseded by [`QosPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosProfile {
    #[serde(default)]
    pub dscp_to_tc_map: Option<String>,
    #[serde(default)]
    pub tc_to_queue_map: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_qos_policy_json() {
        let policy: QosPolicy = serde_json::from_str(
            r#"{
                "queues": [
                    {"queue": 0, "weight": 10},
                    {"queue": 5, "wred": {"min_threshold": 1048576, "max_threshold": 2097152, "drop_probability": 5}}
                ],
                "dscp_to_tc": {"0": "0", "46": "5"},
                "tc_to_queue": {"0": "0", "5": "5"}
            }"#,
        )
        .unwrap();
        assert_eq!(policy.queues.len(), 2);
        assert_eq!(policy.queues[0].weight, Some(10));
        assert!(policy.queues[1].wred.is_some());
        assert_eq!(policy.dscp_to_tc.get("46").unwrap(), "5");
    }

    #[test]
    fn test_legacy_profile_json() {
        let profile: QosProfile =
            serde_json::from_str(r#"{"dscp_to_tc_map": "AZURE"}"#).unwrap();
        assert_eq!(profile.dscp_to_tc_map.as_deref(), Some("AZURE"));
        assert!(profile.tc_to_queue_map.is_none());
    }
}
