//! Packet filter specifications, expanded into ACL_TABLE/ACL_RULE rows.

use newtron_types::IpPrefix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Permit or deny; becomes PACKET_ACTION FORWARD/DROP in ACL rules and
/// the action of prefix-set entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Permit,
    Deny,
}

impl FilterAction {
    /// The ACL_RULE PACKET_ACTION value.
    pub const fn packet_action(&self) -> &'static str {
        match self {
            FilterAction::Permit => "FORWARD",
            FilterAction::Deny => "DROP",
        }
    }
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterAction::Permit => "permit",
            FilterAction::Deny => "deny",
        };
        f.write_str(s)
    }
}

/// One rule of a filter spec.
///
/// `src_prefix_list`/`dst_prefix_list` name prefix lists that are
/// expanded into a Cartesian product of ACL_RULE rows; the singular
/// `src_prefix`/`dst_prefix` carry one literal prefix instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub sequence: u32,
    pub action: FilterAction,
    #[serde(default)]
    pub src_prefix_list: Option<String>,
    #[serde(default)]
    pub dst_prefix_list: Option<String>,
    #[serde(default)]
    pub src_prefix: Option<IpPrefix>,
    #[serde(default)]
    pub dst_prefix: Option<IpPrefix>,
    /// Protocol name ("tcp", "udp", ...) or literal number.
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub src_port: Option<String>,
    #[serde(default)]
    pub dst_port: Option<String>,
    #[serde(default)]
    pub dscp: Option<u8>,
    /// Name of a policer definition.
    #[serde(default)]
    pub policer: Option<String>,
    /// CoS class name ("be", "cs1".."cs7", "ef") mapped to a TC.
    #[serde(default)]
    pub cos: Option<String>,
}

/// A named packet filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub description: Option<String>,
    pub rules: Vec<FilterRule>,
}

/// One entry of a prefix list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixListEntry {
    pub prefix: IpPrefix,
    #[serde(default = "default_permit")]
    pub action: FilterAction,
}

fn default_permit() -> FilterAction {
    FilterAction::Permit
}

/// A named, ordered list of prefixes, referenced by filter rules and
/// route policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixList {
    pub prefixes: Vec<PrefixListEntry>,
}

impl PrefixList {
    /// The prefixes in declared order.
    pub fn prefix_strings(&self) -> Vec<String> {
        self.prefixes.iter().map(|p| p.prefix.to_string()).collect()
    }
}

/// A two-rate policer, referenced from filter rules by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policer {
    /// Committed information rate, bits/s.
    pub cir: u64,
    /// Committed burst size, bytes.
    pub cbs: u64,
    #[serde(default)]
    pub pir: Option<u64>,
    #[serde(default)]
    pub pbs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filter_action() {
        assert_eq!(FilterAction::Permit.packet_action(), "FORWARD");
        assert_eq!(FilterAction::Deny.packet_action(), "DROP");
    }

    #[test]
    fn test_filter_rule_json() {
        let rule: FilterRule = serde_json::from_str(
            r#"{
                "sequence": 10,
                "action": "permit",
                "src_prefix_list": "cust-nets",
                "protocol": "tcp",
                "dst_port": "443"
            }"#,
        )
        .unwrap();
        assert_eq!(rule.sequence, 10);
        assert_eq!(rule.action, FilterAction::Permit);
        assert_eq!(rule.src_prefix_list.as_deref(), Some("cust-nets"));
        assert!(rule.dst_prefix_list.is_none());
    }

    #[test]
    fn test_prefix_list_default_action() {
        let list: PrefixList = serde_json::from_str(
            r#"{"prefixes": [{"prefix": "10.0.0.0/8"}, {"prefix": "0.0.0.0/0", "action": "deny"}]}"#,
        )
        .unwrap();
        assert_eq!(list.prefixes[0].action, FilterAction::Permit);
        assert_eq!(list.prefixes[1].action, FilterAction::Deny);
        assert_eq!(list.prefix_strings(), vec!["10.0.0.0/8", "0.0.0.0/0"]);
    }
}
