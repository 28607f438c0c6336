//! Filter-spec expansion into ACL_TABLE and ACL_RULE rows.

use itertools::iproduct;
use newtron_configdb::tables::{fields, ACL_RULE_TABLE, ACL_TABLE_TABLE};
use newtron_configdb::{join_key, CompositeEntry, FieldValues};
use newtron_spec::{FilterRule, FilterSpec, NetworkSpec};

use crate::error::{GeneratorError, GeneratorResult};

/// ACL rule priorities count down from this base as sequences go up.
const PRIORITY_BASE: u32 = 10_000;

/// Which direction an ACL filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclStage {
    Ingress,
    Egress,
}

impl AclStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AclStage::Ingress => "ingress",
            AclStage::Egress => "egress",
        }
    }

    /// Capitalized form used in policy_desc.
    pub const fn title(&self) -> &'static str {
        match self {
            AclStage::Ingress => "Ingress",
            AclStage::Egress => "Egress",
        }
    }
}

/// Maps a protocol name to its IP protocol number; unknown names pass
/// through as literals.
pub fn protocol_number(protocol: &str) -> String {
    match protocol.to_ascii_lowercase().as_str() {
        "icmp" => "1",
        "igmp" => "2",
        "tcp" => "6",
        "udp" => "17",
        "gre" => "47",
        "esp" => "50",
        "ah" => "51",
        "icmpv6" => "58",
        "ospf" => "89",
        "pim" => "103",
        "vrrp" => "112",
        other => return other.to_string(),
    }
    .to_string()
}

/// Maps a CoS class name to its traffic class.
pub fn tc_for_cos(cos: &str) -> Option<u8> {
    match cos.to_ascii_lowercase().as_str() {
        "be" => Some(0),
        "cs1" => Some(1),
        "cs2" => Some(2),
        "cs3" => Some(3),
        "cs4" => Some(4),
        "ef" => Some(5),
        "cs6" => Some(6),
        "cs7" => Some(7),
        _ => None,
    }
}

/// Builds the ACL_TABLE row for one stage of a service.
pub fn acl_table_entry(acl_name: &str, stage: AclStage, service: &str, interface: &str) -> CompositeEntry {
    let mut row = FieldValues::new();
    row.insert(fields::TYPE.to_string(), "L3".to_string());
    row.insert(fields::STAGE.to_string(), stage.as_str().to_string());
    row.insert(fields::PORTS.to_string(), interface.to_string());
    row.insert(
        fields::POLICY_DESC.to_string(),
        format!("{} filter for {}", stage.title(), service),
    );
    CompositeEntry::new(ACL_TABLE_TABLE, acl_name, row)
}

/// Expands a filter spec into ACL_RULE rows under `acl_name`.
///
/// A rule with N source prefixes and M destination prefixes becomes the
/// N·M Cartesian product: one row keyed RULE_{seq} when the product is
/// a single row, RULE_{seq}_{idx} otherwise.
pub fn acl_rule_entries(
    network: &NetworkSpec,
    filter_name: &str,
    filter: &FilterSpec,
    acl_name: &str,
) -> GeneratorResult<Vec<CompositeEntry>> {
    let mut entries = Vec::new();

    for rule in &filter.rules {
        let src_prefixes = resolve_prefixes(
            network,
            rule.src_prefix_list.as_deref(),
            rule.src_prefix.map(|p| p.to_string()),
        )?;
        let dst_prefixes = resolve_prefixes(
            network,
            rule.dst_prefix_list.as_deref(),
            rule.dst_prefix.map(|p| p.to_string()),
        )?;

        let product = src_prefixes.len() * dst_prefixes.len();
        for (idx, (src, dst)) in iproduct!(&src_prefixes, &dst_prefixes).enumerate() {
            let key = if product == 1 {
                format!("RULE_{}", rule.sequence)
            } else {
                format!("RULE_{}_{}", rule.sequence, idx)
            };
            entries.push(CompositeEntry::new(
                ACL_RULE_TABLE,
                join_key([acl_name, &key]),
                rule_fields(network, filter_name, rule, src.as_deref(), dst.as_deref())?,
            ));
        }
    }

    Ok(entries)
}

/// Resolves the prefix dimension of a rule: a named prefix list, a
/// literal prefix, or unconstrained (one row, no IP match field).
fn resolve_prefixes(
    network: &NetworkSpec,
    list_name: Option<&str>,
    literal: Option<String>,
) -> GeneratorResult<Vec<Option<String>>> {
    if let Some(name) = list_name {
        let list = network.prefix_list(name)?;
        return Ok(list.prefix_strings().into_iter().map(Some).collect());
    }
    if let Some(prefix) = literal {
        return Ok(vec![Some(prefix)]);
    }
    Ok(vec![None])
}

fn rule_fields(
    network: &NetworkSpec,
    filter_name: &str,
    rule: &FilterRule,
    src: Option<&str>,
    dst: Option<&str>,
) -> GeneratorResult<FieldValues> {
    let mut row = FieldValues::new();
    row.insert(
        fields::PRIORITY.to_string(),
        PRIORITY_BASE.saturating_sub(rule.sequence).to_string(),
    );
    row.insert(
        fields::PACKET_ACTION.to_string(),
        rule.action.packet_action().to_string(),
    );
    if let Some(src) = src {
        row.insert(fields::ACL_SRC_IP.to_string(), src.to_string());
    }
    if let Some(dst) = dst {
        row.insert(fields::ACL_DST_IP.to_string(), dst.to_string());
    }
    if let Some(protocol) = &rule.protocol {
        row.insert(fields::IP_PROTOCOL.to_string(), protocol_number(protocol));
    }
    if let Some(port) = &rule.src_port {
        row.insert(fields::L4_SRC_PORT.to_string(), port.clone());
    }
    if let Some(port) = &rule.dst_port {
        row.insert(fields::L4_DST_PORT.to_string(), port.clone());
    }
    if let Some(dscp) = rule.dscp {
        row.insert(fields::DSCP.to_string(), dscp.to_string());
    }
    if let Some(policer) = &rule.policer {
        // the policer must be defined, even though only its name lands
        // in the rule
        network.policer(policer)?;
        row.insert(fields::POLICER.to_string(), policer.clone());
    }
    if let Some(cos) = &rule.cos {
        let tc = tc_for_cos(cos).ok_or_else(|| GeneratorError::UnknownCosClass {
            filter: filter_name.to_string(),
            cos: cos.clone(),
        })?;
        row.insert(fields::TC.to_string(), tc.to_string());
    }
    Ok(row)
}
