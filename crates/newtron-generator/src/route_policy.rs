//! Route policy expansion into ROUTE_MAP, PREFIX_SET, and
//! COMMUNITY_SET rows.

use newtron_configdb::tables::{COMMUNITY_SET_TABLE, PREFIX_SET_TABLE, ROUTE_MAP_TABLE};
use newtron_configdb::{join_key, CompositeEntry, FieldValues};
use newtron_spec::{CommunityMatch, NetworkSpec, PrefixList};
use std::collections::BTreeSet;

use crate::error::GeneratorResult;

/// Emits PREFIX_SET rows for a named prefix list: one row per entry,
/// keyed "{name}|{(i+1)*10}".
pub fn prefix_set_entries(name: &str, list: &PrefixList) -> Vec<CompositeEntry> {
    list.prefixes
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut row = FieldValues::new();
            row.insert("ip_prefix".to_string(), entry.prefix.to_string());
            row.insert("action".to_string(), entry.action.to_string());
            CompositeEntry::new(
                PREFIX_SET_TABLE,
                join_key([name, &((i + 1) * 10).to_string()]),
                row,
            )
        })
        .collect()
}

/// Emits the COMMUNITY_SET row for an inline community match.
pub fn community_set_entry(community: &CommunityMatch) -> CompositeEntry {
    let mut row = FieldValues::new();
    row.insert("set_type".to_string(), "standard".to_string());
    row.insert("match_action".to_string(), "any".to_string());
    row.insert("community_member".to_string(), community.member.clone());
    CompositeEntry::new(COMMUNITY_SET_TABLE, community.name.clone(), row)
}

/// Expands a route policy into ROUTE_MAP rows plus the PREFIX_SET and
/// COMMUNITY_SET rows its terms reference.
pub fn route_policy_entries(
    network: &NetworkSpec,
    policy_name: &str,
) -> GeneratorResult<Vec<CompositeEntry>> {
    let policy = network.route_policy(policy_name)?;
    let mut entries = Vec::new();
    let mut emitted_sets: BTreeSet<String> = BTreeSet::new();

    for term in &policy.terms {
        let mut row = FieldValues::new();
        row.insert("route_operation".to_string(), term.operation.to_string());
        if let Some(set) = &term.match_prefix_set {
            row.insert("match_prefix_set".to_string(), set.clone());
        }
        if let Some(community) = &term.match_community {
            row.insert("match_community".to_string(), community.name.clone());
        }
        if let Some(pref) = term.set_local_pref {
            row.insert("set_local_pref".to_string(), pref.to_string());
        }
        if let Some(community) = &term.set_community {
            row.insert("set_community".to_string(), community.clone());
        }
        if let Some(med) = term.set_med {
            row.insert("set_med".to_string(), med.to_string());
        }
        entries.push(CompositeEntry::new(
            ROUTE_MAP_TABLE,
            join_key([policy_name, &term.sequence.to_string()]),
            row,
        ));

        if let Some(set) = &term.match_prefix_set {
            if emitted_sets.insert(format!("prefix:{}", set)) {
                let list = network.prefix_list(set)?;
                entries.extend(prefix_set_entries(set, list));
            }
        }
        if let Some(community) = &term.match_community {
            if emitted_sets.insert(format!("community:{}", community.name)) {
                entries.push(community_set_entry(community));
            }
        }
    }

    Ok(entries)
}
