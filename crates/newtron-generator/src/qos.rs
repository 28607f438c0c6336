//! QoS policy expansion into the device-wide QoS tables.

use newtron_configdb::tables::{
    DSCP_TO_TC_MAP_TABLE, PORT_QOS_MAP_TABLE, QUEUE_TABLE, SCHEDULER_TABLE, TC_TO_QUEUE_MAP_TABLE,
    WRED_PROFILE_TABLE,
};
use newtron_configdb::{join_key, CompositeEntry, FieldValues};
use newtron_spec::NetworkSpec;

use crate::error::GeneratorResult;

/// Expands a QoS policy for one interface.
///
/// The classification maps and schedulers are device-wide (named after
/// the policy, shared across interfaces); QUEUE and PORT_QOS_MAP rows
/// are per-interface.
pub fn qos_entries(
    network: &NetworkSpec,
    policy_name: &str,
    interface: &str,
) -> GeneratorResult<Vec<CompositeEntry>> {
    let policy = network.qos_policy(policy_name)?;
    let mut entries = Vec::new();

    let dscp_map_name = format!("{}_dscp", policy_name);
    if !policy.dscp_to_tc.is_empty() {
        entries.push(CompositeEntry::new(
            DSCP_TO_TC_MAP_TABLE,
            dscp_map_name.clone(),
            policy.dscp_to_tc.clone(),
        ));
    }

    let tc_map_name = format!("{}_tc2q", policy_name);
    if !policy.tc_to_queue.is_empty() {
        entries.push(CompositeEntry::new(
            TC_TO_QUEUE_MAP_TABLE,
            tc_map_name.clone(),
            policy.tc_to_queue.clone(),
        ));
    }

    for queue in &policy.queues {
        let scheduler_name = format!("{}.q{}", policy_name, queue.queue);
        let wred_name = format!("{}_q{}_wred", policy_name, queue.queue);

        if let Some(weight) = queue.weight {
            let mut row = FieldValues::new();
            row.insert("type".to_string(), "DWRR".to_string());
            row.insert("weight".to_string(), weight.to_string());
            entries.push(CompositeEntry::new(
                SCHEDULER_TABLE,
                scheduler_name.clone(),
                row,
            ));
        }

        if let Some(wred) = &queue.wred {
            let mut row = FieldValues::new();
            row.insert("wred_red_enable".to_string(), "true".to_string());
            row.insert("red_min_threshold".to_string(), wred.min_threshold.to_string());
            row.insert("red_max_threshold".to_string(), wred.max_threshold.to_string());
            row.insert(
                "red_drop_probability".to_string(),
                wred.drop_probability.to_string(),
            );
            entries.push(CompositeEntry::new(WRED_PROFILE_TABLE, wred_name.clone(), row));
        }

        let mut queue_row = FieldValues::new();
        if queue.weight.is_some() {
            queue_row.insert("scheduler".to_string(), scheduler_name);
        }
        if queue.wred.is_some() {
            queue_row.insert("wred_profile".to_string(), wred_name);
        }
        entries.push(CompositeEntry::new(
            QUEUE_TABLE,
            join_key([interface, &queue.queue.to_string()]),
            queue_row,
        ));
    }

    let mut port_row = FieldValues::new();
    if !policy.dscp_to_tc.is_empty() {
        port_row.insert("dscp_to_tc_map".to_string(), dscp_map_name);
    }
    if !policy.tc_to_queue.is_empty() {
        port_row.insert("tc_to_queue_map".to_string(), tc_map_name);
    }
    entries.push(CompositeEntry::new(PORT_QOS_MAP_TABLE, interface, port_row));

    Ok(entries)
}

/// Expands a legacy QoS profile: one PORT_QOS_MAP row referencing maps
/// that already exist on the device.
pub fn qos_profile_entries(
    network: &NetworkSpec,
    profile_name: &str,
    interface: &str,
) -> GeneratorResult<Vec<CompositeEntry>> {
    let profile = network.qos_profile(profile_name)?;
    let mut row = FieldValues::new();
    if let Some(map) = &profile.dscp_to_tc_map {
        row.insert("dscp_to_tc_map".to_string(), map.clone());
    }
    if let Some(map) = &profile.tc_to_queue_map {
        row.insert("tc_to_queue_map".to_string(), map.clone());
    }
    Ok(vec![CompositeEntry::new(PORT_QOS_MAP_TABLE, interface, row)])
}
