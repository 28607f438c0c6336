//! In-memory mirror of a device's CONFIG_DB.

use crate::{Change, ChangeKind, CompositeEntry, FieldValues};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point-in-time copy of (the relevant subset of) CONFIG_DB,
/// tables keyed by name, rows keyed by their '|'-joined key.
///
/// Dependency queries and idempotency filtering run against this
/// mirror; they never re-fetch from the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDbSnapshot {
    tables: BTreeMap<String, BTreeMap<String, FieldValues>>,
}

impl ConfigDbSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up one row.
    pub fn get(&self, table: &str, key: &str) -> Option<&FieldValues> {
        self.tables.get(table)?.get(key)
    }

    /// Returns true if the row exists.
    pub fn contains(&self, table: &str, key: &str) -> bool {
        self.get(table, key).is_some()
    }

    /// Returns true if the table has at least one row.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.get(table).is_some_and(|rows| !rows.is_empty())
    }

    /// Iterates one table's rows in key order.
    pub fn table(&self, table: &str) -> impl Iterator<Item = (&String, &FieldValues)> {
        self.tables.get(table).into_iter().flatten()
    }

    /// Returns the keys of a table that start with `prefix`, in order.
    pub fn keys_with_prefix(&self, table: &str, prefix: &str) -> Vec<String> {
        self.table(table)
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Inserts or replaces a row.
    pub fn set(&mut self, table: impl Into<String>, key: impl Into<String>, row: FieldValues) {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(key.into(), row);
    }

    /// Removes a row; empty tables are dropped.
    pub fn remove(&mut self, table: &str, key: &str) -> Option<FieldValues> {
        let rows = self.tables.get_mut(table)?;
        let removed = rows.remove(key);
        if rows.is_empty() {
            self.tables.remove(table);
        }
        removed
    }

    /// Folds a change into the mirror, keeping it aligned with what the
    /// device now holds.
    pub fn apply_change(&mut self, change: &Change) {
        match change.kind {
            ChangeKind::Add | ChangeKind::Modify => {
                self.set(
                    change.table.clone(),
                    change.key.clone(),
                    change.new_fields.clone().unwrap_or_default(),
                );
            }
            ChangeKind::Delete => {
                self.remove(&change.table, &change.key);
            }
        }
    }

    /// Total row count across all tables.
    pub fn entry_count(&self) -> usize {
        self.tables.values().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Flattens the snapshot into entries, table order then key order.
    pub fn entries(&self) -> Vec<CompositeEntry> {
        self.tables
            .iter()
            .flat_map(|(table, rows)| {
                rows.iter().map(|(key, fields)| CompositeEntry {
                    table: table.clone(),
                    key: key.clone(),
                    fields: fields.clone(),
                })
            })
            .collect()
    }

    /// Replaces all content with the given entries.
    pub fn replace_with(&mut self, entries: &[CompositeEntry]) {
        self.tables.clear();
        for entry in entries {
            self.set(entry.table.clone(), entry.key.clone(), entry.fields.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use pretty_assertions::assert_eq;

    fn sample() -> ConfigDbSnapshot {
        let mut snap = ConfigDbSnapshot::new();
        snap.set("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        snap.set("VLAN_MEMBER", "Vlan100|Ethernet0", fields! {"tagging_mode" => "untagged"});
        snap.set("VLAN_MEMBER", "Vlan100|Ethernet1", fields! {"tagging_mode" => "untagged"});
        snap
    }

    #[test]
    fn test_get_and_contains() {
        let snap = sample();
        assert!(snap.contains("VLAN", "Vlan100"));
        assert!(!snap.contains("VLAN", "Vlan200"));
        assert_eq!(
            snap.get("VLAN", "Vlan100").unwrap().get("vlanid").unwrap(),
            "100"
        );
    }

    #[test]
    fn test_keys_with_prefix() {
        let snap = sample();
        let keys = snap.keys_with_prefix("VLAN_MEMBER", "Vlan100|");
        assert_eq!(keys, vec!["Vlan100|Ethernet0", "Vlan100|Ethernet1"]);
        assert!(snap.keys_with_prefix("VLAN_MEMBER", "Vlan200|").is_empty());
    }

    #[test]
    fn test_apply_change_round_trip() {
        let mut snap = ConfigDbSnapshot::new();
        let add = Change::add("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        snap.apply_change(&add);
        assert!(snap.contains("VLAN", "Vlan100"));

        snap.apply_change(&add.inverse());
        assert!(snap.is_empty());
    }

    #[test]
    fn test_remove_drops_empty_table() {
        let mut snap = ConfigDbSnapshot::new();
        snap.set("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        snap.remove("VLAN", "Vlan100");
        assert!(!snap.has_table("VLAN"));
    }

    #[test]
    fn test_entries_are_ordered() {
        let snap = sample();
        let entries = snap.entries();
        assert_eq!(entries.len(), 3);
        // table order: VLAN before VLAN_MEMBER; keys sorted inside
        assert_eq!(entries[0].table, "VLAN");
        assert_eq!(entries[1].key, "Vlan100|Ethernet0");
        assert_eq!(entries[2].key, "Vlan100|Ethernet1");
    }

    #[test]
    fn test_replace_with() {
        let mut snap = sample();
        let entries = vec![CompositeEntry {
            table: "VRF".to_string(),
            key: "cust".to_string(),
            fields: fields! {"vni" => "10001"},
        }];
        snap.replace_with(&entries);
        assert_eq!(snap.entry_count(), 1);
        assert!(snap.contains("VRF", "cust"));
        assert!(!snap.contains("VLAN", "Vlan100"));
    }
}
