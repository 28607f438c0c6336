//! Whole-device composites assembled offline for atomic delivery.

use crate::FieldValues;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One generated CONFIG_DB row: table, key, fields.
///
/// The generator's output form; the transport layer does any
/// schema-level coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeEntry {
    pub table: String,
    pub key: String,
    pub fields: FieldValues,
}

impl CompositeEntry {
    pub fn new(table: impl Into<String>, key: impl Into<String>, fields: FieldValues) -> Self {
        CompositeEntry {
            table: table.into(),
            key: key.into(),
            fields,
        }
    }

    /// Full Redis-style key, "TABLE|key".
    pub fn redis_key(&self) -> String {
        format!("{}|{}", self.table, self.key)
    }
}

impl fmt::Display for CompositeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.table, self.key)
    }
}

/// How a composite is delivered to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Replace the whole CONFIG_DB atomically; readers see either all
    /// old rows or all new rows.
    Overwrite,
    /// Validate against existing service bindings, then pipeline-write
    /// on top of the current content.
    Merge,
}

impl DeliveryMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Overwrite => "overwrite",
            DeliveryMode::Merge => "merge",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeMetadata {
    pub generated_at: DateTime<Utc>,
    pub device: String,
    pub generator: String,
    pub description: String,
    pub mode: DeliveryMode,
}

/// A whole-device configuration: table → key → fields, plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub metadata: CompositeMetadata,
    tables: BTreeMap<String, BTreeMap<String, FieldValues>>,
}

impl CompositeConfig {
    /// Looks up one row.
    pub fn get(&self, table: &str, key: &str) -> Option<&FieldValues> {
        self.tables.get(table)?.get(key)
    }

    /// Iterates one table's rows in key order.
    pub fn table(&self, table: &str) -> impl Iterator<Item = (&String, &FieldValues)> {
        self.tables.get(table).into_iter().flatten()
    }

    /// Total row count.
    pub fn entry_count(&self) -> usize {
        self.tables.values().map(|rows| rows.len()).sum()
    }

    /// Flattens into entries, table order then key order.
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
}

/// Accumulates table → key → fields maps and stamps metadata.
#[derive(Debug, Clone)]
pub struct CompositeBuilder {
    device: String,
    generator: String,
    description: String,
    mode: DeliveryMode,
    tables: BTreeMap<String, BTreeMap<String, FieldValues>>,
}

impl CompositeBuilder {
    pub fn new(device: impl Into<String>, generator: impl Into<String>) -> Self {
        CompositeBuilder {
            device: device.into(),
            generator: generator.into(),
            description: String::new(),
            mode: DeliveryMode::Overwrite,
            tables: BTreeMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds a row; a later insert for the same table/key merges fields
    /// over the earlier one.
    pub fn insert(&mut self, entry: CompositeEntry) {
        let row = self
            .tables
            .entry(entry.table)
            .or_default()
            .entry(entry.key)
            .or_default();
        row.extend(entry.fields);
    }

    /// Adds a batch of rows.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = CompositeEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    /// Returns true if the row exists already.
    pub fn contains(&self, table: &str, key: &str) -> bool {
        self.tables.get(table).is_some_and(|rows| rows.contains_key(key))
    }

    /// Finishes the composite, stamping the metadata timestamp.
    pub fn build(self) -> CompositeConfig {
        CompositeConfig {
            metadata: CompositeMetadata {
                generated_at: Utc::now(),
                device: self.device,
                generator: self.generator,
                description: self.description,
                mode: self.mode,
            },
            tables: self.tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_accumulates() {
        let mut builder = CompositeBuilder::new("leaf1", "topology");
        builder.insert(CompositeEntry::new("VLAN", "Vlan100", fields! {"vlanid" => "100"}));
        builder.insert(CompositeEntry::new(
            "VLAN_MEMBER",
            "Vlan100|Ethernet0",
            fields! {"tagging_mode" => "untagged"},
        ));

        let cfg = builder.mode(DeliveryMode::Overwrite).build();
        assert_eq!(cfg.entry_count(), 2);
        assert_eq!(cfg.metadata.device, "leaf1");
        assert_eq!(cfg.metadata.mode, DeliveryMode::Overwrite);
    }

    #[test]
    fn test_insert_merges_fields() {
        let mut builder = CompositeBuilder::new("leaf1", "topology");
        builder.insert(CompositeEntry::new("BGP_GLOBALS", "default", fields! {"local_asn" => "64512"}));
        builder.insert(CompositeEntry::new("BGP_GLOBALS", "default", fields! {"router_id" => "10.0.0.1"}));

        let cfg = builder.build();
        let row = cfg.get("BGP_GLOBALS", "default").unwrap();
        assert_eq!(row.get("local_asn").unwrap(), "64512");
        assert_eq!(row.get("router_id").unwrap(), "10.0.0.1");
    }

    #[test]
    fn test_entries_ordered() {
        let mut builder = CompositeBuilder::new("leaf1", "topology");
        builder.insert(CompositeEntry::new("VRF", "cust", fields! {}));
        builder.insert(CompositeEntry::new("DEVICE_METADATA", "localhost", fields! {}));

        let entries = builder.build().entries();
        assert_eq!(entries[0].table, "DEVICE_METADATA");
        assert_eq!(entries[1].table, "VRF");
    }
}
