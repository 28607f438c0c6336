//! CONFIG_DB table model shared across the newtron control plane.
//!
//! This crate is the vocabulary every other crate speaks:
//!
//! - [`tables`]: CONFIG_DB table and field name constants (SONiC Unified
//!   FRR Management schema)
//! - [`FieldValues`]: one row, an ordered field→value mapping
//! - [`Change`] / [`ChangeKind`]: a single table/key mutation with enough
//!   recorded state to invert it
//! - [`ConfigDbSnapshot`]: an in-memory mirror of (a subset of) a
//!   device's CONFIG_DB
//! - [`CompositeConfig`] / [`CompositeBuilder`]: a whole-device
//!   configuration assembled offline for atomic delivery

mod change;
mod composite;
mod key;
mod snapshot;
pub mod tables;

pub use change::{Change, ChangeKind};
pub use composite::{
    CompositeBuilder, CompositeConfig, CompositeEntry, CompositeMetadata, DeliveryMode,
};
pub use key::{join_key, split_key, KEY_SEPARATOR};
pub use snapshot::ConfigDbSnapshot;

use std::collections::BTreeMap;

/// One CONFIG_DB row: field name → value, ordered.
///
/// A `BTreeMap` so that every iteration over a row is sorted; previews
/// and generated composites must be byte-stable across runs.
pub type FieldValues = BTreeMap<String, String>;

/// Builds a [`FieldValues`] row from literal pairs.
///
/// ```
/// use newtron_configdb::fields;
///
/// let row = fields! {
///     "vlanid" => "100",
///     "admin_status" => "up",
/// };
/// assert_eq!(row.get("vlanid").map(String::as_str), Some("100"));
/// ```
#[macro_export]
macro_rules! fields {
    ($($field:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut row = $crate::FieldValues::new();
        $(row.insert($field.to_string(), $value.to_string());)*
        row
    }};
}
