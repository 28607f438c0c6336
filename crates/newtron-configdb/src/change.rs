//! A single CONFIG_DB mutation, recorded with enough state to invert it.

use crate::FieldValues;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of mutation a [`Change`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl ChangeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "ADD",
            ChangeKind::Modify => "MODIFY",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One table/key mutation.
///
/// Field bookkeeping is strict so the rollback inverse is never
/// ambiguous: Add carries only new fields, Delete only old fields,
/// Modify both. The constructors enforce this; there is no way to build
/// a malformed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub table: String,
    pub key: String,
    pub kind: ChangeKind,
    pub old_fields: Option<FieldValues>,
    pub new_fields: Option<FieldValues>,
}

impl Change {
    /// A new row. `new_fields` may be empty (CONFIG_DB keeps rows with
    /// no fields, e.g. INTERFACE IP children).
    pub fn add(table: impl Into<String>, key: impl Into<String>, new_fields: FieldValues) -> Self {
        Change {
            table: table.into(),
            key: key.into(),
            kind: ChangeKind::Add,
            old_fields: None,
            new_fields: Some(new_fields),
        }
    }

    /// A row replacement: `old_fields` is the full row before, and
    /// `new_fields` the full row after.
    pub fn modify(
        table: impl Into<String>,
        key: impl Into<String>,
        old_fields: FieldValues,
        new_fields: FieldValues,
    ) -> Self {
        Change {
            table: table.into(),
            key: key.into(),
            kind: ChangeKind::Modify,
            old_fields: Some(old_fields),
            new_fields: Some(new_fields),
        }
    }

    /// A row removal; `old_fields` records what the row held.
    pub fn delete(
        table: impl Into<String>,
        key: impl Into<String>,
        old_fields: FieldValues,
    ) -> Self {
        Change {
            table: table.into(),
            key: key.into(),
            kind: ChangeKind::Delete,
            old_fields: Some(old_fields),
            new_fields: None,
        }
    }

    /// Full Redis-style key, "TABLE|key".
    pub fn redis_key(&self) -> String {
        format!("{}|{}", self.table, self.key)
    }

    /// The row state this change expects after application; `None`
    /// means the row must be absent.
    pub fn expected_fields(&self) -> Option<&FieldValues> {
        match self.kind {
            ChangeKind::Add | ChangeKind::Modify => self.new_fields.as_ref(),
            ChangeKind::Delete => None,
        }
    }

    /// Builds the inverse change: Add ↔ Delete, Modify restores the old
    /// fields.
    pub fn inverse(&self) -> Change {
        match self.kind {
            ChangeKind::Add => Change::delete(
                self.table.clone(),
                self.key.clone(),
                self.new_fields.clone().unwrap_or_default(),
            ),
            ChangeKind::Delete => Change::add(
                self.table.clone(),
                self.key.clone(),
                self.old_fields.clone().unwrap_or_default(),
            ),
            ChangeKind::Modify => Change::modify(
                self.table.clone(),
                self.key.clone(),
                self.new_fields.clone().unwrap_or_default(),
                self.old_fields.clone().unwrap_or_default(),
            ),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}|{}", self.kind, self.table, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_inverse_is_delete() {
        let add = Change::add("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        assert!(add.old_fields.is_none());

        let inv = add.inverse();
        assert_eq!(inv.kind, ChangeKind::Delete);
        assert_eq!(inv.old_fields, Some(fields! {"vlanid" => "100"}));
        assert!(inv.new_fields.is_none());
    }

    #[test]
    fn test_delete_inverse_is_add() {
        let del = Change::delete("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        let inv = del.inverse();
        assert_eq!(inv.kind, ChangeKind::Add);
        assert_eq!(inv.new_fields, Some(fields! {"vlanid" => "100"}));
    }

    #[test]
    fn test_modify_inverse_swaps_fields() {
        let old = fields! {"ports" => "Ethernet0"};
        let new = fields! {"ports" => "Ethernet0,Ethernet4"};
        let modify = Change::modify("ACL_TABLE", "cust-in", old.clone(), new.clone());

        let inv = modify.inverse();
        assert_eq!(inv.old_fields, Some(new));
        assert_eq!(inv.new_fields, Some(old));
    }

    #[test]
    fn test_double_inverse_is_identity() {
        let change = Change::modify(
            "INTERFACE",
            "Ethernet4",
            fields! {},
            fields! {"vrf_name" => "cust-Eth4"},
        );
        assert_eq!(change.inverse().inverse(), change);
    }

    #[test]
    fn test_expected_fields() {
        let add = Change::add("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        assert!(add.expected_fields().is_some());

        let del = Change::delete("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        assert!(del.expected_fields().is_none());
    }

    #[test]
    fn test_redis_key() {
        let change = Change::add("VLAN_MEMBER", "Vlan100|Ethernet0", fields! {});
        assert_eq!(change.redis_key(), "VLAN_MEMBER|Vlan100|Ethernet0");
    }
}
