//! Reverse-dependency queries over a CONFIG_DB snapshot.
//!
//! Teardown asks "is this interface the last user of X?" before
//! deleting shared resources. All queries are read-only against the
//! cached snapshot; nothing here re-fetches from the device.

use newtron_configdb::tables::{
    binding, fields, ACL_TABLE_TABLE, INTERFACE_TABLE, SERVICE_BINDING_TABLE, VLAN_MEMBER_TABLE,
};
use newtron_configdb::ConfigDbSnapshot;

/// Dependency queries with one interface excluded — the interface
/// being torn down.
pub struct DependencyTracker<'a> {
    snapshot: &'a ConfigDbSnapshot,
    excluded: &'a str,
}

impl<'a> DependencyTracker<'a> {
    pub fn new(snapshot: &'a ConfigDbSnapshot, excluded: &'a str) -> Self {
        DependencyTracker { snapshot, excluded }
    }

    /// True when no port other than the excluded one is bound to the
    /// ACL. An absent ACL has no users.
    pub fn is_last_acl_user(&self, acl_name: &str) -> bool {
        let Some(row) = self.snapshot.get(ACL_TABLE_TABLE, acl_name) else {
            return true;
        };
        let Some(ports) = row.get(fields::PORTS) else {
            return true;
        };
        !ports
            .split(',')
            .map(str::trim)
            .any(|p| !p.is_empty() && p != self.excluded)
    }

    /// True when no member other than the excluded one remains in the
    /// VLAN.
    pub fn is_last_vlan_member(&self, vlan_id: u16) -> bool {
        let prefix = format!("Vlan{}|", vlan_id);
        !self
            .snapshot
            .keys_with_prefix(VLAN_MEMBER_TABLE, &prefix)
            .iter()
            .any(|key| key.strip_prefix(&prefix) != Some(self.excluded))
    }

    /// True when no other interface binds this service.
    pub fn is_last_service_user(&self, service_name: &str) -> bool {
        !self.bindings_excluding_self(binding::SERVICE_NAME, service_name)
    }

    /// True when no other interface binds a service of this ipvpn.
    pub fn is_last_ipvpn_user(&self, ipvpn_name: &str) -> bool {
        !self.bindings_excluding_self(binding::IPVPN, ipvpn_name)
    }

    /// True when no INTERFACE row other than the excluded interface
    /// references the VRF. Only non-composite keys count; IP children
    /// ride with their parent.
    pub fn is_last_vrf_user(&self, vrf_name: &str) -> bool {
        !self.snapshot.table(INTERFACE_TABLE).any(|(key, row)| {
            !key.contains('|')
                && key != self.excluded
                && row.get(fields::VRF_NAME).map(String::as_str) == Some(vrf_name)
        })
    }

    /// Any binding row, other than the excluded interface's, whose
    /// `field` equals `value`?
    fn bindings_excluding_self(&self, field: &str, value: &str) -> bool {
        self.snapshot
            .table(SERVICE_BINDING_TABLE)
            .any(|(key, row)| {
                key != self.excluded && row.get(field).map(String::as_str) == Some(value)
            })
    }
}
