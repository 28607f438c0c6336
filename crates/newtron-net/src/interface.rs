//! Interface handles: incremental service apply and dependency-aware
//! removal.

use newtron_changeset::ChangeSet;
use newtron_configdb::tables::{
    fields, ACL_RULE_TABLE, ACL_TABLE_TABLE, BGP_EVPN_VNI_TABLE, BGP_GLOBALS_AF_TABLE,
    BGP_GLOBALS_TABLE, BGP_NEIGHBOR_AF_TABLE, BGP_NEIGHBOR_TABLE, DEFAULT_VRF, INTERFACE_TABLE,
    PORT_QOS_MAP_TABLE, QUEUE_TABLE, SERVICE_BINDING_TABLE, SUPPRESS_VLAN_NEIGH_TABLE,
    VLAN_INTERFACE_TABLE, VLAN_MEMBER_TABLE, VLAN_TABLE, VRF_TABLE, VXLAN_TUNNEL_MAP_TABLE,
    VXLAN_TUNNEL_TABLE,
};
use newtron_configdb::{ConfigDbSnapshot, FieldValues};
use newtron_generator::{plan as generate_plan, ServiceRequest};
use newtron_spec::VrfType;
use newtron_types::IpPrefix;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::deptracker::DependencyTracker;
use crate::device::{Device, ServiceBinding};
use crate::error::{NetError, NetResult};

/// Options for binding a service to an interface.
#[derive(Debug, Clone, Default)]
pub struct ApplyServiceOptions {
    pub service: String,
    /// Interface address, required for L3 services.
    pub ip: Option<IpPrefix>,
    /// Peer AS, consumed when the service says peer_as = "request".
    pub peer_as: Option<u32>,
    /// Free-form service parameters.
    pub params: BTreeMap<String, String>,
}

impl ApplyServiceOptions {
    pub fn new(service: impl Into<String>) -> Self {
        ApplyServiceOptions {
            service: service.into(),
            ..Default::default()
        }
    }
}

/// A handle on one interface of a live device. Interfaces own no
/// state; they read and mutate through their Device.
pub struct Interface {
    device: Arc<Device>,
    name: String,
}

impl Device {
    /// Returns a handle on an interface known to the device. Requires
    /// connected.
    pub async fn interface(self: &Arc<Self>, name: &str) -> NetResult<Interface> {
        let state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name().to_string(),
            });
        }
        if !state.interfaces.contains_key(name) {
            return Err(NetError::UnknownInterface {
                device: self.name().to_string(),
                interface: name.to_string(),
            });
        }
        drop(state);
        Ok(Interface {
            device: Arc::clone(self),
            name: name.to_string(),
        })
    }
}

impl Interface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The current service binding, if any.
    pub async fn binding(&self) -> Option<ServiceBinding> {
        self.device.binding(&self.name).await
    }

    /// Builds the change set that binds a service to this interface.
    ///
    /// Runs the generator, then filters entries already satisfied by
    /// device state (the idempotent overlay), layers route-map MODIFYs
    /// onto the emitted BGP AF row, appends QoS tables, and re-emits
    /// the service binding last. The set is returned unapplied; the
    /// caller drives apply / verify / rollback.
    #[instrument(skip(self, opts), fields(device = %self.device.name(), interface = %self.name, service = %opts.service))]
    pub async fn apply_service(&self, opts: &ApplyServiceOptions) -> NetResult<ChangeSet> {
        let state = self.device.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.device.name().to_string(),
            });
        }
        if !state.locked {
            return Err(NetError::NotLocked {
                device: self.device.name().to_string(),
            });
        }

        let intf_state =
            state
                .interfaces
                .get(&self.name)
                .ok_or_else(|| NetError::UnknownInterface {
                    device: self.device.name().to_string(),
                    interface: self.name.clone(),
                })?;
        if let Some(lag) = &intf_state.lag {
            return Err(NetError::LagMember {
                interface: self.name.clone(),
                lag: lag.clone(),
            });
        }
        if let Some(bound) = &intf_state.binding {
            return Err(NetError::ServiceBound {
                interface: self.name.clone(),
                service: bound.service_name.clone(),
            });
        }

        let profile = self.device.profile();
        let request = ServiceRequest {
            service_name: opts.service.clone(),
            interface: self.name.clone(),
            ip: opts.ip,
            peer_as: opts.peer_as,
            local_as: profile.asn.as_u32(),
            underlay_asn: profile.underlay_asn,
            platform: Some(profile.platform.clone()),
            params: opts.params.clone(),
        };

        let plan = {
            let spec = self.device.shared.spec.read();
            generate_plan(&spec, &request)?
        };

        let snap = &state.snapshot;

        if plan.is_evpn() {
            if !snap.has_table(VXLAN_TUNNEL_TABLE) {
                return Err(NetError::EvpnPrereq {
                    device: self.device.name().to_string(),
                    missing: "a VTEP",
                });
            }
            if !snap.has_table(BGP_GLOBALS_TABLE) {
                return Err(NetError::EvpnPrereq {
                    device: self.device.name().to_string(),
                    missing: "BGP globals",
                });
            }
        }

        let mut cs = ChangeSet::new(
            self.device.name(),
            format!("apply-service {}", opts.service),
        );

        let vlan_key = plan.vlan.map(|v| v.key());
        let vlan_present = vlan_key
            .as_ref()
            .is_some_and(|key| snap.contains(VLAN_TABLE, key));
        let shared_vrf_present = plan.vrf_type == VrfType::Shared
            && plan
                .vrf_name
                .as_ref()
                .is_some_and(|vrf| snap.contains(VRF_TABLE, vrf));
        let mut preexisting_acls: BTreeSet<String> = BTreeSet::new();

        for entry in &plan.entries {
            match entry.table.as_str() {
                // VLAN scaffold rides on the first applier of the VLAN
                VLAN_TABLE | SUPPRESS_VLAN_NEIGH_TABLE if vlan_present => {
                    debug!(key = %entry.key, "VLAN already on device, skipping scaffold row");
                }
                VXLAN_TUNNEL_MAP_TABLE => {
                    let is_vlan_map = vlan_key
                        .as_ref()
                        .is_some_and(|key| entry.key.ends_with(&format!("_{}", key)));
                    if is_vlan_map && vlan_present {
                        continue;
                    }
                    if !is_vlan_map && shared_vrf_present {
                        continue;
                    }
                    cs.add_create(entry.table.clone(), entry.key.clone(), entry.fields.clone());
                }
                // a shared VRF and its EVPN rows already exist when any
                // other interface uses the ipvpn
                VRF_TABLE | BGP_GLOBALS_AF_TABLE | BGP_EVPN_VNI_TABLE if shared_vrf_present => {
                    debug!(key = %entry.key, "Shared VRF already on device, skipping");
                }
                ACL_TABLE_TABLE => {
                    if let Some(existing) = snap.get(ACL_TABLE_TABLE, &entry.key) {
                        preexisting_acls.insert(entry.key.clone());
                        if let Some(change) =
                            merge_acl_ports(&entry.key, existing, &self.name)
                        {
                            cs.add(change);
                        }
                    } else {
                        cs.add_create(
                            entry.table.clone(),
                            entry.key.clone(),
                            entry.fields.clone(),
                        );
                    }
                }
                ACL_RULE_TABLE => {
                    // rules belong to the interface that created the ACL
                    let acl = entry.key.split('|').next().unwrap_or_default();
                    if preexisting_acls.contains(acl) {
                        continue;
                    }
                    cs.add_create(entry.table.clone(), entry.key.clone(), entry.fields.clone());
                }
                // re-emitted last, with the derived bgp_neighbor field
                SERVICE_BINDING_TABLE => {}
                BGP_NEIGHBOR_TABLE => {
                    if snap.contains(BGP_NEIGHBOR_TABLE, &entry.key) {
                        let (vrf, neighbor) = entry
                            .key
                            .split_once('|')
                            .unwrap_or((DEFAULT_VRF, entry.key.as_str()));
                        return Err(NetError::DuplicateNeighbor {
                            vrf: vrf.to_string(),
                            neighbor: neighbor.to_string(),
                        });
                    }
                    cs.add_create(entry.table.clone(), entry.key.clone(), entry.fields.clone());
                }
                _ => match snap.get(&entry.table, &entry.key) {
                    Some(existing) if existing == &entry.fields => {
                        debug!(key = %entry.key, "Row already matches device state");
                    }
                    Some(existing) => {
                        // merge over what the device holds
                        let mut merged = existing.clone();
                        merged.extend(entry.fields.clone());
                        if &merged != existing {
                            cs.add_modify(
                                entry.table.clone(),
                                entry.key.clone(),
                                existing.clone(),
                                merged,
                            );
                        }
                    }
                    None => {
                        cs.add_create(
                            entry.table.clone(),
                            entry.key.clone(),
                            entry.fields.clone(),
                        );
                    }
                },
            }
        }

        // route maps layer onto the AF row as a second MODIFY
        if let Some(af_key) = &plan.neighbor_af_key {
            if plan.import_policy.is_some() || plan.export_policy.is_some() {
                let old: FieldValues = plan
                    .entries
                    .iter()
                    .find(|e| e.table == BGP_NEIGHBOR_AF_TABLE && &e.key == af_key)
                    .map(|e| e.fields.clone())
                    .unwrap_or_default();
                let mut new = old.clone();
                if let Some(policy) = &plan.import_policy {
                    new.insert(fields::ROUTE_MAP_IN.to_string(), policy.clone());
                }
                if let Some(policy) = &plan.export_policy {
                    new.insert(fields::ROUTE_MAP_OUT.to_string(), policy.clone());
                }
                cs.add_modify(BGP_NEIGHBOR_AF_TABLE, af_key.clone(), old, new);
            }
        }

        // per-service QoS; classification maps are shared device-wide
        for entry in &plan.qos_entries {
            match snap.get(&entry.table, &entry.key) {
                Some(existing) if existing == &entry.fields => {}
                Some(existing) => {
                    let mut merged = existing.clone();
                    merged.extend(entry.fields.clone());
                    if &merged != existing {
                        cs.add_modify(
                            entry.table.clone(),
                            entry.key.clone(),
                            existing.clone(),
                            merged,
                        );
                    }
                }
                None => {
                    cs.add_create(entry.table.clone(), entry.key.clone(), entry.fields.clone())
                }
            }
        }

        cs.add_create(SERVICE_BINDING_TABLE, self.name.clone(), plan.binding.clone());

        debug!(changes = cs.len(), "Assembled apply change set");
        Ok(cs)
    }

    /// Builds the change set that removes this interface's service,
    /// deleting shared resources only when this interface is their
    /// last user.
    #[instrument(skip(self), fields(device = %self.device.name(), interface = %self.name))]
    pub async fn remove_service(&self) -> NetResult<ChangeSet> {
        let state = self.device.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.device.name().to_string(),
            });
        }
        if !state.locked {
            return Err(NetError::NotLocked {
                device: self.device.name().to_string(),
            });
        }

        let bound = state
            .interfaces
            .get(&self.name)
            .and_then(|i| i.binding.clone())
            .ok_or_else(|| NetError::NoServiceBound {
                interface: self.name.clone(),
            })?;

        let snap = &state.snapshot;
        let deps = DependencyTracker::new(snap, &self.name);
        let mut cs = ChangeSet::new(
            self.device.name(),
            format!("remove-service {}", bound.service_name),
        );

        // per-interface rows that always go
        delete_if_present(&mut cs, snap, PORT_QOS_MAP_TABLE, &self.name);
        for key in snap.keys_with_prefix(QUEUE_TABLE, &format!("{}|", self.name)) {
            delete_if_present(&mut cs, snap, QUEUE_TABLE, &key);
        }
        for key in snap.keys_with_prefix(INTERFACE_TABLE, &format!("{}|", self.name)) {
            delete_if_present(&mut cs, snap, INTERFACE_TABLE, &key);
        }
        delete_if_present(&mut cs, snap, SERVICE_BINDING_TABLE, &self.name);

        // ACLs: last user deletes, others step out of the ports list
        for acl in [&bound.ingress_acl, &bound.egress_acl].into_iter().flatten() {
            let Some(existing) = snap.get(ACL_TABLE_TABLE, acl) else {
                continue;
            };
            if deps.is_last_acl_user(acl) {
                for key in snap.keys_with_prefix(ACL_RULE_TABLE, &format!("{}|", acl)) {
                    delete_if_present(&mut cs, snap, ACL_RULE_TABLE, &key);
                }
                cs.add_delete(ACL_TABLE_TABLE, acl.clone(), existing.clone());
            } else {
                let remaining: Vec<&str> = existing
                    .get(fields::PORTS)
                    .map(|p| {
                        p.split(',')
                            .filter(|port| !port.is_empty() && *port != self.name)
                            .collect()
                    })
                    .unwrap_or_default();
                let mut updated = existing.clone();
                updated.insert(fields::PORTS.to_string(), remaining.join(","));
                cs.add_modify(ACL_TABLE_TABLE, acl.clone(), existing.clone(), updated);
            }
        }

        // the BGP session rode on this interface's address
        if let Some(peer) = &bound.bgp_neighbor {
            let vrf_key = bound.vrf_name.as_deref().unwrap_or(DEFAULT_VRF);
            let neighbor_key = format!("{}|{}", vrf_key, peer);
            for key in
                snap.keys_with_prefix(BGP_NEIGHBOR_AF_TABLE, &format!("{}|", neighbor_key))
            {
                delete_if_present(&mut cs, snap, BGP_NEIGHBOR_AF_TABLE, &key);
            }
            delete_if_present(&mut cs, snap, BGP_NEIGHBOR_TABLE, &neighbor_key);
        }

        // VRF teardown
        if let Some(vrf) = &bound.vrf_name {
            let shared = bound.ipvpn.as_deref() == Some(vrf.as_str());
            clear_interface_vrf(&mut cs, snap, &self.name, vrf);
            if shared {
                if deps.is_last_ipvpn_user(vrf) {
                    teardown_vrf(&mut cs, snap, vrf);
                }
            } else {
                teardown_vrf(&mut cs, snap, vrf);
            }
        }

        // VLAN teardown
        if let Some(macvpn_name) = &bound.macvpn {
            let (vlan, l2vni) = {
                let spec = self.device.shared.spec.read();
                let macvpn = spec.macvpn(macvpn_name)?;
                (macvpn.vlan, macvpn.l2vni)
            };
            let vlan_key = vlan.key();

            delete_if_present(
                &mut cs,
                snap,
                VLAN_MEMBER_TABLE,
                &format!("{}|{}", vlan_key, self.name),
            );

            if deps.is_last_vlan_member(vlan.as_u16()) {
                for key in snap.keys_with_prefix(VLAN_INTERFACE_TABLE, &format!("{}|", vlan_key)) {
                    delete_if_present(&mut cs, snap, VLAN_INTERFACE_TABLE, &key);
                }
                delete_if_present(&mut cs, snap, VLAN_INTERFACE_TABLE, &vlan_key);
                delete_if_present(&mut cs, snap, SUPPRESS_VLAN_NEIGH_TABLE, &vlan_key);
                if let Some(vni) = l2vni {
                    delete_if_present(
                        &mut cs,
                        snap,
                        VXLAN_TUNNEL_MAP_TABLE,
                        &format!("vtep1|map_{}_{}", vni, vlan_key),
                    );
                }
                delete_if_present(&mut cs, snap, VLAN_TABLE, &vlan_key);
            }
        }

        debug!(changes = cs.len(), "Assembled remove change set");
        Ok(cs)
    }
}

/// MODIFY appending an interface to an ACL's ports list; `None` when
/// it is already there. Order preserved, no duplicates.
fn merge_acl_ports(
    acl_name: &str,
    existing: &FieldValues,
    interface: &str,
) -> Option<newtron_configdb::Change> {
    let ports = existing.get(fields::PORTS).cloned().unwrap_or_default();
    let mut list: Vec<&str> = ports.split(',').filter(|p| !p.is_empty()).collect();
    if list.contains(&interface) {
        return None;
    }
    list.push(interface);
    let mut updated = existing.clone();
    updated.insert(fields::PORTS.to_string(), list.join(","));
    Some(newtron_configdb::Change::modify(
        ACL_TABLE_TABLE,
        acl_name,
        existing.clone(),
        updated,
    ))
}

fn delete_if_present(cs: &mut ChangeSet, snap: &ConfigDbSnapshot, table: &str, key: &str) {
    if let Some(existing) = snap.get(table, key) {
        cs.add_delete(table, key, existing.clone());
    }
}

/// Clears the vrf_name field on the interface's base row.
fn clear_interface_vrf(cs: &mut ChangeSet, snap: &ConfigDbSnapshot, interface: &str, vrf: &str) {
    if let Some(existing) = snap.get(INTERFACE_TABLE, interface) {
        if existing.get(fields::VRF_NAME).map(String::as_str) == Some(vrf) {
            let mut cleared = existing.clone();
            cleared.remove(fields::VRF_NAME);
            cs.add_modify(INTERFACE_TABLE, interface, existing.clone(), cleared);
        }
    }
}

/// Tears down a VRF and its EVPN rows, children before the VRF row.
fn teardown_vrf(cs: &mut ChangeSet, snap: &ConfigDbSnapshot, vrf: &str) {
    for key in snap.keys_with_prefix(BGP_EVPN_VNI_TABLE, &format!("{}|", vrf)) {
        delete_if_present(cs, snap, BGP_EVPN_VNI_TABLE, &key);
    }
    delete_if_present(cs, snap, BGP_GLOBALS_AF_TABLE, &format!("{}|l2vpn_evpn", vrf));
    for key in snap.keys_with_prefix(VXLAN_TUNNEL_MAP_TABLE, "vtep1|") {
        if key.ends_with(&format!("_{}", vrf)) {
            delete_if_present(cs, snap, VXLAN_TUNNEL_MAP_TABLE, &key);
        }
    }
    delete_if_present(cs, snap, VRF_TABLE, vrf);
}
