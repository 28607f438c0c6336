//! Per-device configuration primitives.
//!
//! Each primitive builds a ChangeSet against the cached snapshot and
//! returns it unapplied; callers drive apply / verify / rollback
//! through the Device's changeset wrappers. Building requires a
//! connected device (the snapshot must be live); applying additionally
//! requires the lock.

use newtron_changeset::ChangeSet;
use newtron_configdb::tables::{
    fields, ACL_TABLE_TABLE, BGP_GLOBALS_TABLE, BGP_NEIGHBOR_AF_TABLE, BGP_NEIGHBOR_TABLE,
    BGP_PEER_GROUP_TABLE, DEFAULT_VRF, EVPN_NVO_NAME, INTERFACE_TABLE, PORTCHANNEL_MEMBER_TABLE,
    PORTCHANNEL_TABLE, PORT_TABLE, ROUTE_REDISTRIBUTE_TABLE, VLAN_MEMBER_TABLE, VLAN_TABLE,
    VRF_TABLE, VTEP_NAME, VXLAN_EVPN_NVO_TABLE, VXLAN_TUNNEL_MAP_TABLE, VXLAN_TUNNEL_TABLE,
};
use newtron_configdb::{join_key, FieldValues};
use newtron_generator::route_policy::route_policy_entries;
use newtron_types::{IpAddress, VlanId, Vni};
use std::collections::BTreeSet;
use tracing::debug;

use crate::device::{Device, DeviceState};
use crate::error::{NetError, NetResult};

/// Port speeds the PORT table accepts, Mb/s.
const VALID_SPEEDS: &[&str] = &[
    "1000", "10000", "25000", "40000", "50000", "100000", "200000", "400000",
];

const MTU_MIN: u32 = 1280;
const MTU_MAX: u32 = 9216;

impl Device {
    async fn state_for_build(&self) -> NetResult<tokio::sync::MutexGuard<'_, DeviceState>> {
        let state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name().to_string(),
            });
        }
        Ok(state)
    }

    fn changeset(&self, operation: impl Into<String>) -> ChangeSet {
        ChangeSet::new(self.name(), operation)
    }

    /// Creates a VLAN. Idempotent: an existing VLAN yields an empty
    /// set.
    pub async fn create_vlan(&self, vlan: VlanId) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let mut cs = self.changeset(format!("create-vlan {}", vlan));
        if state.snapshot.contains(VLAN_TABLE, &vlan.key()) {
            debug!(device = %self.name(), %vlan, "VLAN already exists");
            return Ok(cs);
        }
        let mut row = FieldValues::new();
        row.insert(fields::VLANID.to_string(), vlan.to_string());
        cs.add_create(VLAN_TABLE, vlan.key(), row);
        Ok(cs)
    }

    /// Removes a VLAN; refused while it still has members.
    pub async fn remove_vlan(&self, vlan: VlanId) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let key = vlan.key();
        let Some(existing) = state.snapshot.get(VLAN_TABLE, &key) else {
            return Err(NetError::invalid_input(
                "vlan",
                format!("{} does not exist on {}", key, self.name()),
            ));
        };
        let members = state
            .snapshot
            .keys_with_prefix(VLAN_MEMBER_TABLE, &format!("{}|", key));
        if !members.is_empty() {
            return Err(NetError::invalid_input(
                "vlan",
                format!("{} still has {} members", key, members.len()),
            ));
        }
        let mut cs = self.changeset(format!("remove-vlan {}", vlan));
        cs.add_delete(VLAN_TABLE, key, existing.clone());
        Ok(cs)
    }

    /// Creates a VRF, optionally mapped to an L3VNI.
    pub async fn create_vrf(&self, name: &str, vni: Option<Vni>) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let mut cs = self.changeset(format!("create-vrf {}", name));
        if state.snapshot.contains(VRF_TABLE, name) {
            debug!(device = %self.name(), vrf = name, "VRF already exists");
            return Ok(cs);
        }
        let mut row = FieldValues::new();
        if let Some(vni) = vni {
            row.insert(fields::VNI.to_string(), vni.to_string());
        }
        cs.add_create(VRF_TABLE, name, row);
        if let Some(vni) = vni {
            let mut map_row = FieldValues::new();
            map_row.insert("vrf".to_string(), name.to_string());
            map_row.insert(fields::VNI.to_string(), vni.to_string());
            cs.add_create(
                VXLAN_TUNNEL_MAP_TABLE,
                join_key([VTEP_NAME, &format!("map_{}_{}", vni, name)]),
                map_row,
            );
        }
        Ok(cs)
    }

    /// Removes a VRF; refused while any interface references it.
    pub async fn remove_vrf(&self, name: &str) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let Some(existing) = state.snapshot.get(VRF_TABLE, name) else {
            return Err(NetError::invalid_input(
                "vrf",
                format!("'{}' does not exist on {}", name, self.name()),
            ));
        };
        let user = state.snapshot.table(INTERFACE_TABLE).find(|(key, row)| {
            !key.contains('|') && row.get(fields::VRF_NAME).map(String::as_str) == Some(name)
        });
        if let Some((interface, _)) = user {
            return Err(NetError::invalid_input(
                "vrf",
                format!("'{}' is still bound to interface '{}'", name, interface),
            ));
        }

        let mut cs = self.changeset(format!("remove-vrf {}", name));
        for key in state
            .snapshot
            .keys_with_prefix(VXLAN_TUNNEL_MAP_TABLE, "vtep1|")
        {
            if key.ends_with(&format!("_{}", name)) {
                if let Some(row) = state.snapshot.get(VXLAN_TUNNEL_MAP_TABLE, &key) {
                    cs.add_delete(VXLAN_TUNNEL_MAP_TABLE, key, row.clone());
                }
            }
        }
        cs.add_delete(VRF_TABLE, name, existing.clone());
        Ok(cs)
    }

    /// Creates a front-panel port. Validates speed, MTU range, and
    /// that the lanes collide with no existing port.
    pub async fn create_port(
        &self,
        name: &str,
        lanes: &str,
        speed: &str,
        mtu: u32,
    ) -> NetResult<ChangeSet> {
        if !VALID_SPEEDS.contains(&speed) {
            return Err(NetError::invalid_input(
                "speed",
                format!("'{}' is not a valid port speed", speed),
            ));
        }
        if !(MTU_MIN..=MTU_MAX).contains(&mtu) {
            return Err(NetError::invalid_input(
                "mtu",
                format!("{} outside {}..={}", mtu, MTU_MIN, MTU_MAX),
            ));
        }

        let state = self.state_for_build().await?;
        if state.snapshot.contains(PORT_TABLE, name) {
            return Err(NetError::invalid_input(
                "port",
                format!("'{}' already exists", name),
            ));
        }

        let new_lanes: BTreeSet<&str> = lanes.split(',').map(str::trim).collect();
        for (existing, row) in state.snapshot.table(PORT_TABLE) {
            if let Some(existing_lanes) = row.get(fields::LANES) {
                if existing_lanes
                    .split(',')
                    .map(str::trim)
                    .any(|lane| new_lanes.contains(lane))
                {
                    return Err(NetError::LaneConflict {
                        port: name.to_string(),
                        existing: existing.clone(),
                    });
                }
            }
        }

        let mut row = FieldValues::new();
        row.insert(fields::LANES.to_string(), lanes.to_string());
        row.insert(fields::SPEED.to_string(), speed.to_string());
        row.insert(fields::MTU.to_string(), mtu.to_string());
        row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());

        let mut cs = self.changeset(format!("create-port {}", name));
        cs.add_create(PORT_TABLE, name, row);
        Ok(cs)
    }

    /// Creates a port channel with the given member ports.
    pub async fn create_port_channel(
        &self,
        name: &str,
        members: &[String],
    ) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        if state.snapshot.contains(PORTCHANNEL_TABLE, name) {
            return Err(NetError::invalid_input(
                "port channel",
                format!("'{}' already exists", name),
            ));
        }
        for member in members {
            if !state.snapshot.contains(PORT_TABLE, member) {
                return Err(NetError::UnknownInterface {
                    device: self.name().to_string(),
                    interface: member.clone(),
                });
            }
            if let Some(lag) = state
                .interfaces
                .get(member)
                .and_then(|i| i.lag.as_deref())
            {
                return Err(NetError::LagMember {
                    interface: member.clone(),
                    lag: lag.to_string(),
                });
            }
        }

        let mut cs = self.changeset(format!("create-port-channel {}", name));
        let mut row = FieldValues::new();
        row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
        row.insert(fields::MTU.to_string(), "9100".to_string());
        cs.add_create(PORTCHANNEL_TABLE, name, row);
        for member in members {
            cs.add_create(
                PORTCHANNEL_MEMBER_TABLE,
                join_key([name, member]),
                FieldValues::new(),
            );
        }
        Ok(cs)
    }

    /// Removes a port channel and its membership rows.
    pub async fn remove_port_channel(&self, name: &str) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let Some(existing) = state.snapshot.get(PORTCHANNEL_TABLE, name) else {
            return Err(NetError::invalid_input(
                "port channel",
                format!("'{}' does not exist", name),
            ));
        };
        let mut cs = self.changeset(format!("remove-port-channel {}", name));
        for key in state
            .snapshot
            .keys_with_prefix(PORTCHANNEL_MEMBER_TABLE, &format!("{}|", name))
        {
            if let Some(row) = state.snapshot.get(PORTCHANNEL_MEMBER_TABLE, &key) {
                cs.add_delete(PORTCHANNEL_MEMBER_TABLE, key, row.clone());
            }
        }
        cs.add_delete(PORTCHANNEL_TABLE, name, existing.clone());
        Ok(cs)
    }

    /// Binds an existing ACL to an interface by appending it to the
    /// ports list.
    pub async fn bind_acl(&self, acl_name: &str, interface: &str) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let Some(existing) = state.snapshot.get(ACL_TABLE_TABLE, acl_name) else {
            return Err(NetError::invalid_input(
                "acl",
                format!("'{}' does not exist on {}", acl_name, self.name()),
            ));
        };
        let ports = existing.get(fields::PORTS).cloned().unwrap_or_default();
        let mut list: Vec<&str> = ports.split(',').filter(|p| !p.is_empty()).collect();
        let mut cs = self.changeset(format!("bind-acl {}", acl_name));
        if !list.contains(&interface) {
            list.push(interface);
            let mut updated = existing.clone();
            updated.insert(fields::PORTS.to_string(), list.join(","));
            cs.add_modify(ACL_TABLE_TABLE, acl_name, existing.clone(), updated);
        }
        Ok(cs)
    }

    /// Unbinds an ACL from an interface; refused when not bound.
    pub async fn unbind_acl(&self, acl_name: &str, interface: &str) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let Some(existing) = state.snapshot.get(ACL_TABLE_TABLE, acl_name) else {
            return Err(NetError::invalid_input(
                "acl",
                format!("'{}' does not exist on {}", acl_name, self.name()),
            ));
        };
        let ports = existing.get(fields::PORTS).cloned().unwrap_or_default();
        let list: Vec<&str> = ports.split(',').filter(|p| !p.is_empty()).collect();
        if !list.contains(&interface) {
            return Err(NetError::invalid_input(
                "acl",
                format!("'{}' is not bound to '{}'", acl_name, interface),
            ));
        }
        let remaining: Vec<&str> = list.into_iter().filter(|p| *p != interface).collect();
        let mut updated = existing.clone();
        updated.insert(fields::PORTS.to_string(), remaining.join(","));
        let mut cs = self.changeset(format!("unbind-acl {}", acl_name));
        cs.add_modify(ACL_TABLE_TABLE, acl_name, existing.clone(), updated);
        Ok(cs)
    }

    /// Creates the device VTEP and its EVPN NVO, sourced from the
    /// profile's loopback.
    pub async fn create_vtep(&self) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let mut cs = self.changeset("create-vtep");
        if state.snapshot.contains(VXLAN_TUNNEL_TABLE, VTEP_NAME) {
            debug!(device = %self.name(), "VTEP already exists");
            return Ok(cs);
        }
        let mut row = FieldValues::new();
        row.insert(
            fields::SRC_IP.to_string(),
            self.profile().vtep_source_ip.to_string(),
        );
        cs.add_create(VXLAN_TUNNEL_TABLE, VTEP_NAME, row);

        let mut nvo = FieldValues::new();
        nvo.insert(fields::SOURCE_VTEP.to_string(), VTEP_NAME.to_string());
        cs.add_create(VXLAN_EVPN_NVO_TABLE, EVPN_NVO_NAME, nvo);
        Ok(cs)
    }

    /// Maps a VLAN to an L2VNI on the device VTEP.
    pub async fn map_vlan_vni(&self, vlan: VlanId, vni: Vni) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        if !state.snapshot.contains(VLAN_TABLE, &vlan.key()) {
            return Err(NetError::invalid_input(
                "vlan",
                format!("{} does not exist on {}", vlan.key(), self.name()),
            ));
        }
        let mut row = FieldValues::new();
        row.insert(fields::VLAN.to_string(), vlan.key());
        row.insert(fields::VNI.to_string(), vni.to_string());
        let mut cs = self.changeset(format!("map-vni {}", vni));
        cs.add_create(
            VXLAN_TUNNEL_MAP_TABLE,
            join_key([VTEP_NAME, &format!("map_{}_{}", vni, vlan.key())]),
            row,
        );
        Ok(cs)
    }

    /// Writes the device's BGP globals from its resolved profile.
    pub async fn configure_bgp_globals(&self) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let profile = self.profile();
        let mut row = FieldValues::new();
        row.insert(
            fields::LOCAL_ASN.to_string(),
            profile.effective_underlay_asn().to_string(),
        );
        row.insert(fields::ROUTER_ID.to_string(), profile.router_id.to_string());

        let mut cs = self.changeset("configure-bgp-globals");
        match state.snapshot.get(BGP_GLOBALS_TABLE, DEFAULT_VRF) {
            Some(existing) if existing == &row => {}
            Some(existing) => {
                cs.add_modify(BGP_GLOBALS_TABLE, DEFAULT_VRF, existing.clone(), row);
            }
            None => cs.add_create(BGP_GLOBALS_TABLE, DEFAULT_VRF, row),
        }
        Ok(cs)
    }

    /// Adds a BGP neighbor with an ipv4_unicast AF row; refused when
    /// the neighbor already exists.
    pub async fn add_bgp_neighbor(
        &self,
        vrf: Option<&str>,
        peer: &IpAddress,
        peer_as: u32,
        local_addr: Option<&IpAddress>,
    ) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let vrf_key = vrf.unwrap_or(DEFAULT_VRF);
        let neighbor_key = join_key([vrf_key, &peer.to_string()]);
        if state.snapshot.contains(BGP_NEIGHBOR_TABLE, &neighbor_key) {
            return Err(NetError::DuplicateNeighbor {
                vrf: vrf_key.to_string(),
                neighbor: peer.to_string(),
            });
        }

        let mut row = FieldValues::new();
        row.insert(fields::ASN.to_string(), peer_as.to_string());
        row.insert(
            fields::LOCAL_ASN.to_string(),
            self.profile().effective_underlay_asn().to_string(),
        );
        if let Some(local) = local_addr {
            row.insert(fields::LOCAL_ADDR.to_string(), local.to_string());
        }
        row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
        if let Some(vrf) = vrf {
            row.insert(fields::VRF_NAME.to_string(), vrf.to_string());
        }

        let mut cs = self.changeset(format!("add-bgp-neighbor {}", peer));
        cs.add_create(BGP_NEIGHBOR_TABLE, neighbor_key.clone(), row);
        let mut af = FieldValues::new();
        af.insert(fields::ADMIN_STATUS.to_string(), "true".to_string());
        cs.add_create(
            BGP_NEIGHBOR_AF_TABLE,
            join_key([vrf_key, &peer.to_string(), "ipv4_unicast"]),
            af,
        );
        Ok(cs)
    }

    /// Removes a BGP neighbor and its AF rows.
    pub async fn remove_bgp_neighbor(
        &self,
        vrf: Option<&str>,
        peer: &IpAddress,
    ) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let vrf_key = vrf.unwrap_or(DEFAULT_VRF);
        let neighbor_key = join_key([vrf_key, &peer.to_string()]);
        let Some(existing) = state.snapshot.get(BGP_NEIGHBOR_TABLE, &neighbor_key) else {
            return Err(NetError::invalid_input(
                "bgp neighbor",
                format!("{} not configured in vrf '{}'", peer, vrf_key),
            ));
        };

        let mut cs = self.changeset(format!("remove-bgp-neighbor {}", peer));
        for key in state
            .snapshot
            .keys_with_prefix(BGP_NEIGHBOR_AF_TABLE, &format!("{}|", neighbor_key))
        {
            if let Some(row) = state.snapshot.get(BGP_NEIGHBOR_AF_TABLE, &key) {
                cs.add_delete(BGP_NEIGHBOR_AF_TABLE, key, row.clone());
            }
        }
        cs.add_delete(BGP_NEIGHBOR_TABLE, neighbor_key, existing.clone());
        Ok(cs)
    }

    /// Creates a BGP peer group.
    pub async fn add_bgp_peer_group(
        &self,
        vrf: Option<&str>,
        name: &str,
        peer_as: Option<u32>,
    ) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let vrf_key = vrf.unwrap_or(DEFAULT_VRF);
        let key = join_key([vrf_key, name]);
        if state.snapshot.contains(BGP_PEER_GROUP_TABLE, &key) {
            return Err(NetError::invalid_input(
                "peer group",
                format!("'{}' already exists in vrf '{}'", name, vrf_key),
            ));
        }
        let mut row = FieldValues::new();
        if let Some(asn) = peer_as {
            row.insert(fields::ASN.to_string(), asn.to_string());
        }
        row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
        let mut cs = self.changeset(format!("add-bgp-peer-group {}", name));
        cs.add_create(BGP_PEER_GROUP_TABLE, key, row);
        Ok(cs)
    }

    /// Expands a named route policy from the network spec into
    /// ROUTE_MAP / PREFIX_SET / COMMUNITY_SET rows, skipping rows the
    /// device already holds.
    pub async fn apply_route_policy(&self, policy_name: &str) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let entries = {
            let spec = self.shared.spec.read();
            route_policy_entries(&spec, policy_name)?
        };
        let mut cs = self.changeset(format!("apply-route-policy {}", policy_name));
        for entry in entries {
            match state.snapshot.get(&entry.table, &entry.key) {
                Some(existing) if existing == &entry.fields => {}
                Some(existing) => {
                    cs.add_modify(entry.table, entry.key, existing.clone(), entry.fields);
                }
                None => cs.add_create(entry.table, entry.key, entry.fields),
            }
        }
        Ok(cs)
    }

    /// Enables redistribution of a protocol into BGP for a VRF.
    pub async fn set_route_redistribute(
        &self,
        vrf: Option<&str>,
        protocol: &str,
    ) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let key = join_key([vrf.unwrap_or(DEFAULT_VRF), protocol, "bgp", "ipv4"]);
        let mut cs = self.changeset(format!("redistribute {}", protocol));
        if !state.snapshot.contains(ROUTE_REDISTRIBUTE_TABLE, &key) {
            cs.add_create(ROUTE_REDISTRIBUTE_TABLE, key, FieldValues::new());
        }
        Ok(cs)
    }

    /// Disables redistribution of a protocol into BGP for a VRF.
    pub async fn remove_route_redistribute(
        &self,
        vrf: Option<&str>,
        protocol: &str,
    ) -> NetResult<ChangeSet> {
        let state = self.state_for_build().await?;
        let key = join_key([vrf.unwrap_or(DEFAULT_VRF), protocol, "bgp", "ipv4"]);
        let Some(existing) = state.snapshot.get(ROUTE_REDISTRIBUTE_TABLE, &key) else {
            return Err(NetError::invalid_input(
                "redistribution",
                format!("'{}' not enabled", key),
            ));
        };
        let mut cs = self.changeset(format!("no-redistribute {}", protocol));
        cs.add_delete(ROUTE_REDISTRIBUTE_TABLE, key, existing.clone());
        Ok(cs)
    }
}
