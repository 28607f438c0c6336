//! Whole-device provisioning from the topology manifest.

use newtron_changeset::ChangeSet;
use newtron_configdb::tables::{
    fields, BGP_GLOBALS_AF_TABLE, BGP_GLOBALS_TABLE, BGP_NEIGHBOR_AF_TABLE, BGP_NEIGHBOR_TABLE,
    DEFAULT_VRF, DEVICE_METADATA_TABLE, EVPN_NVO_NAME, INTERFACE_TABLE, LOOPBACK_INTERFACE_TABLE,
    PORT_TABLE, ROUTE_REDISTRIBUTE_TABLE, VTEP_NAME, VXLAN_EVPN_NVO_TABLE, VXLAN_TUNNEL_TABLE,
};
use newtron_configdb::{
    join_key, CompositeBuilder, CompositeConfig, CompositeEntry, DeliveryMode, FieldValues,
};
use newtron_generator::{plan as generate_plan, ServicePlan, ServiceRequest};
use newtron_spec::{PeerAs, ResolvedProfile, ServiceType, TopologyDevice, TopologySpec};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::composite::DeliveryReport;
use crate::error::{NetError, NetResult};
use crate::interface::ApplyServiceOptions;
use crate::network::Network;

/// The generator id stamped into composite metadata.
const GENERATOR_ID: &str = "newtron-topology";

/// Builds whole-device composites from the topology manifest and
/// drives their delivery.
pub struct TopologyProvisioner {
    network: Network,
}

impl TopologyProvisioner {
    /// Fails when the network carries no topology manifest.
    pub fn new(network: &Network) -> NetResult<TopologyProvisioner> {
        if network.topology().is_none() {
            return Err(NetError::NoTopology);
        }
        Ok(TopologyProvisioner {
            network: network.clone(),
        })
    }

    fn topology(&self) -> NetResult<&TopologySpec> {
        self.network.topology().ok_or(NetError::NoTopology)
    }

    fn topology_device<'a>(&self, topology: &'a TopologySpec, device: &str) -> NetResult<&'a TopologyDevice> {
        topology
            .device(device)
            .ok_or_else(|| NetError::TopologyInvalid {
                device: device.to_string(),
                reason: "not present in topology manifest".to_string(),
            })
    }

    /// Validates a topology device entry against the network specs:
    /// every referenced service exists, IPs are present where the
    /// service type demands them, peer_as parameters are supplied
    /// where services request them, and links point at devices the
    /// manifest knows. Stub ports (no service, no link) are skipped.
    pub fn validate_topology_device(&self, device: &str) -> NetResult<()> {
        let topology = self.topology()?;
        let topo_device = self.topology_device(topology, device)?;

        let invalid = |reason: String| NetError::TopologyInvalid {
            device: device.to_string(),
            reason,
        };

        self.network.with_spec(|spec| {
            for (intf_name, intf) in &topo_device.interfaces {
                if intf.is_stub() {
                    continue;
                }

                if let Some(service_name) = &intf.service {
                    let service = spec.service(service_name)?;
                    if service.service_type == ServiceType::L3 && intf.ip.is_none() {
                        return Err(invalid(format!(
                            "interface '{}' carries L3 service '{}' but has no IP",
                            intf_name, service_name
                        )));
                    }
                    if let Some(routing) = &service.routing {
                        if routing.peer_as == PeerAs::Request
                            && !intf.params.contains_key("peer_as")
                        {
                            return Err(invalid(format!(
                                "interface '{}' service '{}' requests a peer AS but none is given",
                                intf_name, service_name
                            )));
                        }
                    }
                }

                if let Some(link) = &intf.link {
                    if !topology.contains_device(&link.device) {
                        return Err(invalid(format!(
                            "interface '{}' links to unknown device '{}'",
                            intf_name, link.device
                        )));
                    }
                    if intf.ip.is_none() {
                        return Err(invalid(format!(
                            "interface '{}' is a fabric link and needs an IP for peer derivation",
                            intf_name
                        )));
                    }
                }
            }
            Ok(())
        })
    }

    /// Assembles the whole CONFIG_DB for a topology device. No device
    /// contact: everything derives from specs and the manifest.
    #[instrument(skip(self))]
    pub fn generate_device_composite(&self, device: &str) -> NetResult<CompositeConfig> {
        self.validate_topology_device(device)?;

        let topology = self.topology()?;
        let topo_device = self.topology_device(topology, device)?;
        let resolved = self.network.resolved_profile(device)?;

        // run the shared generator for every bound service up front;
        // whether the device needs a VTEP falls out of the plans
        let mut service_plans: Vec<ServicePlan> = Vec::new();
        self.network.with_spec(|spec| {
            for (intf_name, intf) in &topo_device.interfaces {
                let Some(service_name) = &intf.service else {
                    continue;
                };
                let request = ServiceRequest {
                    service_name: service_name.clone(),
                    interface: intf_name.clone(),
                    ip: intf.ip,
                    peer_as: intf.params.get("peer_as").and_then(|v| v.parse().ok()),
                    local_as: resolved.asn.as_u32(),
                    underlay_asn: resolved.underlay_asn,
                    platform: Some(resolved.platform.clone()),
                    params: intf.params.clone(),
                };
                service_plans.push(generate_plan(spec, &request)?);
            }
            Ok::<(), NetError>(())
        })?;
        let has_evpn = service_plans.iter().any(|p| p.is_evpn());

        let mut builder = CompositeBuilder::new(device, GENERATOR_ID)
            .description(format!("full device configuration for {}", device))
            .mode(DeliveryMode::Overwrite);

        self.emit_device_metadata(&mut builder, device, &resolved);
        self.emit_loopback(&mut builder, &resolved);
        self.emit_ports(&mut builder, topo_device, &resolved);
        if has_evpn {
            self.emit_vtep(&mut builder, &resolved);
        }
        self.emit_bgp_globals(&mut builder, &resolved, has_evpn);
        self.emit_overlay_neighbors(&mut builder, &resolved);
        self.emit_underlay_neighbors(&mut builder, device, topo_device, &resolved)?;
        if resolved.is_route_reflector {
            self.emit_rr_clients(&mut builder, device, topology, &resolved)?;
        }
        builder.insert(CompositeEntry::new(
            ROUTE_REDISTRIBUTE_TABLE,
            join_key([DEFAULT_VRF, "connected", "bgp", "ipv4"]),
            FieldValues::new(),
        ));

        for plan in service_plans {
            builder.extend(plan.entries);
            builder.extend(plan.qos_entries);
        }

        let composite = builder.build();
        info!(
            device,
            entries = composite.entry_count(),
            "Generated device composite"
        );
        Ok(composite)
    }

    /// Connects, locks, and delivers the device's composite by atomic
    /// overwrite.
    pub async fn provision_device(
        &self,
        device_name: &str,
        holder: &str,
        token: &CancellationToken,
    ) -> NetResult<DeliveryReport> {
        let composite = self.generate_device_composite(device_name)?;
        let device = self.network.device(device_name)?;
        device.connect().await?;
        device.lock(holder).await?;
        device.deliver_composite(&composite, token).await
    }

    /// Drives single-interface provisioning from the manifest: builds
    /// the apply change set from the topology entry and commits it
    /// through the full lifecycle. The device must already be
    /// connected and locked.
    pub async fn provision_interface(
        &self,
        device_name: &str,
        interface: &str,
        token: &CancellationToken,
    ) -> NetResult<ChangeSet> {
        let topology = self.topology()?;
        let topo_device = self.topology_device(topology, device_name)?;
        let intf = topo_device
            .interfaces
            .get(interface)
            .ok_or_else(|| NetError::TopologyInvalid {
                device: device_name.to_string(),
                reason: format!("interface '{}' not in topology", interface),
            })?;
        let service = intf
            .service
            .clone()
            .ok_or_else(|| NetError::TopologyInvalid {
                device: device_name.to_string(),
                reason: format!("interface '{}' has no service to provision", interface),
            })?;

        let device = self.network.device(device_name)?;
        let handle = device.interface(interface).await?;
        let opts = ApplyServiceOptions {
            service,
            ip: intf.ip,
            peer_as: intf.params.get("peer_as").and_then(|v| v.parse().ok()),
            params: intf.params.clone(),
        };
        let mut changeset = handle.apply_service(&opts).await?;
        device.commit(&mut changeset, token).await?;
        Ok(changeset)
    }

    fn emit_device_metadata(
        &self,
        builder: &mut CompositeBuilder,
        device: &str,
        resolved: &ResolvedProfile,
    ) {
        let device_type = if resolved.is_route_reflector {
            "SpineRouter"
        } else {
            "LeafRouter"
        };
        let mut row = FieldValues::new();
        row.insert("hostname".to_string(), device.to_string());
        row.insert("bgp_asn".to_string(), resolved.asn.to_string());
        row.insert("platform".to_string(), resolved.platform.clone());
        row.insert("hwsku".to_string(), resolved.hwsku.clone());
        row.insert("mac".to_string(), resolved.mac.to_string());
        row.insert("type".to_string(), device_type.to_string());
        // unified-mode markers: FRR owns routing config, driven from
        // CONFIG_DB
        row.insert(
            "docker_routing_config_mode".to_string(),
            "unified".to_string(),
        );
        row.insert(
            "frr_mgmt_framework_config".to_string(),
            "true".to_string(),
        );
        builder.insert(CompositeEntry::new(DEVICE_METADATA_TABLE, "localhost", row));
    }

    fn emit_loopback(&self, builder: &mut CompositeBuilder, resolved: &ResolvedProfile) {
        builder.insert(CompositeEntry::new(
            LOOPBACK_INTERFACE_TABLE,
            "Loopback0",
            FieldValues::new(),
        ));
        builder.insert(CompositeEntry::new(
            LOOPBACK_INTERFACE_TABLE,
            format!("Loopback0|{}/32", resolved.loopback_ip),
            FieldValues::new(),
        ));
    }

    fn emit_ports(
        &self,
        builder: &mut CompositeBuilder,
        topo_device: &TopologyDevice,
        resolved: &ResolvedProfile,
    ) {
        let port_speed = self
            .network
            .platforms()
            .get(&resolved.platform)
            .and_then(|p| p.port_speed.clone());

        for (intf_name, intf) in &topo_device.interfaces {
            if intf.is_stub() {
                continue;
            }
            let mut row = FieldValues::new();
            row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
            row.insert(fields::MTU.to_string(), "9100".to_string());
            if let Some(speed) = &port_speed {
                row.insert(fields::SPEED.to_string(), speed.clone());
            }
            builder.insert(CompositeEntry::new(PORT_TABLE, intf_name.clone(), row));
        }
    }

    fn emit_vtep(&self, builder: &mut CompositeBuilder, resolved: &ResolvedProfile) {
        builder.insert(CompositeEntry::new(
            VXLAN_TUNNEL_TABLE,
            VTEP_NAME,
            one(fields::SRC_IP, resolved.vtep_source_ip.to_string()),
        ));
        builder.insert(CompositeEntry::new(
            VXLAN_EVPN_NVO_TABLE,
            EVPN_NVO_NAME,
            one(fields::SOURCE_VTEP, VTEP_NAME),
        ));
    }

    fn emit_bgp_globals(
        &self,
        builder: &mut CompositeBuilder,
        resolved: &ResolvedProfile,
        has_evpn: bool,
    ) {
        let mut row = FieldValues::new();
        row.insert(
            fields::LOCAL_ASN.to_string(),
            resolved.effective_underlay_asn().to_string(),
        );
        row.insert(fields::ROUTER_ID.to_string(), resolved.router_id.to_string());
        builder.insert(CompositeEntry::new(BGP_GLOBALS_TABLE, DEFAULT_VRF, row));

        if has_evpn {
            builder.insert(CompositeEntry::new(
                BGP_GLOBALS_AF_TABLE,
                join_key([DEFAULT_VRF, "l2vpn_evpn"]),
                one("advertise-all-vni", "true"),
            ));
        }
    }

    /// iBGP overlay sessions to the site's route reflectors. The
    /// router-bgp instance runs under the underlay ASN, so loopback
    /// sessions need ebgp_multihop.
    fn emit_overlay_neighbors(&self, builder: &mut CompositeBuilder, resolved: &ResolvedProfile) {
        for rr_loopback in &resolved.bgp_neighbors {
            let mut row = FieldValues::new();
            row.insert(fields::ASN.to_string(), resolved.asn.to_string());
            row.insert(fields::LOCAL_ASN.to_string(), resolved.asn.to_string());
            row.insert(fields::EBGP_MULTIHOP.to_string(), "true".to_string());
            row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
            builder.insert(CompositeEntry::new(
                BGP_NEIGHBOR_TABLE,
                join_key([DEFAULT_VRF, &rr_loopback.to_string()]),
                row,
            ));
            builder.insert(CompositeEntry::new(
                BGP_NEIGHBOR_AF_TABLE,
                join_key([DEFAULT_VRF, &rr_loopback.to_string(), "l2vpn_evpn"]),
                one(fields::ADMIN_STATUS, "true"),
            ));
        }
    }

    /// eBGP underlay sessions, one per fabric link; the peer ASN comes
    /// from the peer device's profile and the peer IP from /30-/31
    /// derivation.
    fn emit_underlay_neighbors(
        &self,
        builder: &mut CompositeBuilder,
        device: &str,
        topo_device: &TopologyDevice,
        resolved: &ResolvedProfile,
    ) -> NetResult<()> {
        for (intf_name, intf) in &topo_device.interfaces {
            let Some(link) = &intf.link else {
                continue;
            };
            let ip = intf.ip.as_ref().ok_or_else(|| NetError::TopologyInvalid {
                device: device.to_string(),
                reason: format!("link interface '{}' has no IP", intf_name),
            })?;
            let peer_ip = ip.peer_address().map_err(|e| NetError::TopologyInvalid {
                device: device.to_string(),
                reason: format!("interface '{}': {}", intf_name, e),
            })?;
            let peer_profile = self.network.resolved_profile(&link.device)?;

            // the link address itself
            builder.insert(CompositeEntry::new(
                INTERFACE_TABLE,
                intf_name.clone(),
                FieldValues::new(),
            ));
            builder.insert(CompositeEntry::new(
                INTERFACE_TABLE,
                join_key([intf_name.as_str(), &ip.to_string()]),
                FieldValues::new(),
            ));

            let mut row = FieldValues::new();
            row.insert(
                fields::ASN.to_string(),
                peer_profile.effective_underlay_asn().to_string(),
            );
            row.insert(
                fields::LOCAL_ASN.to_string(),
                resolved.effective_underlay_asn().to_string(),
            );
            row.insert(fields::LOCAL_ADDR.to_string(), ip.address_str());
            row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
            builder.insert(CompositeEntry::new(
                BGP_NEIGHBOR_TABLE,
                join_key([DEFAULT_VRF, &peer_ip.to_string()]),
                row,
            ));
            builder.insert(CompositeEntry::new(
                BGP_NEIGHBOR_AF_TABLE,
                join_key([DEFAULT_VRF, &peer_ip.to_string(), "ipv4_unicast"]),
                one(fields::ADMIN_STATUS, "true"),
            ));
        }
        Ok(())
    }

    /// On route reflectors: sessions to every non-RR device in the
    /// topology, marked rr_client on each address family.
    fn emit_rr_clients(
        &self,
        builder: &mut CompositeBuilder,
        device: &str,
        topology: &TopologySpec,
        resolved: &ResolvedProfile,
    ) -> NetResult<()> {
        for client_name in topology.device_names() {
            if client_name == device {
                continue;
            }
            let client_profile = self.network.resolved_profile(client_name)?;
            if client_profile.is_route_reflector {
                continue;
            }
            let loopback = client_profile.loopback_ip.to_string();

            let mut row = FieldValues::new();
            row.insert(fields::ASN.to_string(), resolved.asn.to_string());
            row.insert(fields::LOCAL_ASN.to_string(), resolved.asn.to_string());
            row.insert(fields::EBGP_MULTIHOP.to_string(), "true".to_string());
            row.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
            builder.insert(CompositeEntry::new(
                BGP_NEIGHBOR_TABLE,
                join_key([DEFAULT_VRF, &loopback]),
                row,
            ));

            for af in ["ipv4_unicast", "l2vpn_evpn"] {
                let mut af_row = FieldValues::new();
                af_row.insert(fields::ADMIN_STATUS.to_string(), "true".to_string());
                af_row.insert(fields::RR_CLIENT.to_string(), "true".to_string());
                builder.insert(CompositeEntry::new(
                    BGP_NEIGHBOR_AF_TABLE,
                    join_key([DEFAULT_VRF, &loopback, af]),
                    af_row,
                ));
            }
        }
        Ok(())
    }
}

fn one(field: &str, value: impl Into<String>) -> FieldValues {
    let mut row = FieldValues::new();
    row.insert(field.to_string(), value.into());
    row
}
