//! The service-to-table translation: one pure function from a service
//! binding request to an ordered set of CONFIG_DB entries.

use newtron_configdb::tables::{
    binding, fields, BGP_EVPN_VNI_TABLE, BGP_GLOBALS_AF_TABLE, INTERFACE_TABLE,
    ROUTE_REDISTRIBUTE_TABLE, SAG_GLOBAL_TABLE, SERVICE_BINDING_TABLE, SUPPRESS_VLAN_NEIGH_TABLE,
    VLAN_INTERFACE_TABLE, VLAN_MEMBER_TABLE, VLAN_TABLE, VRF_TABLE, VTEP_NAME,
    VXLAN_TUNNEL_MAP_TABLE,
};
use newtron_configdb::{join_key, CompositeEntry, FieldValues};
use newtron_spec::{NetworkSpec, Service, ServiceType, VrfType};
use newtron_types::{IntfName, IpAddress, IpPrefix, VlanId, Vni};
use std::collections::BTreeMap;
use tracing::debug;

use crate::acl::{acl_rule_entries, acl_table_entry, AclStage};
use crate::error::{GeneratorError, GeneratorResult};
use crate::qos::{qos_entries, qos_profile_entries};
use crate::route_policy::{community_set_entry, prefix_set_entries, route_policy_entries};
use crate::routing::bgp_session;

/// Inputs to the generator. No device state: the same request always
/// produces the same plan.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub service_name: String,
    pub interface: String,
    /// Interface address, required for L3 services.
    pub ip: Option<IpPrefix>,
    /// Caller-supplied peer AS, consumed when the service says
    /// peer_as = "request".
    pub peer_as: Option<u32>,
    /// The device's overlay AS number.
    pub local_as: u32,
    /// The device's underlay AS number, preferred for session
    /// local_asn when set.
    pub underlay_asn: Option<u32>,
    /// The device's platform name; reserved for platform-conditional
    /// generation.
    pub platform: Option<String>,
    /// Free-form parameters ("peer_as", ...).
    pub params: BTreeMap<String, String>,
}

impl ServiceRequest {
    pub fn new(service_name: impl Into<String>, interface: impl Into<String>, local_as: u32) -> Self {
        ServiceRequest {
            service_name: service_name.into(),
            interface: interface.into(),
            ip: None,
            peer_as: None,
            local_as,
            underlay_asn: None,
            platform: None,
            params: BTreeMap::new(),
        }
    }

    /// The caller-supplied peer AS: the typed field, else the
    /// "peer_as" param.
    fn caller_peer_as(&self) -> Option<u32> {
        self.peer_as
            .or_else(|| self.params.get("peer_as").and_then(|v| v.parse().ok()))
    }
}

/// A generated plan: the ordered entries plus everything the
/// incremental path needs to filter and augment them.
#[derive(Debug, Clone)]
pub struct ServicePlan {
    /// Ordered CONFIG_DB entries: VLAN scaffold, VRF scaffold,
    /// interface attachment, ACLs, BGP, service binding.
    pub entries: Vec<CompositeEntry>,
    pub service_name: String,
    pub service_type: ServiceType,
    pub vrf_type: VrfType,
    pub vrf_name: Option<String>,
    pub vlan: Option<VlanId>,
    pub l2vni: Option<Vni>,
    pub l3vni: Option<Vni>,
    pub ipvpn: Option<String>,
    pub macvpn: Option<String>,
    pub peer_ip: Option<IpAddress>,
    /// BGP_NEIGHBOR_AF key of the emitted session, target of the
    /// route-map overlay MODIFY.
    pub neighbor_af_key: Option<String>,
    pub import_policy: Option<String>,
    pub export_policy: Option<String>,
    pub ingress_acl: Option<String>,
    pub egress_acl: Option<String>,
    /// QoS rows, kept apart from `entries`: the incremental path
    /// appends them after filtering.
    pub qos_entries: Vec<CompositeEntry>,
    /// The NEWTRON_SERVICE_BINDING row fields.
    pub binding: FieldValues,
}

impl ServicePlan {
    /// True when the service rides VXLAN and therefore needs a VTEP
    /// and BGP preconfigured on the device.
    pub fn is_evpn(&self) -> bool {
        self.l2vni.is_some() || self.l3vni.is_some()
    }
}

/// Derives the per-interface VRF name: "{service}-{short interface}".
pub fn interface_vrf_name(service_name: &str, interface: &str) -> GeneratorResult<String> {
    let intf = IntfName::classify(interface)?;
    Ok(format!("{}-{}", service_name, intf.short()))
}

/// Runs the generator. Single source of truth for "what rows does this
/// service imply"; both incremental apply and composite builders
/// consume it. Deterministic: identical inputs produce identical
/// sequences.
pub fn plan(network: &NetworkSpec, req: &ServiceRequest) -> GeneratorResult<ServicePlan> {
    let service = network.service(&req.service_name)?;

    let ipvpn = match &service.ipvpn {
        Some(name) => Some((name.clone(), network.ipvpn(name)?)),
        None => None,
    };
    let macvpn = match &service.macvpn {
        Some(name) => Some((name.clone(), network.macvpn(name)?)),
        None => None,
    };

    validate(service, req, macvpn.is_some(), ipvpn.is_some())?;

    let vlan = macvpn.as_ref().map(|(_, m)| m.vlan);
    let l2vni = macvpn.as_ref().and_then(|(_, m)| m.l2vni);
    let l3vni = ipvpn.as_ref().and_then(|(_, v)| v.l3vni);

    let vrf_name = match (service.service_type, service.vrf_type) {
        (ServiceType::L2, _) | (_, VrfType::None) => None,
        (_, VrfType::Interface) => Some(interface_vrf_name(&req.service_name, &req.interface)?),
        (_, VrfType::Shared) => ipvpn.as_ref().map(|(name, _)| name.clone()),
    };

    let mut entries = Vec::new();

    // VLAN scaffold
    if let (Some(vlan), Some((_, mac))) = (vlan, macvpn.as_ref()) {
        let vlan_key = vlan.key();
        entries.push(CompositeEntry::new(
            VLAN_TABLE,
            vlan_key.clone(),
            one(fields::VLANID, vlan.to_string()),
        ));
        if let Some(vni) = l2vni {
            let mut row = FieldValues::new();
            row.insert(fields::VLAN.to_string(), vlan_key.clone());
            row.insert(fields::VNI.to_string(), vni.to_string());
            entries.push(CompositeEntry::new(
                VXLAN_TUNNEL_MAP_TABLE,
                join_key([VTEP_NAME, &format!("map_{}_{}", vni, vlan_key)]),
                row,
            ));
        }
        if mac.arp_suppression {
            entries.push(CompositeEntry::new(
                SUPPRESS_VLAN_NEIGH_TABLE,
                vlan_key,
                one(fields::SUPPRESS, "on"),
            ));
        }
    }

    // VRF scaffold
    if let Some(vrf) = &vrf_name {
        let mut vrf_row = FieldValues::new();
        if let Some(vni) = l3vni {
            vrf_row.insert(fields::VNI.to_string(), vni.to_string());
        }
        entries.push(CompositeEntry::new(VRF_TABLE, vrf.clone(), vrf_row));

        if let Some(vni) = l3vni {
            let mut map_row = FieldValues::new();
            map_row.insert("vrf".to_string(), vrf.clone());
            map_row.insert(fields::VNI.to_string(), vni.to_string());
            entries.push(CompositeEntry::new(
                VXLAN_TUNNEL_MAP_TABLE,
                join_key([VTEP_NAME, &format!("map_{}_{}", vni, vrf)]),
                map_row,
            ));

            if let Some((_, vpn)) = &ipvpn {
                let rts = |targets: &[newtron_types::RouteTarget]| {
                    newtron_types::join_route_targets(targets)
                };
                let mut af_row = FieldValues::new();
                af_row.insert(fields::IMPORT_RTS.to_string(), rts(&vpn.import_rt));
                af_row.insert(fields::EXPORT_RTS.to_string(), rts(&vpn.export_rt));
                entries.push(CompositeEntry::new(
                    BGP_GLOBALS_AF_TABLE,
                    join_key([vrf.as_str(), "l2vpn_evpn"]),
                    af_row,
                ));

                let mut vni_row = FieldValues::new();
                vni_row.insert(fields::RD.to_string(), "auto".to_string());
                vni_row.insert(fields::IMPORT_RTS.to_string(), rts(&vpn.import_rt));
                vni_row.insert(fields::EXPORT_RTS.to_string(), rts(&vpn.export_rt));
                entries.push(CompositeEntry::new(
                    BGP_EVPN_VNI_TABLE,
                    join_key([vrf.as_str(), &vni.to_string()]),
                    vni_row,
                ));
            }
        }
    }

    // interface attachment
    match service.service_type {
        ServiceType::L2 => {
            let vlan_key = vlan.map(|v| v.key()).unwrap_or_default();
            entries.push(CompositeEntry::new(
                VLAN_MEMBER_TABLE,
                join_key([&vlan_key, &req.interface]),
                one(fields::TAGGING_MODE, "untagged"),
            ));
        }
        ServiceType::L3 => {
            // base row first; the interface manager refuses IP children
            // until the parent row exists
            let mut base = FieldValues::new();
            if let Some(vrf) = &vrf_name {
                base.insert(fields::VRF_NAME.to_string(), vrf.clone());
            }
            entries.push(CompositeEntry::new(
                INTERFACE_TABLE,
                req.interface.clone(),
                base,
            ));
            if let Some(ip) = &req.ip {
                entries.push(CompositeEntry::new(
                    INTERFACE_TABLE,
                    join_key([&req.interface, &ip.to_string()]),
                    FieldValues::new(),
                ));
            }
        }
        ServiceType::Irb => {
            let vlan_key = vlan.map(|v| v.key()).unwrap_or_default();
            entries.push(CompositeEntry::new(
                VLAN_MEMBER_TABLE,
                join_key([&vlan_key, &req.interface]),
                one(fields::TAGGING_MODE, "tagged"),
            ));

            let mut svi = FieldValues::new();
            if let Some(vrf) = &vrf_name {
                svi.insert(fields::VRF_NAME.to_string(), vrf.clone());
            }
            entries.push(CompositeEntry::new(
                VLAN_INTERFACE_TABLE,
                vlan_key.clone(),
                svi,
            ));
            if let Some(gateway) = &service.anycast_gateway {
                entries.push(CompositeEntry::new(
                    VLAN_INTERFACE_TABLE,
                    join_key([&vlan_key, &gateway.to_string()]),
                    FieldValues::new(),
                ));
            }
            if let Some(mac) = &service.anycast_mac {
                entries.push(CompositeEntry::new(
                    SAG_GLOBAL_TABLE,
                    "IPv4",
                    one(fields::GWMAC, mac.to_string()),
                ));
            }
        }
    }

    // ACLs, shared per service across interfaces
    let mut ingress_acl = None;
    let mut egress_acl = None;
    for (filter_name, stage) in [
        (&service.ingress_filter, AclStage::Ingress),
        (&service.egress_filter, AclStage::Egress),
    ] {
        let Some(filter_name) = filter_name else {
            continue;
        };
        let filter = network.filter(filter_name)?;
        let acl_name = Service::acl_name(&req.service_name, stage == AclStage::Egress);
        entries.push(acl_table_entry(&acl_name, stage, &req.service_name, &req.interface));
        entries.extend(acl_rule_entries(network, filter_name, filter, &acl_name)?);
        match stage {
            AclStage::Ingress => ingress_acl = Some(acl_name),
            AclStage::Egress => egress_acl = Some(acl_name),
        }
    }

    // BGP routing
    let mut peer_ip = None;
    let mut neighbor_af_key = None;
    let mut import_policy = None;
    let mut export_policy = None;
    if let Some(routing) = &service.routing {
        let ip = req.ip.as_ref().ok_or_else(|| GeneratorError::MissingIp {
            service: req.service_name.clone(),
        })?;
        let session = bgp_session(
            &req.service_name,
            routing,
            vrf_name.as_deref(),
            ip,
            req.local_as,
            req.underlay_asn,
            req.caller_peer_as(),
        )?;
        peer_ip = Some(session.peer_ip);
        neighbor_af_key = Some(session.neighbor_af_key.clone());
        entries.extend(session.entries);

        for policy in [&routing.import_policy, &routing.export_policy]
            .into_iter()
            .flatten()
        {
            entries.extend(route_policy_entries(network, policy)?);
        }
        import_policy = routing.import_policy.clone();
        export_policy = routing.export_policy.clone();

        if let Some(community) = &routing.community_filter {
            entries.push(community_set_entry(community));
        }
        if let Some(prefix_filter) = &routing.prefix_filter {
            let list = network.prefix_list(prefix_filter)?;
            entries.extend(prefix_set_entries(prefix_filter, list));
        }
        if routing.redistribute {
            let vrf_key = vrf_name.as_deref().unwrap_or("default");
            entries.push(CompositeEntry::new(
                ROUTE_REDISTRIBUTE_TABLE,
                join_key([vrf_key, "connected", "bgp", "ipv4"]),
                FieldValues::new(),
            ));
        }
    }

    // service binding, the provenance row
    let mut binding_row = FieldValues::new();
    binding_row.insert(binding::SERVICE_NAME.to_string(), req.service_name.clone());
    if let Some(ip) = &req.ip {
        binding_row.insert(binding::IP_ADDRESS.to_string(), ip.to_string());
    }
    if let Some(vrf) = &vrf_name {
        binding_row.insert(binding::VRF_NAME.to_string(), vrf.clone());
    }
    if let Some((name, _)) = &ipvpn {
        binding_row.insert(binding::IPVPN.to_string(), name.clone());
    }
    if let Some((name, _)) = &macvpn {
        binding_row.insert(binding::MACVPN.to_string(), name.clone());
    }
    if let Some(acl) = &ingress_acl {
        binding_row.insert(binding::INGRESS_ACL.to_string(), acl.clone());
    }
    if let Some(acl) = &egress_acl {
        binding_row.insert(binding::EGRESS_ACL.to_string(), acl.clone());
    }
    if let Some(peer) = &peer_ip {
        binding_row.insert(binding::BGP_NEIGHBOR.to_string(), peer.to_string());
    }
    entries.push(CompositeEntry::new(
        SERVICE_BINDING_TABLE,
        req.interface.clone(),
        binding_row.clone(),
    ));

    // QoS rides apart from the main sequence; the incremental path
    // appends it after idempotency filtering
    let mut qos = Vec::new();
    if let Some(policy) = &service.qos_policy {
        qos.extend(qos_entries(network, policy, &req.interface)?);
    } else if let Some(profile) = &service.qos_profile {
        qos.extend(qos_profile_entries(network, profile, &req.interface)?);
    }

    debug!(
        service = %req.service_name,
        interface = %req.interface,
        entries = entries.len(),
        "Generated service plan"
    );

    Ok(ServicePlan {
        entries,
        service_name: req.service_name.clone(),
        service_type: service.service_type,
        vrf_type: service.vrf_type,
        vrf_name,
        vlan,
        l2vni,
        l3vni,
        ipvpn: ipvpn.map(|(name, _)| name),
        macvpn: macvpn.map(|(name, _)| name),
        peer_ip,
        neighbor_af_key,
        import_policy,
        export_policy,
        ingress_acl,
        egress_acl,
        qos_entries: qos,
        binding: binding_row,
    })
}

/// Runs the generator and returns just the ordered entries.
pub fn generate(network: &NetworkSpec, req: &ServiceRequest) -> GeneratorResult<Vec<CompositeEntry>> {
    Ok(plan(network, req)?.entries)
}

fn validate(
    service: &Service,
    req: &ServiceRequest,
    has_macvpn: bool,
    has_ipvpn: bool,
) -> GeneratorResult<()> {
    match service.service_type {
        ServiceType::L3 => {
            let ip = req.ip.as_ref().ok_or_else(|| GeneratorError::MissingIp {
                service: req.service_name.clone(),
            })?;
            if !ip.is_ipv4() {
                return Err(GeneratorError::Ipv4Required {
                    service: req.service_name.clone(),
                    ip: ip.to_string(),
                });
            }
        }
        ServiceType::L2 | ServiceType::Irb => {
            if !has_macvpn {
                return Err(GeneratorError::MissingMacVpn {
                    service: req.service_name.clone(),
                    service_type: service.service_type.to_string(),
                });
            }
        }
    }
    if service.vrf_type == VrfType::Shared && !has_ipvpn {
        return Err(GeneratorError::MissingIpVpn {
            service: req.service_name.clone(),
        });
    }
    Ok(())
}

fn one(field: &str, value: impl Into<String>) -> FieldValues {
    let mut row = FieldValues::new();
    row.insert(field.to_string(), value.into());
    row
}
