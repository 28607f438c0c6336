//! CONFIG_DB table and field name constants.
//!
//! Table names follow the SONiC Unified FRR Management schema; the one
//! table newtron owns outright is [`SERVICE_BINDING_TABLE`], its
//! provenance record of which service is bound where.

pub const PORT_TABLE: &str = "PORT";
pub const PORTCHANNEL_TABLE: &str = "PORTCHANNEL";
pub const PORTCHANNEL_MEMBER_TABLE: &str = "PORTCHANNEL_MEMBER";
pub const VLAN_TABLE: &str = "VLAN";
pub const VLAN_MEMBER_TABLE: &str = "VLAN_MEMBER";
pub const VLAN_INTERFACE_TABLE: &str = "VLAN_INTERFACE";
pub const INTERFACE_TABLE: &str = "INTERFACE";
pub const LOOPBACK_INTERFACE_TABLE: &str = "LOOPBACK_INTERFACE";
pub const VRF_TABLE: &str = "VRF";
pub const ACL_TABLE_TABLE: &str = "ACL_TABLE";
pub const ACL_RULE_TABLE: &str = "ACL_RULE";
pub const VXLAN_TUNNEL_TABLE: &str = "VXLAN_TUNNEL";
pub const VXLAN_TUNNEL_MAP_TABLE: &str = "VXLAN_TUNNEL_MAP";
pub const VXLAN_EVPN_NVO_TABLE: &str = "VXLAN_EVPN_NVO";
pub const SUPPRESS_VLAN_NEIGH_TABLE: &str = "SUPPRESS_VLAN_NEIGH";
pub const BGP_GLOBALS_TABLE: &str = "BGP_GLOBALS";
pub const BGP_GLOBALS_AF_TABLE: &str = "BGP_GLOBALS_AF";
pub const BGP_NEIGHBOR_TABLE: &str = "BGP_NEIGHBOR";
pub const BGP_NEIGHBOR_AF_TABLE: &str = "BGP_NEIGHBOR_AF";
pub const BGP_PEER_GROUP_TABLE: &str = "BGP_PEER_GROUP";
pub const BGP_EVPN_VNI_TABLE: &str = "BGP_EVPN_VNI";
pub const ROUTE_MAP_TABLE: &str = "ROUTE_MAP";
pub const PREFIX_SET_TABLE: &str = "PREFIX_SET";
pub const COMMUNITY_SET_TABLE: &str = "COMMUNITY_SET";
pub const ROUTE_REDISTRIBUTE_TABLE: &str = "ROUTE_REDISTRIBUTE";
pub const DEVICE_METADATA_TABLE: &str = "DEVICE_METADATA";
pub const SAG_GLOBAL_TABLE: &str = "SAG_GLOBAL";
pub const PORT_QOS_MAP_TABLE: &str = "PORT_QOS_MAP";
pub const QUEUE_TABLE: &str = "QUEUE";
pub const DSCP_TO_TC_MAP_TABLE: &str = "DSCP_TO_TC_MAP";
pub const TC_TO_QUEUE_MAP_TABLE: &str = "TC_TO_QUEUE_MAP";
pub const SCHEDULER_TABLE: &str = "SCHEDULER";
pub const WRED_PROFILE_TABLE: &str = "WRED_PROFILE";

/// Newtron's own provenance table: interface name → bound service.
pub const SERVICE_BINDING_TABLE: &str = "NEWTRON_SERVICE_BINDING";

/// The canonical VTEP name; VXLAN_TUNNEL_MAP keys are
/// "vtep1|map_{vni}_{name}".
pub const VTEP_NAME: &str = "vtep1";

/// The canonical EVPN NVO name.
pub const EVPN_NVO_NAME: &str = "nvo1";

/// VRF key component used for the global routing table.
pub const DEFAULT_VRF: &str = "default";

/// Common field names.
pub mod fields {
    pub const VLANID: &str = "vlanid";
    pub const TAGGING_MODE: &str = "tagging_mode";
    pub const VRF_NAME: &str = "vrf_name";
    pub const VNI: &str = "vni";
    pub const VLAN: &str = "vlan";
    pub const SUPPRESS: &str = "suppress";
    pub const ADMIN_STATUS: &str = "admin_status";
    pub const MTU: &str = "mtu";
    pub const SPEED: &str = "speed";
    pub const LANES: &str = "lanes";
    pub const SRC_IP: &str = "src_ip";
    pub const SOURCE_VTEP: &str = "source_vtep";
    pub const LOCAL_ASN: &str = "local_asn";
    pub const ROUTER_ID: &str = "router_id";
    pub const ASN: &str = "asn";
    pub const LOCAL_ADDR: &str = "local_addr";
    pub const EBGP_MULTIHOP: &str = "ebgp_multihop";
    pub const RR_CLIENT: &str = "rr_client";
    pub const ROUTE_MAP_IN: &str = "route_map_in";
    pub const ROUTE_MAP_OUT: &str = "route_map_out";
    pub const IMPORT_RTS: &str = "import-rts";
    pub const EXPORT_RTS: &str = "export-rts";
    pub const RD: &str = "rd";
    pub const PORTS: &str = "ports";
    pub const POLICY_DESC: &str = "policy_desc";
    pub const STAGE: &str = "stage";
    pub const TYPE: &str = "type";
    pub const PRIORITY: &str = "PRIORITY";
    pub const PACKET_ACTION: &str = "PACKET_ACTION";
    pub const ACL_SRC_IP: &str = "SRC_IP";
    pub const ACL_DST_IP: &str = "DST_IP";
    pub const IP_PROTOCOL: &str = "IP_PROTOCOL";
    pub const L4_SRC_PORT: &str = "L4_SRC_PORT";
    pub const L4_DST_PORT: &str = "L4_DST_PORT";
    pub const DSCP: &str = "DSCP";
    pub const POLICER: &str = "POLICER";
    pub const TC: &str = "TC";
    pub const GWMAC: &str = "gwmac";
}

/// Field names of the NEWTRON_SERVICE_BINDING row.
pub mod binding {
    pub const SERVICE_NAME: &str = "service_name";
    pub const IP_ADDRESS: &str = "ip_address";
    pub const VRF_NAME: &str = "vrf_name";
    pub const IPVPN: &str = "ipvpn";
    pub const MACVPN: &str = "macvpn";
    pub const INGRESS_ACL: &str = "ingress_acl";
    pub const EGRESS_ACL: &str = "egress_acl";
    pub const BGP_NEIGHBOR: &str = "bgp_neighbor";
}
