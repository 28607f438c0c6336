//! Service definitions: the unit a user binds to an interface.

use newtron_types::{IpPrefix, MacAddress};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::route_policy::CommunityMatch;

/// The forwarding shape of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Bridged: untagged VLAN membership.
    L2,
    /// Routed: interface IP, optional VRF, optional BGP session.
    L3,
    /// Integrated routing and bridging: tagged membership plus an SVI
    /// with anycast gateway.
    Irb,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceType::L2 => "l2",
            ServiceType::L3 => "l3",
            ServiceType::Irb => "irb",
        };
        f.write_str(s)
    }
}

/// How a routed service scopes its VRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VrfType {
    /// No VRF; the interface stays in the global routing table.
    #[default]
    None,
    /// One VRF per interface, named "{service}-{short interface}".
    Interface,
    /// The ipvpn name is the VRF name, shared across interfaces.
    Shared,
}

/// Routing protocol of a service routing block. BGP is the only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProtocol {
    Bgp,
}

/// The peer AS of a service BGP session: a literal, or "request",
/// meaning the caller must supply it at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAs {
    Literal(u32),
    Request,
}

impl Serialize for PeerAs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PeerAs::Literal(asn) => serializer.serialize_u32(*asn),
            PeerAs::Request => serializer.serialize_str("request"),
        }
    }
}

impl<'de> Deserialize<'de> for PeerAs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u32),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(asn) => Ok(PeerAs::Literal(asn)),
            Raw::Str(s) if s == "request" => Ok(PeerAs::Request),
            Raw::Str(s) => Err(serde::de::Error::custom(format!(
                "peer_as must be a number or \"request\", got \"{}\"",
                s
            ))),
        }
    }
}

/// The routing block of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    pub protocol: RoutingProtocol,
    pub peer_as: PeerAs,
    #[serde(default)]
    pub redistribute: bool,
    /// Name of a route policy applied inbound.
    #[serde(default)]
    pub import_policy: Option<String>,
    /// Name of a route policy applied outbound.
    #[serde(default)]
    pub export_policy: Option<String>,
    /// Inline community filter.
    #[serde(default)]
    pub community_filter: Option<CommunityMatch>,
    /// Inline prefix filter (names a prefix list).
    #[serde(default)]
    pub prefix_filter: Option<String>,
}

/// A service definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub description: Option<String>,
    /// IP-VPN reference: L3VNI and route targets.
    #[serde(default)]
    pub ipvpn: Option<String>,
    /// MAC-VPN reference: VLAN id, L2VNI, ARP suppression.
    #[serde(default)]
    pub macvpn: Option<String>,
    #[serde(default)]
    pub vrf_type: VrfType,
    /// Name of a filter spec applied at ingress.
    #[serde(default)]
    pub ingress_filter: Option<String>,
    /// Name of a filter spec applied at egress.
    #[serde(default)]
    pub egress_filter: Option<String>,
    #[serde(default)]
    pub qos_policy: Option<String>,
    /// Legacy per-port QoS profile; superseded by qos_policy.
    #[serde(default)]
    pub qos_profile: Option<String>,
    #[serde(default)]
    pub routing: Option<Routing>,
    /// IRB anycast gateway address (CIDR).
    #[serde(default)]
    pub anycast_gateway: Option<IpPrefix>,
    /// IRB anycast gateway MAC.
    #[serde(default)]
    pub anycast_mac: Option<MacAddress>,
}

impl Service {
    /// True for service types that attach to a VLAN (L2 and IRB).
    pub fn is_bridged(&self) -> bool {
        matches!(self.service_type, ServiceType::L2 | ServiceType::Irb)
    }

    /// True for service types that carry an interface IP (L3).
    pub fn is_routed(&self) -> bool {
        matches!(self.service_type, ServiceType::L3)
    }

    /// The ACL table name for a stage of this service, shared by every
    /// interface the service is applied to.
    pub fn acl_name(service_name: &str, egress: bool) -> String {
        if egress {
            format!("{}-out", service_name)
        } else {
            format!("{}-in", service_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_service_type_serde() {
        let l3: ServiceType = serde_json::from_str("\"l3\"").unwrap();
        assert_eq!(l3, ServiceType::L3);
        let irb: ServiceType = serde_json::from_str("\"irb\"").unwrap();
        assert_eq!(irb, ServiceType::Irb);
    }

    #[test]
    fn test_peer_as_literal() {
        let peer: PeerAs = serde_json::from_str("65001").unwrap();
        assert_eq!(peer, PeerAs::Literal(65001));
        assert_eq!(serde_json::to_string(&peer).unwrap(), "65001");
    }

    #[test]
    fn test_peer_as_request() {
        let peer: PeerAs = serde_json::from_str("\"request\"").unwrap();
        assert_eq!(peer, PeerAs::Request);
        assert_eq!(serde_json::to_string(&peer).unwrap(), "\"request\"");
    }

    #[test]
    fn test_peer_as_rejects_other_strings() {
        assert!(serde_json::from_str::<PeerAs>("\"auto\"").is_err());
    }

    #[test]
    fn test_service_minimal_json() {
        let svc: Service = serde_json::from_str(
            r#"{"type": "l3", "vrf_type": "interface", "ipvpn": "cust"}"#,
        )
        .unwrap();
        assert_eq!(svc.service_type, ServiceType::L3);
        assert_eq!(svc.vrf_type, VrfType::Interface);
        assert_eq!(svc.ipvpn.as_deref(), Some("cust"));
        assert!(svc.routing.is_none());
    }

    #[test]
    fn test_service_routing_block() {
        let svc: Service = serde_json::from_str(
            r#"{
                "type": "l3",
                "routing": {"protocol": "bgp", "peer_as": "request", "redistribute": true}
            }"#,
        )
        .unwrap();
        let routing = svc.routing.unwrap();
        assert_eq!(routing.peer_as, PeerAs::Request);
        assert!(routing.redistribute);
    }

    #[test]
    fn test_acl_names() {
        assert_eq!(Service::acl_name("customer-l3", false), "customer-l3-in");
        assert_eq!(Service::acl_name("customer-l3", true), "customer-l3-out");
    }
}
