//! BGP session emission for routed services.

use newtron_configdb::tables::{fields, BGP_NEIGHBOR_AF_TABLE, BGP_NEIGHBOR_TABLE, DEFAULT_VRF};
use newtron_configdb::{join_key, CompositeEntry, FieldValues};
use newtron_spec::{PeerAs, Routing};
use newtron_types::{IpAddress, IpPrefix};

use crate::error::{GeneratorError, GeneratorResult};

/// The BGP rows a service routing block produces, plus the derived
/// peer address recorded in the service binding.
#[derive(Debug, Clone)]
pub struct BgpSession {
    pub peer_ip: IpAddress,
    pub neighbor_key: String,
    pub neighbor_af_key: String,
    pub entries: Vec<CompositeEntry>,
}

/// Emits the BGP_NEIGHBOR and BGP_NEIGHBOR_AF rows for a service.
///
/// The peer address is derived from the interface IP assuming a /30 or
/// /31 point-to-point link; local_asn prefers the underlay ASN when the
/// device has one.
pub fn bgp_session(
    service_name: &str,
    routing: &Routing,
    vrf_name: Option<&str>,
    ip: &IpPrefix,
    local_as: u32,
    underlay_asn: Option<u32>,
    caller_peer_as: Option<u32>,
) -> GeneratorResult<BgpSession> {
    let peer_ip = ip.peer_address()?;

    let peer_as = match routing.peer_as {
        PeerAs::Literal(asn) => asn,
        PeerAs::Request => caller_peer_as.ok_or_else(|| GeneratorError::MissingPeerAs {
            service: service_name.to_string(),
        })?,
    };

    let local_asn = underlay_asn.unwrap_or(local_as);
    let vrf_key = vrf_name.unwrap_or(DEFAULT_VRF);

    let mut neighbor = FieldValues::new();
    neighbor.insert(fields::ASN.to_string(), peer_as.to_string());
    neighbor.insert(fields::LOCAL_ASN.to_string(), local_asn.to_string());
    neighbor.insert(fields::LOCAL_ADDR.to_string(), ip.address_str());
    neighbor.insert(fields::ADMIN_STATUS.to_string(), "up".to_string());
    if let Some(vrf) = vrf_name {
        neighbor.insert(fields::VRF_NAME.to_string(), vrf.to_string());
    }

    let neighbor_key = join_key([vrf_key, &peer_ip.to_string()]);
    let neighbor_af_key = join_key([vrf_key, &peer_ip.to_string(), "ipv4_unicast"]);

    let mut af = FieldValues::new();
    // this schema drives AF activation through admin_status, not
    // an "activate" flag
    af.insert(fields::ADMIN_STATUS.to_string(), "true".to_string());

    let entries = vec![
        CompositeEntry::new(BGP_NEIGHBOR_TABLE, neighbor_key.clone(), neighbor),
        CompositeEntry::new(BGP_NEIGHBOR_AF_TABLE, neighbor_af_key.clone(), af),
    ];

    Ok(BgpSession {
        peer_ip,
        neighbor_key,
        neighbor_af_key,
        entries,
    })
}
