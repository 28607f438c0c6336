//! VPN definitions: IP-VPN (L3VNI + route targets) and MAC-VPN
//! (VLAN + L2VNI).

use newtron_types::{RouteTarget, VlanId, Vni};
use serde::{Deserialize, Serialize};

/// An IP-VPN: the L3 side of an EVPN instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpVpn {
    /// L3VNI; absent for a VPN carried without VXLAN.
    #[serde(default)]
    pub l3vni: Option<Vni>,
    #[serde(default)]
    pub import_rt: Vec<RouteTarget>,
    #[serde(default)]
    pub export_rt: Vec<RouteTarget>,
}

/// A MAC-VPN: the L2 side of an EVPN instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacVpn {
    pub vlan: VlanId,
    /// L2VNI; absent for a plain VLAN with no VXLAN transport.
    #[serde(default)]
    pub l2vni: Option<Vni>,
    #[serde(default)]
    pub arp_suppression: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ipvpn_json() {
        let vpn: IpVpn = serde_json::from_str(
            r#"{"l3vni": 10001, "import_rt": ["64512:10001"], "export_rt": ["64512:10001"]}"#,
        )
        .unwrap();
        assert_eq!(vpn.l3vni.unwrap().as_u32(), 10001);
        assert_eq!(vpn.import_rt[0].to_string(), "64512:10001");
    }

    #[test]
    fn test_macvpn_json() {
        let vpn: MacVpn = serde_json::from_str(
            r#"{"vlan": 100, "l2vni": 20100, "arp_suppression": true}"#,
        )
        .unwrap();
        assert_eq!(vpn.vlan.as_u16(), 100);
        assert_eq!(vpn.l2vni.unwrap().as_u32(), 20100);
        assert!(vpn.arp_suppression);
    }

    #[test]
    fn test_macvpn_rejects_bad_vlan() {
        assert!(serde_json::from_str::<MacVpn>(r#"{"vlan": 4095}"#).is_err());
    }
}
