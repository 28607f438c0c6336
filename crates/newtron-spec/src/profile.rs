//! Device profiles and their resolution against region, site, platform,
//! and topology.

use newtron_types::{AsNumber, IpAddress, MacAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{SpecError, SpecResult};
use crate::filter::PrefixList;
use crate::network::NetworkSpec;
use crate::platform::Platform;
use crate::site::Site;
use crate::topology::TopologySpec;

/// A device profile as written on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub mgmt_ip: IpAddress,
    pub loopback_ip: IpAddress,
    /// Overlay AS number; falls back to the region's.
    #[serde(default)]
    pub asn: Option<u32>,
    pub platform: String,
    pub mac: MacAddress,
    #[serde(default)]
    pub ssh_user: Option<String>,
    #[serde(default)]
    pub ssh_password: Option<String>,
    /// Underlay AS number for fabric eBGP.
    #[serde(default)]
    pub underlay_asn: Option<u32>,
    pub site: String,
    #[serde(default)]
    pub is_route_reflector: bool,
    /// Device-scoped prefix lists; win over region and global.
    #[serde(default)]
    pub prefix_lists: BTreeMap<String, PrefixList>,
    /// Device-scoped aliases; win over region and global.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// A profile resolved against the spec layers; everything the rest of
/// the system needs to know about a device without contacting it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProfile {
    pub name: String,
    pub asn: AsNumber,
    /// router_id and vtep_source_ip are both the loopback.
    pub router_id: IpAddress,
    pub vtep_source_ip: IpAddress,
    pub loopback_ip: IpAddress,
    pub mgmt_ip: IpAddress,
    pub mac: MacAddress,
    pub platform: String,
    pub hwsku: String,
    pub underlay_asn: Option<u32>,
    pub site: String,
    pub is_route_reflector: bool,
    /// Loopback IPs of the site's route reflectors, excluding this
    /// device and devices absent from the current topology.
    pub bgp_neighbors: Vec<IpAddress>,
    pub prefix_lists: BTreeMap<String, PrefixList>,
    pub aliases: BTreeMap<String, String>,
}

impl ResolvedProfile {
    /// Resolves a profile.
    ///
    /// Resolution rules:
    /// - asn = profile.asn ?? region.asn, error when neither is set
    /// - router_id = vtep_source_ip = loopback_ip
    /// - bgp_neighbors = loopbacks of site route reflectors, minus
    ///   self, minus devices not in the topology (when one is loaded)
    /// - prefix_lists / aliases = global ∪ region ∪ profile, with the
    ///   profile winning on collisions
    pub fn resolve(
        name: &str,
        profile: &DeviceProfile,
        network: &NetworkSpec,
        sites: &BTreeMap<String, Site>,
        platforms: &BTreeMap<String, Platform>,
        topology: Option<&TopologySpec>,
        profiles: &BTreeMap<String, DeviceProfile>,
    ) -> SpecResult<ResolvedProfile> {
        let site = sites.get(&profile.site).ok_or_else(|| SpecError::UnknownReference {
            device: name.to_string(),
            kind: "site",
            name: profile.site.clone(),
        })?;

        let region = match &site.region {
            Some(region_name) => Some(network.region(region_name).map_err(|_| {
                SpecError::UnknownReference {
                    device: name.to_string(),
                    kind: "region",
                    name: region_name.clone(),
                }
            })?),
            None => None,
        };

        let platform = platforms.get(&profile.platform).ok_or_else(|| {
            SpecError::UnknownReference {
                device: name.to_string(),
                kind: "platform",
                name: profile.platform.clone(),
            }
        })?;

        let asn_value = profile
            .asn
            .or(region.and_then(|r| r.asn))
            .ok_or_else(|| SpecError::MissingAsn {
                device: name.to_string(),
            })?;
        let asn = AsNumber::new(asn_value)
            .map_err(|_| SpecError::invalid("asn", format!("{} is not a valid AS number", asn_value)))?;

        let mut bgp_neighbors = Vec::new();
        for rr_name in &site.route_reflectors {
            if rr_name == name {
                continue;
            }
            if let Some(topo) = topology {
                if !topo.contains_device(rr_name) {
                    continue;
                }
            }
            let rr_profile = profiles.get(rr_name).ok_or_else(|| {
                SpecError::UnknownReference {
                    device: name.to_string(),
                    kind: "route reflector profile",
                    name: rr_name.clone(),
                }
            })?;
            bgp_neighbors.push(rr_profile.loopback_ip);
        }

        // union with profile-wins: later inserts overwrite earlier ones
        let mut prefix_lists = network.prefix_lists.clone();
        let mut aliases = network.aliases.clone();
        if let Some(region) = region {
            prefix_lists.extend(region.prefix_lists.clone());
            aliases.extend(region.aliases.clone());
        }
        prefix_lists.extend(profile.prefix_lists.clone());
        aliases.extend(profile.aliases.clone());

        Ok(ResolvedProfile {
            name: name.to_string(),
            asn,
            router_id: profile.loopback_ip,
            vtep_source_ip: profile.loopback_ip,
            loopback_ip: profile.loopback_ip,
            mgmt_ip: profile.mgmt_ip,
            mac: profile.mac,
            platform: profile.platform.clone(),
            hwsku: platform.hwsku.clone(),
            underlay_asn: profile.underlay_asn,
            site: profile.site.clone(),
            is_route_reflector: profile.is_route_reflector,
            bgp_neighbors,
            prefix_lists,
            aliases,
        })
    }

    /// The AS number used for fabric underlay sessions; falls back to
    /// the overlay ASN when no underlay ASN is set.
    pub fn effective_underlay_asn(&self) -> u32 {
        self.underlay_asn.unwrap_or(self.asn.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Region;
    use pretty_assertions::assert_eq;

    fn profile(loopback: &str, site: &str, rr: bool) -> DeviceProfile {
        DeviceProfile {
            mgmt_ip: "192.168.0.10".parse().unwrap(),
            loopback_ip: loopback.parse().unwrap(),
            asn: None,
            platform: "as7326".to_string(),
            mac: "00:11:22:33:44:55".parse().unwrap(),
            ssh_user: None,
            ssh_password: None,
            underlay_asn: Some(4200000001),
            site: site.to_string(),
            is_route_reflector: rr,
            prefix_lists: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    fn fixture() -> (
        NetworkSpec,
        BTreeMap<String, Site>,
        BTreeMap<String, Platform>,
        BTreeMap<String, DeviceProfile>,
    ) {
        let mut network = NetworkSpec::default();
        network.regions.insert(
            "east".to_string(),
            Region {
                asn: Some(64512),
                prefix_lists: BTreeMap::new(),
                aliases: BTreeMap::from([("dns".to_string(), "10.9.9.9".to_string())]),
            },
        );
        network
            .aliases
            .insert("dns".to_string(), "10.8.8.8".to_string());

        let sites = BTreeMap::from([(
            "pod1".to_string(),
            Site {
                region: Some("east".to_string()),
                route_reflectors: vec!["spine1".to_string(), "spine2".to_string()],
            },
        )]);

        let platforms = BTreeMap::from([(
            "as7326".to_string(),
            Platform {
                hwsku: "Accton-AS7326-56X".to_string(),
                description: None,
                port_count: Some(56),
                port_speed: Some("25000".to_string()),
            },
        )]);

        let profiles = BTreeMap::from([
            ("leaf1".to_string(), profile("10.0.0.1", "pod1", false)),
            ("spine1".to_string(), profile("10.0.0.101", "pod1", true)),
            ("spine2".to_string(), profile("10.0.0.102", "pod1", true)),
        ]);

        (network, sites, platforms, profiles)
    }

    #[test]
    fn test_resolve_asn_from_region() {
        let (network, sites, platforms, profiles) = fixture();
        let resolved = ResolvedProfile::resolve(
            "leaf1",
            &profiles["leaf1"],
            &network,
            &sites,
            &platforms,
            None,
            &profiles,
        )
        .unwrap();
        assert_eq!(resolved.asn.as_u32(), 64512);
        assert_eq!(resolved.router_id.to_string(), "10.0.0.1");
        assert_eq!(resolved.vtep_source_ip, resolved.loopback_ip);
        assert_eq!(resolved.hwsku, "Accton-AS7326-56X");
    }

    #[test]
    fn test_resolve_missing_asn() {
        let (mut network, sites, platforms, profiles) = fixture();
        network.regions.get_mut("east").unwrap().asn = None;
        let err = ResolvedProfile::resolve(
            "leaf1",
            &profiles["leaf1"],
            &network,
            &sites,
            &platforms,
            None,
            &profiles,
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingAsn { .. }));
    }

    #[test]
    fn test_resolve_bgp_neighbors_exclude_self() {
        let (network, sites, platforms, profiles) = fixture();
        let resolved = ResolvedProfile::resolve(
            "spine1",
            &profiles["spine1"],
            &network,
            &sites,
            &platforms,
            None,
            &profiles,
        )
        .unwrap();
        // spine1 is itself an RR; it peers only with spine2
        assert_eq!(resolved.bgp_neighbors.len(), 1);
        assert_eq!(resolved.bgp_neighbors[0].to_string(), "10.0.0.102");
    }

    #[test]
    fn test_resolve_bgp_neighbors_respect_topology() {
        let (network, sites, platforms, profiles) = fixture();
        let topology: TopologySpec = serde_json::from_str(
            r#"{"devices": {"leaf1": {}, "spine1": {}}}"#,
        )
        .unwrap();
        let resolved = ResolvedProfile::resolve(
            "leaf1",
            &profiles["leaf1"],
            &network,
            &sites,
            &platforms,
            Some(&topology),
            &profiles,
        )
        .unwrap();
        // spine2 is not in the topology, so only spine1 remains
        assert_eq!(resolved.bgp_neighbors.len(), 1);
        assert_eq!(resolved.bgp_neighbors[0].to_string(), "10.0.0.101");
    }

    #[test]
    fn test_resolve_alias_union_profile_wins() {
        let (network, sites, platforms, mut profiles) = fixture();
        profiles
            .get_mut("leaf1")
            .unwrap()
            .aliases
            .insert("dns".to_string(), "10.7.7.7".to_string());
        let resolved = ResolvedProfile::resolve(
            "leaf1",
            &profiles["leaf1"],
            &network,
            &sites,
            &platforms,
            None,
            &profiles,
        )
        .unwrap();
        // global 10.8.8.8 < region 10.9.9.9 < profile 10.7.7.7
        assert_eq!(resolved.aliases.get("dns").unwrap(), "10.7.7.7");
    }

    #[test]
    fn test_effective_underlay_asn() {
        let (network, sites, platforms, mut profiles) = fixture();
        let resolved = ResolvedProfile::resolve(
            "leaf1",
            &profiles["leaf1"],
            &network,
            &sites,
            &platforms,
            None,
            &profiles,
        )
        .unwrap();
        assert_eq!(resolved.effective_underlay_asn(), 4200000001);

        profiles.get_mut("leaf1").unwrap().underlay_asn = None;
        let resolved = ResolvedProfile::resolve(
            "leaf1",
            &profiles["leaf1"],
            &network,
            &sites,
            &platforms,
            None,
            &profiles,
        )
        .unwrap();
        assert_eq!(resolved.effective_underlay_asn(), 64512);
    }
}
