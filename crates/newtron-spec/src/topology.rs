//! The topology manifest: devices, their interfaces, services bound to
//! them, and the links between them.

use newtron_types::IpPrefix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The far end of a point-to-point link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyLink {
    pub device: String,
    pub interface: String,
}

/// One interface of a topology device.
///
/// An interface with neither a service nor a link is a stub port and is
/// skipped by validation and composite generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyInterface {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub ip: Option<IpPrefix>,
    /// Free-form service parameters, e.g. "peer_as" where the service
    /// says "request".
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub link: Option<TopologyLink>,
}

impl TopologyInterface {
    /// True when the interface carries neither a service nor a link.
    pub fn is_stub(&self) -> bool {
        self.service.is_none() && self.link.is_none()
    }
}

/// One device of the topology manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDevice {
    #[serde(default)]
    pub interfaces: BTreeMap<String, TopologyInterface>,
}

/// The topology manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    #[serde(default)]
    pub devices: BTreeMap<String, TopologyDevice>,
}

impl TopologySpec {
    pub fn device(&self, name: &str) -> Option<&TopologyDevice> {
        self.devices.get(name)
    }

    pub fn contains_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    /// Device names in order.
    pub fn device_names(&self) -> impl Iterator<Item = &String> {
        self.devices.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_topology_json() {
        let topo: TopologySpec = serde_json::from_str(
            r#"{
                "devices": {
                    "leaf1": {
                        "interfaces": {
                            "Ethernet0": {"service": "customer-l3", "ip": "10.2.0.1/30"},
                            "Ethernet48": {"link": {"device": "spine1", "interface": "Ethernet0"}},
                            "Ethernet49": {}
                        }
                    },
                    "spine1": {
                        "interfaces": {
                            "Ethernet0": {"link": {"device": "leaf1", "interface": "Ethernet48"}}
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(topo.contains_device("leaf1"));
        let leaf = topo.device("leaf1").unwrap();
        assert_eq!(leaf.interfaces.len(), 3);
        assert!(leaf.interfaces["Ethernet49"].is_stub());
        assert!(!leaf.interfaces["Ethernet0"].is_stub());
        assert!(!leaf.interfaces["Ethernet48"].is_stub());
    }
}
