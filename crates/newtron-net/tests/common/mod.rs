//! Shared fixtures: an in-memory network with mock devices.
#![allow(dead_code)]

use newtron_client::mock::MockSonicClient;
use newtron_client::SonicClient;
use newtron_configdb::fields;
use newtron_net::{ClientFactory, Network};
use newtron_spec::{DeviceProfile, LoadedSpecs, NetworkSpec, Platform, Site, TopologySpec};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// The spec set the scenarios run against: an L3 service with
/// interface VRF and eBGP, an L2 service, a filtered L2 service, and
/// an IRB tenant.
pub fn network_spec() -> NetworkSpec {
    serde_json::from_str(
        r#"{
            "services": {
                "customer-l3": {
                    "type": "l3",
                    "vrf_type": "interface",
                    "ipvpn": "cust",
                    "routing": {"protocol": "bgp", "peer_as": 65001}
                },
                "customer-l2": {
                    "type": "l2",
                    "macvpn": "m"
                },
                "filtered-l2": {
                    "type": "l2",
                    "macvpn": "m2",
                    "ingress_filter": "edge-in"
                }
            },
            "filters": {
                "edge-in": {
                    "rules": [
                        {"sequence": 10, "action": "permit", "protocol": "tcp", "dst_port": "443"},
                        {"sequence": 20, "action": "deny"}
                    ]
                }
            },
            "ipvpns": {
                "cust": {"l3vni": 10001, "import_rt": ["64512:10001"], "export_rt": ["64512:10001"]}
            },
            "macvpns": {
                "m": {"vlan": 100, "l2vni": 20100, "arp_suppression": true},
                "m2": {"vlan": 200, "l2vni": 20200, "arp_suppression": false}
            }
        }"#,
    )
    .unwrap()
}

pub fn sites() -> BTreeMap<String, Site> {
    serde_json::from_str(r#"{"pod1": {"route_reflectors": ["spine1"]}}"#).unwrap()
}

pub fn platforms() -> BTreeMap<String, Platform> {
    serde_json::from_str(
        r#"{"as7326": {"hwsku": "Accton-AS7326-56X", "port_speed": "25000"}}"#,
    )
    .unwrap()
}

pub fn profile(mgmt: &str, loopback: &str, rr: bool) -> DeviceProfile {
    serde_json::from_str(&format!(
        r#"{{
            "mgmt_ip": "{}",
            "loopback_ip": "{}",
            "asn": 64512,
            "underlay_asn": {},
            "platform": "as7326",
            "mac": "00:11:22:33:44:55",
            "site": "pod1",
            "is_route_reflector": {}
        }}"#,
        mgmt,
        loopback,
        if rr { 4200000101u32 } else { 4200000001u32 },
        rr
    ))
    .unwrap()
}

/// A network wired to per-device mock transports, inspectable by name.
pub struct TestBed {
    pub network: Network,
    clients: Arc<Mutex<HashMap<String, Arc<MockSonicClient>>>>,
}

impl TestBed {
    pub fn new(topology: Option<TopologySpec>) -> TestBed {
        let clients: Arc<Mutex<HashMap<String, Arc<MockSonicClient>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let registry = Arc::clone(&clients);
        let factory: ClientFactory =
            Box::new(move |resolved| -> Arc<dyn SonicClient> {
                registry
                    .lock()
                    .unwrap()
                    .entry(resolved.name.clone())
                    .or_insert_with(MockSonicClient::new)
                    .clone()
            });

        let loaded = LoadedSpecs::in_memory(network_spec(), sites(), platforms(), topology);
        let network = Network::from_specs(loaded, factory);
        network.register_profile("leaf1", profile("192.168.0.10", "10.0.0.1", false));
        network.register_profile("spine1", profile("192.168.0.100", "10.0.0.101", true));

        TestBed { network, clients }
    }

    /// The mock behind a device, created on first use (before or after
    /// the Network builds the device).
    pub fn client(&self, device: &str) -> Arc<MockSonicClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(device.to_string())
            .or_insert_with(MockSonicClient::new)
            .clone()
    }
}

/// Seeds a leaf's CONFIG_DB: front-panel ports, a VTEP, and BGP
/// globals (the EVPN preconditions), plus one LAG with a member.
pub fn seed_leaf(client: &MockSonicClient) {
    let mut snap = newtron_configdb::ConfigDbSnapshot::new();
    for port in ["Ethernet0", "Ethernet1", "Ethernet4", "Ethernet8", "Ethernet48"] {
        snap.set(
            "PORT",
            port,
            fields! {"admin_status" => "up", "mtu" => "9100", "speed" => "25000"},
        );
    }
    snap.set("PORTCHANNEL", "PortChannel1", fields! {"admin_status" => "up"});
    snap.set("PORTCHANNEL_MEMBER", "PortChannel1|Ethernet8", fields! {});
    snap.set("VXLAN_TUNNEL", "vtep1", fields! {"src_ip" => "10.0.0.1"});
    snap.set("VXLAN_EVPN_NVO", "nvo1", fields! {"source_vtep" => "vtep1"});
    snap.set(
        "BGP_GLOBALS",
        "default",
        fields! {"local_asn" => "4200000001", "router_id" => "10.0.0.1"},
    );
    snap.set(
        "DEVICE_METADATA",
        "localhost",
        fields! {"hostname" => "leaf1", "hwsku" => "Accton-AS7326-56X"},
    );
    client.seed_snapshot(snap);
}
