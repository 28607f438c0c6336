//! End-to-end service lifecycle scenarios against a mock device:
//! incremental apply, idempotent overlay, rollback, and
//! dependency-aware removal.

mod common;

use common::{seed_leaf, TestBed};
use newtron_changeset::ChangeSet;
use newtron_client::SonicClient;
use newtron_configdb::fields;
use newtron_net::{ApplyServiceOptions, NetError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn connected_leaf(bed: &TestBed) -> Arc<newtron_net::Device> {
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    device.lock("operator@host1").await.unwrap();
    device
}

fn l3_options() -> ApplyServiceOptions {
    let mut opts = ApplyServiceOptions::new("customer-l3");
    opts.ip = Some("10.2.0.1/30".parse().unwrap());
    opts
}

/// An L3 service on a point-to-point link with eBGP lands the full
/// VRF, EVPN, interface, session, and binding row set.
#[tokio::test]
async fn l3_service_with_ebgp() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let token = CancellationToken::new();

    let interface = device.interface("Ethernet4").await.unwrap();
    let mut cs = interface.apply_service(&l3_options()).await.unwrap();
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert_eq!(
        db.get("VRF", "customer-l3-Eth4").unwrap().get("vni").unwrap(),
        "10001"
    );
    assert!(db.contains("VXLAN_TUNNEL_MAP", "vtep1|map_10001_customer-l3-Eth4"));
    assert_eq!(
        db.get("BGP_GLOBALS_AF", "customer-l3-Eth4|l2vpn_evpn")
            .unwrap()
            .get("import-rts")
            .unwrap(),
        "64512:10001"
    );
    assert_eq!(
        db.get("BGP_EVPN_VNI", "customer-l3-Eth4|10001")
            .unwrap()
            .get("rd")
            .unwrap(),
        "auto"
    );
    assert_eq!(
        db.get("INTERFACE", "Ethernet4").unwrap().get("vrf_name").unwrap(),
        "customer-l3-Eth4"
    );
    assert!(db.contains("INTERFACE", "Ethernet4|10.2.0.1/30"));

    let neighbor = db.get("BGP_NEIGHBOR", "customer-l3-Eth4|10.2.0.2").unwrap();
    assert_eq!(neighbor.get("asn").unwrap(), "65001");
    assert_eq!(neighbor.get("local_asn").unwrap(), "4200000001");
    assert_eq!(neighbor.get("local_addr").unwrap(), "10.2.0.1");
    assert_eq!(
        db.get("BGP_NEIGHBOR_AF", "customer-l3-Eth4|10.2.0.2|ipv4_unicast")
            .unwrap()
            .get("admin_status")
            .unwrap(),
        "true"
    );

    let binding = db.get("NEWTRON_SERVICE_BINDING", "Ethernet4").unwrap();
    assert_eq!(binding.get("service_name").unwrap(), "customer-l3");
    assert_eq!(binding.get("ip_address").unwrap(), "10.2.0.1/30");
    assert_eq!(binding.get("vrf_name").unwrap(), "customer-l3-Eth4");
    assert_eq!(binding.get("ipvpn").unwrap(), "cust");
    assert_eq!(binding.get("bgp_neighbor").unwrap(), "10.2.0.2");
}

/// The VLAN scaffold rides only on the first
/// applier; the second interface gets just membership and binding.
#[tokio::test]
async fn l2_vlan_idempotence_across_interfaces() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let token = CancellationToken::new();

    let first = device.interface("Ethernet0").await.unwrap();
    let mut cs = first
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap();
    let tables: Vec<&str> = cs.changes().iter().map(|c| c.table.as_str()).collect();
    assert!(tables.contains(&"VLAN"));
    assert!(tables.contains(&"VXLAN_TUNNEL_MAP"));
    assert!(tables.contains(&"SUPPRESS_VLAN_NEIGH"));
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert_eq!(db.get("VLAN", "Vlan100").unwrap().get("vlanid").unwrap(), "100");
    assert!(db.contains("VXLAN_TUNNEL_MAP", "vtep1|map_20100_Vlan100"));
    assert_eq!(
        db.get("SUPPRESS_VLAN_NEIGH", "Vlan100").unwrap().get("suppress").unwrap(),
        "on"
    );
    assert_eq!(
        db.get("VLAN_MEMBER", "Vlan100|Ethernet0")
            .unwrap()
            .get("tagging_mode")
            .unwrap(),
        "untagged"
    );

    // second interface: no VLAN row, no VNI row, no suppress row
    let second = device.interface("Ethernet1").await.unwrap();
    let mut cs = second
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap();
    let tables: Vec<&str> = cs.changes().iter().map(|c| c.table.as_str()).collect();
    assert_eq!(tables, vec!["VLAN_MEMBER", "NEWTRON_SERVICE_BINDING"]);
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert!(db.contains("VLAN_MEMBER", "Vlan100|Ethernet1"));
    assert!(db.contains("NEWTRON_SERVICE_BINDING", "Ethernet1"));
}

/// The shared ACL's ports field merges "A,B", order
/// preserved, no duplicates.
#[tokio::test]
async fn acl_port_merge_across_interfaces() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let token = CancellationToken::new();

    let first = device.interface("Ethernet0").await.unwrap();
    let mut cs = first
        .apply_service(&ApplyServiceOptions::new("filtered-l2"))
        .await
        .unwrap();
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert_eq!(
        db.get("ACL_TABLE", "filtered-l2-in").unwrap().get("ports").unwrap(),
        "Ethernet0"
    );
    assert!(db.contains("ACL_RULE", "filtered-l2-in|RULE_10"));
    assert!(db.contains("ACL_RULE", "filtered-l2-in|RULE_20"));

    let second = device.interface("Ethernet1").await.unwrap();
    let mut cs = second
        .apply_service(&ApplyServiceOptions::new("filtered-l2"))
        .await
        .unwrap();
    // the second applier must not duplicate the rules
    assert!(cs.changes().iter().all(|c| c.table != "ACL_RULE"));
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert_eq!(
        db.get("ACL_TABLE", "filtered-l2-in").unwrap().get("ports").unwrap(),
        "Ethernet0,Ethernet1"
    );
}

/// A transport failure at change #3 leaves #1 and #2 applied;
/// rollback deletes them in reverse and restores the pre-apply state.
#[tokio::test]
async fn rollback_on_transport_failure() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let client = bed.client("leaf1");
    let token = CancellationToken::new();
    let before = client.db();

    let mut cs = ChangeSet::new("leaf1", "three-adds");
    cs.add_create("VLAN", "Vlan300", fields! {"vlanid" => "300"});
    cs.add_create("VLAN_MEMBER", "Vlan300|Ethernet0", fields! {"tagging_mode" => "untagged"});
    cs.add_create("SUPPRESS_VLAN_NEIGH", "Vlan300", fields! {"suppress" => "on"});

    client.fail_apply_at(2);
    let err = device.apply_changeset(&mut cs, &token).await.unwrap_err();
    assert!(matches!(err, NetError::Change(_)));
    assert_eq!(cs.applied_count(), 2);

    client.clear_failures();
    device.rollback_changeset(&mut cs, &token).await.unwrap();
    assert_eq!(client.db(), before);
    assert_eq!(device.snapshot().await, before);
}

/// Removal deletes shared rows only with the last user.
#[tokio::test]
async fn remove_service_last_user_cleanup() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let token = CancellationToken::new();

    for port in ["Ethernet0", "Ethernet1"] {
        let interface = device.interface(port).await.unwrap();
        let mut cs = interface
            .apply_service(&ApplyServiceOptions::new("customer-l2"))
            .await
            .unwrap();
        device.commit(&mut cs, &token).await.unwrap();
    }

    // Ethernet1 goes first: the VLAN keeps its other member
    let interface = device.interface("Ethernet1").await.unwrap();
    let mut cs = interface.remove_service().await.unwrap();
    let keys: Vec<String> = cs.changes().iter().map(|c| c.redis_key()).collect();
    assert_eq!(
        keys,
        vec![
            "NEWTRON_SERVICE_BINDING|Ethernet1",
            "VLAN_MEMBER|Vlan100|Ethernet1",
        ]
    );
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert!(db.contains("VLAN", "Vlan100"));
    assert!(db.contains("SUPPRESS_VLAN_NEIGH", "Vlan100"));
    assert!(!db.contains("VLAN_MEMBER", "Vlan100|Ethernet1"));

    // Ethernet0 is the last member: everything goes
    let interface = device.interface("Ethernet0").await.unwrap();
    let mut cs = interface.remove_service().await.unwrap();
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert!(!db.contains("VLAN_MEMBER", "Vlan100|Ethernet0"));
    assert!(!db.contains("VXLAN_TUNNEL_MAP", "vtep1|map_20100_Vlan100"));
    assert!(!db.contains("SUPPRESS_VLAN_NEIGH", "Vlan100"));
    assert!(!db.contains("VLAN", "Vlan100"));
    assert!(!db.contains("NEWTRON_SERVICE_BINDING", "Ethernet0"));
}

/// L3 removal tears down the per-interface VRF and the BGP session.
#[tokio::test]
async fn remove_l3_service_clears_vrf_and_session() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let token = CancellationToken::new();

    let interface = device.interface("Ethernet4").await.unwrap();
    let mut cs = interface.apply_service(&l3_options()).await.unwrap();
    device.commit(&mut cs, &token).await.unwrap();

    let mut cs = interface.remove_service().await.unwrap();
    device.commit(&mut cs, &token).await.unwrap();

    let db = bed.client("leaf1").db();
    assert!(!db.contains("VRF", "customer-l3-Eth4"));
    assert!(!db.contains("BGP_NEIGHBOR", "customer-l3-Eth4|10.2.0.2"));
    assert!(!db.contains("BGP_EVPN_VNI", "customer-l3-Eth4|10001"));
    assert!(!db.contains("VXLAN_TUNNEL_MAP", "vtep1|map_10001_customer-l3-Eth4"));
    assert!(!db.contains("INTERFACE", "Ethernet4|10.2.0.1/30"));
    assert!(!db.contains("NEWTRON_SERVICE_BINDING", "Ethernet4"));
    // the base row remains, with the vrf reference cleared
    assert!(db.get("INTERFACE", "Ethernet4").unwrap().is_empty());
}

#[tokio::test]
async fn apply_requires_lock() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();

    let interface = device.interface("Ethernet4").await.unwrap();
    let err = interface.apply_service(&l3_options()).await.unwrap_err();
    assert!(matches!(err, NetError::NotLocked { .. }));
}

#[tokio::test]
async fn apply_refused_on_lag_member() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;

    let interface = device.interface("Ethernet8").await.unwrap();
    let err = interface
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::LagMember { .. }));
}

#[tokio::test]
async fn apply_refused_on_bound_interface() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let token = CancellationToken::new();

    let interface = device.interface("Ethernet0").await.unwrap();
    let mut cs = interface
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap();
    device.commit(&mut cs, &token).await.unwrap();

    let err = interface
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap_err();
    match err {
        NetError::ServiceBound { service, .. } => assert_eq!(service, "customer-l2"),
        other => panic!("expected ServiceBound, got {other}"),
    }
}

#[tokio::test]
async fn evpn_precondition_enforced() {
    let bed = TestBed::new(None);
    // seed without VTEP or BGP
    let client = bed.client("leaf1");
    let mut snap = newtron_configdb::ConfigDbSnapshot::new();
    snap.set("PORT", "Ethernet0", fields! {"admin_status" => "up"});
    client.seed_snapshot(snap);

    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    device.lock("operator@host1").await.unwrap();

    let interface = device.interface("Ethernet0").await.unwrap();
    let err = interface
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::EvpnPrereq { .. }));
}

#[tokio::test]
async fn lock_exclusion_between_operators() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();

    // someone else already holds the lock
    bed.client("leaf1").lock("bob@host2", 3600).await.unwrap();

    let err = device.lock("alice@host1").await.unwrap_err();
    match err {
        NetError::LockHeld { holder, .. } => assert_eq!(holder, "bob@host2"),
        other => panic!("expected LockHeld, got {other}"),
    }
}

/// A third-party write between apply and verify shows up as a
/// verification failure; rollback restores the pre-apply state.
#[tokio::test]
async fn failed_verification_then_rollback() {
    let bed = TestBed::new(None);
    let device = connected_leaf(&bed).await;
    let client = bed.client("leaf1");
    let token = CancellationToken::new();
    let before = client.db();

    let mut cs = ChangeSet::new("leaf1", "add-vlan");
    cs.add_create("VLAN", "Vlan400", fields! {"vlanid" => "400"});
    device.apply_changeset(&mut cs, &token).await.unwrap();

    // someone else clobbers the row behind our back
    client.with_entry("VLAN", "Vlan400", fields! {"vlanid" => "999"});

    let verification = device.verify_changeset(&mut cs, &token).await.unwrap();
    assert!(!verification.passed());
    assert_eq!(verification.failure_count(), 1);

    device.rollback_changeset(&mut cs, &token).await.unwrap();
    assert_eq!(client.db(), before);
}
