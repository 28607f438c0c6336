//! Composite delivery scenarios: atomic overwrite and validated
//! merge.

mod common;

use common::{seed_leaf, TestBed};
use newtron_configdb::{fields, CompositeBuilder, CompositeEntry, DeliveryMode};
use newtron_net::{ApplyServiceOptions, NetError};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn small_composite(mode: DeliveryMode) -> newtron_configdb::CompositeConfig {
    let mut builder = CompositeBuilder::new("leaf1", "test").mode(mode);
    builder.insert(CompositeEntry::new(
        "DEVICE_METADATA",
        "localhost",
        fields! {"hostname" => "leaf1"},
    ));
    builder.insert(CompositeEntry::new("VLAN", "Vlan500", fields! {"vlanid" => "500"}));
    builder.insert(CompositeEntry::new(
        "NEWTRON_SERVICE_BINDING",
        "Ethernet0",
        fields! {"service_name" => "tenant-new"},
    ));
    builder.build()
}

/// After an overwrite delivery every composite row is
/// present and nothing pre-existing survives.
#[tokio::test]
async fn overwrite_replaces_everything() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    device.lock("operator@host1").await.unwrap();
    let token = CancellationToken::new();

    let composite = small_composite(DeliveryMode::Overwrite);
    let report = device.deliver_composite(&composite, &token).await.unwrap();
    assert_eq!(report.applied, 3);
    assert_eq!(report.mode, DeliveryMode::Overwrite);

    let db = bed.client("leaf1").db();
    assert_eq!(db.entry_count(), 3);
    assert!(db.contains("VLAN", "Vlan500"));
    // the seeded PORT and VTEP rows are gone
    assert!(!db.contains("PORT", "Ethernet0"));
    assert!(!db.contains("VXLAN_TUNNEL", "vtep1"));

    // the device mirror followed
    assert_eq!(device.snapshot().await, db);
}

/// Merge refuses when the composite binds an interface that
/// already has a service, naming the existing one; nothing is written.
#[tokio::test]
async fn merge_refuses_on_existing_binding() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    device.lock("operator@host1").await.unwrap();
    let token = CancellationToken::new();

    // bind Ethernet0 first
    let interface = device.interface("Ethernet0").await.unwrap();
    let mut cs = interface
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap();
    device.commit(&mut cs, &token).await.unwrap();
    let before = bed.client("leaf1").db();

    let composite = small_composite(DeliveryMode::Merge);
    let err = device.deliver_composite(&composite, &token).await.unwrap_err();
    match &err {
        NetError::MergeConflicts { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].interface, "Ethernet0");
            assert_eq!(conflicts[0].existing_service, "customer-l2");
            assert_eq!(conflicts[0].incoming_service, "tenant-new");
        }
        other => panic!("expected MergeConflicts, got {other}"),
    }
    assert!(err.to_string().contains("customer-l2"));

    // no writes happened
    assert_eq!(bed.client("leaf1").db(), before);
}

/// Merge with no conflicts pipelines the entries on top of the
/// existing content.
#[tokio::test]
async fn merge_writes_on_clean_device() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    device.lock("operator@host1").await.unwrap();
    let token = CancellationToken::new();

    let composite = small_composite(DeliveryMode::Merge);
    let report = device.deliver_composite(&composite, &token).await.unwrap();
    assert_eq!(report.applied, 3);

    let db = bed.client("leaf1").db();
    assert!(db.contains("VLAN", "Vlan500"));
    // pre-existing rows survive a merge
    assert!(db.contains("PORT", "Ethernet0"));
    assert!(db.contains("VXLAN_TUNNEL", "vtep1"));
}

/// Validation is the dry-run of merge: same conflicts, no writes.
#[tokio::test]
async fn validate_composite_reports_conflicts_without_writing() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    device.lock("operator@host1").await.unwrap();
    let token = CancellationToken::new();

    let interface = device.interface("Ethernet0").await.unwrap();
    let mut cs = interface
        .apply_service(&ApplyServiceOptions::new("customer-l2"))
        .await
        .unwrap();
    device.commit(&mut cs, &token).await.unwrap();
    let before = bed.client("leaf1").db();

    let composite = small_composite(DeliveryMode::Merge);
    let conflicts = device.validate_composite(&composite).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].existing_service, "customer-l2");
    assert_eq!(bed.client("leaf1").db(), before);
}

/// Delivery requires the lock.
#[tokio::test]
async fn delivery_requires_lock() {
    let bed = TestBed::new(None);
    seed_leaf(&bed.client("leaf1"));
    let device = bed.network.device("leaf1").unwrap();
    device.connect().await.unwrap();
    let token = CancellationToken::new();

    let composite = small_composite(DeliveryMode::Overwrite);
    let err = device.deliver_composite(&composite, &token).await.unwrap_err();
    assert!(matches!(err, NetError::NotLocked { .. }));
}
