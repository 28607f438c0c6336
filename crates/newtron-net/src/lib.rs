//! Network facade, device and interface operations.
//!
//! The object model is Network → Device → Interface: the [`Network`]
//! owns the loaded specs and a cache of lazily created devices; a
//! [`Device`] wraps one switch's transport, its CONFIG_DB mirror, and
//! the change lifecycle (apply / verify / rollback under the advisory
//! lock); an [`Interface`] is a handle through which services are
//! applied and removed incrementally.
//!
//! Whole-device provisioning goes the other way: the
//! [`TopologyProvisioner`] builds a [`CompositeConfig`] offline from
//! the topology manifest and delivers it atomically.
//!
//! [`CompositeConfig`]: newtron_configdb::CompositeConfig

mod composite;
mod deptracker;
mod device;
mod device_ops;
mod error;
mod interface;
mod network;
mod topology;

pub use composite::{DeliveryReport, MergeConflict};
pub use deptracker::DependencyTracker;
pub use device::{Device, ServiceBinding};
pub use error::{NetError, NetResult};
pub use interface::{ApplyServiceOptions, Interface};
pub use network::{ClientFactory, Network};
pub use topology::TopologyProvisioner;
