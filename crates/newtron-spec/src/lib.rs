//! Declarative network specification model and loader.
//!
//! The specification is layered: network-wide policy ([`NetworkSpec`]),
//! per-site data ([`Site`]), per-device profiles ([`DeviceProfile`],
//! resolved against region and site into a [`ResolvedProfile`]), and an
//! optional topology manifest ([`TopologySpec`]).
//!
//! Everything is plain serde-over-JSON; [`loader`] reads a spec
//! directory and persists edits atomically.

mod error;
mod filter;
pub mod loader;
mod network;
mod platform;
mod profile;
mod qos;
mod route_policy;
mod service;
mod site;
mod topology;
mod vpn;

pub use error::{SpecError, SpecResult};
pub use filter::{FilterAction, FilterRule, FilterSpec, Policer, PrefixList, PrefixListEntry};
pub use loader::{LoadedSpecs, SpecDir};
pub use network::NetworkSpec;
pub use platform::Platform;
pub use profile::{DeviceProfile, ResolvedProfile};
pub use qos::{QosPolicy, QosProfile, QueueSpec, WredSpec};
pub use route_policy::{CommunityMatch, RoutePolicy, RoutePolicyTerm};
pub use service::{PeerAs, Routing, RoutingProtocol, Service, ServiceType, VrfType};
pub use site::{Region, Site};
pub use topology::{TopologyDevice, TopologyInterface, TopologyLink, TopologySpec};
pub use vpn::{IpVpn, MacVpn};
