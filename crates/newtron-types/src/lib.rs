//! Network primitive types for the newtron control plane.
//!
//! Type-safe representations of the values that end up as CONFIG_DB
//! fields and keys:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`], [`IpPrefix`]: IPv4/IPv6 addresses and CIDR prefixes,
//!   including point-to-point peer derivation for /30 and /31 links
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`Vni`]: 24-bit VXLAN network identifiers
//! - [`AsNumber`], [`RouteTarget`]: BGP autonomous-system numbers and
//!   extended-community route targets
//! - [`IntfName`]: interface-name classification and key shortening

mod bgp;
mod ifname;
mod ip;
mod mac;
mod vlan;
mod vni;

pub use bgp::{join_route_targets, AsNumber, RouteTarget};
pub use ifname::IntfName;
pub use ip::{IpAddress, IpPrefix, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use vlan::VlanId;
pub use vni::Vni;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid VNI: {0} (must be 1-16777215)")]
    InvalidVni(u32),

    #[error("invalid AS number: {0}")]
    InvalidAsNumber(String),

    #[error("invalid route target: {0} (expected asn:value)")]
    InvalidRouteTarget(String),

    #[error("invalid interface name: {0}")]
    InvalidInterfaceName(String),

    #[error("{0} is not a point-to-point address (/30 or /31 required)")]
    NotPointToPoint(String),
}
