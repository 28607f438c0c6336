//! IP address and prefix types with safe parsing.
//!
//! [`IpPrefix`] carries the point-to-point peer derivation used when a
//! service attaches a BGP session to a /30 or /31 link.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    pub const fn inner(&self) -> Ipv4Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    /// Returns the address as a host-order u32.
    pub const fn to_bits(&self) -> u32 {
        u32::from_be_bytes(self.0.octets())
    }

    /// Builds an address from a host-order u32.
    pub const fn from_bits(bits: u32) -> Self {
        let b = bits.to_be_bytes();
        Ipv4Address(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

/// An IPv6 address wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv6Address(Ipv6Addr);

impl Ipv6Address {
    pub const UNSPECIFIED: Self = Ipv6Address(Ipv6Addr::UNSPECIFIED);

    pub const fn inner(&self) -> Ipv6Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 16] {
        self.0.octets()
    }

    pub const fn segments(&self) -> [u16; 8] {
        self.0.segments()
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv6Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv6Addr>()
            .map(Ipv6Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv6Addr> for Ipv6Address {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Address(addr)
    }
}

/// An IP address that can be either IPv4 or IPv6.
///
/// Serializes as its string form ("10.0.0.1", "2001:db8::1") so profile
/// and topology JSON stays human-editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddress {
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    pub const fn as_ipv4(&self) -> Option<&Ipv4Address> {
        match self {
            IpAddress::V4(addr) => Some(addr),
            IpAddress::V6(_) => None,
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            s.parse::<Ipv6Address>().map(IpAddress::V6)
        } else {
            s.parse::<Ipv4Address>().map(IpAddress::V4)
        }
    }
}

impl TryFrom<String> for IpAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddress> for String {
    fn from(addr: IpAddress) -> String {
        addr.to_string()
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(Ipv4Address(addr))
    }
}

/// An IP prefix in CIDR notation (e.g., 10.2.0.1/30 or 2001:db8::/32).
///
/// The address portion keeps its host bits: "10.2.0.1/30" is an interface
/// address on a /30, not the /30 network. Serializes as the CIDR string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddress,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new IP prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length is invalid for the address
    /// type (>32 for IPv4, >128 for IPv6).
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = match address {
            IpAddress::V4(_) => 32,
            IpAddress::V6(_) => 128,
        };

        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {} for address type",
                prefix_len, max_len
            )));
        }

        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// Returns the address portion (host bits intact).
    pub const fn address(&self) -> &IpAddress {
        &self.address
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    /// Returns true if this is a host route (/32 for IPv4, /128 for IPv6).
    pub const fn is_host_route(&self) -> bool {
        match self.address {
            IpAddress::V4(_) => self.prefix_len == 32,
            IpAddress::V6(_) => self.prefix_len == 128,
        }
    }

    /// Returns the address without the mask, as written into fields such
    /// as BGP_NEIGHBOR.local_addr.
    pub fn address_str(&self) -> String {
        self.address.to_string()
    }

    /// Derives the far-end address of a point-to-point link.
    ///
    /// Supported: IPv4 /31 (flip the low bit), IPv4 /30 (the two usable
    /// hosts swap), IPv6 /127 (flip the low bit). Anything else, or a /30
    /// network/broadcast address, is an error.
    pub fn peer_address(&self) -> Result<IpAddress, ParseError> {
        match (&self.address, self.prefix_len) {
            (IpAddress::V4(v4), 31) => {
                Ok(IpAddress::V4(Ipv4Address::from_bits(v4.to_bits() ^ 1)))
            }
            (IpAddress::V4(v4), 30) => {
                let bits = v4.to_bits();
                match bits & 0b11 {
                    // usable hosts are network+1 and network+2
                    1 => Ok(IpAddress::V4(Ipv4Address::from_bits(bits + 1))),
                    2 => Ok(IpAddress::V4(Ipv4Address::from_bits(bits - 1))),
                    _ => Err(ParseError::NotPointToPoint(self.to_string())),
                }
            }
            (IpAddress::V6(v6), 127) => {
                let mut octets = v6.octets();
                octets[15] ^= 1;
                Ok(IpAddress::V6(Ipv6Address(Ipv6Addr::from(octets))))
            }
            _ => Err(ParseError::NotPointToPoint(self.to_string())),
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddress = addr_str.parse()?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ipv4_parse() {
        let addr: Ipv4Address = "192.168.1.1".parse().unwrap();
        assert_eq!(addr.octets(), [192, 168, 1, 1]);
    }

    #[test]
    fn test_ip_address_discrimination() {
        let v4: IpAddress = "10.0.0.1".parse().unwrap();
        assert!(v4.is_ipv4());

        let v6: IpAddress = "::1".parse().unwrap();
        assert!(v6.is_ipv6());
    }

    #[test]
    fn test_ip_prefix_parse() {
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        assert!(prefix.is_ipv4());
        assert_eq!(prefix.prefix_len(), 24);

        let v6_prefix: IpPrefix = "2001:db8::/32".parse().unwrap();
        assert_eq!(v6_prefix.prefix_len(), 32);
    }

    #[test]
    fn test_address_without_mask() {
        let prefix: IpPrefix = "10.2.0.1/30".parse().unwrap();
        assert_eq!(prefix.address_str(), "10.2.0.1");
    }

    #[test]
    fn test_peer_address_slash_30() {
        let low: IpPrefix = "10.2.0.1/30".parse().unwrap();
        assert_eq!(low.peer_address().unwrap().to_string(), "10.2.0.2");

        let high: IpPrefix = "10.2.0.2/30".parse().unwrap();
        assert_eq!(high.peer_address().unwrap().to_string(), "10.2.0.1");
    }

    #[test]
    fn test_peer_address_slash_30_network_address() {
        let network: IpPrefix = "10.2.0.0/30".parse().unwrap();
        assert!(network.peer_address().is_err());

        let broadcast: IpPrefix = "10.2.0.3/30".parse().unwrap();
        assert!(broadcast.peer_address().is_err());
    }

    #[test]
    fn test_peer_address_slash_31() {
        let even: IpPrefix = "10.2.0.0/31".parse().unwrap();
        assert_eq!(even.peer_address().unwrap().to_string(), "10.2.0.1");

        let odd: IpPrefix = "10.2.0.1/31".parse().unwrap();
        assert_eq!(odd.peer_address().unwrap().to_string(), "10.2.0.0");
    }

    #[test]
    fn test_peer_address_rejects_other_lengths() {
        let p: IpPrefix = "10.2.0.1/24".parse().unwrap();
        assert!(p.peer_address().is_err());

        let host: IpPrefix = "10.2.0.1/32".parse().unwrap();
        assert!(host.peer_address().is_err());
    }

    #[test]
    fn test_peer_address_slash_127() {
        let p: IpPrefix = "2001:db8::0/127".parse().unwrap();
        assert_eq!(p.peer_address().unwrap().to_string(), "2001:db8::1");
    }

    #[test]
    fn test_invalid_prefix_length() {
        assert!("10.0.0.0/33".parse::<IpPrefix>().is_err());
        assert!("2001:db8::/129".parse::<IpPrefix>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let prefix: IpPrefix = "192.168.0.1/16".parse().unwrap();
        assert_eq!(prefix.to_string(), "192.168.0.1/16");
    }

    #[test]
    fn test_serde_string_form() {
        let prefix: IpPrefix = serde_json::from_str("\"10.2.0.1/30\"").unwrap();
        assert_eq!(prefix.prefix_len(), 30);
        assert_eq!(serde_json::to_string(&prefix).unwrap(), "\"10.2.0.1/30\"");
    }
}
