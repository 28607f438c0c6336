//! Interface name classification and key shortening.

use crate::ParseError;
use std::fmt;
use std::str::FromStr;

/// A classified switch interface name.
///
/// The shortening rule ("Ethernet4" → "Eth4", "PortChannel2" → "Po2")
/// keeps derived VRF names inside CONFIG_DB key-length limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntfName {
    /// Physical port (e.g., Ethernet0)
    Physical(String),

    /// LAG interface (e.g., PortChannel1)
    Lag(String),

    /// VLAN interface (e.g., Vlan100)
    Vlan(String),

    /// Loopback interface (e.g., Loopback0)
    Loopback(String),
}

impl IntfName {
    /// Parses and classifies an interface name.
    pub fn classify(name: &str) -> Result<Self, ParseError> {
        if let Some(rest) = name.strip_prefix("Ethernet") {
            if rest.parse::<u32>().is_ok() {
                return Ok(IntfName::Physical(name.to_string()));
            }
        } else if let Some(rest) = name.strip_prefix("PortChannel") {
            if rest.parse::<u32>().is_ok() {
                return Ok(IntfName::Lag(name.to_string()));
            }
        } else if let Some(rest) = name.strip_prefix("Vlan") {
            if rest.parse::<u16>().is_ok() {
                return Ok(IntfName::Vlan(name.to_string()));
            }
        } else if let Some(rest) = name.strip_prefix("Loopback") {
            if rest.parse::<u32>().is_ok() {
                return Ok(IntfName::Loopback(name.to_string()));
            }
        }
        Err(ParseError::InvalidInterfaceName(name.to_string()))
    }

    /// Returns the full interface name.
    pub fn name(&self) -> &str {
        match self {
            IntfName::Physical(n) | IntfName::Lag(n) | IntfName::Vlan(n) | IntfName::Loopback(n) => {
                n
            }
        }
    }

    /// Returns the shortened form used in derived names:
    /// "EthernetN" → "EthN", "PortChannelN" → "PoN"; other kinds are
    /// returned unchanged.
    pub fn short(&self) -> String {
        match self {
            IntfName::Physical(n) => {
                format!("Eth{}", n.trim_start_matches("Ethernet"))
            }
            IntfName::Lag(n) => {
                format!("Po{}", n.trim_start_matches("PortChannel"))
            }
            IntfName::Vlan(n) | IntfName::Loopback(n) => n.clone(),
        }
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, IntfName::Physical(_))
    }

    pub fn is_lag(&self) -> bool {
        matches!(self, IntfName::Lag(_))
    }
}

impl fmt::Display for IntfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntfName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntfName::classify(s)
    }
}
