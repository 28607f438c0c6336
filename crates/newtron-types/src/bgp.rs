//! BGP identity types: AS numbers and route targets.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A BGP autonomous-system number (two- or four-byte, nonzero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AsNumber(u32);

impl AsNumber {
    /// Creates a new AS number.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is zero (reserved).
    pub const fn new(asn: u32) -> Result<Self, ParseError> {
        if asn == 0 {
            Err(ParseError::InvalidAsNumber(String::new()))
        } else {
            Ok(AsNumber(asn))
        }
    }

    /// Returns the AS number as a u32.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AsNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AsNumber {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let asn: u32 = s
            .parse()
            .map_err(|_| ParseError::InvalidAsNumber(s.to_string()))?;
        AsNumber::new(asn).map_err(|_| ParseError::InvalidAsNumber(s.to_string()))
    }
}

impl TryFrom<u32> for AsNumber {
    type Error = ParseError;

    fn try_from(asn: u32) -> Result<Self, Self::Error> {
        AsNumber::new(asn)
    }
}

impl From<AsNumber> for u32 {
    fn from(asn: AsNumber) -> u32 {
        asn.0
    }
}

/// A BGP extended-community route target in "asn:value" form.
///
/// Route targets scope VPN route import/export; ipvpn definitions carry
/// lists of them that end up comma-joined in BGP_GLOBALS_AF and
/// BGP_EVPN_VNI rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteTarget {
    asn: u32,
    value: u32,
}

impl RouteTarget {
    pub const fn new(asn: u32, value: u32) -> Self {
        RouteTarget { asn, value }
    }

    pub const fn asn(&self) -> u32 {
        self.asn
    }

    pub const fn value(&self) -> u32 {
        self.value
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asn, self.value)
    }
}

impl FromStr for RouteTarget {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (asn_str, value_str) = s
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidRouteTarget(s.to_string()))?;

        let asn: u32 = asn_str
            .parse()
            .map_err(|_| ParseError::InvalidRouteTarget(s.to_string()))?;
        let value: u32 = value_str
            .parse()
            .map_err(|_| ParseError::InvalidRouteTarget(s.to_string()))?;

        Ok(RouteTarget { asn, value })
    }
}

impl TryFrom<String> for RouteTarget {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RouteTarget> for String {
    fn from(rt: RouteTarget) -> String {
        rt.to_string()
    }
}

/// Joins route targets with commas, as written into CONFIG_DB fields.
pub fn join_route_targets(targets: &[RouteTarget]) -> String {
    targets
        .iter()
        .map(|rt| rt.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
