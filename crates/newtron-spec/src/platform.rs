//! Hardware platform definitions.

use serde::{Deserialize, Serialize};

/// A switch platform: maps a profile's platform name to the HWSKU and
/// port characteristics written into DEVICE_METADATA and PORT rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub hwsku: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub port_count: Option<u32>,
    /// Default port speed in Mb/s, e.g. "100000".
    #[serde(default)]
    pub port_speed: Option<String>,
}
