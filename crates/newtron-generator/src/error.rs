//! Generator errors.

use newtron_spec::SpecError;
use newtron_types::ParseError;
use thiserror::Error;

/// Result type alias for generator operations.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Errors raised while translating a service binding into CONFIG_DB
/// entries.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// A named definition was missing or inconsistent in the spec.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A value failed to parse or derive.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An L3 service was requested without an interface IP.
    #[error("service '{service}' is L3 and requires an interface IP (CIDR)")]
    MissingIp { service: String },

    /// An L3 service requires an IPv4 interface address.
    #[error("service '{service}' requires an IPv4 interface address, got {ip}")]
    Ipv4Required { service: String, ip: String },

    /// An L2/IRB service was requested without a macvpn.
    #[error("service '{service}' is {service_type} and requires a macvpn reference")]
    MissingMacVpn {
        service: String,
        service_type: String,
    },

    /// A shared-VRF service was requested without an ipvpn.
    #[error("service '{service}' uses a shared VRF and requires an ipvpn reference")]
    MissingIpVpn { service: String },

    /// The service says peer_as = "request" but the caller supplied
    /// none.
    #[error("service '{service}' requires a caller-supplied peer AS")]
    MissingPeerAs { service: String },

    /// A filter rule referenced an unknown CoS class.
    #[error("unknown CoS class '{cos}' in filter '{filter}'")]
    UnknownCosClass { filter: String, cos: String },
}
