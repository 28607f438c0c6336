//! Deterministic service-to-CONFIG_DB-table generation.
//!
//! [`plan`] is the single source of truth for "what rows does this
//! service imply". It has no device contact: the incremental apply path
//! filters its output against device state afterwards, the topology
//! composite path takes it whole. Given identical inputs it produces an
//! identical sequence of entries, which is what makes previews
//! reproducible and golden tests possible.

pub mod acl;
mod error;
mod plan;
pub mod qos;
pub mod route_policy;
pub mod routing;

pub use error::{GeneratorError, GeneratorResult};
pub use plan::{generate, interface_vrf_name, plan, ServicePlan, ServiceRequest};
