//! Error types for specification loading and lookup.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Errors raised by the specification layer.
#[derive(Debug, Error)]
pub enum SpecError {
    /// A named definition is missing from the network spec.
    #[error("{kind} '{name}' not found in network spec")]
    NotFound {
        /// Definition kind (e.g., "service", "filter", "ipvpn").
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// A definition cannot be deleted because a service references it.
    #[error("{kind} '{name}' is referenced by service '{service}'")]
    DefinitionInUse {
        kind: &'static str,
        name: String,
        /// The referencing service.
        service: String,
    },

    /// A device profile resolves to no AS number.
    #[error("device '{device}' has no AS number (profile and region both unset)")]
    MissingAsn { device: String },

    /// A profile names a site/region/platform that does not exist.
    #[error("device '{device}' references unknown {kind} '{name}'")]
    UnknownReference {
        device: String,
        kind: &'static str,
        name: String,
    },

    /// A spec value failed validation.
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    /// Failed to read or write a spec file.
    #[error("spec file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to parse a spec file.
    #[error("spec file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SpecError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        SpecError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn in_use(
        kind: &'static str,
        name: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        SpecError::DefinitionInUse {
            kind,
            name: name.into(),
            service: service.into(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SpecError::Invalid {
            field,
            message: message.into(),
        }
    }
}
