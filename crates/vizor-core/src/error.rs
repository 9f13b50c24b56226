//! Error types for vizor.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::session::LayerFailure;

/// A shared error type for the orchestrator.
///
/// Variants follow the failure taxonomy of the three external systems:
/// registry failures propagate, provisioner and route-table failures carry
/// the HTTP status (if any) and whether a retry is worthwhile.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum VizorError {
    /// Session registry unreachable or a command failed
    #[error("Registry error: {0}")]
    Registry(String),

    /// A registry record exists but does not decode
    #[error("Malformed session record '{session}': {message}")]
    Decode { session: String, message: String },

    /// Launcher service rejected or never received a request
    #[error("Provisioner error{}: {message}", fmt_status(.status))]
    Provisioner {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// Proxy API rejected or never received a request
    #[error("Route table error{}: {message}", fmt_status(.status))]
    RouteTable {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// The visualization request cannot be acted on
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Session names are embedded in paths and container names
    #[error("Invalid session name: '{0}'")]
    InvalidSessionName(String),

    /// Every layer of a request failed to provision
    #[error("No layer could be provisioned for session '{session}' ({} failures)", .failures.len())]
    NoLayersProvisioned {
        session: String,
        failures: Vec<LayerFailure>,
    },

    /// The viewer never published its token
    #[error("Viewer for session '{session}' failed to start within {waited:?}")]
    ViewerFailedToStart { session: String, waited: Duration },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// IO error
    #[error("IO error: {message}")]
    Io { message: String },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl VizorError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    /// Creates a Decode error for the given session
    pub fn decode(session: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            session: session.into(),
            message: message.into(),
        }
    }

    /// Creates a Provisioner error
    pub fn provisioner(status: Option<u16>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provisioner {
            status,
            message: message.into(),
            retryable,
        }
    }

    /// Creates a RouteTable error
    pub fn route_table(status: Option<u16>, message: impl Into<String>, retryable: bool) -> Self {
        Self::RouteTable {
            status,
            message: message.into(),
            retryable,
        }
    }

    /// Creates an InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Whether repeating the same call may succeed.
    ///
    /// Only transport failures, timeouts, 429 and 5xx responses from the
    /// HTTP collaborators qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provisioner { retryable, .. } | Self::RouteTable { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Check if this is a registry error
    pub fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_) | Self::Decode { .. })
    }

    /// Check if this is a provisioner error
    pub fn is_provisioner(&self) -> bool {
        matches!(self, Self::Provisioner { .. })
    }

    /// Check if this is a route table error
    pub fn is_route_table(&self) -> bool {
        matches!(self, Self::RouteTable { .. })
    }

    /// Check if the viewer token never arrived
    pub fn is_viewer_timeout(&self) -> bool {
        matches!(self, Self::ViewerFailedToStart { .. })
    }

    /// Whether the caller sent something unusable (maps to a 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::InvalidSessionName(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for VizorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for VizorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for VizorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, VizorError>`.
pub type Result<T> = std::result::Result<T, VizorError>;
