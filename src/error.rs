//! Error types for the Azure disk snapshot driver
//!
//! Every failure surfaced to the host falls into one of a handful of kinds:
//! configuration (the driver cannot be used), lookup (a referenced claim,
//! volume, storage class, snapshot or disk does not exist), remote service
//! (the disk service answered with an error status) and not-supported.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the driver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("{kind} not found: {name}")]
    Lookup { kind: String, name: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    // =========================================================================
    // Remote Disk Service Errors
    // =========================================================================
    #[error("Remote service error (status {status}): {message}")]
    RemoteService { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to delete {} snapshot(s): {}", failures.len(), failures.join("; "))]
    CleanupFailed { failures: Vec<String> },

    // =========================================================================
    // Capability Errors
    // =========================================================================
    #[error("Operation not supported by this driver: {capability}")]
    NotSupported { capability: String },

    #[error("Volume driver already registered: {name}")]
    DriverAlreadyRegistered { name: String },

    // =========================================================================
    // Parse / Infrastructure Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action the caller should take when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry the whole job with exponential backoff
    RequeueWithBackoff,
    /// Retry after a specific duration
    RequeueAfter(Duration),
    /// Permanent failure, don't retry
    NoRequeue,
}

impl Error {
    /// Shorthand for a lookup miss
    pub fn lookup(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::Lookup {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for an intentionally unimplemented capability
    pub fn not_supported(capability: impl Into<String>) -> Self {
        Error::NotSupported {
            capability: capability.into(),
        }
    }

    /// Whether the remote service reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RemoteService { status: 404, .. })
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal",
            Error::Configuration(_) => "configuration",
            Error::Validation(_) => "validation",
            Error::Lookup { .. } => "not_found",
            Error::Kube(_) => "kubernetes",
            Error::RemoteService { .. } => "remote_service",
            Error::Http(_) => "http",
            Error::CleanupFailed { .. } => "cleanup_failed",
            Error::NotSupported { .. } => "not_supported",
            Error::DriverAlreadyRegistered { .. } => "already_registered",
            Error::JsonParse(_) => "json",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Throttled by the remote service
            Error::RemoteService { status: 429, .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(30))
            }

            // Permanent signals
            Error::Configuration(_)
            | Error::Validation(_)
            | Error::NotSupported { .. }
            | Error::DriverAlreadyRegistered { .. } => ErrorAction::NoRequeue,

            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::Kube(_) => true,
            Error::RemoteService { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for the driver
pub type Result<T> = std::result::Result<T, Error>;
