//! Error types for the controller.
//!
//! Defines custom error types with classification for retry, cancellation
//! and absorption behavior.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// A collaborator returned state of an unexpected shape.
    #[error("Wrong type: expected {expected}, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: String,
    },

    /// The record does not exist in the target store.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record already exists in the target store.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A dependent cluster or API is not reachable yet.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The tenant cluster no longer publishes access to its API.
    #[error("Tenant cluster gone: {0}")]
    TenantGone(String),

    /// A call into a dependency did not complete before its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Desired-state computation received an unusable input.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Two records share the same (kind, namespace, name) key.
    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    /// Package pull or install failed
    #[error("Package error: {0}")]
    Package(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// Check if this error indicates the record is already present
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists(_) => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 409 && e.reason == "AlreadyExists",
            _ => false,
        }
    }

    /// Check if this error should end the pass early instead of failing it.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Error::DependencyUnavailable(_) | Error::TenantGone(_) | Error::Timeout(_)
        )
    }

    /// Check if the tenant cluster holding the records is gone for good
    pub fn is_tenant_gone(&self) -> bool {
        matches!(self, Error::TenantGone(_))
    }

    /// Check if this error should be retried within the pass
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_) | kube::Error::HyperError(_))
            }
            Error::Transient(_) | Error::Io(_) | Error::Package(_) => true,
            Error::WrongType { .. }
            | Error::InvalidConfig(_)
            | Error::MissingField(_)
            | Error::DuplicateRecord(_)
            | Error::Serialization(_) => false,
            // Absorbed or turned into a cancellation by the caller
            Error::NotFound(_)
            | Error::AlreadyExists(_)
            | Error::DependencyUnavailable(_)
            | Error::TenantGone(_)
            | Error::Timeout(_) => false,
        }
    }

    /// Check if this error is worth alerting on
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::WrongType { .. } | Error::InvalidConfig(_))
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() || self.is_cancellation() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(300)
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
