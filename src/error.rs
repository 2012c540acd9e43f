//! Error taxonomy for storage operations.
//!
//! Two channels exist side by side:
//!
//! - [`StorageError`] is returned through `Err` and covers failures the caller
//!   must act on: local validation (`InvalidUri`, `InvalidArgument`),
//!   capability gaps (`UnsupportedOperation`), and remote conditions that need
//!   pacing or escalation (`Throttled`, `ResourceExhausted`).
//! - [`PermanentFailure`] is carried inside [`Outcome::Failed`] and covers the
//!   everyday remote refusals (not found, access denied, malformed response)
//!   so that batch operations keep processing the remaining items.

use serde::Serialize;
use thiserror::Error;

/// Configuration errors raised while loading or validating settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value
    #[error("Invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors that abort a storage call
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object identifier could not be split into scheme, container and key
    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The selected driver does not support this operation; no request was sent
    #[error("{driver} driver does not support {operation}")]
    UnsupportedOperation {
        operation: &'static str,
        driver: &'static str,
    },

    /// A caller-supplied argument was rejected before any request was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend asked us to slow down, or a transient failure outlived the
    /// retry budget. The caller decides when to try again.
    #[error("{operation} throttled ({code}): {message}")]
    Throttled {
        operation: String,
        code: String,
        message: String,
    },

    /// The backend reported a capacity or quota limit. Never retried here.
    #[error("{operation} hit a resource limit ({code}): {message}")]
    ResourceExhausted {
        operation: String,
        code: String,
        message: String,
    },

    /// Credential validation handshake failed
    #[error("Credential validation failed: {0}")]
    Credentials(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StorageError {
    /// Build an `InvalidUri` error
    pub fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a higher-level loop should back off and retry this call
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Whether this error was raised locally, before any network request
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidUri { .. }
                | Self::UnsupportedOperation { .. }
                | Self::InvalidArgument(_)
                | Self::Config(_)
        )
    }
}

/// Category of a permanent remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Object, container or job does not exist
    NotFound,
    /// Credentials lack permission
    AccessDenied,
    /// The response could not be interpreted
    Malformed,
    /// Any other refusal from the backend
    Rejected,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::Malformed => "malformed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remote failure reported as a value rather than raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermanentFailure {
    /// Operation that failed (e.g. `head_object`)
    pub operation: String,
    /// Failure category
    pub kind: FailureKind,
    /// Provider error code, when one was returned
    pub code: Option<String>,
    /// Human-readable cause
    pub message: String,
}

impl PermanentFailure {
    pub fn new(operation: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            kind,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for PermanentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} failed [{}] {}: {}", self.operation, self.kind, code, self.message),
            None => write!(f, "{} failed [{}]: {}", self.operation, self.kind, self.message),
        }
    }
}

/// Result value of a remote call that did not raise
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The call completed
    Completed(T),
    /// The backend refused the call permanently
    Failed(PermanentFailure),
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The completed value, discarding a failure
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    /// The failure, if any
    pub fn failure(&self) -> Option<&PermanentFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Failed(failure) => Outcome::Failed(failure),
        }
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> Result<T, PermanentFailure> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(failure) => Err(failure),
        }
    }
}
