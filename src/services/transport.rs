//! Transport seam between the backend client and a concrete service
//!
//! [`ObjectTransport`] is one call per remote control-plane action with no
//! retry and no interpretation beyond shaping parameters and responses.
//! Failures come back as [`TransportError`], which [`classify`] sorts into the
//! retry/propagate/report classes using fixed provider code tables.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

use crate::error::FailureKind;
use crate::models::{
    BatchDeleteOutput, HeadMetadata, ListPage, ObjectReference, RuleDocument, StorageClass,
};

/// Provider codes that mean "slow down"
pub const THROTTLED_ERROR_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];

/// Provider codes that mean a capacity or quota ceiling was hit
pub const RESOURCE_EXHAUSTED_ERROR_CODES: &[&str] = &[
    "InsufficientInstanceCapacity",
    "InsufficientCapacity",
    "ServiceQuotaExceededException",
    "QuotaExceeded",
];

/// Provider codes for failures worth retrying in place
pub const TRANSIENT_ERROR_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "InternalServerException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "RequestTimeout",
    "RequestTimeoutException",
    "ReadTimeoutError",
];

const NOT_FOUND_ERROR_CODES: &[&str] = &[
    "NoSuchKey",
    "NotFound",
    "NoSuchBucket",
    "NoSuchLifecycleConfiguration",
    "ResourceNotFoundException",
];

const ACCESS_DENIED_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "Forbidden",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

/// Refusals that carry a misleading HTTP status (S3 answers 403 for
/// `InvalidObjectState`)
const REJECTED_ERROR_CODES: &[&str] = &[
    "InvalidObjectState",
    "RestoreAlreadyInProgress",
    "InvalidRequest",
    "InvalidArgument",
    "MalformedXML",
];

/// Where a transport failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The service answered with an error
    Service,
    /// The request never got an answer (connect/dispatch failure)
    Connection,
    /// The request or response timed out
    Timeout,
    /// The response could not be decoded, or the request could not be built
    Malformed,
}

/// Unclassified failure of a single transport call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", origin(.code, .status))]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl TransportError {
    /// Service error with an HTTP status and provider code
    pub fn service(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Service,
            status: Some(status),
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connection,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Malformed,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Provider code, or a placeholder derived from the failure kind
    #[must_use]
    pub fn code_or_kind(&self) -> String {
        match (&self.code, self.kind) {
            (Some(code), _) => code.clone(),
            (None, TransportErrorKind::Connection) => "ConnectionError".to_string(),
            (None, TransportErrorKind::Timeout) => "Timeout".to_string(),
            (None, TransportErrorKind::Malformed) => "MalformedResponse".to_string(),
            (None, TransportErrorKind::Service) => self
                .status
                .map(|s| format!("Http{s}"))
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Convert an AWS SDK error
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|r| r.status().as_u16());
        match err {
            SdkError::TimeoutError(_) => Self::timeout("request timed out"),
            SdkError::DispatchFailure(failure) => {
                if failure.is_timeout() {
                    Self::timeout(format!("{failure:?}"))
                } else {
                    Self::connection(format!("{failure:?}"))
                }
            }
            SdkError::ResponseError(response) => Self {
                kind: TransportErrorKind::Malformed,
                status,
                code: None,
                message: format!("{response:?}"),
            },
            SdkError::ConstructionFailure(failure) => {
                Self::malformed(format!("request construction failed: {failure:?}"))
            }
            SdkError::ServiceError(service) => {
                let inner = service.err();
                Self {
                    kind: TransportErrorKind::Service,
                    status,
                    code: inner.code().map(String::from),
                    message: inner
                        .message()
                        .map(String::from)
                        .unwrap_or_else(|| inner.to_string()),
                }
            }
            other => Self::malformed(other.to_string()),
        }
    }
}

/// `code (HTTP status): ` prefix for a rendered [`TransportError`]
fn origin(code: &Option<String>, status: &Option<u16>) -> String {
    match (code.as_deref(), status) {
        (Some(code), Some(status)) => format!("{code} (HTTP {status}): "),
        (Some(code), None) => format!("{code}: "),
        (None, Some(status)) => format!("HTTP {status}: "),
        (None, None) => String::new(),
    }
}

/// What the backend client does with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry in place with backoff
    Transient,
    /// Raise to the caller for paced retry
    Throttled,
    /// Raise to the caller; never retried
    ResourceExhausted,
    /// Report as a value
    Permanent(FailureKind),
}

/// Sort a transport failure into its class
#[must_use]
pub fn classify(error: &TransportError) -> ErrorClass {
    if let Some(code) = error.code.as_deref() {
        if THROTTLED_ERROR_CODES.contains(&code) {
            return ErrorClass::Throttled;
        }
        if RESOURCE_EXHAUSTED_ERROR_CODES.contains(&code) {
            return ErrorClass::ResourceExhausted;
        }
        if TRANSIENT_ERROR_CODES.contains(&code) {
            return ErrorClass::Transient;
        }
        if NOT_FOUND_ERROR_CODES.contains(&code) {
            return ErrorClass::Permanent(FailureKind::NotFound);
        }
        if ACCESS_DENIED_ERROR_CODES.contains(&code) {
            return ErrorClass::Permanent(FailureKind::AccessDenied);
        }
        if REJECTED_ERROR_CODES.contains(&code) {
            return ErrorClass::Permanent(FailureKind::Rejected);
        }
    }

    match error.kind {
        TransportErrorKind::Connection | TransportErrorKind::Timeout => ErrorClass::Transient,
        TransportErrorKind::Malformed => ErrorClass::Permanent(FailureKind::Malformed),
        TransportErrorKind::Service => match error.status {
            Some(429) => ErrorClass::Throttled,
            Some(500 | 502 | 503 | 504) => ErrorClass::Transient,
            Some(404) => ErrorClass::Permanent(FailureKind::NotFound),
            Some(401 | 403) => ErrorClass::Permanent(FailureKind::AccessDenied),
            _ => ErrorClass::Permanent(FailureKind::Rejected),
        },
    }
}

/// Retrieval speed requested for a restore job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTier {
    Expedited,
    Standard,
    Bulk,
}

impl RestoreTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expedited => "Expedited",
            Self::Standard => "Standard",
            Self::Bulk => "Bulk",
        }
    }

    /// Tier actually sent for an object in `class`.
    ///
    /// GLACIER objects are always fetched expedited; DEEP_ARCHIVE does not
    /// offer expedited retrieval.
    #[must_use]
    pub fn effective_for(hint: Option<RestoreTier>, class: StorageClass) -> RestoreTier {
        match (class, hint.unwrap_or(RestoreTier::Standard)) {
            (StorageClass::Glacier, _) => RestoreTier::Expedited,
            (StorageClass::DeepArchive, RestoreTier::Expedited) => RestoreTier::Standard,
            (_, tier) => tier,
        }
    }
}

/// Control-plane calls against one object-storage service
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// `Ok(None)` when the object does not exist
    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<HeadMetadata>, TransportError>;

    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, TransportError>;

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), TransportError>;

    /// One batched delete request; per-key refusals are reported, not raised
    async fn delete_objects(
        &self,
        container: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, TransportError>;

    async fn copy_object(
        &self,
        source: &ObjectReference,
        target: &ObjectReference,
        storage_class: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn presign_get(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, TransportError>;

    /// One page of a prefix listing
    async fn list_objects_page(
        &self,
        container: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, TransportError>;

    /// Empty when the container has no lifecycle configuration
    async fn get_lifecycle(&self, container: &str) -> Result<Vec<RuleDocument>, TransportError>;

    async fn put_lifecycle(
        &self,
        container: &str,
        rules: &[RuleDocument],
    ) -> Result<(), TransportError>;

    async fn restore_object(
        &self,
        container: &str,
        key: &str,
        days: u32,
        tier: RestoreTier,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_throttle_codes() {
        for code in THROTTLED_ERROR_CODES {
            let error = TransportError::service(400, *code, "slow down");
            assert_eq!(classify(&error), ErrorClass::Throttled, "{code}");
        }
    }

    #[test]
    fn test_classify_slow_down_503_is_throttled_not_transient() {
        let error = TransportError::service(503, "SlowDown", "Please reduce your request rate.");
        assert_eq!(classify(&error), ErrorClass::Throttled);
    }

    #[test]
    fn test_classify_capacity_codes() {
        let error = TransportError::service(400, "ServiceQuotaExceededException", "quota");
        assert_eq!(classify(&error), ErrorClass::ResourceExhausted);
    }

    #[test]
    fn test_classify_http_429_without_code() {
        let mut error = TransportError::service(429, "x", "too many");
        error.code = None;
        assert_eq!(classify(&error), ErrorClass::Throttled);
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(
            classify(&TransportError::connection("reset by peer")),
            ErrorClass::Transient
        );
        assert_eq!(classify(&TransportError::timeout("slow")), ErrorClass::Transient);
        assert_eq!(
            classify(&TransportError::service(500, "InternalError", "oops")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&TransportError::service(502, "BadGateway", "proxy")),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_classify_permanent() {
        assert_eq!(
            classify(&TransportError::service(404, "NoSuchKey", "missing")),
            ErrorClass::Permanent(FailureKind::NotFound)
        );
        assert_eq!(
            classify(&TransportError::service(403, "AccessDenied", "denied")),
            ErrorClass::Permanent(FailureKind::AccessDenied)
        );
        assert_eq!(
            classify(&TransportError::service(400, "InvalidObjectState", "nope")),
            ErrorClass::Permanent(FailureKind::Rejected)
        );
        assert_eq!(
            classify(&TransportError::service(403, "InvalidObjectState", "archived")),
            ErrorClass::Permanent(FailureKind::Rejected)
        );
        assert_eq!(
            classify(&TransportError::malformed("bad xml")),
            ErrorClass::Permanent(FailureKind::Malformed)
        );
    }

    #[test]
    fn test_code_or_kind() {
        assert_eq!(TransportError::connection("x").code_or_kind(), "ConnectionError");
        assert_eq!(
            TransportError::service(409, "Conflict", "x").code_or_kind(),
            "Conflict"
        );
    }

    #[test]
    fn test_display_includes_code_and_status() {
        let error = TransportError::service(503, "SlowDown", "reduce rate");
        assert_eq!(error.to_string(), "SlowDown (HTTP 503): reduce rate");
        assert_eq!(TransportError::connection("reset").to_string(), "reset");

        let source: &dyn std::error::Error = &error;
        assert!(source.source().is_none());
    }

    #[test]
    fn test_restore_tier_selection() {
        assert_eq!(
            RestoreTier::effective_for(None, StorageClass::Glacier),
            RestoreTier::Expedited
        );
        assert_eq!(
            RestoreTier::effective_for(Some(RestoreTier::Bulk), StorageClass::Glacier),
            RestoreTier::Expedited
        );
        assert_eq!(
            RestoreTier::effective_for(Some(RestoreTier::Expedited), StorageClass::DeepArchive),
            RestoreTier::Standard
        );
        assert_eq!(
            RestoreTier::effective_for(Some(RestoreTier::Bulk), StorageClass::DeepArchive),
            RestoreTier::Bulk
        );
        assert_eq!(
            RestoreTier::effective_for(None, StorageClass::DeepArchive),
            RestoreTier::Standard
        );
    }
}
