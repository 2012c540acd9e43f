//! Retry-instrumented client over an [`ObjectTransport`]
//!
//! Every operation runs through [`RetryPolicy::execute`]:
//!
//! - transient failures (connection reset, timeouts, 5xx without a throttle
//!   code) are retried in place with exponential backoff and jitter; once the
//!   budget is spent they surface as [`StorageError::Throttled`]
//! - throttled and resource-exhausted responses are raised immediately and
//!   never retried here
//! - permanent failures come back as [`Outcome::Failed`]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::error::{FailureKind, Outcome, PermanentFailure, StorageError};
use crate::models::{
    BatchDeleteOutput, HeadMetadata, KeyError, ListedObject, ObjectReference, RuleDocument,
    StorageClass,
};
use crate::services::transport::{
    classify, ErrorClass, ObjectTransport, RestoreTier, TransportError,
};

/// Initial backoff delay in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Base multiplier for exponential backoff
const BACKOFF_MULTIPLIER: u64 = 2;

/// Most keys one batched delete request accepts
pub const MAX_DELETE_BATCH: usize = 1000;

/// Bounded retry policy for transient transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_secs(crate::config::DEFAULT_RETRY_MAX_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_secs(config.retry_max_backoff_secs),
        }
    }

    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// delay = min(initial * 2^(attempt-1), max) plus 0-25% jitter
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_backoff.as_millis() as u64;
        let base_delay_ms = initial_ms
            .saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(attempt.saturating_sub(1)));
        let max_backoff_ms = self.max_backoff.as_millis() as u64;
        let capped_delay_ms = base_delay_ms.min(max_backoff_ms);

        let jitter_ms = (capped_delay_ms / 4) * (rand::random::<u64>() % 100) / 100;
        Duration::from_millis(capped_delay_ms + jitter_ms)
    }

    /// Run one remote call under this policy
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        resource: &str,
        mut call: F,
    ) -> Result<Outcome<T>, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 1;

        loop {
            let error = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation,
                            resource,
                            attempt,
                            "Storage operation succeeded after retry"
                        );
                    }
                    return Ok(Outcome::Completed(value));
                }
                Err(error) => error,
            };

            match classify(&error) {
                ErrorClass::Transient if attempt < max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        operation,
                        resource,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Storage operation failed, will retry"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                ErrorClass::Transient => {
                    error!(
                        operation,
                        resource,
                        attempt,
                        max_attempts,
                        error = %error,
                        "Storage operation failed after all retries"
                    );
                    return Err(StorageError::Throttled {
                        operation: operation.to_string(),
                        code: error.code_or_kind(),
                        message: error.message,
                    });
                }
                ErrorClass::Throttled => {
                    warn!(
                        operation,
                        resource,
                        attempt,
                        error = %error,
                        "Storage operation throttled"
                    );
                    return Err(StorageError::Throttled {
                        operation: operation.to_string(),
                        code: error.code_or_kind(),
                        message: error.message,
                    });
                }
                ErrorClass::ResourceExhausted => {
                    error!(
                        operation,
                        resource,
                        error = %error,
                        "Storage operation hit a resource limit"
                    );
                    return Err(StorageError::ResourceExhausted {
                        operation: operation.to_string(),
                        code: error.code_or_kind(),
                        message: error.message,
                    });
                }
                ErrorClass::Permanent(kind) => {
                    error!(
                        operation,
                        resource,
                        kind = %kind,
                        error = %error,
                        "Storage operation failed permanently"
                    );
                    let mut failure = PermanentFailure::new(operation, kind, error.message.clone());
                    if let Some(code) = error.code {
                        failure = failure.with_code(code);
                    }
                    return Ok(Outcome::Failed(failure));
                }
            }
        }
    }
}

/// One backend's control-plane operations with retry and classification
#[derive(Clone)]
pub struct BackendClient {
    transport: Arc<dyn ObjectTransport>,
    retry: RetryPolicy,
}

impl BackendClient {
    pub fn new(transport: Arc<dyn ObjectTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// `Completed(None)` when the object does not exist
    pub async fn head(
        &self,
        reference: &ObjectReference,
    ) -> Result<Outcome<Option<HeadMetadata>>, StorageError> {
        let transport = self.transport.as_ref();
        let (container, key) = (reference.container(), reference.key());
        self.retry
            .execute("head_object", &reference.format(), move || {
                transport.head_object(container, key)
            })
            .await
    }

    pub async fn get_body(
        &self,
        reference: &ObjectReference,
    ) -> Result<Outcome<Vec<u8>>, StorageError> {
        let transport = self.transport.as_ref();
        let (container, key) = (reference.container(), reference.key());
        self.retry
            .execute("get_object", &reference.format(), move || {
                transport.get_object(container, key)
            })
            .await
    }

    pub async fn put_body(
        &self,
        reference: &ObjectReference,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<Outcome<()>, StorageError> {
        let transport = self.transport.as_ref();
        let (container, key) = (reference.container(), reference.key());
        self.retry
            .execute("put_object", &reference.format(), move || {
                transport.put_object(container, key, body, content_type)
            })
            .await
    }

    pub async fn delete(&self, reference: &ObjectReference) -> Result<Outcome<()>, StorageError> {
        let transport = self.transport.as_ref();
        let (container, key) = (reference.container(), reference.key());
        self.retry
            .execute("delete_object", &reference.format(), move || {
                transport.delete_object(container, key)
            })
            .await
    }

    /// Delete keys from one container in batches of [`MAX_DELETE_BATCH`].
    ///
    /// A batch refused as a whole is reported as a per-key error for every key
    /// in it, so the remaining batches still run.
    pub async fn delete_batch(
        &self,
        container: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, StorageError> {
        let transport = self.transport.as_ref();
        let mut output = BatchDeleteOutput::default();

        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let outcome = self
                .retry
                .execute("delete_objects", container, move || {
                    transport.delete_objects(container, chunk)
                })
                .await?;

            match outcome {
                Outcome::Completed(batch) => {
                    output.deleted.extend(batch.deleted);
                    output.errors.extend(batch.errors);
                }
                Outcome::Failed(failure) => {
                    warn!(
                        container,
                        keys = chunk.len(),
                        error = %failure,
                        "Batched delete refused"
                    );
                    output.errors.extend(chunk.iter().map(|key| KeyError {
                        key: key.clone(),
                        code: failure.code.clone(),
                        message: failure.message.clone(),
                    }));
                }
            }
        }

        Ok(output)
    }

    /// Server-side copy, optionally into another storage class
    pub async fn copy(
        &self,
        source: &ObjectReference,
        target: &ObjectReference,
        storage_class: Option<StorageClass>,
    ) -> Result<Outcome<()>, StorageError> {
        let class_name = match storage_class {
            Some(class) => Some(class.provider_name().ok_or_else(|| {
                StorageError::InvalidArgument(format!("cannot copy into storage class {class}"))
            })?),
            None => None,
        };
        let transport = self.transport.as_ref();
        self.retry
            .execute("copy_object", &target.format(), move || {
                transport.copy_object(source, target, class_name)
            })
            .await
    }

    pub async fn presign(
        &self,
        reference: &ObjectReference,
        expires_in: Duration,
    ) -> Result<Outcome<String>, StorageError> {
        let transport = self.transport.as_ref();
        let (container, key) = (reference.container(), reference.key());
        self.retry
            .execute("presign_get", &reference.format(), move || {
                transport.presign_get(container, key, expires_in)
            })
            .await
    }

    /// Every object under `prefix`, following continuation tokens
    pub async fn list(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Outcome<Vec<ListedObject>>, StorageError> {
        let transport = self.transport.as_ref();
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let current = token.as_deref();
            let outcome = self
                .retry
                .execute("list_objects", container, move || {
                    transport.list_objects_page(container, prefix, current)
                })
                .await?;

            let page = match outcome {
                Outcome::Completed(page) => page,
                Outcome::Failed(failure) => return Ok(Outcome::Failed(failure)),
            };
            pages += 1;
            objects.extend(page.objects);

            match page.next_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    warn!(
                        container,
                        prefix,
                        pages,
                        token = %next,
                        "Listing returned the same continuation token twice"
                    );
                    return Ok(Outcome::Failed(PermanentFailure::new(
                        "list_objects",
                        FailureKind::Malformed,
                        format!("continuation token '{next}' repeated after page {pages}"),
                    )));
                }
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        debug!(container, prefix, pages, count = objects.len(), "Listed objects");
        Ok(Outcome::Completed(objects))
    }

    pub async fn get_lifecycle(
        &self,
        container: &str,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        let transport = self.transport.as_ref();
        self.retry
            .execute("get_lifecycle", container, move || {
                transport.get_lifecycle(container)
            })
            .await
    }

    pub async fn put_lifecycle(
        &self,
        container: &str,
        rules: &[RuleDocument],
    ) -> Result<Outcome<()>, StorageError> {
        let transport = self.transport.as_ref();
        self.retry
            .execute("put_lifecycle", container, move || {
                transport.put_lifecycle(container, rules)
            })
            .await
    }

    pub async fn request_restore(
        &self,
        reference: &ObjectReference,
        days: u32,
        tier: RestoreTier,
    ) -> Result<Outcome<()>, StorageError> {
        let transport = self.transport.as_ref();
        let (container, key) = (reference.container(), reference.key());
        self.retry
            .execute("restore_object", &reference.format(), move || {
                transport.restore_object(container, key, days, tier)
            })
            .await
    }
}

#[cfg(test)]
#[path = "backend_client_tests.rs"]
mod tests;
