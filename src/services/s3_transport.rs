//! [`ObjectTransport`] backed by `aws-sdk-s3`
//!
//! Also owns SDK bootstrap: one shared [`SdkConfig`] per storage
//! configuration, with the SDK's own retries disabled (the backend client
//! applies the retry policy) and a fixed network timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials as StaticCredentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketLifecycleConfiguration, Delete, ExpirationStatus,
    GlacierJobParameters, LifecycleExpiration, LifecycleRule as SdkLifecycleRule,
    LifecycleRuleAndOperator, LifecycleRuleFilter, NoncurrentVersionExpiration,
    NoncurrentVersionTransition, ObjectIdentifier, RestoreRequest,
    StorageClass as SdkStorageClass, Tag as SdkTag, Tier, Transition, TransitionStorageClass,
};
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{
    BatchDeleteOutput, ExpirationDocument, HeadMetadata, KeyError, ListPage, ListedObject,
    NoncurrentExpirationDocument, NoncurrentTransitionDocument, ObjectReference, RuleDocument,
    RuleFilter, Tag, TransitionDocument,
};
use crate::services::transport::{ObjectTransport, RestoreTier, TransportError};

/// Connect timeout for every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-operation timeout, including reading the body
const OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Error code S3 returns when a bucket has no lifecycle configuration
const NO_LIFECYCLE_CODE: &str = "NoSuchLifecycleConfiguration";

/// Load the shared SDK configuration for `config`.
///
/// Static credentials are used when configured; otherwise the default
/// provider chain (environment, profile, instance role) applies.
pub async fn load_sdk_config(config: &StorageConfig) -> SdkConfig {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .operation_timeout(OPERATION_TIMEOUT)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .retry_config(RetryConfig::disabled())
        .timeout_config(timeouts);

    if let Some(credentials) = &config.credentials {
        loader = loader.credentials_provider(StaticCredentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            credentials.session_token.clone(),
            None,
            "static",
        ));
    }

    loader.load().await
}

/// Confirm the credentials resolve to a caller identity
pub async fn verify_credentials(sdk_config: &SdkConfig) -> Result<(), StorageError> {
    let sts = aws_sdk_sts::Client::new(sdk_config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| StorageError::Credentials(TransportError::from_sdk(e).to_string()))?;

    info!(
        account = identity.account().unwrap_or("unknown"),
        arn = identity.arn().unwrap_or("unknown"),
        "Storage credentials validated"
    );
    Ok(())
}

/// S3 (or S3-compatible) transport
#[derive(Clone)]
pub struct S3Transport {
    client: S3Client,
}

impl S3Transport {
    pub fn new(sdk_config: &SdkConfig, config: &StorageConfig) -> Self {
        let mut builder =
            aws_sdk_s3::config::Builder::from(sdk_config).force_path_style(config.effective_path_style());

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

fn build_error(context: &str, error: impl std::fmt::Display) -> TransportError {
    TransportError::malformed(format!("{context}: {error}"))
}

fn to_smithy(value: &chrono::DateTime<chrono::Utc>) -> aws_sdk_s3::primitives::DateTime {
    aws_sdk_s3::primitives::DateTime::from_secs_and_nanos(value.timestamp(), value.timestamp_subsec_nanos())
}

fn count_u32(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn count_i32(value: Option<u32>) -> Result<Option<i32>, TransportError> {
    value.map(days_i32).transpose()
}

fn days_i32(days: u32) -> Result<i32, TransportError> {
    i32::try_from(days).map_err(|_| TransportError::malformed(format!("{days} days is out of range")))
}

/// `x-amz-copy-source` value: container plus the key percent-encoded per
/// path segment
fn copy_source(reference: &ObjectReference) -> String {
    let key = reference
        .key()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", reference.container(), key)
}

fn filter_from_sdk(filter: &LifecycleRuleFilter) -> RuleFilter {
    match filter.and() {
        Some(and) => RuleFilter {
            prefix: and.prefix().unwrap_or_default().to_string(),
            tags: and
                .tags()
                .iter()
                .map(|t| Tag::new(t.key(), t.value()))
                .collect(),
            object_size_greater_than: and.object_size_greater_than(),
            object_size_less_than: and.object_size_less_than(),
        },
        None => RuleFilter {
            prefix: filter.prefix().unwrap_or_default().to_string(),
            tags: filter
                .tag()
                .map(|t| vec![Tag::new(t.key(), t.value())])
                .unwrap_or_default(),
            object_size_greater_than: filter.object_size_greater_than(),
            object_size_less_than: filter.object_size_less_than(),
        },
    }
}

/// Backend rule to crate representation
#[allow(deprecated)]
fn rule_from_sdk(rule: &SdkLifecycleRule) -> RuleDocument {
    RuleDocument {
        id: rule.id().unwrap_or_default().to_string(),
        status: rule.status().as_str().to_string(),
        prefix: rule.prefix().map(String::from),
        filter: rule.filter().map(filter_from_sdk),
        transitions: rule
            .transitions()
            .iter()
            .map(|t| TransitionDocument {
                days: count_u32(t.days()),
                date: t.date().and_then(to_chrono),
                storage_class: t
                    .storage_class()
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect(),
        expiration: rule.expiration().map(|e| ExpirationDocument {
            days: count_u32(e.days()),
            date: e.date().and_then(to_chrono),
            expired_object_delete_marker: e.expired_object_delete_marker(),
        }),
        noncurrent_transitions: rule
            .noncurrent_version_transitions()
            .iter()
            .map(|t| NoncurrentTransitionDocument {
                noncurrent_days: count_u32(t.noncurrent_days()),
                newer_noncurrent_versions: count_u32(t.newer_noncurrent_versions()),
                storage_class: t
                    .storage_class()
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect(),
        noncurrent_expiration: rule.noncurrent_version_expiration().map(|e| {
            NoncurrentExpirationDocument {
                noncurrent_days: count_u32(e.noncurrent_days()),
                newer_noncurrent_versions: count_u32(e.newer_noncurrent_versions()),
            }
        }),
        abort_incomplete_multipart_days: rule
            .abort_incomplete_multipart_upload()
            .and_then(|a| count_u32(a.days_after_initiation())),
    }
}

/// A single condition goes at the top level; several need the `And` operator
fn filter_to_sdk(filter: &RuleFilter) -> Result<LifecycleRuleFilter, TransportError> {
    let mut tags = filter
        .tags
        .iter()
        .map(|t| {
            SdkTag::builder()
                .key(&t.key)
                .value(&t.value)
                .build()
                .map_err(|e| build_error("lifecycle tag", e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let conditions = usize::from(!filter.prefix.is_empty())
        + tags.len()
        + usize::from(filter.object_size_greater_than.is_some())
        + usize::from(filter.object_size_less_than.is_some());

    let builder = LifecycleRuleFilter::builder();
    let sdk_filter = if conditions > 1 {
        builder
            .and(
                LifecycleRuleAndOperator::builder()
                    .prefix(&filter.prefix)
                    .set_tags(Some(tags))
                    .set_object_size_greater_than(filter.object_size_greater_than)
                    .set_object_size_less_than(filter.object_size_less_than)
                    .build(),
            )
            .build()
    } else if let Some(tag) = tags.pop() {
        builder.tag(tag).build()
    } else if filter.object_size_greater_than.is_some() || filter.object_size_less_than.is_some() {
        builder
            .set_object_size_greater_than(filter.object_size_greater_than)
            .set_object_size_less_than(filter.object_size_less_than)
            .build()
    } else {
        builder.prefix(&filter.prefix).build()
    };
    Ok(sdk_filter)
}

/// Crate representation to backend rule
#[allow(deprecated)]
fn rule_to_sdk(document: &RuleDocument) -> Result<SdkLifecycleRule, TransportError> {
    let mut builder = SdkLifecycleRule::builder()
        .id(&document.id)
        .status(ExpirationStatus::from(document.status.as_str()));

    builder = match (&document.filter, &document.prefix) {
        (Some(filter), _) => builder.filter(filter_to_sdk(filter)?),
        (None, Some(prefix)) => builder.prefix(prefix),
        (None, None) => builder.filter(LifecycleRuleFilter::builder().prefix("").build()),
    };

    for transition in &document.transitions {
        builder = builder.transitions(
            Transition::builder()
                .set_days(count_i32(transition.days)?)
                .set_date(transition.date.as_ref().map(to_smithy))
                .storage_class(TransitionStorageClass::from(transition.storage_class.as_str()))
                .build(),
        );
    }
    for transition in &document.noncurrent_transitions {
        builder = builder.noncurrent_version_transitions(
            NoncurrentVersionTransition::builder()
                .set_noncurrent_days(count_i32(transition.noncurrent_days)?)
                .set_newer_noncurrent_versions(count_i32(transition.newer_noncurrent_versions)?)
                .storage_class(TransitionStorageClass::from(transition.storage_class.as_str()))
                .build(),
        );
    }

    if let Some(expiration) = &document.expiration {
        builder = builder.expiration(
            LifecycleExpiration::builder()
                .set_days(count_i32(expiration.days)?)
                .set_date(expiration.date.as_ref().map(to_smithy))
                .set_expired_object_delete_marker(expiration.expired_object_delete_marker)
                .build(),
        );
    }
    if let Some(expiration) = &document.noncurrent_expiration {
        builder = builder.noncurrent_version_expiration(
            NoncurrentVersionExpiration::builder()
                .set_noncurrent_days(count_i32(expiration.noncurrent_days)?)
                .set_newer_noncurrent_versions(count_i32(expiration.newer_noncurrent_versions)?)
                .build(),
        );
    }
    if let Some(days) = document.abort_incomplete_multipart_days {
        builder = builder.abort_incomplete_multipart_upload(
            AbortIncompleteMultipartUpload::builder()
                .days_after_initiation(days_i32(days)?)
                .build(),
        );
    }

    builder.build().map_err(|e| build_error("lifecycle rule", e))
}

#[async_trait]
impl ObjectTransport for S3Transport {
    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<HeadMetadata>, TransportError> {
        let output = match self.client.head_object().bucket(container).key(key).send().await {
            Ok(output) => output,
            Err(SdkError::ServiceError(service)) if service.err().is_not_found() => {
                return Ok(None);
            }
            Err(err) => {
                if err.raw_response().map(|r| r.status().as_u16()) == Some(404) {
                    return Ok(None);
                }
                return Err(TransportError::from_sdk(err));
            }
        };

        Ok(Some(HeadMetadata {
            storage_class: output.storage_class().map(|c| c.as_str().to_string()),
            restore: output.restore().map(String::from),
            content_length: output.content_length().and_then(|l| u64::try_from(l).ok()),
            content_type: output.content_type().map(String::from),
            e_tag: output.e_tag().map(String::from),
            last_modified: output.last_modified().and_then(to_chrono),
            user_metadata: output.metadata().cloned().unwrap_or_else(HashMap::new),
        }))
    }

    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, TransportError> {
        let output = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(TransportError::from_sdk)?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| TransportError::connection(format!("failed to read body: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), TransportError> {
        self.client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(body.to_vec()))
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(TransportError::from_sdk)?;
        Ok(())
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), TransportError> {
        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(TransportError::from_sdk)?;
        Ok(())
    }

    async fn delete_objects(
        &self,
        container: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, TransportError> {
        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| build_error("delete identifier", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| build_error("delete request", e))?;

        let output = self
            .client
            .delete_objects()
            .bucket(container)
            .delete(delete)
            .send()
            .await
            .map_err(TransportError::from_sdk)?;

        Ok(BatchDeleteOutput {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(String::from))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| KeyError {
                    key: e.key().unwrap_or_default().to_string(),
                    code: e.code().map(String::from),
                    message: e.message().unwrap_or_default().to_string(),
                })
                .collect(),
        })
    }

    async fn copy_object(
        &self,
        source: &ObjectReference,
        target: &ObjectReference,
        storage_class: Option<&str>,
    ) -> Result<(), TransportError> {
        self.client
            .copy_object()
            .copy_source(copy_source(source))
            .bucket(target.container())
            .key(target.key())
            .set_storage_class(storage_class.map(SdkStorageClass::from))
            .send()
            .await
            .map_err(TransportError::from_sdk)?;
        Ok(())
    }

    async fn presign_get(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, TransportError> {
        let presigning =
            PresigningConfig::expires_in(expires_in).map_err(|e| build_error("presign expiry", e))?;
        let request = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(TransportError::from_sdk)?;
        Ok(request.uri().to_string())
    }

    async fn list_objects_page(
        &self,
        container: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, TransportError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(container)
            .prefix(prefix)
            .set_continuation_token(continuation_token.map(String::from))
            .send()
            .await
            .map_err(TransportError::from_sdk)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ListedObject {
                    key: object.key()?.to_string(),
                    size: object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                    storage_class: object.storage_class().map(|c| c.as_str().to_string()),
                    e_tag: object.e_tag().map(String::from),
                    last_modified: object.last_modified().and_then(to_chrono),
                })
            })
            .collect();

        let next_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ListPage { objects, next_token })
    }

    async fn get_lifecycle(&self, container: &str) -> Result<Vec<RuleDocument>, TransportError> {
        match self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(container)
            .send()
            .await
        {
            Ok(output) => Ok(output.rules().iter().map(rule_from_sdk).collect()),
            Err(SdkError::ServiceError(service)) if service.err().code() == Some(NO_LIFECYCLE_CODE) => {
                debug!(container, "No lifecycle configuration");
                Ok(Vec::new())
            }
            Err(err) => Err(TransportError::from_sdk(err)),
        }
    }

    async fn put_lifecycle(
        &self,
        container: &str,
        rules: &[RuleDocument],
    ) -> Result<(), TransportError> {
        let sdk_rules = rules.iter().map(rule_to_sdk).collect::<Result<Vec<_>, _>>()?;
        let configuration = BucketLifecycleConfiguration::builder()
            .set_rules(Some(sdk_rules))
            .build()
            .map_err(|e| build_error("lifecycle configuration", e))?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(container)
            .lifecycle_configuration(configuration)
            .send()
            .await
            .map_err(TransportError::from_sdk)?;
        Ok(())
    }

    async fn restore_object(
        &self,
        container: &str,
        key: &str,
        days: u32,
        tier: RestoreTier,
    ) -> Result<(), TransportError> {
        let parameters = GlacierJobParameters::builder()
            .tier(Tier::from(tier.as_str()))
            .build()
            .map_err(|e| build_error("restore tier", e))?;
        let request = RestoreRequest::builder()
            .days(days_i32(days)?)
            .glacier_job_parameters(parameters)
            .build();

        self.client
            .restore_object()
            .bucket(container)
            .key(key)
            .restore_request(request)
            .send()
            .await
            .map_err(TransportError::from_sdk)?;
        Ok(())
    }
}
