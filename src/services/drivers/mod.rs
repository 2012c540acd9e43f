//! Storage drivers
//!
//! A driver binds a [`BackendClient`] and the status resolver into one
//! implementation of [`StorageBackend`]. [`PrimaryDriver`] carries the full
//! feature set; [`ReducedDriver`] and [`ArchivalDriver`] embed a primary
//! driver and override only what differs.

mod archival;
mod primary;
mod reduced;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub use archival::ArchivalDriver;
pub use primary::PrimaryDriver;
pub use reduced::ReducedDriver;

use crate::config::{DriverKind, StorageConfig};
use crate::error::{Outcome, StorageError};
use crate::models::{
    BulkOperationResult, HeadMetadata, LifecycleRule, ListedObject, ObjectReference,
    ObjectStatus, RuleDocument, StorageClass, StorageContext, UploadReceipt,
};
use crate::services::archive::{ArchiveClient, OmicsArchive};
use crate::services::backend_client::{BackendClient, RetryPolicy};
use crate::services::s3_transport::{load_sdk_config, verify_credentials, S3Transport};
use crate::services::transport::RestoreTier;

/// Marker in access-point aliases that front the archival store
pub const ARCHIVAL_ALIAS_MARKER: &str = "-s3alias";

/// Operations a driver supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub lifecycle: bool,
    pub restore: bool,
    pub archival: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        lifecycle: true,
        restore: true,
        archival: false,
    };
}

/// Inputs to a restore request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Days the restored copy stays readable; the configured default if unset
    pub days: Option<u32>,
    /// Requested retrieval speed; GLACIER always uses `Expedited`
    pub tier_hint: Option<RestoreTier>,
}

impl RestoreOptions {
    #[must_use]
    pub fn days(days: u32) -> Self {
        Self {
            days: Some(days),
            tier_hint: None,
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier: RestoreTier) -> Self {
        self.tier_hint = Some(tier);
        self
    }
}

/// The storage contract every driver implements.
///
/// Remote refusals come back as [`Outcome::Failed`] or as an
/// [`ObjectStatus`] in `restore_error`; only fail-fast and propagated
/// conditions use `Err`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> DriverKind;

    fn capabilities(&self) -> Capabilities;

    /// Container used when none is given
    fn default_container(&self) -> &str;

    /// `s3://{default container}/{key}`
    fn uri_for(&self, key: &str) -> Result<ObjectReference, StorageError>;

    fn storage_context(&self) -> StorageContext;

    async fn get_head(
        &self,
        reference: &ObjectReference,
    ) -> Result<Outcome<Option<HeadMetadata>>, StorageError>;

    /// Fresh status from the backend, never cached
    async fn get_status(&self, reference: &ObjectReference) -> Result<ObjectStatus, StorageError>;

    /// Start a restore when one is needed and not yet running.
    ///
    /// Returns the current status without a remote request when the object
    /// is readable, missing, errored or already restoring.
    async fn restore(
        &self,
        reference: &ObjectReference,
        options: RestoreOptions,
    ) -> Result<ObjectStatus, StorageError>;

    /// Restore every reference in `restore_not_started`, reporting each item
    async fn restore_many(
        &self,
        references: &[ObjectReference],
        options: RestoreOptions,
    ) -> Result<BulkOperationResult, StorageError>;

    async fn get_lifecycle(
        &self,
        container: Option<&str>,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError>;

    /// Write `rule`, merging into the existing set unless `replace`.
    /// Returns the rule set that was written.
    async fn set_lifecycle(
        &self,
        container: Option<&str>,
        rule: &LifecycleRule,
        replace: bool,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError>;

    /// One batched delete per container; per-key failures are reported
    async fn bulk_delete(
        &self,
        references: &[ObjectReference],
    ) -> Result<BulkOperationResult, StorageError>;

    async fn get_body(&self, reference: &ObjectReference) -> Result<Outcome<Vec<u8>>, StorageError>;

    async fn set_body(
        &self,
        reference: &ObjectReference,
        body: &[u8],
    ) -> Result<Outcome<()>, StorageError>;

    async fn delete(&self, reference: &ObjectReference) -> Result<Outcome<()>, StorageError>;

    async fn list(
        &self,
        container: Option<&str>,
        prefix: &str,
    ) -> Result<Outcome<Vec<ListedObject>>, StorageError>;

    /// Time-limited read URL
    async fn presign(&self, reference: &ObjectReference) -> Result<Outcome<String>, StorageError>;

    /// Copy `source` to `target_key` in the default container
    async fn replicate(
        &self,
        source: &ObjectReference,
        target_key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<Outcome<ObjectReference>, StorageError>;

    /// Write `body` under `key` in the default container unless it already
    /// exists and `force` is false
    async fn upload(
        &self,
        key: &str,
        body: &[u8],
        force: bool,
    ) -> Result<Outcome<UploadReceipt>, StorageError>;
}

/// Whether `reference` is served through an archival access point.
///
/// Only the container is inspected; a key that happens to contain the marker
/// does not qualify.
#[must_use]
pub fn is_archival_reference(reference: &ObjectReference) -> bool {
    reference.container().contains(ARCHIVAL_ALIAS_MARKER)
}

/// Read set id of an archival reference (`.../readSet/{id}/{file}`)
pub fn read_set_id(reference: &ObjectReference) -> Result<&str, StorageError> {
    let mut segments = reference.key().rsplit('/');
    let _file = segments.next();
    match segments.next() {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(StorageError::invalid_uri(
            &reference.format(),
            "archival key must end with {read_set_id}/{file}",
        )),
    }
}

/// Build the driver selected by `config` against the real services
pub async fn connect(config: StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    config.validate()?;

    let sdk_config = load_sdk_config(&config).await;
    if config.disable_sts {
        info!(driver = %config.driver, "Skipping credential validation");
    } else {
        verify_credentials(&sdk_config).await?;
    }

    let retry = RetryPolicy::from_config(&config);
    let transport = Arc::new(S3Transport::new(&sdk_config, &config));
    let client = BackendClient::new(transport, retry);
    let config = Arc::new(config);

    let driver: Arc<dyn StorageBackend> = match config.driver {
        DriverKind::Primary => Arc::new(PrimaryDriver::new(client, config.clone())),
        DriverKind::Reduced => Arc::new(ReducedDriver::new(PrimaryDriver::new(
            client,
            config.clone(),
        ))),
        DriverKind::Archival => {
            let archive_config = config.archive.clone().ok_or_else(|| {
                StorageError::InvalidArgument("archival driver needs a sequence store".to_string())
            })?;
            let omics_config = aws_sdk_omics::config::Builder::from(&sdk_config)
                .region(aws_config::Region::new(archive_config.region.clone()))
                .build();
            let api = Arc::new(OmicsArchive::new(aws_sdk_omics::Client::from_conf(omics_config)));
            let archive = ArchiveClient::new(api, archive_config.sequence_store_id, retry);
            Arc::new(ArchivalDriver::new(
                PrimaryDriver::new(client, config.clone()),
                archive,
            ))
        }
    };

    info!(
        driver = %config.driver,
        bucket = %config.bucket,
        region = %config.region,
        "Storage driver ready"
    );
    Ok(driver)
}
