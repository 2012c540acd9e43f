//! Full-featured driver for the general object-storage service

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Capabilities, RestoreOptions, StorageBackend};
use crate::config::{DriverKind, StorageConfig};
use crate::error::{Outcome, StorageError};
use crate::models::{
    merge_rules, BulkOperationResult, HeadMetadata, LifecycleRule, ListedObject, ObjectReference,
    ObjectStatus, RestoreStatus, RuleDocument, StorageClass, StorageContext, UploadReceipt,
};
use crate::services::backend_client::BackendClient;
use crate::services::status_resolver;
use crate::services::transport::RestoreTier;

/// Provider code for a restore that another caller already started
const RESTORE_ALREADY_IN_PROGRESS: &str = "RestoreAlreadyInProgress";

/// Storage class replicas land in when none is given
pub const DEFAULT_REPLICA_CLASS: StorageClass = StorageClass::InfrequentAccess;

/// Driver with every capability
#[derive(Clone)]
pub struct PrimaryDriver {
    client: BackendClient,
    config: Arc<StorageConfig>,
}

impl PrimaryDriver {
    pub fn new(client: BackendClient, config: Arc<StorageConfig>) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn container_or_default<'a>(&'a self, container: Option<&'a str>) -> &'a str {
        container.unwrap_or(&self.config.bucket)
    }

    pub(crate) fn restore_days(&self, options: RestoreOptions) -> Result<u32, StorageError> {
        match options.days {
            Some(0) => Err(StorageError::InvalidArgument(
                "restore period must be at least one day".to_string(),
            )),
            Some(days) => Ok(days),
            None => Ok(self.config.default_restore_days()),
        }
    }

    /// Issue the restore request for an object already known to need one
    async fn start_restore(
        &self,
        reference: &ObjectReference,
        current: ObjectStatus,
        days: u32,
        tier_hint: Option<RestoreTier>,
    ) -> Result<ObjectStatus, StorageError> {
        let class = current.storage_class;
        let tier = RestoreTier::effective_for(tier_hint, class);

        match self.client.request_restore(reference, days, tier).await? {
            Outcome::Completed(()) => {
                info!(
                    uri = %reference,
                    days,
                    tier = tier.as_str(),
                    storage_class = %class,
                    "Restore requested"
                );
                Ok(ObjectStatus::new(RestoreStatus::RestoreInProgress, class))
            }
            Outcome::Failed(failure)
                if failure.code.as_deref() == Some(RESTORE_ALREADY_IN_PROGRESS) =>
            {
                debug!(uri = %reference, "Restore already running");
                Ok(ObjectStatus::new(RestoreStatus::RestoreInProgress, class))
            }
            Outcome::Failed(failure) => {
                warn!(uri = %reference, error = %failure, "Restore request refused");
                Ok(ObjectStatus::failed(class, failure))
            }
        }
    }

    /// Shared restore loop; `restore` decides per item
    pub(crate) async fn restore_each<B: StorageBackend + ?Sized>(
        backend: &B,
        references: &[ObjectReference],
        options: RestoreOptions,
    ) -> Result<BulkOperationResult, StorageError> {
        let mut result = BulkOperationResult::new();

        for reference in references {
            result.attempt(reference);
            let before = backend.get_status(reference).await?;
            if before.status != RestoreStatus::RestoreNotStarted {
                record_untouched(&mut result, reference, before);
                continue;
            }

            let after = backend.restore(reference, options).await?;
            match after.status {
                RestoreStatus::RestoreError => record_error(&mut result, reference, &after),
                _ => result.record_success(reference.clone()),
            }
        }

        info!(
            attempted = references.len(),
            restored = result.succeeded.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "Bulk restore finished"
        );
        Ok(result)
    }
}

fn record_untouched(result: &mut BulkOperationResult, reference: &ObjectReference, status: ObjectStatus) {
    match status.status {
        RestoreStatus::FileNotFound => {
            result.record_failure(reference.format(), None, "object not found");
        }
        RestoreStatus::RestoreError => record_error(result, reference, &status),
        _ => result.record_skipped(reference.clone()),
    }
}

fn record_error(result: &mut BulkOperationResult, reference: &ObjectReference, status: &ObjectStatus) {
    match &status.cause {
        Some(cause) => result.record_permanent(reference, cause),
        None => result.record_failure(
            reference.format(),
            None,
            format!("unexpected restore state for storage class {}", status.storage_class),
        ),
    }
}

#[async_trait]
impl StorageBackend for PrimaryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Primary
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn default_container(&self) -> &str {
        &self.config.bucket
    }

    fn uri_for(&self, key: &str) -> Result<ObjectReference, StorageError> {
        ObjectReference::s3(self.config.bucket.clone(), key)
    }

    fn storage_context(&self) -> StorageContext {
        StorageContext {
            storage_driver: self.config.driver.as_str().to_string(),
            storage_bucket: self.config.bucket.clone(),
            storage_region: self.config.region.clone(),
            storage_url: self.config.service_url(),
            storage_archival_enabled: self.config.restore_period_days.is_some(),
            storage_sse_enabled: true,
        }
    }

    async fn get_head(
        &self,
        reference: &ObjectReference,
    ) -> Result<Outcome<Option<HeadMetadata>>, StorageError> {
        self.client.head(reference).await
    }

    async fn get_status(&self, reference: &ObjectReference) -> Result<ObjectStatus, StorageError> {
        let status = match self.client.head(reference).await? {
            Outcome::Completed(head) => status_resolver::resolve_detail(head.as_ref()),
            Outcome::Failed(failure) => ObjectStatus::failed(StorageClass::Unknown, failure),
        };
        debug!(uri = %reference, status = %status.status, storage_class = %status.storage_class, "Resolved status");
        Ok(status)
    }

    async fn restore(
        &self,
        reference: &ObjectReference,
        options: RestoreOptions,
    ) -> Result<ObjectStatus, StorageError> {
        let days = self.restore_days(options)?;
        let current = self.get_status(reference).await?;
        if current.status != RestoreStatus::RestoreNotStarted {
            debug!(uri = %reference, status = %current.status, "Restore not needed");
            return Ok(current);
        }
        self.start_restore(reference, current, days, options.tier_hint)
            .await
    }

    async fn restore_many(
        &self,
        references: &[ObjectReference],
        options: RestoreOptions,
    ) -> Result<BulkOperationResult, StorageError> {
        self.restore_days(options)?;
        Self::restore_each(self, references, options).await
    }

    async fn get_lifecycle(
        &self,
        container: Option<&str>,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        let container = self.container_or_default(container);
        Ok(self
            .client
            .get_lifecycle(container)
            .await?
            .map(|rules| rules.into_iter().map(RuleDocument::upgraded).collect()))
    }

    async fn set_lifecycle(
        &self,
        container: Option<&str>,
        rule: &LifecycleRule,
        replace: bool,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        let container = self.container_or_default(container);

        let rules = if replace {
            vec![rule.to_document()]
        } else {
            match self.client.get_lifecycle(container).await? {
                Outcome::Completed(existing) => merge_rules(existing, rule),
                Outcome::Failed(failure) => return Ok(Outcome::Failed(failure)),
            }
        };

        match self.client.put_lifecycle(container, &rules).await? {
            Outcome::Completed(()) => {
                info!(
                    container,
                    rule_id = %rule.id,
                    replace,
                    rules = rules.len(),
                    "Lifecycle configuration written"
                );
                Ok(Outcome::Completed(rules))
            }
            Outcome::Failed(failure) => Ok(Outcome::Failed(failure)),
        }
    }

    async fn bulk_delete(
        &self,
        references: &[ObjectReference],
    ) -> Result<BulkOperationResult, StorageError> {
        let mut grouped: BTreeMap<&str, Vec<&ObjectReference>> = BTreeMap::new();
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        for reference in references {
            if seen.insert((reference.container(), reference.key())) {
                grouped.entry(reference.container()).or_default().push(reference);
            }
        }

        let mut result = BulkOperationResult::new();
        for (container, refs) in grouped {
            let keys: Vec<String> = refs.iter().map(|r| r.key().to_string()).collect();
            for reference in &refs {
                result.attempt(reference);
            }

            let output = self.client.delete_batch(container, &keys).await?;
            for reference in refs {
                if let Some(error) = output.errors.iter().find(|e| e.key == reference.key()) {
                    result.record_failure(
                        reference.format(),
                        error.code.clone(),
                        error.message.clone(),
                    );
                } else if output.deleted.iter().any(|k| k == reference.key()) {
                    result.record_success(reference.clone());
                } else {
                    result.record_failure(reference.format(), None, "delete not acknowledged");
                }
            }
        }

        if result.failed.is_empty() {
            info!(deleted = result.succeeded.len(), "Bulk delete finished");
        } else {
            warn!(
                deleted = result.succeeded.len(),
                failed = result.failed.len(),
                "Bulk delete finished with failures"
            );
        }
        Ok(result)
    }

    async fn get_body(&self, reference: &ObjectReference) -> Result<Outcome<Vec<u8>>, StorageError> {
        self.client.get_body(reference).await
    }

    async fn set_body(
        &self,
        reference: &ObjectReference,
        body: &[u8],
    ) -> Result<Outcome<()>, StorageError> {
        self.client.put_body(reference, body, None).await
    }

    async fn delete(&self, reference: &ObjectReference) -> Result<Outcome<()>, StorageError> {
        self.client.delete(reference).await
    }

    async fn list(
        &self,
        container: Option<&str>,
        prefix: &str,
    ) -> Result<Outcome<Vec<ListedObject>>, StorageError> {
        let container = self.container_or_default(container);
        self.client.list(container, prefix).await
    }

    async fn presign(&self, reference: &ObjectReference) -> Result<Outcome<String>, StorageError> {
        let expires_in = Duration::from_secs(self.config.presign_expiry_secs);
        self.client.presign(reference, expires_in).await
    }

    async fn replicate(
        &self,
        source: &ObjectReference,
        target_key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<Outcome<ObjectReference>, StorageError> {
        let target = self.uri_for(target_key)?;
        let class = storage_class.unwrap_or(DEFAULT_REPLICA_CLASS);
        let outcome = self.client.copy(source, &target, Some(class)).await?;
        if outcome.is_completed() {
            info!(source = %source, target = %target, storage_class = %class, "Object replicated");
        }
        Ok(outcome.map(|()| target))
    }

    async fn upload(
        &self,
        key: &str,
        body: &[u8],
        force: bool,
    ) -> Result<Outcome<UploadReceipt>, StorageError> {
        let reference = self.uri_for(key)?;

        let exists = if force {
            false
        } else {
            match self.client.head(&reference).await? {
                Outcome::Completed(head) => head.is_some(),
                Outcome::Failed(failure) => return Ok(Outcome::Failed(failure)),
            }
        };

        if exists {
            debug!(uri = %reference, "Object exists, skipping upload");
        } else {
            let content_type = mime_guess::from_path(key).first_raw();
            if let Outcome::Failed(failure) =
                self.client.put_body(&reference, body, content_type).await?
            {
                return Ok(Outcome::Failed(failure));
            }
        }

        let url = match self.presign(&reference).await? {
            Outcome::Completed(url) => url,
            Outcome::Failed(failure) => {
                warn!(
                    uri = %reference,
                    written = !exists,
                    error = %failure,
                    "Uploaded object could not be presigned"
                );
                return Ok(Outcome::Failed(failure));
            }
        };
        Ok(Outcome::Completed(UploadReceipt {
            uri: reference.format(),
            url,
            written: !exists,
        }))
    }
}

#[cfg(test)]
#[path = "primary_tests.rs"]
mod tests;
