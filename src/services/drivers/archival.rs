//! Driver that routes archival access-point references to the archive job API
//!
//! Plain references behave exactly as on the primary driver. References whose
//! container is an archival access-point alias take their status from read set
//! state and are restored by starting an activation job.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{
    is_archival_reference, read_set_id, Capabilities, PrimaryDriver, RestoreOptions,
    StorageBackend,
};
use crate::config::DriverKind;
use crate::error::{FailureKind, Outcome, StorageError};
use crate::models::{
    BulkOperationResult, HeadMetadata, LifecycleRule, ListedObject, ObjectReference,
    ObjectStatus, RestoreStatus, RuleDocument, StorageClass, StorageContext, UploadReceipt,
};
use crate::services::archive::ArchiveClient;
use crate::services::status_resolver;

/// Primary driver plus archival read set handling
#[derive(Clone)]
pub struct ArchivalDriver {
    inner: PrimaryDriver,
    archive: ArchiveClient,
}

impl ArchivalDriver {
    pub fn new(inner: PrimaryDriver, archive: ArchiveClient) -> Self {
        Self { inner, archive }
    }

    async fn archive_status(&self, reference: &ObjectReference) -> Result<ObjectStatus, StorageError> {
        let read_set = read_set_id(reference)?;
        let status = match self.archive.read_set_status(read_set).await? {
            Outcome::Completed(state) => status_resolver::resolve_archive(&state),
            Outcome::Failed(failure) if failure.kind == FailureKind::NotFound => {
                ObjectStatus::new(RestoreStatus::FileNotFound, StorageClass::Unknown)
            }
            Outcome::Failed(failure) => ObjectStatus::failed(StorageClass::Unknown, failure),
        };
        debug!(uri = %reference, read_set, status = %status.status, "Resolved read set status");
        Ok(status)
    }
}

#[async_trait]
impl StorageBackend for ArchivalDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Archival
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            archival: true,
            ..Capabilities::FULL
        }
    }

    fn default_container(&self) -> &str {
        self.inner.default_container()
    }

    fn uri_for(&self, key: &str) -> Result<ObjectReference, StorageError> {
        self.inner.uri_for(key)
    }

    fn storage_context(&self) -> StorageContext {
        StorageContext {
            storage_driver: DriverKind::Archival.as_str().to_string(),
            ..self.inner.storage_context()
        }
    }

    async fn get_head(
        &self,
        reference: &ObjectReference,
    ) -> Result<Outcome<Option<HeadMetadata>>, StorageError> {
        self.inner.get_head(reference).await
    }

    async fn get_status(&self, reference: &ObjectReference) -> Result<ObjectStatus, StorageError> {
        if is_archival_reference(reference) {
            self.archive_status(reference).await
        } else {
            self.inner.get_status(reference).await
        }
    }

    async fn restore(
        &self,
        reference: &ObjectReference,
        options: RestoreOptions,
    ) -> Result<ObjectStatus, StorageError> {
        self.inner.restore_days(options)?;
        if !is_archival_reference(reference) {
            return self.inner.restore(reference, options).await;
        }

        let current = self.archive_status(reference).await?;
        if current.status != RestoreStatus::RestoreNotStarted {
            debug!(uri = %reference, status = %current.status, "Activation not needed");
            return Ok(current);
        }

        let read_set = read_set_id(reference)?;
        match self.archive.activate(read_set).await? {
            Outcome::Completed(job_id) => {
                info!(uri = %reference, read_set, job_id = %job_id, "Read set activation started");
                Ok(ObjectStatus::new(
                    RestoreStatus::RestoreInProgress,
                    StorageClass::Activating,
                ))
            }
            Outcome::Failed(failure) => {
                warn!(uri = %reference, read_set, error = %failure, "Read set activation refused");
                Ok(ObjectStatus::failed(current.storage_class, failure))
            }
        }
    }

    async fn restore_many(
        &self,
        references: &[ObjectReference],
        options: RestoreOptions,
    ) -> Result<BulkOperationResult, StorageError> {
        self.inner.restore_days(options)?;
        PrimaryDriver::restore_each(self, references, options).await
    }

    async fn get_lifecycle(
        &self,
        container: Option<&str>,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        self.inner.get_lifecycle(container).await
    }

    async fn set_lifecycle(
        &self,
        container: Option<&str>,
        rule: &LifecycleRule,
        replace: bool,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        self.inner.set_lifecycle(container, rule, replace).await
    }

    async fn bulk_delete(
        &self,
        references: &[ObjectReference],
    ) -> Result<BulkOperationResult, StorageError> {
        self.inner.bulk_delete(references).await
    }

    async fn get_body(&self, reference: &ObjectReference) -> Result<Outcome<Vec<u8>>, StorageError> {
        self.inner.get_body(reference).await
    }

    async fn set_body(
        &self,
        reference: &ObjectReference,
        body: &[u8],
    ) -> Result<Outcome<()>, StorageError> {
        self.inner.set_body(reference, body).await
    }

    async fn delete(&self, reference: &ObjectReference) -> Result<Outcome<()>, StorageError> {
        self.inner.delete(reference).await
    }

    async fn list(
        &self,
        container: Option<&str>,
        prefix: &str,
    ) -> Result<Outcome<Vec<ListedObject>>, StorageError> {
        self.inner.list(container, prefix).await
    }

    /// Archival references are presigned against their access-point alias,
    /// which is what the reference's container already holds
    async fn presign(&self, reference: &ObjectReference) -> Result<Outcome<String>, StorageError> {
        self.inner.presign(reference).await
    }

    async fn replicate(
        &self,
        source: &ObjectReference,
        target_key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<Outcome<ObjectReference>, StorageError> {
        self.inner.replicate(source, target_key, storage_class).await
    }

    async fn upload(
        &self,
        key: &str,
        body: &[u8],
        force: bool,
    ) -> Result<Outcome<UploadReceipt>, StorageError> {
        self.inner.upload(key, body, force).await
    }
}

#[cfg(test)]
#[path = "archival_tests.rs"]
mod tests;
