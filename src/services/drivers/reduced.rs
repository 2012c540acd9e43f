//! Driver for S3-compatible services without lifecycle or restore support

use async_trait::async_trait;

use super::{Capabilities, PrimaryDriver, RestoreOptions, StorageBackend};
use crate::config::DriverKind;
use crate::error::{Outcome, StorageError};
use crate::models::{
    BulkOperationResult, HeadMetadata, LifecycleRule, ListedObject, ObjectReference,
    ObjectStatus, RuleDocument, StorageClass, StorageContext, UploadReceipt,
};

const DRIVER_NAME: &str = "minio";

/// Primary behaviour minus lifecycle and restore, which fail locally
#[derive(Clone)]
pub struct ReducedDriver {
    inner: PrimaryDriver,
}

impl ReducedDriver {
    pub fn new(inner: PrimaryDriver) -> Self {
        Self { inner }
    }

    fn unsupported(operation: &'static str) -> StorageError {
        StorageError::UnsupportedOperation {
            operation,
            driver: DRIVER_NAME,
        }
    }
}

#[async_trait]
impl StorageBackend for ReducedDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Reduced
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            lifecycle: false,
            restore: false,
            archival: false,
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
            storage_driver: DriverKind::Reduced.as_str().to_string(),
            storage_sse_enabled: false,
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
        self.inner.get_status(reference).await
    }

    async fn restore(
        &self,
        _reference: &ObjectReference,
        _options: RestoreOptions,
    ) -> Result<ObjectStatus, StorageError> {
        Err(Self::unsupported("restore"))
    }

    async fn restore_many(
        &self,
        _references: &[ObjectReference],
        _options: RestoreOptions,
    ) -> Result<BulkOperationResult, StorageError> {
        Err(Self::unsupported("restore_many"))
    }

    async fn get_lifecycle(
        &self,
        _container: Option<&str>,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        Err(Self::unsupported("get_lifecycle"))
    }

    async fn set_lifecycle(
        &self,
        _container: Option<&str>,
        _rule: &LifecycleRule,
        _replace: bool,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        Err(Self::unsupported("set_lifecycle"))
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
#[path = "reduced_tests.rs"]
mod tests;
