//! Storage facade
//!
//! [`Storage`] is the entry point callers use. It owns one driver, chosen at
//! construction, and forwards URI-level calls to it. The only behaviour it
//! adds is [`Storage::get_overall_status`], which reduces many objects to a
//! single restore decision.
//!
//! Logging goes through the `tracing::Dispatch` handed to the constructor,
//! when one is given; otherwise the caller's default subscriber applies.

use std::future::Future;
use std::sync::Arc;

use tracing::instrument::WithSubscriber;
use tracing::{info, Dispatch};

use crate::config::{DriverKind, StorageConfig};
use crate::error::{Outcome, StorageError};
use crate::models::{
    BulkOperationResult, HeadMetadata, LifecycleRule, ListedObject, ObjectReference,
    ObjectStatus, RestoreStatus, RuleDocument, StorageClass, StorageContext, UploadReceipt,
};
use crate::services::drivers::{self, Capabilities, RestoreOptions, StorageBackend};

/// Code recorded for bulk items whose identifier could not be parsed
const INVALID_URI_CODE: &str = "InvalidUri";

/// Single entry point over the configured driver
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
    dispatch: Option<Dispatch>,
}

impl Storage {
    /// Build the driver named by `config` and validate credentials
    pub async fn connect(
        config: StorageConfig,
        dispatch: Option<Dispatch>,
    ) -> Result<Self, StorageError> {
        let backend = match &dispatch {
            Some(dispatch) => {
                drivers::connect(config)
                    .with_subscriber(dispatch.clone())
                    .await?
            }
            None => drivers::connect(config).await?,
        };
        Ok(Self { backend, dispatch })
    }

    /// Load configuration from the environment, then [`Storage::connect`]
    pub async fn from_env(dispatch: Option<Dispatch>) -> Result<Self, StorageError> {
        let config = StorageConfig::from_env()?;
        Self::connect(config, dispatch).await
    }

    /// Use an already-built driver
    pub fn with_driver(backend: Arc<dyn StorageBackend>, dispatch: Option<Dispatch>) -> Self {
        Self { backend, dispatch }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    #[must_use]
    pub fn kind(&self) -> DriverKind {
        self.backend.kind()
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    #[must_use]
    pub fn storage_context(&self) -> StorageContext {
        self.backend.storage_context()
    }

    /// URI of `key` in the default container
    pub fn uri_for(&self, key: &str) -> Result<String, StorageError> {
        Ok(self.backend.uri_for(key)?.format())
    }

    async fn scoped<F: Future>(&self, future: F) -> F::Output {
        match &self.dispatch {
            Some(dispatch) => future.with_subscriber(dispatch.clone()).await,
            None => future.await,
        }
    }

    pub async fn get_head(&self, uri: &str) -> Result<Outcome<Option<HeadMetadata>>, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.get_head(&reference)).await
    }

    pub async fn get_status(&self, uri: &str) -> Result<ObjectStatus, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.get_status(&reference)).await
    }

    pub async fn restore(
        &self,
        uri: &str,
        options: RestoreOptions,
    ) -> Result<ObjectStatus, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.restore(&reference, options)).await
    }

    /// Restore every object that needs it; unparseable URIs are reported as
    /// failed items
    pub async fn restore_many<S: AsRef<str>>(
        &self,
        uris: &[S],
        options: RestoreOptions,
    ) -> Result<BulkOperationResult, StorageError> {
        let (references, mut result) = parse_bulk(uris);
        let restored = self
            .scoped(self.backend.restore_many(&references, options))
            .await?;
        result.merge(restored);
        Ok(result)
    }

    pub async fn get_lifecycle(
        &self,
        container: Option<&str>,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        self.scoped(self.backend.get_lifecycle(container)).await
    }

    pub async fn set_lifecycle(
        &self,
        container: Option<&str>,
        rule: &LifecycleRule,
        replace: bool,
    ) -> Result<Outcome<Vec<RuleDocument>>, StorageError> {
        self.scoped(self.backend.set_lifecycle(container, rule, replace))
            .await
    }

    /// Delete many objects; unparseable URIs are reported as failed items
    pub async fn bulk_delete<S: AsRef<str>>(
        &self,
        uris: &[S],
    ) -> Result<BulkOperationResult, StorageError> {
        let (references, mut result) = parse_bulk(uris);
        let deleted = self.scoped(self.backend.bulk_delete(&references)).await?;
        result.merge(deleted);
        Ok(result)
    }

    pub async fn get_body(&self, uri: &str) -> Result<Outcome<Vec<u8>>, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.get_body(&reference)).await
    }

    pub async fn set_body(&self, uri: &str, body: &[u8]) -> Result<Outcome<()>, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.set_body(&reference, body)).await
    }

    pub async fn delete(&self, uri: &str) -> Result<Outcome<()>, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.delete(&reference)).await
    }

    pub async fn list(
        &self,
        container: Option<&str>,
        prefix: &str,
    ) -> Result<Outcome<Vec<ListedObject>>, StorageError> {
        self.scoped(self.backend.list(container, prefix)).await
    }

    /// Time-limited read URL
    pub async fn presign(&self, uri: &str) -> Result<Outcome<String>, StorageError> {
        let reference = ObjectReference::parse(uri)?;
        self.scoped(self.backend.presign(&reference)).await
    }

    /// Copy `source_uri` to `target_key` in the default container; returns the
    /// new object's URI
    pub async fn replicate(
        &self,
        source_uri: &str,
        target_key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<Outcome<String>, StorageError> {
        let source = ObjectReference::parse(source_uri)?;
        let outcome = self
            .scoped(self.backend.replicate(&source, target_key, storage_class))
            .await?;
        Ok(outcome.map(|target| target.format()))
    }

    pub async fn upload(
        &self,
        key: &str,
        body: &[u8],
        force: bool,
    ) -> Result<Outcome<UploadReceipt>, StorageError> {
        self.scoped(self.backend.upload(key, body, force)).await
    }

    /// One restore state for a set of objects.
    ///
    /// Every URI is parsed before any remote call. Statuses are fetched one
    /// at a time, fresh, and reduced with [`RestoreStatus::aggregate`].
    pub async fn get_overall_status<S: AsRef<str>>(
        &self,
        uris: &[S],
    ) -> Result<RestoreStatus, StorageError> {
        let references = uris
            .iter()
            .map(|uri| ObjectReference::parse(uri.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        self.scoped(async {
            let mut statuses = Vec::with_capacity(references.len());
            for reference in &references {
                statuses.push(self.backend.get_status(reference).await?.status);
            }
            let overall = RestoreStatus::aggregate(&statuses);
            info!(objects = references.len(), status = %overall, "Computed overall restore status");
            Ok::<_, StorageError>(overall)
        })
        .await
    }
}

/// Split bulk input into parsed references and a result pre-filled with the
/// identifiers that failed to parse
fn parse_bulk<S: AsRef<str>>(uris: &[S]) -> (Vec<ObjectReference>, BulkOperationResult) {
    let mut result = BulkOperationResult::new();
    let mut references = Vec::with_capacity(uris.len());
    for uri in uris {
        match ObjectReference::parse(uri.as_ref()) {
            Ok(reference) => references.push(reference),
            Err(error) => {
                result.record_failure(uri.as_ref(), Some(INVALID_URI_CODE.to_string()), error.to_string())
            }
        }
    }
    (references, result)
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
