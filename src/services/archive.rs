//! Archival job API (read set metadata and activation jobs)
//!
//! Objects held by the genomic archive are exposed through an S3 access point
//! but their tier is governed by read set state. [`ArchiveJobApi`] is the seam
//! over the two calls this crate needs; [`OmicsArchive`] implements it with
//! `aws-sdk-omics` and [`ArchiveClient`] adds the shared retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_omics::types::StartReadSetActivationJobSourceItem;
use aws_sdk_omics::Client as OmicsClient;
use tracing::{debug, info};

use crate::error::{Outcome, StorageError};
use crate::services::backend_client::RetryPolicy;
use crate::services::transport::TransportError;

/// Read set states reported by the archive
pub const READ_SET_ARCHIVED: &str = "ARCHIVED";
pub const READ_SET_ACTIVE: &str = "ACTIVE";
pub const READ_SET_ACTIVATING: &str = "ACTIVATING";

/// Calls against one archival sequence store
#[async_trait]
pub trait ArchiveJobApi: Send + Sync {
    /// Current read set status string (e.g. `ARCHIVED`)
    async fn get_read_set_status(
        &self,
        sequence_store_id: &str,
        read_set_id: &str,
    ) -> Result<String, TransportError>;

    /// Start one activation job covering `read_set_ids`; returns the job id.
    ///
    /// Repeating a call with the same `client_token` must not start a second
    /// job.
    async fn start_read_set_activation(
        &self,
        sequence_store_id: &str,
        read_set_ids: &[String],
        client_token: &str,
    ) -> Result<String, TransportError>;
}

/// [`ArchiveJobApi`] backed by the AWS HealthOmics service
#[derive(Clone)]
pub struct OmicsArchive {
    client: OmicsClient,
}

impl OmicsArchive {
    pub fn new(client: OmicsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArchiveJobApi for OmicsArchive {
    async fn get_read_set_status(
        &self,
        sequence_store_id: &str,
        read_set_id: &str,
    ) -> Result<String, TransportError> {
        let output = self
            .client
            .get_read_set_metadata()
            .sequence_store_id(sequence_store_id)
            .id(read_set_id)
            .send()
            .await
            .map_err(TransportError::from_sdk)?;

        Ok(output.status().as_str().to_string())
    }

    async fn start_read_set_activation(
        &self,
        sequence_store_id: &str,
        read_set_ids: &[String],
        client_token: &str,
    ) -> Result<String, TransportError> {
        let mut request = self
            .client
            .start_read_set_activation_job()
            .sequence_store_id(sequence_store_id)
            .client_token(client_token);

        for read_set_id in read_set_ids {
            let source = StartReadSetActivationJobSourceItem::builder()
                .read_set_id(read_set_id)
                .build()
                .map_err(|e| TransportError::malformed(format!("invalid activation source: {e}")))?;
            request = request.sources(source);
        }

        let output = request.send().await.map_err(TransportError::from_sdk)?;
        Ok(output.id().to_string())
    }
}

/// Retrying client bound to one sequence store
#[derive(Clone)]
pub struct ArchiveClient {
    api: Arc<dyn ArchiveJobApi>,
    sequence_store_id: String,
    retry: RetryPolicy,
}

impl ArchiveClient {
    pub fn new(
        api: Arc<dyn ArchiveJobApi>,
        sequence_store_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            sequence_store_id: sequence_store_id.into(),
            retry,
        }
    }

    #[must_use]
    pub fn sequence_store_id(&self) -> &str {
        &self.sequence_store_id
    }

    pub async fn read_set_status(
        &self,
        read_set_id: &str,
    ) -> Result<Outcome<String>, StorageError> {
        let api = self.api.as_ref();
        let store = self.sequence_store_id.as_str();
        let outcome = self
            .retry
            .execute("get_read_set_metadata", read_set_id, move || {
                api.get_read_set_status(store, read_set_id)
            })
            .await?;

        if let Outcome::Completed(status) = &outcome {
            debug!(read_set_id, status = %status, "Fetched read set status");
        }
        Ok(outcome)
    }

    /// Start an activation job for one read set.
    ///
    /// Every attempt carries the same client token, so a retry after a lost
    /// response does not start a second job.
    pub async fn activate(&self, read_set_id: &str) -> Result<Outcome<String>, StorageError> {
        let api = self.api.as_ref();
        let store = self.sequence_store_id.as_str();
        let ids = [read_set_id.to_string()];
        let ids = ids.as_slice();
        let token = uuid::Uuid::new_v4().to_string();
        let token = token.as_str();
        let outcome = self
            .retry
            .execute("start_read_set_activation_job", read_set_id, move || {
                api.start_read_set_activation(store, ids, token)
            })
            .await?;

        if let Outcome::Completed(job_id) = &outcome {
            info!(read_set_id, job_id = %job_id, "Started read set activation job");
        }
        Ok(outcome)
    }
}
