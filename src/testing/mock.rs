//! In-memory transports for tests.
//!
//! [`MockTransport`] keeps objects and lifecycle documents in memory, records
//! every call, and can be scripted to fail the next N calls of an operation.
//! [`MockArchive`] does the same for read sets and activation jobs.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    BatchDeleteOutput, HeadMetadata, KeyError, ListPage, ListedObject, ObjectReference,
    RuleDocument,
};
use crate::services::archive::{ArchiveJobApi, READ_SET_ACTIVATING, READ_SET_ARCHIVED};
use crate::services::transport::{ObjectTransport, RestoreTier, TransportError};

/// Record of a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Operation name (e.g. "head_object", "restore_object")
    pub operation: String,
    /// Arguments passed to the call
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl MockCall {
    fn new(operation: &str, args: Vec<String>) -> Self {
        Self {
            operation: operation.to_string(),
            args,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    head: HeadMetadata,
}

#[derive(Default)]
struct MockState {
    containers: BTreeSet<String>,
    objects: BTreeMap<(String, String), StoredObject>,
    lifecycle: HashMap<String, Vec<RuleDocument>>,
    calls: Vec<MockCall>,
    failures: HashMap<String, VecDeque<TransportError>>,
    rejected_deletes: HashMap<(String, String), KeyError>,
    restore_requests: Vec<(ObjectReference, u32, RestoreTier)>,
}

impl MockState {
    fn record(&mut self, operation: &str, args: &[&str]) -> Result<(), TransportError> {
        self.calls
            .push(MockCall::new(operation, args.iter().map(|a| a.to_string()).collect()));
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_container(&self, container: &str) -> Result<(), TransportError> {
        if self.containers.contains(container) {
            Ok(())
        } else {
            Err(TransportError::service(
                404,
                "NoSuchBucket",
                format!("The specified bucket does not exist: {container}"),
            ))
        }
    }
}

fn no_such_key(key: &str) -> TransportError {
    TransportError::service(404, "NoSuchKey", format!("The specified key does not exist: {key}"))
}

/// In-memory [`ObjectTransport`].
///
/// Containers must exist (see [`MockTransport::with_container`]) or calls
/// against them fail with `NoSuchBucket`.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    page_size: usize,
    stuck_token: Option<String>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            page_size: 1000,
            stuck_token: None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Listing page size, to exercise pagination
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every listing page claims more results under the same `token`
    #[must_use]
    pub fn with_stuck_token(mut self, token: &str) -> Self {
        self.stuck_token = Some(token.to_string());
        self
    }

    #[must_use]
    pub fn with_container(self, container: &str) -> Self {
        self.lock().containers.insert(container.to_string());
        self
    }

    /// Store an object with the given head metadata
    pub fn insert_object(&self, reference: &ObjectReference, body: &[u8], head: HeadMetadata) {
        let mut state = self.lock();
        state.containers.insert(reference.container().to_string());
        let head = HeadMetadata {
            content_length: Some(body.len() as u64),
            ..head
        };
        state.objects.insert(
            (reference.container().to_string(), reference.key().to_string()),
            StoredObject {
                body: body.to_vec(),
                head,
            },
        );
    }

    /// Store an object in the given provider storage class
    pub fn insert_in_class(&self, reference: &ObjectReference, storage_class: &str) {
        self.insert_object(reference, b"data", HeadMetadata::with_class(storage_class));
    }

    /// Overwrite the restore flag of a stored object
    pub fn set_restore_flag(&self, reference: &ObjectReference, flag: Option<&str>) {
        let mut state = self.lock();
        if let Some(object) = state
            .objects
            .get_mut(&(reference.container().to_string(), reference.key().to_string()))
        {
            object.head.restore = flag.map(String::from);
        }
    }

    pub fn set_lifecycle_rules(&self, container: &str, rules: Vec<RuleDocument>) {
        let mut state = self.lock();
        state.containers.insert(container.to_string());
        state.lifecycle.insert(container.to_string(), rules);
    }

    /// Rules currently stored for a container
    pub fn lifecycle_rules(&self, container: &str) -> Vec<RuleDocument> {
        self.lock().lifecycle.get(container).cloned().unwrap_or_default()
    }

    pub fn contains(&self, reference: &ObjectReference) -> bool {
        self.lock()
            .objects
            .contains_key(&(reference.container().to_string(), reference.key().to_string()))
    }

    pub fn head_of(&self, reference: &ObjectReference) -> Option<HeadMetadata> {
        self.lock()
            .objects
            .get(&(reference.container().to_string(), reference.key().to_string()))
            .map(|o| o.head.clone())
    }

    /// Fail the next call of `operation` with `error`; queued failures are
    /// consumed in order
    pub fn fail_next(&self, operation: &str, error: TransportError) {
        self.lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Make batched deletes refuse one key
    pub fn reject_delete(&self, reference: &ObjectReference, code: &str, message: &str) {
        self.lock().rejected_deletes.insert(
            (reference.container().to_string(), reference.key().to_string()),
            KeyError {
                key: reference.key().to_string(),
                code: Some(code.to_string()),
                message: message.to_string(),
            },
        );
    }

    /// Every recorded call
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls of `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Restore requests accepted so far
    pub fn restore_requests(&self) -> Vec<(ObjectReference, u32, RestoreTier)> {
        self.lock().restore_requests.clone()
    }
}

#[async_trait]
impl ObjectTransport for MockTransport {
    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<HeadMetadata>, TransportError> {
        let mut state = self.lock();
        state.record("head_object", &[container, key])?;
        state.require_container(container)?;
        Ok(state
            .objects
            .get(&(container.to_string(), key.to_string()))
            .map(|o| o.head.clone()))
    }

    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        state.record("get_object", &[container, key])?;
        state.require_container(container)?;
        let object = state
            .objects
            .get(&(container.to_string(), key.to_string()))
            .ok_or_else(|| no_such_key(key))?;

        let archived = matches!(
            object.head.storage_class.as_deref(),
            Some("GLACIER" | "DEEP_ARCHIVE")
        );
        let restored = object
            .head
            .restore
            .as_deref()
            .is_some_and(|r| r.contains(r#"ongoing-request="false""#));
        if archived && !restored {
            return Err(TransportError::service(
                403,
                "InvalidObjectState",
                "The operation is not valid for the object's storage class",
            ));
        }
        Ok(object.body.clone())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.record("put_object", &[container, key])?;
        state.require_container(container)?;
        state.objects.insert(
            (container.to_string(), key.to_string()),
            StoredObject {
                body: body.to_vec(),
                head: HeadMetadata {
                    content_length: Some(body.len() as u64),
                    content_type: content_type.map(String::from),
                    last_modified: Some(Utc::now()),
                    ..HeadMetadata::default()
                },
            },
        );
        Ok(())
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.record("delete_object", &[container, key])?;
        state.require_container(container)?;
        state.objects.remove(&(container.to_string(), key.to_string()));
        Ok(())
    }

    async fn delete_objects(
        &self,
        container: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, TransportError> {
        let mut state = self.lock();
        let mut args = vec![container];
        args.extend(keys.iter().map(String::as_str));
        state.record("delete_objects", &args)?;
        state.require_container(container)?;

        let mut output = BatchDeleteOutput::default();
        for key in keys {
            let id = (container.to_string(), key.clone());
            if let Some(error) = state.rejected_deletes.get(&id) {
                output.errors.push(error.clone());
            } else {
                state.objects.remove(&id);
                output.deleted.push(key.clone());
            }
        }
        Ok(output)
    }

    async fn copy_object(
        &self,
        source: &ObjectReference,
        target: &ObjectReference,
        storage_class: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        let (source_uri, target_uri) = (source.format(), target.format());
        state.record(
            "copy_object",
            &[
                source_uri.as_str(),
                target_uri.as_str(),
                storage_class.unwrap_or(""),
            ],
        )?;
        state.require_container(source.container())?;
        state.require_container(target.container())?;

        let object = state
            .objects
            .get(&(source.container().to_string(), source.key().to_string()))
            .cloned()
            .ok_or_else(|| no_such_key(source.key()))?;
        let head = HeadMetadata {
            storage_class: storage_class.map(String::from),
            restore: None,
            ..object.head
        };
        state.objects.insert(
            (target.container().to_string(), target.key().to_string()),
            StoredObject {
                body: object.body,
                head,
            },
        );
        Ok(())
    }

    async fn presign_get(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.record("presign_get", &[container, key])?;
        Ok(format!(
            "https://{container}.mock.local/{key}?X-Amz-Expires={}",
            expires_in.as_secs()
        ))
    }

    async fn list_objects_page(
        &self,
        container: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, TransportError> {
        let mut state = self.lock();
        state.record(
            "list_objects_page",
            &[container, prefix, continuation_token.unwrap_or("")],
        )?;
        state.require_container(container)?;

        let continuation_token = match &self.stuck_token {
            Some(_) => None,
            None => continuation_token,
        };
        let start: usize = match continuation_token {
            Some(token) => token
                .parse()
                .map_err(|_| TransportError::service(400, "InvalidArgument", "bad token"))?,
            None => 0,
        };

        let matching: Vec<ListedObject> = state
            .objects
            .iter()
            .filter(|((c, k), _)| c == container && k.starts_with(prefix))
            .map(|((_, key), object)| ListedObject {
                key: key.clone(),
                size: object.body.len() as u64,
                storage_class: object.head.storage_class.clone(),
                e_tag: object.head.e_tag.clone(),
                last_modified: object.head.last_modified,
            })
            .collect();

        let end = (start + self.page_size).min(matching.len());
        let next_token = match &self.stuck_token {
            Some(token) => Some(token.clone()),
            None => (end < matching.len()).then(|| end.to_string()),
        };
        Ok(ListPage {
            objects: matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
            next_token,
        })
    }

    async fn get_lifecycle(&self, container: &str) -> Result<Vec<RuleDocument>, TransportError> {
        let mut state = self.lock();
        state.record("get_lifecycle", &[container])?;
        state.require_container(container)?;
        Ok(state.lifecycle.get(container).cloned().unwrap_or_default())
    }

    async fn put_lifecycle(
        &self,
        container: &str,
        rules: &[RuleDocument],
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.record("put_lifecycle", &[container])?;
        state.require_container(container)?;
        state.lifecycle.insert(container.to_string(), rules.to_vec());
        Ok(())
    }

    async fn restore_object(
        &self,
        container: &str,
        key: &str,
        days: u32,
        tier: RestoreTier,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        let days_arg = days.to_string();
        state.record("restore_object", &[container, key, days_arg.as_str(), tier.as_str()])?;
        state.require_container(container)?;

        let object = state
            .objects
            .get_mut(&(container.to_string(), key.to_string()))
            .ok_or_else(|| no_such_key(key))?;
        if !matches!(
            object.head.storage_class.as_deref(),
            Some("GLACIER" | "DEEP_ARCHIVE")
        ) {
            return Err(TransportError::service(
                403,
                "InvalidObjectState",
                "Restore is not allowed for the object's current storage class",
            ));
        }
        if object.head.restore.as_deref() == Some(r#"ongoing-request="true""#) {
            return Err(TransportError::service(
                409,
                "RestoreAlreadyInProgress",
                "Object restore is already in progress",
            ));
        }
        object.head.restore = Some(r#"ongoing-request="true""#.to_string());

        let reference = ObjectReference::s3(container, key)
            .map_err(|e| TransportError::malformed(e.to_string()))?;
        state.restore_requests.push((reference, days, tier));
        Ok(())
    }
}

#[derive(Default)]
struct MockArchiveState {
    read_sets: HashMap<String, String>,
    calls: Vec<MockCall>,
    failures: HashMap<String, VecDeque<TransportError>>,
    jobs: Vec<(String, Vec<String>)>,
    jobs_by_token: HashMap<String, String>,
}

/// In-memory [`ArchiveJobApi`]
#[derive(Clone, Default)]
pub struct MockArchive {
    state: Arc<Mutex<MockArchiveState>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockArchiveState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn with_read_set(self, id: &str, status: &str) -> Self {
        self.set_read_set(id, status);
        self
    }

    pub fn set_read_set(&self, id: &str, status: &str) {
        self.lock().read_sets.insert(id.to_string(), status.to_string());
    }

    pub fn fail_next(&self, operation: &str, error: TransportError) {
        self.lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Activation jobs started: (job id, read set ids)
    pub fn jobs(&self) -> Vec<(String, Vec<String>)> {
        self.lock().jobs.clone()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }
}

impl MockArchiveState {
    fn record(&mut self, operation: &str, args: Vec<String>) -> Result<(), TransportError> {
        self.calls.push(MockCall::new(operation, args));
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ArchiveJobApi for MockArchive {
    async fn get_read_set_status(
        &self,
        sequence_store_id: &str,
        read_set_id: &str,
    ) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.record(
            "get_read_set_metadata",
            vec![sequence_store_id.to_string(), read_set_id.to_string()],
        )?;
        state.read_sets.get(read_set_id).cloned().ok_or_else(|| {
            TransportError::service(
                404,
                "ResourceNotFoundException",
                format!("Read set {read_set_id} not found"),
            )
        })
    }

    async fn start_read_set_activation(
        &self,
        sequence_store_id: &str,
        read_set_ids: &[String],
        client_token: &str,
    ) -> Result<String, TransportError> {
        let mut state = self.lock();
        let mut args = vec![sequence_store_id.to_string(), client_token.to_string()];
        args.extend(read_set_ids.iter().cloned());
        state.record("start_read_set_activation_job", args)?;

        if let Some(job_id) = state.jobs_by_token.get(client_token) {
            return Ok(job_id.clone());
        }

        for id in read_set_ids {
            match state.read_sets.get(id).map(String::as_str) {
                Some(READ_SET_ARCHIVED) => {}
                Some(_) => {
                    return Err(TransportError::service(
                        400,
                        "ValidationException",
                        format!("Read set {id} is not archived"),
                    ));
                }
                None => {
                    return Err(TransportError::service(
                        404,
                        "ResourceNotFoundException",
                        format!("Read set {id} not found"),
                    ));
                }
            }
        }
        for id in read_set_ids {
            state.read_sets.insert(id.clone(), READ_SET_ACTIVATING.to_string());
        }

        let job_id = format!("job-{}", state.jobs.len() + 1);
        state.jobs.push((job_id.clone(), read_set_ids.to_vec()));
        state
            .jobs_by_token
            .insert(client_token.to_string(), job_id.clone());
        Ok(job_id)
    }
}
