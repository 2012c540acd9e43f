//! Tests for archival read set routing

use std::sync::Arc;

use super::ArchivalDriver;
use crate::config::{ArchiveConfig, DriverKind, StorageConfig};
use crate::error::{FailureKind, Outcome, StorageError};
use crate::models::{ObjectReference, RestoreStatus, StorageClass};
use crate::services::archive::{ArchiveClient, READ_SET_ACTIVE};
use crate::services::backend_client::{BackendClient, RetryPolicy};
use crate::services::drivers::{PrimaryDriver, RestoreOptions, StorageBackend};
use crate::services::transport::TransportError;
use crate::testing::{MockArchive, MockTransport};

const BUCKET: &str = "basepair-data";
const ALIAS: &str = "1234567890-abcdef-s3alias";
const STORE: &str = "seq-store-1";

fn driver(transport: &MockTransport, archive: &MockArchive) -> ArchivalDriver {
    let config = StorageConfig {
        driver: DriverKind::Archival,
        bucket: BUCKET.to_string(),
        archive: Some(ArchiveConfig {
            sequence_store_id: STORE.to_string(),
            region: "us-east-1".to_string(),
        }),
        ..StorageConfig::default()
    };
    let client = BackendClient::new(Arc::new(transport.clone()), RetryPolicy::no_retry());
    let archive = ArchiveClient::new(Arc::new(archive.clone()), STORE, RetryPolicy::no_retry());
    ArchivalDriver::new(PrimaryDriver::new(client, Arc::new(config)), archive)
}

fn read_set(id: &str) -> ObjectReference {
    ObjectReference::s3(ALIAS, format!("{STORE}/readSet/{id}/source1.fastq.gz")).unwrap()
}

#[tokio::test]
async fn test_read_set_states_map_to_restore_status() {
    let transport = MockTransport::new();
    let archive = MockArchive::new()
        .with_read_set("rs-archived", "ARCHIVED")
        .with_read_set("rs-active", "ACTIVE")
        .with_read_set("rs-activating", "ACTIVATING")
        .with_read_set("rs-deleting", "DELETING");
    let driver = driver(&transport, &archive);

    let cases = [
        ("rs-archived", RestoreStatus::RestoreNotStarted, StorageClass::Archived),
        ("rs-active", RestoreStatus::RestoreComplete, StorageClass::Active),
        ("rs-activating", RestoreStatus::RestoreInProgress, StorageClass::Activating),
        ("rs-deleting", RestoreStatus::RestoreError, StorageClass::Unknown),
    ];
    for (id, status, class) in cases {
        let resolved = driver.get_status(&read_set(id)).await.unwrap();
        assert_eq!(resolved.status, status, "read set {id}");
        assert_eq!(resolved.storage_class, class, "read set {id}");
    }
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_missing_read_set_is_file_not_found() {
    let transport = MockTransport::new();
    let archive = MockArchive::new();

    let status = driver(&transport, &archive)
        .get_status(&read_set("rs-gone"))
        .await
        .unwrap();
    assert_eq!(status.status, RestoreStatus::FileNotFound);
}

#[tokio::test]
async fn test_archive_access_denied_is_error() {
    let transport = MockTransport::new();
    let archive = MockArchive::new();
    archive.fail_next(
        "get_read_set_metadata",
        TransportError::service(403, "AccessDeniedException", "no access"),
    );

    let status = driver(&transport, &archive)
        .get_status(&read_set("rs-1"))
        .await
        .unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreError);
    assert_eq!(status.cause.unwrap().kind, FailureKind::AccessDenied);
}

#[tokio::test]
async fn test_restore_activates_archived_read_set_once() {
    let transport = MockTransport::new();
    let archive = MockArchive::new().with_read_set("rs-1", "ARCHIVED");
    let driver = driver(&transport, &archive);

    let first = driver
        .restore(&read_set("rs-1"), RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(first.status, RestoreStatus::RestoreInProgress);
    assert_eq!(first.storage_class, StorageClass::Activating);
    assert_eq!(archive.jobs(), vec![("job-1".to_string(), vec!["rs-1".to_string()])]);

    let second = driver
        .restore(&read_set("rs-1"), RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(second.status, RestoreStatus::RestoreInProgress);
    assert_eq!(archive.call_count("start_read_set_activation_job"), 1);
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_restore_skips_active_read_set() {
    let transport = MockTransport::new();
    let archive = MockArchive::new().with_read_set("rs-1", "ACTIVE");

    let status = driver(&transport, &archive)
        .restore(&read_set("rs-1"), RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreComplete);
    assert_eq!(archive.call_count("start_read_set_activation_job"), 0);
}

#[tokio::test]
async fn test_refused_activation_is_error() {
    let transport = MockTransport::new();
    let archive = MockArchive::new().with_read_set("rs-1", "ARCHIVED");
    archive.fail_next(
        "start_read_set_activation_job",
        TransportError::service(400, "ValidationException", "bad store"),
    );

    let status = driver(&transport, &archive)
        .restore(&read_set("rs-1"), RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreError);
    assert_eq!(status.storage_class, StorageClass::Archived);
    assert_eq!(status.cause.unwrap().code.as_deref(), Some("ValidationException"));
}

#[tokio::test(start_paused = true)]
async fn test_activation_retry_reuses_client_token() {
    let archive = MockArchive::new().with_read_set("rs-1", "ARCHIVED");
    archive.fail_next(
        "start_read_set_activation_job",
        TransportError::connection("connection reset by peer"),
    );
    let policy = RetryPolicy {
        max_retries: 2,
        ..RetryPolicy::default()
    };
    let client = ArchiveClient::new(Arc::new(archive.clone()), STORE, policy);

    let job = client.activate("rs-1").await.unwrap();
    assert_eq!(job, Outcome::Completed("job-1".to_string()));

    let tokens: Vec<String> = archive
        .calls()
        .into_iter()
        .filter(|c| c.operation == "start_read_set_activation_job")
        .map(|c| c.args[1].clone())
        .collect();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0], tokens[1]);
    assert_eq!(archive.jobs().len(), 1);
}

#[tokio::test]
async fn test_separate_activations_use_fresh_tokens() {
    let archive = MockArchive::new()
        .with_read_set("rs-1", "ARCHIVED")
        .with_read_set("rs-2", "ARCHIVED");
    let client = ArchiveClient::new(Arc::new(archive.clone()), STORE, RetryPolicy::no_retry());

    client.activate("rs-1").await.unwrap();
    client.activate("rs-2").await.unwrap();

    let calls = archive.calls();
    assert_ne!(calls[0].args[1], calls[1].args[1]);
    assert_eq!(archive.jobs().len(), 2);
}

#[tokio::test]
async fn test_activation_throttle_propagates() {
    let transport = MockTransport::new();
    let archive = MockArchive::new().with_read_set("rs-1", "ARCHIVED");
    archive.fail_next(
        "start_read_set_activation_job",
        TransportError::service(429, "ThrottlingException", "Rate exceeded"),
    );

    let err = driver(&transport, &archive)
        .restore(&read_set("rs-1"), RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_throttled());
}

#[tokio::test]
async fn test_archival_key_without_read_set_is_invalid() {
    let transport = MockTransport::new();
    let archive = MockArchive::new();
    let bare = ObjectReference::s3(ALIAS, "file.fastq").unwrap();

    let err = driver(&transport, &archive).get_status(&bare).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidUri { .. }));
    assert_eq!(archive.call_count("get_read_set_metadata"), 0);
}

#[tokio::test]
async fn test_plain_references_use_object_storage() {
    let transport = MockTransport::new().with_container(BUCKET);
    let plain = ObjectReference::s3(BUCKET, "runs/cold.bam").unwrap();
    transport.insert_in_class(&plain, "GLACIER");
    let archive = MockArchive::new();
    let driver = driver(&transport, &archive);

    let status = driver.get_status(&plain).await.unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreNotStarted);

    let status = driver.restore(&plain, RestoreOptions::default()).await.unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreInProgress);
    assert_eq!(transport.call_count("restore_object"), 1);
    assert_eq!(archive.call_count("get_read_set_metadata"), 0);
}

#[tokio::test]
async fn test_restore_many_mixes_archive_and_object_storage() {
    let transport = MockTransport::new().with_container(BUCKET);
    let plain = ObjectReference::s3(BUCKET, "runs/cold.bam").unwrap();
    transport.insert_in_class(&plain, "DEEP_ARCHIVE");
    let archive = MockArchive::new()
        .with_read_set("rs-1", "ARCHIVED")
        .with_read_set("rs-2", "ACTIVATING");

    let refs = [plain.clone(), read_set("rs-1"), read_set("rs-2"), read_set("rs-3")];
    let result = driver(&transport, &archive)
        .restore_many(&refs, RestoreOptions::default())
        .await
        .unwrap();

    assert!(result.succeeded_for(&plain));
    assert!(result.succeeded_for(&read_set("rs-1")));
    assert_eq!(result.skipped, vec![read_set("rs-2")]);
    assert!(result.failed_for(&read_set("rs-3").format()));
    assert_eq!(result.per_container.len(), 2);
    assert_eq!(archive.jobs().len(), 1);
}

#[tokio::test]
async fn test_zero_day_restore_is_rejected_before_any_call() {
    let transport = MockTransport::new().with_container(BUCKET);
    let plain = ObjectReference::s3(BUCKET, "runs/cold.bam").unwrap();
    transport.insert_in_class(&plain, "GLACIER");
    let archive = MockArchive::new().with_read_set("rs-1", "ARCHIVED");
    let driver = driver(&transport, &archive);

    let err = driver
        .restore(&read_set("rs-1"), RestoreOptions::days(0))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));

    let err = driver
        .restore_many(&[read_set("rs-1"), plain], RestoreOptions::days(0))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));

    assert_eq!(archive.call_count("get_read_set_metadata"), 0);
    assert!(archive.jobs().is_empty());
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_activation_state_is_visible_afterwards() {
    let transport = MockTransport::new();
    let archive = MockArchive::new().with_read_set("rs-1", "ARCHIVED");
    let driver = driver(&transport, &archive);

    driver
        .restore(&read_set("rs-1"), RestoreOptions::default())
        .await
        .unwrap();
    archive.set_read_set("rs-1", READ_SET_ACTIVE);

    let status = driver.get_status(&read_set("rs-1")).await.unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreComplete);
}

#[test]
fn test_capabilities_and_context() {
    let driver = driver(&MockTransport::new(), &MockArchive::new());
    assert!(driver.capabilities().archival);
    assert!(driver.capabilities().restore);
    assert_eq!(driver.kind(), DriverKind::Archival);
    assert_eq!(driver.storage_context().storage_driver, "aws_hos");
}
