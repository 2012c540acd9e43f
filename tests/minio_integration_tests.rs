//! MinIO Integration Tests
//!
//! These tests require a running MinIO instance.
//! Run with: `cargo test --test minio_integration_tests -- --ignored`
//!
//! MinIO setup:
//! ```bash
//! docker run -d --name minio \
//!   -p 9000:9000 -p 9001:9001 \
//!   -e MINIO_ROOT_USER=minioadmin \
//!   -e MINIO_ROOT_PASSWORD=minioadmin \
//!   minio/minio server /data --console-address ":9001"
//! ```

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::Region;
use uuid::Uuid;

use tierstore::{
    BulkOutcome, Credentials, DriverKind, RestoreOptions, RestoreStatus, Storage, StorageConfig,
    StorageError,
};

const ENDPOINT: &str = "http://localhost:9000";

fn test_config() -> StorageConfig {
    StorageConfig {
        driver: DriverKind::Reduced,
        bucket: format!("tierstore-test-{}", Uuid::new_v4()),
        region: "us-east-1".to_string(),
        endpoint_url: Some(ENDPOINT.to_string()),
        credentials: Some(Credentials {
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            session_token: None,
        }),
        disable_sts: true,
        use_path_style: true,
        ..StorageConfig::default()
    }
}

fn admin_client(config: &StorageConfig) -> S3Client {
    let credentials = aws_credential_types::Credentials::new(
        "minioadmin",
        "minioadmin",
        None,
        None,
        "static",
    );
    let s3_config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(ENDPOINT)
        .force_path_style(true)
        .credentials_provider(credentials)
        .build();
    S3Client::from_conf(s3_config)
}

async fn create_test_bucket(config: &StorageConfig) -> Result<(), Box<dyn std::error::Error>> {
    admin_client(config)
        .create_bucket()
        .bucket(&config.bucket)
        .send()
        .await?;
    Ok(())
}

async fn cleanup_test_bucket(config: &StorageConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = admin_client(config);
    let listed = client.list_objects_v2().bucket(&config.bucket).send().await?;
    for object in listed.contents() {
        if let Some(key) = object.key() {
            client
                .delete_object()
                .bucket(&config.bucket)
                .key(key)
                .send()
                .await?;
        }
    }
    client.delete_bucket().bucket(&config.bucket).send().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "Requires MinIO"]
async fn test_minio_object_lifecycle() {
    let config = test_config();
    create_test_bucket(&config).await.expect("create bucket");
    let storage = Storage::connect(config.clone(), None)
        .await
        .expect("connect to MinIO");

    let receipt = storage
        .upload("samples/a.txt", b"hello", false)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert!(receipt.written);
    assert!(receipt.url.starts_with("http"));

    let status = storage.get_status(&receipt.uri).await.unwrap();
    assert_eq!(status.status, RestoreStatus::RestoreNotRequired);

    let body = storage.get_body(&receipt.uri).await.unwrap().completed();
    assert_eq!(body.as_deref(), Some(&b"hello"[..]));

    let missing = storage.uri_for("samples/missing.txt").unwrap();
    assert_eq!(
        storage
            .get_overall_status(&[receipt.uri.clone(), missing])
            .await
            .unwrap(),
        RestoreStatus::FileNotFound
    );

    let deleted = storage.bulk_delete(&[receipt.uri.clone()]).await.unwrap();
    assert_eq!(deleted.outcome, BulkOutcome::Completed);

    cleanup_test_bucket(&config).await.expect("cleanup bucket");
}

#[tokio::test]
#[ignore = "Requires MinIO"]
async fn test_minio_rejects_restore_locally() {
    let config = test_config();
    create_test_bucket(&config).await.expect("create bucket");
    let storage = Storage::connect(config.clone(), None)
        .await
        .expect("connect to MinIO");

    let uri = storage.uri_for("samples/a.txt").unwrap();
    let err = storage
        .restore(&uri, RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedOperation { .. }));

    cleanup_test_bucket(&config).await.expect("cleanup bucket");
}
