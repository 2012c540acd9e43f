//! Tests for storage configuration
//!
//! Uses temp-env crate for safe environment variable manipulation in Rust 2024 edition.

use super::{ArchiveConfig, Credentials, DriverKind, StorageConfig};
use crate::error::ConfigError;

const ALL_VARS: [&str; 15] = [
    "STORAGE_DRIVER",
    "STORAGE_BUCKET",
    "STORAGE_REGION",
    "STORAGE_ENDPOINT_URL",
    "STORAGE_ACCESS_KEY_ID",
    "STORAGE_SECRET_ACCESS_KEY",
    "STORAGE_SESSION_TOKEN",
    "STORAGE_DISABLE_STS",
    "STORAGE_USE_PATH_STYLE",
    "STORAGE_RESTORE_PERIOD_DAYS",
    "STORAGE_MAX_RETRIES",
    "STORAGE_RETRY_MAX_BACKOFF",
    "STORAGE_PRESIGN_EXPIRY_SECS",
    "ARCHIVE_SEQUENCE_STORE_ID",
    "ARCHIVE_REGION",
];

/// Run `f` with only the given variables set
fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
    let mut all: Vec<(&str, Option<&str>)> = ALL_VARS.iter().map(|v| (*v, None)).collect();
    for (name, value) in vars {
        if let Some(entry) = all.iter_mut().find(|(n, _)| n == name) {
            entry.1 = Some(*value);
        }
    }
    temp_env::with_vars(all, f);
}

fn valid_config() -> StorageConfig {
    StorageConfig {
        bucket: "basepair-data".to_string(),
        ..StorageConfig::default()
    }
}

#[test]
fn test_default_config() {
    let config = StorageConfig::default();
    assert_eq!(config.driver, DriverKind::Primary);
    assert!(config.bucket.is_empty());
    assert_eq!(config.region, "us-east-1");
    assert!(config.endpoint_url.is_none());
    assert!(config.credentials.is_none());
    assert!(!config.disable_sts);
    assert_eq!(config.restore_period_days, None);
    assert_eq!(config.default_restore_days(), 7);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_max_backoff_secs, 30);
    assert_eq!(config.presign_expiry_secs, 28_800);
}

#[test]
fn test_from_env_missing_bucket() {
    with_env(&[], || {
        assert_eq!(
            StorageConfig::from_env().unwrap_err(),
            ConfigError::MissingEnvVar("STORAGE_BUCKET".to_string())
        );
    });
}

#[test]
fn test_from_env_minimal_config() {
    with_env(&[("STORAGE_BUCKET", "basepair-data")], || {
        let config = StorageConfig::from_env().expect("Should parse minimal config");
        assert_eq!(config.driver, DriverKind::Primary);
        assert_eq!(config.bucket, "basepair-data");
        assert_eq!(config.region, "us-east-1");
        assert!(config.credentials.is_none());
        assert!(config.archive.is_none());
        assert_eq!(config.service_url(), "https://s3.us-east-1.amazonaws.com");
    });
}

#[test]
fn test_from_env_full_reduced_config() {
    with_env(
        &[
            ("STORAGE_DRIVER", "minio"),
            ("STORAGE_BUCKET", "local-bucket"),
            ("STORAGE_REGION", "eu-west-1"),
            ("STORAGE_ENDPOINT_URL", "http://localhost:9000"),
            ("STORAGE_ACCESS_KEY_ID", "minioadmin"),
            ("STORAGE_SECRET_ACCESS_KEY", "minioadmin123"),
            ("STORAGE_DISABLE_STS", "yes"),
            ("STORAGE_RESTORE_PERIOD_DAYS", "3"),
            ("STORAGE_MAX_RETRIES", "5"),
            ("STORAGE_RETRY_MAX_BACKOFF", "60"),
            ("STORAGE_PRESIGN_EXPIRY_SECS", "600"),
        ],
        || {
            let config = StorageConfig::from_env().expect("Should parse full config");
            assert_eq!(config.driver, DriverKind::Reduced);
            assert_eq!(config.region, "eu-west-1");
            assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
            assert_eq!(
                config.credentials,
                Some(Credentials {
                    access_key_id: "minioadmin".to_string(),
                    secret_access_key: "minioadmin123".to_string(),
                    session_token: None,
                })
            );
            assert!(config.disable_sts);
            assert!(config.effective_path_style());
            assert_eq!(config.restore_period_days, Some(3));
            assert_eq!(config.max_retries, 5);
            assert_eq!(config.retry_max_backoff_secs, 60);
            assert_eq!(config.presign_expiry_secs, 600);
            assert_eq!(config.service_url(), "http://localhost:9000");
        },
    );
}

#[test]
fn test_from_env_archival_config() {
    with_env(
        &[
            ("STORAGE_DRIVER", "aws_hos"),
            ("STORAGE_BUCKET", "basepair-data"),
            ("STORAGE_REGION", "us-west-2"),
            ("ARCHIVE_SEQUENCE_STORE_ID", "1234567890"),
        ],
        || {
            let config = StorageConfig::from_env().expect("Should parse archival config");
            assert_eq!(config.driver, DriverKind::Archival);
            assert_eq!(
                config.archive,
                Some(ArchiveConfig {
                    sequence_store_id: "1234567890".to_string(),
                    region: "us-west-2".to_string(),
                })
            );
        },
    );
}

#[test]
fn test_from_env_archival_requires_store() {
    with_env(
        &[("STORAGE_DRIVER", "aws_hos"), ("STORAGE_BUCKET", "basepair-data")],
        || {
            assert!(matches!(
                StorageConfig::from_env(),
                Err(ConfigError::ValidationFailed(_))
            ));
        },
    );
}

#[test]
fn test_from_env_unknown_driver() {
    with_env(
        &[("STORAGE_DRIVER", "ftp"), ("STORAGE_BUCKET", "basepair-data")],
        || {
            assert!(matches!(
                StorageConfig::from_env(),
                Err(ConfigError::InvalidValue { .. })
            ));
        },
    );
}

#[test]
fn test_from_env_partial_credentials() {
    with_env(
        &[
            ("STORAGE_BUCKET", "basepair-data"),
            ("STORAGE_ACCESS_KEY_ID", "AKIA"),
        ],
        || {
            assert!(matches!(
                StorageConfig::from_env(),
                Err(ConfigError::ValidationFailed(_))
            ));
        },
    );
}

#[test]
fn test_from_env_invalid_bool() {
    with_env(
        &[
            ("STORAGE_BUCKET", "basepair-data"),
            ("STORAGE_DISABLE_STS", "maybe"),
        ],
        || {
            let err = StorageConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref variable, .. } if variable == "STORAGE_DISABLE_STS"));
        },
    );
}

#[test]
fn test_from_env_invalid_max_retries() {
    with_env(
        &[
            ("STORAGE_BUCKET", "basepair-data"),
            ("STORAGE_MAX_RETRIES", "lots"),
        ],
        || {
            assert!(matches!(
                StorageConfig::from_env(),
                Err(ConfigError::InvalidValue { .. })
            ));
        },
    );
}

#[test]
fn test_validate_valid_config() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_validate_bucket_length() {
    let mut config = valid_config();
    config.bucket = "ab".to_string();
    assert!(config.validate().is_err());
    config.bucket = "a".repeat(64);
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_bucket_with_slash() {
    let mut config = valid_config();
    config.bucket = "bucket/sub".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_invalid_endpoint_no_scheme() {
    let mut config = valid_config();
    config.endpoint_url = Some("localhost:9000".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_reduced_requires_endpoint() {
    let mut config = valid_config();
    config.driver = DriverKind::Reduced;
    assert!(config.validate().is_err());
    config.endpoint_url = Some("http://localhost:9000".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_limits() {
    let mut config = valid_config();
    config.max_retries = 11;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.retry_max_backoff_secs = 301;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.presign_expiry_secs = 0;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.restore_period_days = Some(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_credentials_debug_redacts_secret() {
    let credentials = Credentials {
        access_key_id: "AKIAEXAMPLE".to_string(),
        secret_access_key: "super-secret".to_string(),
        session_token: Some("token".to_string()),
    };
    let debug = format!("{credentials:?}");
    assert!(debug.contains("AKIAEXAMPLE"));
    assert!(!debug.contains("super-secret"));
    assert!(!debug.contains("token\""));
}

#[test]
fn test_driver_kind_parse_and_display() {
    assert_eq!("aws_s3".parse::<DriverKind>().unwrap(), DriverKind::Primary);
    assert_eq!("MINIO".parse::<DriverKind>().unwrap(), DriverKind::Reduced);
    assert_eq!("archival".parse::<DriverKind>().unwrap(), DriverKind::Archival);
    assert_eq!(DriverKind::Archival.to_string(), "aws_hos");
}
