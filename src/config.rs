//! Storage configuration
//!
//! # Environment Variables
//!
//! - `STORAGE_DRIVER`: `aws_s3` (default), `minio` or `aws_hos`
//! - `STORAGE_BUCKET`: default container (required)
//! - `STORAGE_REGION`: region (optional, defaults to "us-east-1")
//! - `STORAGE_ENDPOINT_URL`: custom endpoint for S3-compatible services
//! - `STORAGE_ACCESS_KEY_ID` / `STORAGE_SECRET_ACCESS_KEY`: static credentials
//! - `STORAGE_SESSION_TOKEN`: session token for temporary static credentials
//! - `STORAGE_DISABLE_STS`: skip the credential validation handshake
//! - `STORAGE_USE_PATH_STYLE`: path-style addressing
//! - `STORAGE_RESTORE_PERIOD_DAYS`: default restore period; enables archival context
//! - `STORAGE_MAX_RETRIES`: transient retry budget (defaults to 3)
//! - `STORAGE_RETRY_MAX_BACKOFF`: backoff cap in seconds (defaults to 30)
//! - `STORAGE_PRESIGN_EXPIRY_SECS`: presigned URL lifetime (defaults to 8 hours)
//! - `ARCHIVE_SEQUENCE_STORE_ID`: archival sequence store (required for `aws_hos`)
//! - `ARCHIVE_REGION`: archival service region (defaults to `STORAGE_REGION`)

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default maximum retry attempts for transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default maximum backoff in seconds
pub const DEFAULT_RETRY_MAX_BACKOFF_SECS: u64 = 30;

/// Default region when not specified
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default restore period in days
pub const DEFAULT_RESTORE_PERIOD_DAYS: u32 = 7;

/// Default lifetime of presigned URLs (8 hours)
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 28_800;

/// Longest lifetime a SigV4 presigned URL may have (7 days)
const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;

/// Driver variant selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Full feature set
    Primary,
    /// S3-compatible service without lifecycle or restore support
    Reduced,
    /// Primary behaviour plus archival read-set delegation
    Archival,
}

impl DriverKind {
    /// Name reported in storage contexts
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "aws_s3",
            Self::Reduced => "minio",
            Self::Archival => "aws_hos",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws_s3" | "primary" | "s3" => Ok(Self::Primary),
            "minio" | "reduced" => Ok(Self::Reduced),
            "aws_hos" | "archival" | "omics" => Ok(Self::Archival),
            other => Err(ConfigError::InvalidValue {
                variable: "STORAGE_DRIVER".to_string(),
                message: format!("unknown driver '{other}'"),
            }),
        }
    }
}

/// Static credentials handed to the SDK
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Settings of the archival job service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub sequence_store_id: String,
    pub region: String,
}

/// Storage configuration, immutable once a facade is built from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub driver: DriverKind,
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    /// `None` uses the default credential chain
    pub credentials: Option<Credentials>,
    pub disable_sts: bool,
    pub use_path_style: bool,
    /// Explicitly configured restore period; `None` means archival is not
    /// advertised in the storage context
    pub restore_period_days: Option<u32>,
    pub max_retries: u32,
    pub retry_max_backoff_secs: u64,
    pub presign_expiry_secs: u64,
    pub archive: Option<ArchiveConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Primary,
            bucket: String::new(),
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            credentials: None,
            disable_sts: false,
            use_path_style: false,
            restore_period_days: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_max_backoff_secs: DEFAULT_RETRY_MAX_BACKOFF_SECS,
            presign_expiry_secs: DEFAULT_PRESIGN_EXPIRY_SECS,
            archive: None,
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if required variables are missing.
    /// Returns `ConfigError::InvalidValue` if values cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let driver = match optional_env("STORAGE_DRIVER") {
            Some(value) => value.parse()?,
            None => DriverKind::Primary,
        };

        let bucket = env::var("STORAGE_BUCKET")
            .map_err(|_| ConfigError::MissingEnvVar("STORAGE_BUCKET".to_string()))?;

        let region = optional_env("STORAGE_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint_url = optional_env("STORAGE_ENDPOINT_URL");

        let credentials = match (
            optional_env("STORAGE_ACCESS_KEY_ID"),
            optional_env("STORAGE_SECRET_ACCESS_KEY"),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id,
                secret_access_key,
                session_token: optional_env("STORAGE_SESSION_TOKEN"),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::ValidationFailed(
                    "STORAGE_SECRET_ACCESS_KEY is required when STORAGE_ACCESS_KEY_ID is provided"
                        .to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::ValidationFailed(
                    "STORAGE_ACCESS_KEY_ID is required when STORAGE_SECRET_ACCESS_KEY is provided"
                        .to_string(),
                ));
            }
        };

        let disable_sts = parse_bool_env("STORAGE_DISABLE_STS")?;
        let use_path_style = parse_bool_env("STORAGE_USE_PATH_STYLE")?;
        let restore_period_days = match optional_env("STORAGE_RESTORE_PERIOD_DAYS") {
            Some(_) => Some(parse_number_env(
                "STORAGE_RESTORE_PERIOD_DAYS",
                DEFAULT_RESTORE_PERIOD_DAYS,
            )?),
            None => None,
        };
        let max_retries = parse_number_env("STORAGE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let retry_max_backoff_secs =
            parse_number_env("STORAGE_RETRY_MAX_BACKOFF", DEFAULT_RETRY_MAX_BACKOFF_SECS)?;
        let presign_expiry_secs =
            parse_number_env("STORAGE_PRESIGN_EXPIRY_SECS", DEFAULT_PRESIGN_EXPIRY_SECS)?;

        let archive = optional_env("ARCHIVE_SEQUENCE_STORE_ID").map(|sequence_store_id| {
            ArchiveConfig {
                sequence_store_id,
                region: optional_env("ARCHIVE_REGION").unwrap_or_else(|| region.clone()),
            }
        });

        let config = Self {
            driver,
            bucket,
            region,
            endpoint_url,
            credentials,
            disable_sts,
            use_path_style,
            restore_period_days,
            max_retries,
            retry_max_backoff_secs,
            presign_expiry_secs,
            archive,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration completeness and correctness
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_BUCKET cannot be empty".to_string(),
            ));
        }

        // DNS naming rules
        if self.bucket.len() < 3 || self.bucket.len() > 63 {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_BUCKET must be between 3 and 63 characters long".to_string(),
            ));
        }

        if self.bucket.contains('/') {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_BUCKET cannot contain '/'".to_string(),
            ));
        }

        if self.region.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_REGION cannot be empty".to_string(),
            ));
        }

        if let Some(ref endpoint) = self.endpoint_url {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::ValidationFailed(
                    "STORAGE_ENDPOINT_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.driver == DriverKind::Reduced && self.endpoint_url.is_none() {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_ENDPOINT_URL is required for the minio driver".to_string(),
            ));
        }

        if self.driver == DriverKind::Archival {
            match &self.archive {
                Some(archive) if !archive.sequence_store_id.is_empty() => {}
                _ => {
                    return Err(ConfigError::ValidationFailed(
                        "ARCHIVE_SEQUENCE_STORE_ID is required for the aws_hos driver".to_string(),
                    ));
                }
            }
        }

        if let Some(credentials) = &self.credentials {
            if credentials.access_key_id.is_empty() || credentials.secret_access_key.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "static credentials must include both key id and secret".to_string(),
                ));
            }
        }

        if self.max_retries > 10 {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_MAX_RETRIES should not exceed 10".to_string(),
            ));
        }

        if self.retry_max_backoff_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_RETRY_MAX_BACKOFF should not exceed 300 seconds".to_string(),
            ));
        }

        if self.presign_expiry_secs == 0 || self.presign_expiry_secs > MAX_PRESIGN_EXPIRY_SECS {
            return Err(ConfigError::ValidationFailed(format!(
                "STORAGE_PRESIGN_EXPIRY_SECS must be between 1 and {MAX_PRESIGN_EXPIRY_SECS}"
            )));
        }

        if self.restore_period_days == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "STORAGE_RESTORE_PERIOD_DAYS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Restore period used when a caller does not pass one
    #[must_use]
    pub fn default_restore_days(&self) -> u32 {
        self.restore_period_days
            .unwrap_or(DEFAULT_RESTORE_PERIOD_DAYS)
    }

    /// Path-style addressing is always used for S3-compatible endpoints
    #[must_use]
    pub fn effective_path_style(&self) -> bool {
        self.use_path_style || self.driver == DriverKind::Reduced
    }

    /// Public endpoint reported in storage contexts
    #[must_use]
    pub fn service_url(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read an environment variable, treating empty values as unset
fn optional_env(var_name: &str) -> Option<String> {
    env::var(var_name).ok().filter(|s| !s.is_empty())
}

/// Parse a boolean environment variable
///
/// Accepts: "true", "1", "yes" (case-insensitive) for true
/// Accepts: "false", "0", "no" (case-insensitive) or unset for false
fn parse_bool_env(var_name: &str) -> Result<bool, ConfigError> {
    match env::var(var_name) {
        Ok(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                variable: var_name.to_string(),
                message: format!(
                    "expected 'true', 'false', '1', '0', 'yes', or 'no', got '{value}'"
                ),
            }),
        },
        Err(_) => Ok(false),
    }
}

/// Parse a numeric environment variable, falling back to `default` when unset
fn parse_number_env<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match optional_env(var_name) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            variable: var_name.to_string(),
            message: format!("expected a non-negative integer, got '{value}'"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
