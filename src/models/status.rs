//! Storage tiers and restore states

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PermanentFailure;

/// Tier a backend reports for an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    InfrequentAccess,
    Glacier,
    DeepArchive,
    /// Archival read set at rest
    Archived,
    /// Archival read set readable
    Active,
    /// Archival read set being activated
    Activating,
    Unknown,
}

impl StorageClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::InfrequentAccess => "INFREQUENT_ACCESS",
            Self::Glacier => "GLACIER",
            Self::DeepArchive => "DEEP_ARCHIVE",
            Self::Archived => "ARCHIVED",
            Self::Active => "ACTIVE",
            Self::Activating => "ACTIVATING",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Map an S3 `x-amz-storage-class` value.
    ///
    /// Returns `None` for names this crate does not recognise.
    #[must_use]
    pub fn from_provider(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "STANDARD" | "REDUCED_REDUNDANCY" | "EXPRESS_ONEZONE" => Some(Self::Standard),
            "STANDARD_IA" | "ONEZONE_IA" | "INTELLIGENT_TIERING" | "GLACIER_IR"
            | "INFREQUENT_ACCESS" => Some(Self::InfrequentAccess),
            "GLACIER" => Some(Self::Glacier),
            "DEEP_ARCHIVE" => Some(Self::DeepArchive),
            _ => None,
        }
    }

    /// Map an archival read set status
    #[must_use]
    pub fn from_archive_status(value: &str) -> Self {
        match value {
            "ARCHIVED" => Self::Archived,
            "ACTIVE" => Self::Active,
            "ACTIVATING" => Self::Activating,
            _ => Self::Unknown,
        }
    }

    /// Provider name used when writing transitions and copies
    #[must_use]
    pub fn provider_name(&self) -> Option<&'static str> {
        match self {
            Self::Standard => Some("STANDARD"),
            Self::InfrequentAccess => Some("STANDARD_IA"),
            Self::Glacier => Some("GLACIER"),
            Self::DeepArchive => Some("DEEP_ARCHIVE"),
            Self::Archived | Self::Active | Self::Activating | Self::Unknown => None,
        }
    }

    /// Whether bytes can only be read after a restore job
    #[must_use]
    pub fn requires_restore(&self) -> bool {
        matches!(self, Self::Glacier | Self::DeepArchive | Self::Archived)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical restore state exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    FileNotFound,
    RestoreNotRequired,
    RestoreNotStarted,
    RestoreInProgress,
    RestoreComplete,
    RestoreError,
}

/// Precedence used when several objects disagree, most pessimistic first.
/// `RestoreComplete` only wins when every object agrees.
const AGGREGATE_PRECEDENCE: [RestoreStatus; 5] = [
    RestoreStatus::FileNotFound,
    RestoreStatus::RestoreInProgress,
    RestoreStatus::RestoreError,
    RestoreStatus::RestoreNotStarted,
    RestoreStatus::RestoreNotRequired,
];

impl RestoreStatus {
    pub const ALL: [RestoreStatus; 6] = [
        Self::FileNotFound,
        Self::RestoreNotRequired,
        Self::RestoreNotStarted,
        Self::RestoreInProgress,
        Self::RestoreComplete,
        Self::RestoreError,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::RestoreNotRequired => "restore_not_required",
            Self::RestoreNotStarted => "restore_not_started",
            Self::RestoreInProgress => "restore_in_progress",
            Self::RestoreComplete => "restore_complete",
            Self::RestoreError => "restore_error",
        }
    }

    /// Whether the object bytes can be read right now
    #[must_use]
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::RestoreNotRequired | Self::RestoreComplete)
    }

    /// Reduce many per-object states to one.
    ///
    /// All `restore_complete` yields `restore_complete`; otherwise the first
    /// state present in `file_not_found > restore_in_progress > restore_error >
    /// restore_not_started > restore_not_required` wins. An empty set needs no
    /// restore.
    #[must_use]
    pub fn aggregate(statuses: &[RestoreStatus]) -> RestoreStatus {
        if statuses.is_empty() {
            return Self::RestoreNotRequired;
        }
        if statuses.iter().all(|s| *s == Self::RestoreComplete) {
            return Self::RestoreComplete;
        }
        AGGREGATE_PRECEDENCE
            .into_iter()
            .find(|candidate| statuses.contains(candidate))
            .unwrap_or(Self::RestoreError)
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one object as computed from fresh backend metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStatus {
    pub status: RestoreStatus,
    pub storage_class: StorageClass,
    /// When the temporary restored copy expires
    pub restore_expiry: Option<DateTime<Utc>>,
    /// Why the status is `restore_error`, when a remote refusal caused it
    pub cause: Option<PermanentFailure>,
}

impl ObjectStatus {
    #[must_use]
    pub fn new(status: RestoreStatus, storage_class: StorageClass) -> Self {
        Self {
            status,
            storage_class,
            restore_expiry: None,
            cause: None,
        }
    }

    /// `restore_error` caused by a permanent backend failure
    #[must_use]
    pub fn failed(storage_class: StorageClass, cause: PermanentFailure) -> Self {
        Self {
            status: RestoreStatus::RestoreError,
            storage_class,
            restore_expiry: None,
            cause: Some(cause),
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Option<DateTime<Utc>>) -> Self {
        self.restore_expiry = expiry;
        self
    }
}
