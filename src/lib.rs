//! tierstore - storage tiering and cold-archive restore orchestration
//!
//! Callers address objects by `scheme://container/key`, learn their storage
//! tier, start and track restores out of cold storage, manage lifecycle
//! transition rules, and run bulk and aggregate operations. The backend is
//! one of three interchangeable drivers (primary S3, a reduced S3-compatible
//! service, or S3 plus an archival read set store) selected from
//! configuration.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod testing;

pub use config::{ArchiveConfig, Credentials, DriverKind, StorageConfig};
pub use error::{ConfigError, FailureKind, Outcome, PermanentFailure, StorageError};

// Re-export specific items to avoid ambiguous glob re-exports
pub use models::{
    BulkOperationResult, BulkOutcome, HeadMetadata, LifecycleRule, ListedObject, ObjectReference,
    ObjectStatus, RestoreStatus, RuleDocument, StorageClass, StorageContext, UploadReceipt,
};

pub use services::{
    is_archival_reference, ArchivalDriver, BackendClient, Capabilities, PrimaryDriver,
    ReducedDriver, RestoreOptions, RestoreTier, RetryPolicy, Storage, StorageBackend,
};
