//! Object metadata returned by backends

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw head-object response, before status resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadMetadata {
    /// Provider storage class name; absent means the default tier
    pub storage_class: Option<String>,
    /// Provider restore flag, e.g. `ongoing-request="true"`
    pub restore: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
}

impl HeadMetadata {
    /// Metadata for an object in the given storage class
    pub fn with_class(storage_class: impl Into<String>) -> Self {
        Self {
            storage_class: Some(storage_class.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn restore_flag(mut self, restore: impl Into<String>) -> Self {
        self.restore = Some(restore.into());
        self
    }
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub storage_class: Option<String>,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Page of a listing, as returned by one backend request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub next_token: Option<String>,
}

/// Per-key result of one batched delete request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutput {
    pub deleted: Vec<String>,
    pub errors: Vec<KeyError>,
}

/// Key-level refusal inside a batched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyError {
    pub key: String,
    pub code: Option<String>,
    pub message: String,
}

/// Location of a freshly uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub uri: String,
    /// Presigned read URL
    pub url: String,
    /// False when the object already existed and the upload was skipped
    pub written: bool,
}

/// Settings a driver exposes to downstream job configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageContext {
    pub storage_driver: String,
    pub storage_bucket: String,
    pub storage_region: String,
    pub storage_url: String,
    pub storage_archival_enabled: bool,
    pub storage_sse_enabled: bool,
}
