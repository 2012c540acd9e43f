//! Object locator
//!
//! Parses and formats the `scheme://container/key` identifiers callers use to
//! address stored objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Scheme used for objects in S3-compatible backends
pub const S3_SCHEME: &str = "s3";

const SCHEME_SEPARATOR: &str = "://";

/// Immutable identifier of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectReference {
    scheme: String,
    container: String,
    key: String,
}

impl ObjectReference {
    /// Build a reference from its parts, validating each one
    pub fn new(
        scheme: impl Into<String>,
        container: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let reference = Self {
            scheme: scheme.into(),
            container: container.into(),
            key: key.into(),
        };
        let uri = reference.format();
        validate_scheme(&uri, &reference.scheme)?;
        validate_container(&uri, &reference.container)?;
        if reference.key.is_empty() {
            return Err(StorageError::invalid_uri(&uri, "key is empty"));
        }
        Ok(reference)
    }

    /// Build an `s3://` reference
    pub fn s3(container: impl Into<String>, key: impl Into<String>) -> Result<Self, StorageError> {
        Self::new(S3_SCHEME, container, key)
    }

    /// Parse `scheme://container/key`
    ///
    /// The key is everything after the first `/` following the container and
    /// is kept verbatim, so keys that repeat the container name survive a
    /// round trip.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let (scheme, rest) = uri
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| StorageError::invalid_uri(uri, "missing '://' separator"))?;
        validate_scheme(uri, scheme)?;

        let (container, key) = rest
            .split_once('/')
            .ok_or_else(|| StorageError::invalid_uri(uri, "missing key after container"))?;
        validate_container(uri, container)?;

        if key.is_empty() {
            return Err(StorageError::invalid_uri(uri, "key is empty"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            container: container.to_string(),
            key: key.to_string(),
        })
    }

    /// Inverse of [`ObjectReference::parse`]
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "{}{}{}/{}",
            self.scheme, SCHEME_SEPARATOR, self.container, self.key
        )
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Same scheme and container, different key
    pub fn with_key(&self, key: impl Into<String>) -> Result<Self, StorageError> {
        Self::new(self.scheme.clone(), self.container.clone(), key)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for ObjectReference {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_scheme(uri: &str, scheme: &str) -> Result<(), StorageError> {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return Err(StorageError::invalid_uri(uri, "scheme must start with a letter")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return Err(StorageError::invalid_uri(uri, "scheme contains invalid characters"));
    }
    Ok(())
}

fn validate_container(uri: &str, container: &str) -> Result<(), StorageError> {
    if container.is_empty() {
        return Err(StorageError::invalid_uri(uri, "container is empty"));
    }
    if container
        .chars()
        .any(|c| matches!(c, '/' | ':' | '?' | '#') || c.is_whitespace())
    {
        return Err(StorageError::invalid_uri(
            uri,
            "container contains a reserved character",
        ));
    }
    Ok(())
}
