//! Lifecycle (tier transition) policies
//!
//! [`LifecycleRule`] is the single-transition rule callers build.
//! [`RuleDocument`] is the backend representation, which may hold rules
//! authored elsewhere (several transitions, expirations) and rules in the
//! legacy shape with a bare `prefix` instead of a `filter` wrapper.
//! Every field a backend rule can carry has a slot here, so rules read back
//! from a container are written back unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::StorageClass;
use crate::error::StorageError;

/// Prefix used when none is given
pub const DEFAULT_RULE_PREFIX: &str = "uploads/";

/// Days before transition when none is given
pub const DEFAULT_TRANSITION_DAYS: u32 = 30;

/// Status string for active rules
pub const RULE_ENABLED: &str = "Enabled";

/// Object tag used in rule filters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Which objects a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleFilter {
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// Bytes; only objects larger than this match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_size_greater_than: Option<i64>,
    /// Bytes; only objects smaller than this match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_size_less_than: Option<i64>,
}

/// Named transition policy attached to a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRule {
    pub id: String,
    pub filter: RuleFilter,
    pub target_class: StorageClass,
    pub transition_after_days: u32,
}

impl LifecycleRule {
    #[must_use]
    pub fn builder() -> LifecycleRuleBuilder {
        LifecycleRuleBuilder::default()
    }

    /// Backend representation of this rule
    #[must_use]
    pub fn to_document(&self) -> RuleDocument {
        RuleDocument {
            id: self.id.clone(),
            status: RULE_ENABLED.to_string(),
            prefix: None,
            filter: Some(self.filter.clone()),
            transitions: vec![TransitionDocument {
                days: Some(self.transition_after_days),
                date: None,
                storage_class: self
                    .target_class
                    .provider_name()
                    .unwrap_or(StorageClass::DeepArchive.as_str())
                    .to_string(),
            }],
            ..RuleDocument::default()
        }
    }
}

/// Builder for [`LifecycleRule`]
#[derive(Debug, Clone, Default)]
pub struct LifecycleRuleBuilder {
    id: Option<String>,
    prefix: Option<String>,
    tags: Vec<Tag>,
    target_class: Option<StorageClass>,
    transition_after_days: Option<u32>,
}

impl LifecycleRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    #[must_use]
    pub fn target_class(mut self, class: StorageClass) -> Self {
        self.target_class = Some(class);
        self
    }

    #[must_use]
    pub fn transition_after_days(mut self, days: u32) -> Self {
        self.transition_after_days = Some(days);
        self
    }

    /// Validate and build.
    ///
    /// Only tiers a backend can transition into are accepted as targets.
    pub fn build(self) -> Result<LifecycleRule, StorageError> {
        let prefix = self
            .prefix
            .unwrap_or_else(|| DEFAULT_RULE_PREFIX.to_string());
        let target_class = self.target_class.unwrap_or(StorageClass::DeepArchive);
        let days = self.transition_after_days.unwrap_or(DEFAULT_TRANSITION_DAYS);

        if target_class.provider_name().is_none() {
            return Err(StorageError::InvalidArgument(format!(
                "{target_class} is not a valid lifecycle transition target"
            )));
        }
        if let Some(tag) = self.tags.iter().find(|t| t.key.is_empty()) {
            return Err(StorageError::InvalidArgument(format!(
                "lifecycle tag with value '{}' has an empty key",
                tag.value
            )));
        }

        let id = match self.id {
            Some(id) if id.trim().is_empty() => {
                return Err(StorageError::InvalidArgument(
                    "lifecycle rule id cannot be empty".to_string(),
                ));
            }
            Some(id) => id,
            None => generated_rule_id(&prefix, &self.tags, target_class, days),
        };

        Ok(LifecycleRule {
            id,
            filter: RuleFilter {
                prefix,
                tags: self.tags,
                ..RuleFilter::default()
            },
            target_class,
            transition_after_days: days,
        })
    }
}

/// Deterministic id so that re-applying the same policy is idempotent
fn generated_rule_id(prefix: &str, tags: &[Tag], class: StorageClass, days: u32) -> String {
    let mut id = format!("move-{}", prefix.trim_end_matches('/'));
    for tag in tags {
        id.push_str(&format!("-tag-{}={}", tag.key, tag.value));
    }
    id.push_str(&format!("-to-{}-after-{}d", class.as_str(), days));
    id
}

/// One transition in a backend rule; either `days` or `date` is set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub storage_class: String,
}

/// Transition applied to versions once they stop being current
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoncurrentTransitionDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncurrent_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newer_noncurrent_versions: Option<u32>,
    pub storage_class: String,
}

/// Expiration of current versions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpirationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_object_delete_marker: Option<bool>,
}

/// Expiration of noncurrent versions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoncurrentExpirationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncurrent_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newer_noncurrent_versions: Option<u32>,
}

/// Backend representation of a lifecycle rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub id: String,
    #[serde(default = "enabled_status")]
    pub status: String,
    /// Legacy bare prefix; upgraded into `filter.prefix`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RuleFilter>,
    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<ExpirationDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub noncurrent_transitions: Vec<NoncurrentTransitionDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncurrent_expiration: Option<NoncurrentExpirationDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_incomplete_multipart_days: Option<u32>,
}

fn enabled_status() -> String {
    RULE_ENABLED.to_string()
}

impl Default for RuleDocument {
    fn default() -> Self {
        Self {
            id: String::new(),
            status: enabled_status(),
            prefix: None,
            filter: None,
            transitions: Vec::new(),
            expiration: None,
            noncurrent_transitions: Vec::new(),
            noncurrent_expiration: None,
            abort_incomplete_multipart_days: None,
        }
    }
}

impl RuleDocument {
    /// Move a legacy bare `prefix` into `filter.prefix`
    #[must_use]
    pub fn upgraded(mut self) -> Self {
        if let Some(prefix) = self.prefix.take() {
            match self.filter.as_mut() {
                Some(filter) if filter.prefix.is_empty() => filter.prefix = prefix,
                Some(_) => {}
                None => {
                    self.filter = Some(RuleFilter {
                        prefix,
                        ..RuleFilter::default()
                    })
                }
            }
        }
        self
    }

    /// Whether this document is still in the legacy shape
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.prefix.is_some()
    }
}

/// Combine an existing rule set with a new rule.
///
/// Existing rules are upgraded and kept in order, every other field as read;
/// a rule with the same id as `rule` is replaced in place, otherwise `rule`
/// is appended.
#[must_use]
pub fn merge_rules(existing: Vec<RuleDocument>, rule: &LifecycleRule) -> Vec<RuleDocument> {
    let new_document = rule.to_document();
    let mut replaced = false;
    let mut merged: Vec<RuleDocument> = existing
        .into_iter()
        .map(RuleDocument::upgraded)
        .map(|document| {
            if document.id == new_document.id {
                replaced = true;
                new_document.clone()
            } else {
                document
            }
        })
        .collect();
    if !replaced {
        merged.push(new_document);
    }
    merged
}
