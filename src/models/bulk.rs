//! Results of operations over many objects

use std::collections::BTreeMap;

use serde::Serialize;

use super::object::ObjectReference;
use crate::error::PermanentFailure;

/// Overall result of a bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOutcome {
    /// Nothing was attempted
    Empty,
    /// Every item succeeded or needed no action
    Completed,
    /// Some items failed
    Partial,
    /// Every attempted item failed
    Failed,
}

/// One item that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemFailure {
    /// The identifier as supplied by the caller
    pub target: String,
    pub code: Option<String>,
    pub cause: String,
}

/// Per-item report of a bulk delete or bulk restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOperationResult {
    /// Keys attempted, grouped by container
    pub per_container: BTreeMap<String, Vec<String>>,
    pub succeeded: Vec<ObjectReference>,
    /// Items that needed no action (restore already running or not required)
    pub skipped: Vec<ObjectReference>,
    pub failed: Vec<BulkItemFailure>,
    pub outcome: BulkOutcome,
}

impl Default for BulkOperationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkOperationResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            per_container: BTreeMap::new(),
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            outcome: BulkOutcome::Empty,
        }
    }

    /// Record that a key was attempted
    pub fn attempt(&mut self, reference: &ObjectReference) {
        self.per_container
            .entry(reference.container().to_string())
            .or_default()
            .push(reference.key().to_string());
    }

    pub fn record_success(&mut self, reference: ObjectReference) {
        self.succeeded.push(reference);
        self.refresh();
    }

    pub fn record_skipped(&mut self, reference: ObjectReference) {
        self.skipped.push(reference);
        self.refresh();
    }

    pub fn record_failure(
        &mut self,
        target: impl Into<String>,
        code: Option<String>,
        cause: impl Into<String>,
    ) {
        self.failed.push(BulkItemFailure {
            target: target.into(),
            code,
            cause: cause.into(),
        });
        self.refresh();
    }

    pub fn record_permanent(&mut self, reference: &ObjectReference, failure: &PermanentFailure) {
        self.record_failure(reference.format(), failure.code.clone(), failure.to_string());
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: BulkOperationResult) {
        for (container, keys) in other.per_container {
            self.per_container.entry(container).or_default().extend(keys);
        }
        self.succeeded.extend(other.succeeded);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.refresh();
    }

    /// Whether a given reference was reported successful
    #[must_use]
    pub fn succeeded_for(&self, reference: &ObjectReference) -> bool {
        self.succeeded.contains(reference)
    }

    /// Whether a given identifier was reported failed
    #[must_use]
    pub fn failed_for(&self, target: &str) -> bool {
        self.failed.iter().any(|f| f.target == target)
    }

    fn refresh(&mut self) {
        let ok = self.succeeded.len() + self.skipped.len();
        self.outcome = match (ok, self.failed.len()) {
            (0, 0) => BulkOutcome::Empty,
            (_, 0) => BulkOutcome::Completed,
            (0, _) => BulkOutcome::Failed,
            _ => BulkOutcome::Partial,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(key: &str) -> ObjectReference {
        ObjectReference::s3("bucket", key).unwrap()
    }

    #[test]
    fn test_outcome_transitions() {
        let mut result = BulkOperationResult::new();
        assert_eq!(result.outcome, BulkOutcome::Empty);

        result.record_success(reference("a"));
        assert_eq!(result.outcome, BulkOutcome::Completed);

        result.record_failure("s3://bucket/b", None, "denied");
        assert_eq!(result.outcome, BulkOutcome::Partial);
    }

    #[test]
    fn test_all_failed() {
        let mut result = BulkOperationResult::new();
        result.record_failure("not-a-uri", None, "invalid");
        assert_eq!(result.outcome, BulkOutcome::Failed);
    }

    #[test]
    fn test_skipped_counts_as_success() {
        let mut result = BulkOperationResult::new();
        result.record_skipped(reference("a"));
        assert_eq!(result.outcome, BulkOutcome::Completed);
    }

    #[test]
    fn test_merge_combines_containers() {
        let mut left = BulkOperationResult::new();
        let a = reference("a");
        left.attempt(&a);
        left.record_success(a);

        let mut right = BulkOperationResult::new();
        let b = reference("b");
        right.attempt(&b);
        right.record_failure(b.format(), Some("AccessDenied".into()), "denied");

        left.merge(right);
        assert_eq!(left.per_container["bucket"], vec!["a", "b"]);
        assert_eq!(left.outcome, BulkOutcome::Partial);
        assert!(left.failed_for("s3://bucket/b"));
    }
}
