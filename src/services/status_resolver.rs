//! Maps raw backend metadata to the canonical restore state
//!
//! Resolution is total: every input lands on exactly one [`RestoreStatus`].
//!
//! | input | status |
//! |---|---|
//! | no metadata | `file_not_found` |
//! | unrecognised storage class | `restore_error` |
//! | instant-retrieval class | `restore_not_required` |
//! | archive class, no restore flag | `restore_not_started` |
//! | archive class, `ongoing-request="true"` | `restore_in_progress` |
//! | archive class, `ongoing-request="false"` | `restore_complete` |
//! | archive class, unparseable flag | `restore_error` |

use chrono::{DateTime, Utc};

use crate::models::{HeadMetadata, ObjectStatus, RestoreStatus, StorageClass};

const ONGOING_REQUEST: &str = "ongoing-request";
const EXPIRY_DATE: &str = "expiry-date";

/// Status and class for a head-object response (`None` = object absent)
#[must_use]
pub fn resolve(head: Option<&HeadMetadata>) -> (RestoreStatus, StorageClass) {
    let status = resolve_detail(head);
    (status.status, status.storage_class)
}

/// Like [`resolve`], also carrying the restored copy's expiry
#[must_use]
pub fn resolve_detail(head: Option<&HeadMetadata>) -> ObjectStatus {
    let Some(head) = head else {
        return ObjectStatus::new(RestoreStatus::FileNotFound, StorageClass::Unknown);
    };

    let class = match head.storage_class.as_deref() {
        None | Some("") => StorageClass::Standard,
        Some(name) => match StorageClass::from_provider(name) {
            Some(class) => class,
            None => return ObjectStatus::new(RestoreStatus::RestoreError, StorageClass::Unknown),
        },
    };

    if !class.requires_restore() {
        return ObjectStatus::new(RestoreStatus::RestoreNotRequired, class);
    }

    let Some(flag) = head.restore.as_deref() else {
        return ObjectStatus::new(RestoreStatus::RestoreNotStarted, class);
    };

    match parse_restore_flag(flag) {
        Some(RestoreFlag::Ongoing) => ObjectStatus::new(RestoreStatus::RestoreInProgress, class),
        Some(RestoreFlag::Done(expiry)) => {
            ObjectStatus::new(RestoreStatus::RestoreComplete, class).with_expiry(expiry)
        }
        None => ObjectStatus::new(RestoreStatus::RestoreError, class),
    }
}

/// Status for an archival read set state
#[must_use]
pub fn resolve_archive(read_set_status: &str) -> ObjectStatus {
    let class = StorageClass::from_archive_status(read_set_status);
    let status = match class {
        StorageClass::Archived => RestoreStatus::RestoreNotStarted,
        StorageClass::Active => RestoreStatus::RestoreComplete,
        StorageClass::Activating => RestoreStatus::RestoreInProgress,
        _ => RestoreStatus::RestoreError,
    };
    ObjectStatus::new(status, class)
}

#[derive(Debug, PartialEq, Eq)]
enum RestoreFlag {
    Ongoing,
    Done(Option<DateTime<Utc>>),
}

/// Parse `ongoing-request="false", expiry-date="Fri, 21 Dec 2012 00:00:00 GMT"`
fn parse_restore_flag(flag: &str) -> Option<RestoreFlag> {
    let pairs = parse_pairs(flag)?;
    let value = |name: &str| {
        pairs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    };

    match value(ONGOING_REQUEST)? {
        "true" => Some(RestoreFlag::Ongoing),
        "false" => {
            let expiry = match value(EXPIRY_DATE) {
                Some(raw) => Some(
                    DateTime::parse_from_rfc2822(raw)
                        .ok()?
                        .with_timezone(&Utc),
                ),
                None => None,
            };
            Some(RestoreFlag::Done(expiry))
        }
        _ => None,
    }
}

/// Split `key="value", key="value"` into pairs; values may contain commas
fn parse_pairs(input: &str) -> Option<Vec<(&str, &str)>> {
    let mut pairs = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let (value, tail) = after.trim_start().strip_prefix('"')?.split_once('"')?;
        pairs.push((key, value));

        rest = tail.trim_start();
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped.trim_start();
        } else if !rest.is_empty() {
            return None;
        }
    }

    Some(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_absent_object() {
        assert_eq!(
            resolve(None),
            (RestoreStatus::FileNotFound, StorageClass::Unknown)
        );
    }

    #[test]
    fn test_missing_class_is_standard() {
        let head = HeadMetadata::default();
        assert_eq!(
            resolve(Some(&head)),
            (RestoreStatus::RestoreNotRequired, StorageClass::Standard)
        );
    }

    #[test]
    fn test_instant_classes() {
        for name in ["STANDARD", "STANDARD_IA", "GLACIER_IR", "INTELLIGENT_TIERING"] {
            let head = HeadMetadata::with_class(name);
            assert_eq!(resolve(Some(&head)).0, RestoreStatus::RestoreNotRequired, "{name}");
        }
    }

    #[test]
    fn test_archive_without_restore() {
        let head = HeadMetadata::with_class("DEEP_ARCHIVE");
        assert_eq!(
            resolve(Some(&head)),
            (RestoreStatus::RestoreNotStarted, StorageClass::DeepArchive)
        );
    }

    #[test]
    fn test_restore_in_progress() {
        let head = HeadMetadata::with_class("GLACIER").restore_flag(r#"ongoing-request="true""#);
        assert_eq!(
            resolve(Some(&head)),
            (RestoreStatus::RestoreInProgress, StorageClass::Glacier)
        );
    }

    #[test]
    fn test_restore_complete_with_expiry() {
        let head = HeadMetadata::with_class("GLACIER").restore_flag(
            r#"ongoing-request="false", expiry-date="Fri, 21 Dec 2012 00:00:00 GMT""#,
        );
        let status = resolve_detail(Some(&head));
        assert_eq!(status.status, RestoreStatus::RestoreComplete);
        assert_eq!(
            status.restore_expiry,
            Some(Utc.with_ymd_and_hms(2012, 12, 21, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_restore_complete_without_expiry() {
        let head =
            HeadMetadata::with_class("DEEP_ARCHIVE").restore_flag(r#"ongoing-request="false""#);
        let status = resolve_detail(Some(&head));
        assert_eq!(status.status, RestoreStatus::RestoreComplete);
        assert_eq!(status.restore_expiry, None);
    }

    #[test]
    fn test_garbled_flags_are_errors() {
        for flag in [
            "",
            "ongoing-request",
            r#"ongoing-request="maybe""#,
            r#"ongoing-request=true"#,
            r#"ongoing-request="false", expiry-date="tomorrow""#,
            r#"expiry-date="Fri, 21 Dec 2012 00:00:00 GMT""#,
            r#"ongoing-request="true" junk"#,
        ] {
            let head = HeadMetadata::with_class("GLACIER").restore_flag(flag);
            assert_eq!(
                resolve(Some(&head)),
                (RestoreStatus::RestoreError, StorageClass::Glacier),
                "{flag:?}"
            );
        }
    }

    #[test]
    fn test_unknown_class() {
        let head = HeadMetadata::with_class("TAPE_VAULT");
        assert_eq!(
            resolve(Some(&head)),
            (RestoreStatus::RestoreError, StorageClass::Unknown)
        );
    }

    #[test]
    fn test_restore_flag_ignored_on_instant_class() {
        let head = HeadMetadata::with_class("STANDARD").restore_flag("garbage");
        assert_eq!(resolve(Some(&head)).0, RestoreStatus::RestoreNotRequired);
    }

    #[test]
    fn test_archive_mapping() {
        assert_eq!(
            resolve_archive("ARCHIVED").status,
            RestoreStatus::RestoreNotStarted
        );
        assert_eq!(resolve_archive("ACTIVE").status, RestoreStatus::RestoreComplete);
        assert_eq!(
            resolve_archive("ACTIVATING").status,
            RestoreStatus::RestoreInProgress
        );
        let deleting = resolve_archive("DELETING");
        assert_eq!(deleting.status, RestoreStatus::RestoreError);
        assert_eq!(deleting.storage_class, StorageClass::Unknown);
    }

    fn class_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("STANDARD".to_string())),
            Just(Some("GLACIER".to_string())),
            Just(Some("DEEP_ARCHIVE".to_string())),
            "[A-Z_]{0,16}".prop_map(Some),
        ]
    }

    fn flag_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(r#"ongoing-request="true""#.to_string())),
            Just(Some(
                r#"ongoing-request="false", expiry-date="Fri, 21 Dec 2012 00:00:00 GMT""#
                    .to_string()
            )),
            ".{0,64}".prop_map(Some),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolution_is_total(class in class_strategy(), flag in flag_strategy()) {
            let head = HeadMetadata {
                storage_class: class,
                restore: flag,
                ..HeadMetadata::default()
            };
            let (status, storage_class) = resolve(Some(&head));
            prop_assert!(RestoreStatus::ALL.contains(&status));
            prop_assert_ne!(status, RestoreStatus::FileNotFound);
            if matches!(status, RestoreStatus::RestoreInProgress | RestoreStatus::RestoreComplete | RestoreStatus::RestoreNotStarted) {
                prop_assert!(storage_class.requires_restore());
            }
        }

        #[test]
        fn prop_archive_resolution_is_total(value in ".{0,24}") {
            let status = resolve_archive(&value);
            prop_assert!(RestoreStatus::ALL.contains(&status.status));
        }
    }
}
