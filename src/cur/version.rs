//! Latest-version resolution for billing export groups.
//!
//! One billing period can be exported several times as successive
//! "versions"; only the files of the newest version may count toward the
//! period's totals.

use std::collections::HashMap;

/// Compute the latest version token per group.
///
/// A group is *versioned* when at least one member carries a token; its
/// latest version is the lexicographically greatest distinct token, and the
/// returned map contains an entry for it. Groups where no member carries a
/// token are *unversioned* and absent from the map (every member is
/// eligible).
///
/// Tokens are assumed to be timestamp-prefixed (`20260815T010203Z-…`), so
/// lexicographic order tracks chronological order. Tokens without a
/// sortable prefix would silently select the wrong version.
pub fn latest_version_per_group<T>(
    items: &[T],
    group_key: impl Fn(&T) -> String,
    version_token: impl Fn(&T) -> Option<String>,
) -> HashMap<String, String> {
    let mut latest: HashMap<String, String> = HashMap::new();

    for item in items {
        let key = group_key(item);
        let Some(token) = version_token(item) else {
            continue;
        };

        match latest.get(&key) {
            Some(current) if *current >= token => {}
            _ => {
                latest.insert(key, token);
            }
        }
    }

    latest
}

/// Whether a member is eligible for aggregation given its group's latest
/// token: every member of an unversioned group is, otherwise only the
/// members carrying the latest token.
pub fn is_eligible(latest_for_group: Option<&str>, token: Option<&str>) -> bool {
    match latest_for_group {
        None => true,
        Some(latest) => token == Some(latest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        group: &'static str,
        token: Option<&'static str>,
    }

    fn resolve(items: &[Item]) -> HashMap<String, String> {
        latest_version_per_group(
            items,
            |i| i.group.to_string(),
            |i| i.token.map(String::from),
        )
    }

    #[test]
    fn test_versioned_group_selects_lexicographic_max() {
        let items = [
            Item {
                group: "proj-1::2026-08",
                token: Some("20260815T020000Z-b"),
            },
            Item {
                group: "proj-1::2026-08",
                token: Some("20260815T010000Z-a"),
            },
        ];

        let latest = resolve(&items);
        assert_eq!(
            latest.get("proj-1::2026-08").map(String::as_str),
            Some("20260815T020000Z-b")
        );
    }

    #[test]
    fn test_unversioned_group_absent_from_map() {
        let items = [
            Item {
                group: "proj-1::2026-08",
                token: None,
            },
            Item {
                group: "proj-1::2026-08",
                token: None,
            },
        ];

        let latest = resolve(&items);
        assert!(latest.is_empty());
    }

    #[test]
    fn test_mixed_groups_resolved_independently() {
        let items = [
            Item {
                group: "proj-1::2026-08",
                token: Some("v1"),
            },
            Item {
                group: "proj-1::2026-08",
                token: Some("v2"),
            },
            Item {
                group: "proj-1::2026-07",
                token: None,
            },
            Item {
                group: "proj-2::2026-08",
                token: Some("v9"),
            },
        ];

        let latest = resolve(&items);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest.get("proj-1::2026-08").map(String::as_str), Some("v2"));
        assert_eq!(latest.get("proj-2::2026-08").map(String::as_str), Some("v9"));
        assert!(!latest.contains_key("proj-1::2026-07"));
    }

    #[test]
    fn test_eligibility() {
        // Unversioned group: everything is eligible.
        assert!(is_eligible(None, None));
        assert!(is_eligible(None, Some("v1")));

        // Versioned group: only the latest token is.
        assert!(is_eligible(Some("v2"), Some("v2")));
        assert!(!is_eligible(Some("v2"), Some("v1")));
        assert!(!is_eligible(Some("v2"), None));
    }
}
