//! Field-wise snapshots of entity values.

use std::collections::BTreeMap;

/// A field-wise copy of an entity's values at a point in time.
///
/// Keys are field names; values are the field contents as JSON. A
/// `BTreeMap` keeps serialisation order stable so stored snapshots compare
/// byte-for-byte when their fields do.
pub type Snapshot = BTreeMap<String, serde_json::Value>;

/// Returns the names of fields whose values differ between `before` and
/// `after`, skipping any field listed in `ignored`.
///
/// A field present on one side only counts as changed.
pub fn changed_fields(before: &Snapshot, after: &Snapshot, ignored: &[String]) -> Vec<String> {
    let mut changed: Vec<String> = before
        .iter()
        .filter(|(name, value)| after.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(
        after
            .keys()
            .filter(|name| !before.contains_key(*name))
            .cloned(),
    );
    changed.retain(|name| !ignored.contains(name));
    changed.sort();
    changed
}

/// Field-wise equality ignoring the listed fields.
pub fn snapshots_equal(a: &Snapshot, b: &Snapshot, ignored: &[String]) -> bool {
    changed_fields(a, b, ignored).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(pairs: &[(&str, serde_json::Value)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let a = snap(&[("title", json!("hello")), ("score", json!(3))]);
        assert!(changed_fields(&a, &a.clone(), &[]).is_empty());
        assert!(snapshots_equal(&a, &a, &[]));
    }

    #[test]
    fn detects_modified_added_and_removed_fields() {
        let before = snap(&[("title", json!("hello")), ("body", json!("x"))]);
        let after = snap(&[("title", json!("bye")), ("tags", json!(["a"]))]);
        assert_eq!(
            changed_fields(&before, &after, &[]),
            vec!["body".to_string(), "tags".to_string(), "title".to_string()]
        );
    }

    #[test]
    fn ignored_fields_do_not_count() {
        let before = snap(&[("title", json!("hello")), ("updated_at", json!("t1"))]);
        let after = snap(&[("title", json!("hello")), ("updated_at", json!("t2"))]);
        let ignored = vec!["updated_at".to_string()];
        assert!(snapshots_equal(&before, &after, &ignored));
        assert!(!snapshots_equal(&before, &after, &[]));
    }
}
