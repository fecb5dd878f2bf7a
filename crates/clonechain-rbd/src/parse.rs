//! Turns `rbd --format json` output and `rbd` error text into values the
//! provider can reason about.

use clonechain_core::chain::Coordinate;
use clonechain_core::error::{ClonechainError, ClonechainResult};
use clonechain_core::provider::{CloneListing, ImageRef};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

/// What a failed `rbd` call tells us about the object it was asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    /// The image or snapshot does not exist (any more).
    NotFound,
    /// The pool or cluster could not be reached.
    Unreachable,
    Other,
}

const ENOENT: i32 = 2;
const UNREACHABLE_ERRNOS: &[i32] = &[108, 110, 111, 113];

fn errno_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((-?\d+)\)").expect("errno pattern is valid"))
}

/// Classify the diagnostic of a failed `rbd` call.
pub(crate) fn classify_failure(diagnostic: &str) -> Failure {
    let lower = diagnostic.to_ascii_lowercase();

    if lower.contains("error opening pool") || lower.contains("couldn't connect to the cluster") {
        return Failure::Unreachable;
    }

    let errno = errno_pattern()
        .captures(diagnostic)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .map(i32::abs);
    match errno {
        Some(code) if UNREACHABLE_ERRNOS.contains(&code) => return Failure::Unreachable,
        Some(ENOENT) => return Failure::NotFound,
        _ => {}
    }

    if lower.contains("error opening image")
        || lower.contains("error setting snapshot context")
        || lower.contains("no such file or directory")
    {
        return Failure::NotFound;
    }

    Failure::Other
}

#[derive(Debug, Deserialize)]
struct SnapEntry {
    name: String,
}

/// Snapshot names from `rbd snap ls --format json`, in output order.
pub(crate) fn parse_snapshot_names(stdout: &str) -> ClonechainResult<Vec<String>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<SnapEntry> = serde_json::from_str(stdout)
        .map_err(|err| malformed("snap ls", stdout, err))?;
    Ok(entries.into_iter().map(|entry| entry.name).collect())
}

/// Clones from `rbd children --format json`.
///
/// Newer releases print `{"pool": .., "image": ..}` objects, older ones
/// `"pool/image"` strings. Entries that do not yield two non-empty fields
/// become `MalformedResponse` items.
pub(crate) fn parse_children(stdout: &str) -> ClonechainResult<CloneListing> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<Value> =
        serde_json::from_str(stdout).map_err(|err| malformed("children", stdout, err))?;
    Ok(entries.iter().map(parse_child).collect())
}

fn parse_child(entry: &Value) -> ClonechainResult<ImageRef> {
    let fields = match entry {
        Value::Object(map) => map
            .get("pool")
            .and_then(Value::as_str)
            .zip(map.get("image").and_then(Value::as_str)),
        Value::String(text) => text.split_once('/'),
        _ => None,
    };

    match fields {
        Some((pool, image)) if !pool.is_empty() && !image.is_empty() => {
            Ok(ImageRef::new(pool, image))
        }
        _ => Err(ClonechainError::MalformedResponse(format!(
            "clone entry {entry} is not a (pool, image) pair"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    #[serde(default)]
    parent: Option<ParentInfo>,
}

#[derive(Debug, Deserialize)]
struct ParentInfo {
    #[serde(default)]
    pool: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    snapshot: String,
}

/// The parent snapshot from `rbd info --format json`, if the image has one.
pub(crate) fn parse_parent(stdout: &str) -> ClonechainResult<Option<Coordinate>> {
    let info: ImageInfo =
        serde_json::from_str(stdout).map_err(|err| malformed("info", stdout, err))?;
    Ok(info.parent.and_then(|parent| {
        if parent.pool.is_empty() || parent.image.is_empty() || parent.snapshot.is_empty() {
            None
        } else {
            Some(Coordinate::snapshot(parent.pool, parent.image, parent.snapshot))
        }
    }))
}

fn malformed(command: &str, stdout: &str, err: serde_json::Error) -> ClonechainError {
    ClonechainError::MalformedResponse(format!(
        "rbd {command} output `{}` is not valid: {err}",
        stdout.trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_names_keep_output_order() {
        let out = r#"[{"id":7,"name":"snapshot-b","size":1073741824,"protected":"true"},
                      {"id":3,"name":"snapshot-a","size":1073741824}]"#;
        assert_eq!(
            parse_snapshot_names(out).unwrap(),
            vec!["snapshot-b".to_string(), "snapshot-a".to_string()]
        );
        assert!(parse_snapshot_names("[]\n").unwrap().is_empty());
        assert!(parse_snapshot_names("").unwrap().is_empty());
    }

    #[test]
    fn garbage_snapshot_listing_is_malformed() {
        let err = parse_snapshot_names("not json").unwrap_err();
        assert!(matches!(err, ClonechainError::MalformedResponse(_)));
    }

    #[test]
    fn children_accept_both_output_forms() {
        let out = r#"[{"pool":"volumes","pool_namespace":"","image":"volume-2"},"ssd/volume-3"]"#;
        let listing = parse_children(out).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(*listing[0].as_ref().unwrap(), ImageRef::new("volumes", "volume-2"));
        assert_eq!(*listing[1].as_ref().unwrap(), ImageRef::new("ssd", "volume-3"));
    }

    #[test]
    fn short_child_entries_are_malformed_items() {
        let out = r#"[{"pool":"volumes"},"volume-9","volumes/",17,"volumes/volume-4"]"#;
        let listing = parse_children(out).unwrap();
        assert_eq!(listing.len(), 5);
        assert!(listing[..4]
            .iter()
            .all(|entry| matches!(entry, Err(ClonechainError::MalformedResponse(_)))));
        assert!(listing[4].is_ok());
    }

    #[test]
    fn parent_requires_all_three_fields() {
        let out = r#"{"name":"volume-2","size":1,"parent":{"pool":"volumes","pool_namespace":"","image":"volume-1","id":"ab12","snapshot":"snapshot-1","trash":false,"overlap":1}}"#;
        assert_eq!(
            parse_parent(out).unwrap(),
            Some(Coordinate::snapshot("volumes", "volume-1", "snapshot-1"))
        );
        assert_eq!(parse_parent(r#"{"name":"volume-1","size":1}"#).unwrap(), None);
        assert_eq!(
            parse_parent(r#"{"name":"x","parent":{"pool":"volumes","image":"volume-1"}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn failures_map_to_not_found_or_unreachable() {
        assert_eq!(
            classify_failure("rbd: error opening image volume-9: (2) No such file or directory"),
            Failure::NotFound
        );
        assert_eq!(
            classify_failure("rbd: error setting snapshot context: (2) No such file or directory"),
            Failure::NotFound
        );
        assert_eq!(
            classify_failure("rbd: error opening pool 'ssd': (2) No such file or directory"),
            Failure::Unreachable
        );
        assert_eq!(
            classify_failure("rbd: couldn't connect to the cluster!"),
            Failure::Unreachable
        );
        assert_eq!(
            classify_failure("librbd: list_children: error (110) Connection timed out"),
            Failure::Unreachable
        );
        assert_eq!(
            classify_failure("rbd: listing snapshots failed: (13) Permission denied"),
            Failure::Other
        );
        assert_eq!(classify_failure(""), Failure::Other);
    }
}
