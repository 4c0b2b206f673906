//! Backend key layout.
//!
//! ```text
//! config/<id>/<version>
//! group/<id>/<version>
//! group/<id>/<version>/<k1=v1&k2=v2...>/<index>
//! request/<token>
//! ```
//!
//! Every segment is escaped with [`encode_segment`], so ids, versions and
//! label text may contain `/`, `=`, `&` or `%` without changing the shape of
//! the key or colliding with another key.

use shared_types::{LABEL_ASSIGN, LABEL_PAIR_SEPARATOR, LabelSet, VersionRef};
use uuid::Uuid;

pub use shared_types::{canonical_labels, decode_segment, encode_segment};

pub const CONFIG_ROOT: &str = "config";
pub const GROUP_ROOT: &str = "group";
pub const REQUEST_ROOT: &str = "request";

/// Fresh random identity for a new config or group.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn config_key(id: &str, version: &str) -> String {
    format!(
        "{CONFIG_ROOT}/{}/{}",
        encode_segment(id),
        encode_segment(version)
    )
}

/// Prefix covering every version of a config.
pub fn config_prefix(id: &str) -> String {
    format!("{CONFIG_ROOT}/{}/", encode_segment(id))
}

pub fn group_key(id: &str, version: &str) -> String {
    format!(
        "{GROUP_ROOT}/{}/{}",
        encode_segment(id),
        encode_segment(version)
    )
}

/// Prefix covering every version of a group, label-sets included.
pub fn group_prefix(id: &str) -> String {
    format!("{GROUP_ROOT}/{}/", encode_segment(id))
}

/// Prefix under which every label-set equal to `labels` is stored.
pub fn label_prefix(id: &str, version: &str, labels: &LabelSet) -> String {
    format!("{}/{}/", group_key(id, version), canonical_labels(labels))
}

pub fn label_key(id: &str, version: &str, labels: &LabelSet, index: &str) -> String {
    format!(
        "{}{}",
        label_prefix(id, version, labels),
        encode_segment(index)
    )
}

pub fn request_key(token: &str) -> String {
    format!("{REQUEST_ROOT}/{}", encode_segment(token))
}

/// Parses a `k1=v1&k2=v2` label query into a label-set.
///
/// Pair order is irrelevant. Keys and values are percent-decoded, so a caller
/// can send `%26` for a literal `&`. Whitespace is kept verbatim, as it is
/// when label-sets are stored. Returns `None` for an empty query, a pair
/// without `=`, an empty key, or a repeated key.
pub fn parse_label_query(query: &str) -> Option<LabelSet> {
    if query.is_empty() {
        return None;
    }

    let mut labels = LabelSet::new();
    for pair in query.split(LABEL_PAIR_SEPARATOR) {
        let (key, value) = pair.split_once(LABEL_ASSIGN)?;
        let key = decode_segment(key)?;
        let value = decode_segment(value)?;
        if key.is_empty() || labels.insert(key, value).is_some() {
            return None;
        }
    }
    Some(labels)
}

/// Recovers `(id, version)` from a `<root>/<id>/<version>` key.
///
/// Keys with extra segments, such as label-set keys, return `None`.
pub fn parse_version_key(key: &str, root: &str) -> Option<VersionRef> {
    let mut segments = key.split('/');
    if segments.next()? != root {
        return None;
    }
    let id = decode_segment(segments.next()?)?;
    let version = decode_segment(segments.next()?)?;
    if segments.next().is_some() {
        return None;
    }
    Some(VersionRef::new(id, version))
}
