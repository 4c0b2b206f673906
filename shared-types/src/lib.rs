#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Header carrying the client-supplied idempotency key on mutating requests.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// A flat string-to-string tag set attached to a group.
///
/// Keys are kept sorted, so two label-sets with the same pairs compare equal
/// and serialize identically regardless of insertion order.
pub type LabelSet = BTreeMap<String, String>;

/// Separates pairs in a canonical label string.
pub const LABEL_PAIR_SEPARATOR: &str = "&";

/// Separates a label key from its value in a canonical label string.
pub const LABEL_ASSIGN: char = '=';

/// Percent-escapes the characters that carry structure in a registry key or
/// label query: `%`, `/`, `=` and `&`.
pub fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`encode_segment`]. Returns `None` on a malformed escape.
pub fn decode_segment(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Sorted `k1=v1&k2=v2` form of a label-set, each key and value escaped.
///
/// `LabelSet` iterates in lexicographic key order, so any two label-sets
/// holding the same pairs produce the same string.
pub fn canonical_labels(labels: &LabelSet) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}{LABEL_ASSIGN}{}", encode_segment(k), encode_segment(v)))
        .collect::<Vec<_>>()
        .join(LABEL_PAIR_SEPARATOR)
}

/// A single versioned configuration entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub id: String,
    pub version: String,
    pub entries: BTreeMap<String, String>,
}

impl Config {
    pub fn new(version: impl Into<String>, entries: BTreeMap<String, String>) -> Self {
        Self {
            id: String::new(),
            version: version.into(),
            entries,
        }
    }
}

/// A versioned, ordered collection of label-sets sharing one identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    #[serde(default)]
    pub id: String,
    pub version: String,
    pub configs: Vec<LabelSet>,
}

impl Group {
    pub fn new(version: impl Into<String>, configs: Vec<LabelSet>) -> Self {
        Self {
            id: String::new(),
            version: version.into(),
            configs,
        }
    }
}

/// Identifies one immutable version of a config or group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VersionRef {
    pub id: String,
    pub version: String,
}

impl VersionRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}
