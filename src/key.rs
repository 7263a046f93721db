//! Shard-key patterns and ordered boundary values.
//!
//! Chunk bounds, zone bounds, and split points are all [`BoundaryKey`]s: one
//! [`KeyValue`] per shard-key field, compared field-wise under a single total
//! order. The `MinKey`/`MaxKey` sentinels represent the open ends of the key
//! space, so the whole space is the half-open range
//! `[global_min, global_max)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// A single boundary scalar in the shard-key space.
///
/// The variant order defines the total order used everywhere bounds are
/// compared: `MinKey < Number < String < MaxKey`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// Sentinel below every other value.
    MinKey,
    /// 64-bit signed integer. Hashed shard-key fields always hold one of
    /// these in chunk bounds.
    Number(i64),
    /// UTF-8 string.
    String(String),
    /// Sentinel above every other value.
    MaxKey,
}

impl KeyValue {
    /// Whether this is the `MinKey` sentinel.
    pub fn is_min(&self) -> bool {
        matches!(self, KeyValue::MinKey)
    }

    /// Whether this is the `MaxKey` sentinel.
    pub fn is_max(&self) -> bool {
        matches!(self, KeyValue::MaxKey)
    }

    /// 64-bit hash of this value, used wherever a shard key declares a
    /// hashed field. Stable across runs.
    pub fn hashed(&self) -> i64 {
        let mut hasher = XxHash64::with_seed(0);
        self.hash(&mut hasher);
        hasher.finish() as i64
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Number(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::String(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::String(v)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::MinKey => write!(f, "MinKey"),
            KeyValue::Number(n) => write!(f, "{}", n),
            KeyValue::String(s) => write!(f, "\"{}\"", s),
            KeyValue::MaxKey => write!(f, "MaxKey"),
        }
    }
}

/// A point in the shard-key space: one value per shard-key field, compared
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoundaryKey(Vec<KeyValue>);

impl BoundaryKey {
    /// Create a boundary key from its field values.
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    /// The field values, in shard-key field order.
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no fields are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<KeyValue>> for BoundaryKey {
    fn from(values: Vec<KeyValue>) -> Self {
        Self(values)
    }
}

impl fmt::Display for BoundaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

/// How a shard-key field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSpec {
    /// Range field, ascending.
    Asc,
    /// Range field, descending.
    Desc,
    /// Hashed field: chunk bounds on this field are 64-bit hash values.
    Hashed,
}

/// One component of a shard-key pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyField {
    /// Dotted field path.
    pub path: String,
    /// Range direction or hashed.
    pub spec: FieldSpec,
}

impl KeyField {
    /// Ascending range field.
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            spec: FieldSpec::Asc,
        }
    }

    /// Descending range field.
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            spec: FieldSpec::Desc,
        }
    }

    /// Hashed field.
    pub fn hashed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            spec: FieldSpec::Hashed,
        }
    }
}

/// An immutable shard-key pattern: an ordered sequence of fields, at most
/// one of which is hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPattern {
    fields: Vec<KeyField>,
}

impl KeyPattern {
    /// Create a pattern from its fields.
    ///
    /// Panics if the pattern is empty or has more than one hashed field;
    /// pattern validation belongs to the command layer that hands us one.
    pub fn new(fields: Vec<KeyField>) -> Self {
        assert!(!fields.is_empty(), "shard key pattern must have fields");
        let hashed = fields
            .iter()
            .filter(|f| f.spec == FieldSpec::Hashed)
            .count();
        assert!(hashed <= 1, "shard key pattern has multiple hashed fields");
        Self { fields }
    }

    /// The pattern's fields in order.
    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    /// Number of fields in the pattern.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Whether any field is hashed.
    pub fn is_hashed(&self) -> bool {
        self.hashed_field_index().is_some()
    }

    /// Whether the first (most significant) field is hashed.
    pub fn has_hashed_prefix(&self) -> bool {
        self.hashed_field_index() == Some(0)
    }

    /// Position of the hashed field, if any.
    pub fn hashed_field_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.spec == FieldSpec::Hashed)
    }

    /// The lower open end of the key space: every field `MinKey`.
    pub fn global_min(&self) -> BoundaryKey {
        BoundaryKey(vec![KeyValue::MinKey; self.fields.len()])
    }

    /// The upper open end of the key space: every field `MaxKey`.
    pub fn global_max(&self) -> BoundaryKey {
        BoundaryKey(vec![KeyValue::MaxKey; self.fields.len()])
    }

    /// Extend a possibly-partial bound to the full pattern width, padding
    /// missing trailing fields with `MinKey` (or `MaxKey` when `upper`).
    ///
    /// Fields beyond the pattern width are dropped.
    pub fn extend_range_bound(&self, bound: &BoundaryKey, upper: bool) -> BoundaryKey {
        let pad = if upper {
            KeyValue::MaxKey
        } else {
            KeyValue::MinKey
        };
        let mut values: Vec<KeyValue> = bound
            .values()
            .iter()
            .take(self.fields.len())
            .cloned()
            .collect();
        values.resize(self.fields.len(), pad);
        BoundaryKey(values)
    }

    /// Fold a raw document's shard-key values into the boundary key the
    /// chunk order uses: hashed fields are replaced by their hash so that
    /// sample sort order matches chunk order.
    pub fn key_for_document(&self, values: &[KeyValue]) -> BoundaryKey {
        assert_eq!(
            values.len(),
            self.fields.len(),
            "document key width does not match the shard key pattern"
        );
        let values = values
            .iter()
            .zip(&self.fields)
            .map(|(v, f)| {
                if f.spec == FieldSpec::Hashed {
                    KeyValue::Number(v.hashed())
                } else {
                    v.clone()
                }
            })
            .collect();
        BoundaryKey(values)
    }
}
