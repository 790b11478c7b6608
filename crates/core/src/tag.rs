//! Tag grammar and the timestamped tag type.
//!
//! A tag's text follows `segment (":" segment)*` where
//! `segment = [A-Za-z0-9_-]+` (spec.md section 6). A `Tag` pairs that text
//! with the nanosecond timestamp at which it was asserted; the storage
//! layer always keeps the full temporal sequence, never just the latest
//! value per namespace (that collapse is the temporal engine's job).

use crate::Timestamp;
use std::fmt;
use thiserror::Error;

/// Namespaces the spec reserves a meaning for. Enumerated here so that
/// `entitydb-security` and `entitydb-repository` can match on a type
/// instead of repeating string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedNamespace {
    Type,
    Status,
    Rbac,
    Id,
    Has,
    RelatesTo,
    RelationType,
    Conf,
    Dataset,
    Hub,
}

impl ReservedNamespace {
    /// Map a namespace segment to its reserved meaning, if any.
    pub fn from_segment(segment: &str) -> Option<Self> {
        Some(match segment {
            "type" => Self::Type,
            "status" => Self::Status,
            "rbac" => Self::Rbac,
            "id" => Self::Id,
            "has" => Self::Has,
            "relates_to" => Self::RelatesTo,
            "relation_type" => Self::RelationType,
            "conf" => Self::Conf,
            "dataset" => Self::Dataset,
            "hub" => Self::Hub,
            _ => return None,
        })
    }
}

/// Errors raised while validating tag text against the grammar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("tag text cannot be empty")]
    Empty,
    #[error("tag segment cannot be empty (text: {0:?})")]
    EmptySegment(String),
    #[error("tag segment {segment:?} contains a character outside [A-Za-z0-9_-]")]
    InvalidCharacter { segment: String },
}

/// Validated tag text: `segment (":" segment)*`.
///
/// Construction is the only place the grammar is enforced; once built, a
/// `TagText` is guaranteed valid for the lifetime of the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagText(String);

impl TagText {
    /// Validate and wrap `text` as a `TagText`.
    pub fn new(text: impl Into<String>) -> Result<Self, TagError> {
        let text = text.into();
        if text.is_empty() {
            return Err(TagError::Empty);
        }
        for segment in text.split(':') {
            if segment.is_empty() {
                return Err(TagError::EmptySegment(text));
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            {
                return Err(TagError::InvalidCharacter {
                    segment: segment.to_string(),
                });
            }
        }
        Ok(TagText(text))
    }

    /// The raw text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first colon-delimited segment.
    pub fn namespace(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }

    /// Whether `namespace()` names a reserved namespace.
    pub fn reserved_namespace(&self) -> Option<ReservedNamespace> {
        ReservedNamespace::from_segment(self.namespace())
    }

    /// The portion of the text after the first segment and its colon, if
    /// present (i.e. `namespace:rest`).
    pub fn value_after_namespace(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, rest)| rest)
    }
}

impl fmt::Display for TagText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TagText {
    type Err = TagError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagText::new(s)
    }
}

/// A single timestamped assertion about an entity: `(nanoseconds, text)`.
///
/// Tags are append-only. "Removing" a tag means the most recent
/// timestamped version of that namespace is absent from a future version
/// set, not that any `Tag` value is ever deleted from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub timestamp: Timestamp,
    pub text: TagText,
}

impl Tag {
    pub fn new(timestamp: Timestamp, text: TagText) -> Self {
        Self { timestamp, text }
    }

    /// The `NANOS|text` wire form used when the temporal form is
    /// requested explicitly (spec.md section 6).
    pub fn to_wire_temporal(&self) -> String {
        format!("{}|{}", self.timestamp.as_nanos(), self.text.as_str())
    }
}
