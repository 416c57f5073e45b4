//! Target path expressions.
//!
//! Grammar:
//!
//! ```text
//! path     = "[" attr "]" ( "." relation )+
//! attr     = 1*( any char except "[" "]" "." ":" )
//! relation = 1*( any char except "[" "]" "." ":" )
//! ```
//!
//! `[followee].followers` names the single collection
//! `<followee>:followers`. `[user].followers.feed_items` first reads
//! `<user>:followers`, then names `<m>:feed_items` for every member `m`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a target expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("target path is empty")]
    Empty,
    #[error("target path `{0}` must start with a bracketed attribute like `[user]`")]
    MissingRoot(String),
    #[error("target path `{0}` has an unterminated `[`")]
    UnterminatedRoot(String),
    #[error("target path `{0}` has an empty root attribute")]
    EmptyAttribute(String),
    #[error("target path `{0}` has no relation segment to mutate")]
    NoRelation(String),
    #[error("target path `{path}` has an invalid segment `{segment}`")]
    InvalidSegment { path: String, segment: String },
}

/// A parsed target expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPath {
    root: String,
    hops: Vec<String>,
    relation: String,
}

impl TargetPath {
    /// Parses a target expression such as `[user].followers.feed_items`.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] describing the first grammar violation.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let rest = raw
            .strip_prefix('[')
            .ok_or_else(|| PathError::MissingRoot(raw.to_string()))?;
        let (root, rest) = rest
            .split_once(']')
            .ok_or_else(|| PathError::UnterminatedRoot(raw.to_string()))?;
        if root.is_empty() {
            return Err(PathError::EmptyAttribute(raw.to_string()));
        }
        if !valid_segment(root) {
            return Err(PathError::InvalidSegment {
                path: raw.to_string(),
                segment: root.to_string(),
            });
        }
        if rest.is_empty() {
            return Err(PathError::NoRelation(raw.to_string()));
        }
        let rest = rest.strip_prefix('.').ok_or_else(|| PathError::InvalidSegment {
            path: raw.to_string(),
            segment: rest.to_string(),
        })?;

        let mut segments = Vec::new();
        for segment in rest.split('.') {
            if !valid_segment(segment) {
                return Err(PathError::InvalidSegment {
                    path: raw.to_string(),
                    segment: segment.to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        // split() on a non-empty string always yields at least one segment
        let relation = segments
            .pop()
            .ok_or_else(|| PathError::NoRelation(raw.to_string()))?;

        Ok(Self {
            root: root.to_string(),
            hops: segments,
            relation,
        })
    }

    /// The payload attribute whose value seeds the traversal.
    pub fn root_attribute(&self) -> &str {
        &self.root
    }

    /// Relations read, in order, before reaching the final relation.
    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    /// The relation whose collections are the mutation targets.
    pub fn relation(&self) -> &str {
        &self.relation
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(['[', ']', '.', ':'])
}

impl std::fmt::Display for TargetPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.root)?;
        for hop in &self.hops {
            write!(f, ".{hop}")?;
        }
        write!(f, ".{}", self.relation)
    }
}

impl std::str::FromStr for TargetPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TargetPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
