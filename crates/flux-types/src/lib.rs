//! Shared types, error definitions, and grammars for the Flux fan-out engine.
//!
//! This crate provides the foundational data model used across all Flux
//! crates: schema documents and their rules, target path expressions,
//! events with their inline overrides, storage keys, and collection kinds.
//!
//! Every parser in this crate is pure. Nothing here touches storage; the
//! store, registry, and fan-out crates build on these types.

use serde::{Deserialize, Serialize};

mod event;
mod path;
mod schema;

pub use event::{
    EventError, EventType, Event, InlineOverride, Payload, RawEvent, RESERVED_ADD,
    RESERVED_REMOVE, RESERVED_SCORE, RESERVED_TARGETS,
};
pub use path::{PathError, TargetPath};
pub use schema::{Rule, RuleAction, Schema, SchemaError, RESERVED_RELATIONS};

/// Numeric rank of a member inside a collection.
///
/// Default scores are drawn from a process-wide counter, so later events
/// rank higher. Events may pin a score explicitly with `@score`.
pub type Score = f64;

/// The mutation a rule or inline override performs on its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    /// Insert the member if it is not already present.
    Add,
    /// Delete the member if present.
    Remove,
}

impl MutationOp {
    /// Returns the wire label for this operation (`add` or `remove`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a collection orders its members when read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Members are ranked by score, highest first; ties by insertion order.
    #[default]
    Ordered,
    /// Plain membership; members are returned in lexicographic order.
    Set,
}

impl CollectionKind {
    /// Returns the canonical label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordered => "ordered",
            Self::Set => "set",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CollectionKind {
    type Err = ParseCollectionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordered" => Ok(Self::Ordered),
            "set" => Ok(Self::Set),
            _ => Err(ParseCollectionKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown collection kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCollectionKindError(pub String);

impl std::fmt::Display for ParseCollectionKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown collection kind: {} (expected `ordered` or `set`)",
            self.0
        )
    }
}

impl std::error::Error for ParseCollectionKindError {}

/// Identifies one collection: `<entityId>:<relationName>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Builds the key for `relation` on `entity_id`.
    pub fn new(entity_id: &str, relation: &str) -> Self {
        Self(format!("{entity_id}:{relation}"))
    }

    /// Wraps an already-formatted key, as received from a query.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the relation name: everything after the last `:`.
    pub fn relation(&self) -> Option<&str> {
        self.0.rsplit_once(':').map(|(_, relation)| relation)
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A member together with its score, as read back from a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: String,
    pub score: Score,
}

/// One concrete change to one collection, fully resolved.
///
/// The fan-out layer plans a list of these per event and hands the whole
/// list to the store in a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Collection to change.
    pub key: StorageKey,
    /// Add or remove.
    pub op: MutationOp,
    /// Member value taken from the event payload.
    pub member: String,
    /// Score to assign when the member is newly added. Ignored for removals.
    pub score: Score,
    /// Kind to create the collection with if it does not exist yet.
    pub kind: CollectionKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_formats_entity_and_relation() {
        let key = StorageKey::new("user1", "followers");
        assert_eq!(key.as_str(), "user1:followers");
        assert_eq!(key.relation(), Some("followers"));
    }

    #[test]
    fn storage_key_relation_uses_last_separator() {
        let key = StorageKey::from_raw("urn:user:1:feed_items");
        assert_eq!(key.relation(), Some("feed_items"));
        assert_eq!(StorageKey::from_raw("plain").relation(), None);
    }

    #[test]
    fn collection_kind_parses_labels() {
        assert_eq!("ordered".parse(), Ok(CollectionKind::Ordered));
        assert_eq!("set".parse(), Ok(CollectionKind::Set));
        assert!("sorted".parse::<CollectionKind>().is_err());
        assert_eq!(CollectionKind::default(), CollectionKind::Ordered);
    }

    #[test]
    fn mutation_op_serializes_lowercase() {
        let json = serde_json::to_string(&MutationOp::Remove).expect("should serialize");
        assert_eq!(json, "\"remove\"");
        assert_eq!(MutationOp::Add.to_string(), "add");
    }
}
