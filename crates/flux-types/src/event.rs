//! Events, payloads, and inline overrides.
//!
//! On the wire an event is a two-element array: `[eventType, payload]`.
//! The payload is a JSON object of attribute values plus optional reserved
//! keys that replace schema dispatch for that single event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::{PathError, TargetPath};
use crate::{MutationOp, Score};

/// Reserved payload key: target expressions for an inline override.
pub const RESERVED_TARGETS: &str = "@targets";
/// Reserved payload key: attribute whose value is added.
pub const RESERVED_ADD: &str = "@add";
/// Reserved payload key: attribute whose value is removed.
pub const RESERVED_REMOVE: &str = "@remove";
/// Reserved payload key: explicit score for added members.
pub const RESERVED_SCORE: &str = "@score";

/// Errors scoped to a single event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// A path or override names an attribute the payload does not carry.
    #[error("payload is missing attribute `{0}`")]
    MissingAttribute(String),

    /// The event type has no `:<entityType>` qualifier to strip.
    #[error("malformed event type `{0}`: expected `<actionClass>:<entityType>`")]
    MalformedEventType(String),

    /// The payload or its reserved keys are structurally invalid.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// An `@targets` expression failed to parse.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl EventError {
    /// Stable error class label surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingAttribute(_) => "missing_attribute",
            Self::MalformedEventType(_) | Self::Path(_) => "invalid_path",
            Self::InvalidEvent(_) => "invalid_event",
        }
    }
}

/// An event exactly as submitted: `[eventType, payloadObject]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent(pub String, pub Map<String, Value>);

impl RawEvent {
    pub fn new(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self(event_type.into(), payload)
    }

    pub fn event_type(&self) -> &str {
        &self.0
    }
}

/// A namespaced event type: `<actionClass>:<entityType>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventType<'a> {
    action_class: &'a str,
    entity_type: &'a str,
}

impl<'a> EventType<'a> {
    /// Splits an event type on its last `:`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MalformedEventType`] when either side of the
    /// split would be empty or there is no `:` at all.
    pub fn parse(raw: &'a str) -> Result<Self, EventError> {
        match raw.rsplit_once(':') {
            Some((action_class, entity_type))
                if !action_class.is_empty() && !entity_type.is_empty() =>
            {
                Ok(Self {
                    action_class,
                    entity_type,
                })
            }
            _ => Err(EventError::MalformedEventType(raw.to_string())),
        }
    }

    /// The schema key this event dispatches on.
    pub fn action_class(&self) -> &'a str {
        self.action_class
    }

    pub fn entity_type(&self) -> &'a str {
        self.entity_type
    }
}

/// Attribute values of an event, with reserved keys removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    /// Looks up an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MissingAttribute`] if the attribute is absent.
    pub fn get(&self, attribute: &str) -> Result<&str, EventError> {
        self.0
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| EventError::MissingAttribute(attribute.to_string()))
    }

    pub fn insert(&mut self, attribute: impl Into<String>, value: impl Into<String>) {
        self.0.insert(attribute.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Per-event targets that bypass the schema entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineOverride {
    pub targets: Vec<TargetPath>,
    pub op: MutationOp,
    /// Payload attribute whose value is the member.
    pub attribute: String,
}

/// A validated event ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub payload: Payload,
    pub inline: Option<InlineOverride>,
    /// Explicit score for every member this event adds.
    pub score: Option<Score>,
}

impl Event {
    /// Validates a raw event, splitting reserved keys from attributes.
    ///
    /// Override mode is selected by the presence of any of `@targets`,
    /// `@add`, or `@remove`, and then requires a non-empty `@targets` plus
    /// exactly one of `@add`/`@remove`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidEvent`] for malformed values or an
    /// incomplete override, and [`EventError::Path`] for a bad target.
    pub fn parse(raw: RawEvent) -> Result<Self, EventError> {
        let RawEvent(event_type, object) = raw;

        let mut payload = Payload::default();
        let mut targets = None;
        let mut add = None;
        let mut remove = None;
        let mut score = None;

        for (key, value) in object {
            match key.as_str() {
                RESERVED_TARGETS => targets = Some(parse_targets(value)?),
                RESERVED_ADD => add = Some(reserved_string(RESERVED_ADD, value)?),
                RESERVED_REMOVE => remove = Some(reserved_string(RESERVED_REMOVE, value)?),
                RESERVED_SCORE => score = Some(parse_score(value)?),
                _ => {
                    let text = attribute_text(&key, value)?;
                    payload.insert(key, text);
                }
            }
        }

        let inline = if targets.is_some() || add.is_some() || remove.is_some() {
            let targets = targets.unwrap_or_default();
            if targets.is_empty() {
                return Err(EventError::InvalidEvent(format!(
                    "inline override requires a non-empty `{RESERVED_TARGETS}`"
                )));
            }
            let (op, attribute) = match (add, remove) {
                (Some(attribute), None) => (MutationOp::Add, attribute),
                (None, Some(attribute)) => (MutationOp::Remove, attribute),
                (Some(_), Some(_)) => {
                    return Err(EventError::InvalidEvent(format!(
                        "inline override cannot set both `{RESERVED_ADD}` and `{RESERVED_REMOVE}`"
                    )))
                }
                (None, None) => {
                    return Err(EventError::InvalidEvent(format!(
                        "inline override requires `{RESERVED_ADD}` or `{RESERVED_REMOVE}`"
                    )))
                }
            };
            Some(InlineOverride {
                targets,
                op,
                attribute,
            })
        } else {
            None
        };

        Ok(Self {
            event_type,
            payload,
            inline,
            score,
        })
    }
}

fn parse_targets(value: Value) -> Result<Vec<TargetPath>, EventError> {
    let Value::Array(items) = value else {
        return Err(EventError::InvalidEvent(format!(
            "`{RESERVED_TARGETS}` must be an array of target paths"
        )));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(raw) => Ok(TargetPath::parse(&raw)?),
            other => Err(EventError::InvalidEvent(format!(
                "`{RESERVED_TARGETS}` entries must be strings, got {other}"
            ))),
        })
        .collect()
}

fn reserved_string(key: &str, value: Value) -> Result<String, EventError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s),
        other => Err(EventError::InvalidEvent(format!(
            "`{key}` must name a payload attribute, got {other}"
        ))),
    }
}

fn parse_score(value: Value) -> Result<Score, EventError> {
    let score = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match score {
        Some(score) if score.is_finite() => Ok(score),
        _ => Err(EventError::InvalidEvent(format!(
            "`{RESERVED_SCORE}` must be a finite number, got {value}"
        ))),
    }
}

fn attribute_text(key: &str, value: Value) -> Result<String, EventError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(EventError::InvalidEvent(format!(
            "attribute `{key}` must be a string, number, or boolean, got {other}"
        ))),
    }
}
