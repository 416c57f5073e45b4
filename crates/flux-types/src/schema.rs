//! Schema documents: action classes mapped to fan-out rules.
//!
//! ```json
//! {
//!   "client:gravity:action:follow": [
//!     { "targets": ["[followee].followers"], "add": "follower" },
//!     { "targets": ["[follower].sources"], "add": "followee" }
//!   ],
//!   "@relations": { "followers": "set", "sources": "set" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::TargetPath;
use crate::{CollectionKind, MutationOp};

/// Reserved schema key declaring the collection kind of each relation.
pub const RESERVED_RELATIONS: &str = "@relations";

/// Errors produced while validating a schema document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema document must be a JSON object")]
    NotAnObject,

    #[error("schema action class must not be empty")]
    EmptyActionClass,

    #[error("unknown reserved schema key `{0}`")]
    UnknownReservedKey(String),

    #[error("rules for `{action_class}` must be an array")]
    RulesNotArray { action_class: String },

    #[error("rule {index} of `{action_class}`: {reason}")]
    InvalidRule {
        action_class: String,
        index: usize,
        reason: String,
    },

    #[error("invalid `@relations`: {0}")]
    InvalidRelations(String),
}

/// What a rule does with the payload value it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleAction {
    pub op: MutationOp,
    /// Payload attribute whose value is the member to add or remove.
    pub attribute: String,
}

/// One fan-out rule: resolve every target, then apply the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub targets: Vec<TargetPath>,
    pub action: RuleAction,
}

impl Rule {
    pub fn new(targets: Vec<TargetPath>, op: MutationOp, attribute: impl Into<String>) -> Self {
        Self {
            targets,
            action: RuleAction {
                op,
                attribute: attribute.into(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    targets: Vec<String>,
    #[serde(default)]
    add: Option<String>,
    #[serde(default)]
    remove: Option<String>,
}

/// A validated schema. Immutable once registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    actions: BTreeMap<String, Vec<Rule>>,
    relations: BTreeMap<String, CollectionKind>,
}

impl Schema {
    /// Validates a schema document.
    ///
    /// Nothing partial is ever produced: the first malformed rule rejects
    /// the whole document.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] naming the offending action class and rule.
    pub fn from_document(document: &Value) -> Result<Self, SchemaError> {
        let object = document.as_object().ok_or(SchemaError::NotAnObject)?;

        let mut schema = Self::default();
        for (key, value) in object {
            if key == RESERVED_RELATIONS {
                schema.relations = parse_relations(value)?;
                continue;
            }
            if key.starts_with('@') {
                return Err(SchemaError::UnknownReservedKey(key.clone()));
            }
            if key.is_empty() {
                return Err(SchemaError::EmptyActionClass);
            }
            let rules = value.as_array().ok_or_else(|| SchemaError::RulesNotArray {
                action_class: key.clone(),
            })?;
            let parsed = rules
                .iter()
                .enumerate()
                .map(|(index, rule)| {
                    parse_rule(rule).map_err(|reason| SchemaError::InvalidRule {
                        action_class: key.clone(),
                        index,
                        reason,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            schema.actions.insert(key.clone(), parsed);
        }
        Ok(schema)
    }

    /// Renders the schema back into its document form.
    pub fn to_document(&self) -> Value {
        let mut object = Map::new();
        for (action_class, rules) in &self.actions {
            let rules = rules
                .iter()
                .map(|rule| {
                    let targets = rule
                        .targets
                        .iter()
                        .map(|target| Value::String(target.to_string()))
                        .collect();
                    let mut doc = Map::new();
                    doc.insert("targets".to_string(), Value::Array(targets));
                    doc.insert(
                        rule.action.op.as_str().to_string(),
                        Value::String(rule.action.attribute.clone()),
                    );
                    Value::Object(doc)
                })
                .collect();
            object.insert(action_class.clone(), Value::Array(rules));
        }
        if !self.relations.is_empty() {
            let relations = self
                .relations
                .iter()
                .map(|(name, kind)| (name.clone(), Value::String(kind.as_str().to_string())))
                .collect();
            object.insert(RESERVED_RELATIONS.to_string(), Value::Object(relations));
        }
        Value::Object(object)
    }

    /// Adds rules for an action class, appending to any already present.
    pub fn with_rules(mut self, action_class: impl Into<String>, rules: Vec<Rule>) -> Self {
        self.actions
            .entry(action_class.into())
            .or_default()
            .extend(rules);
        self
    }

    /// Declares the collection kind of a relation.
    pub fn with_relation(mut self, relation: impl Into<String>, kind: CollectionKind) -> Self {
        self.relations.insert(relation.into(), kind);
        self
    }

    /// Rules registered for an action class, if any.
    pub fn rules(&self, action_class: &str) -> Option<&[Rule]> {
        self.actions.get(action_class).map(Vec::as_slice)
    }

    /// Action classes in sorted order.
    pub fn action_classes(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Kind of collections under `relation`; undeclared relations are ordered.
    pub fn relation_kind(&self, relation: &str) -> CollectionKind {
        self.relations.get(relation).copied().unwrap_or_default()
    }
}

fn parse_rule(value: &Value) -> Result<Rule, String> {
    let doc: RuleDocument = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    if doc.targets.is_empty() {
        return Err("`targets` must list at least one target path".to_string());
    }
    let targets = doc
        .targets
        .iter()
        .map(|raw| TargetPath::parse(raw).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let (op, attribute) = match (doc.add, doc.remove) {
        (Some(attribute), None) => (MutationOp::Add, attribute),
        (None, Some(attribute)) => (MutationOp::Remove, attribute),
        (Some(_), Some(_)) => return Err("rule cannot set both `add` and `remove`".to_string()),
        (None, None) => return Err("rule requires `add` or `remove`".to_string()),
    };
    if attribute.is_empty() {
        return Err(format!("`{}` must name a payload attribute", op.as_str()));
    }
    Ok(Rule::new(targets, op, attribute))
}

fn parse_relations(value: &Value) -> Result<BTreeMap<String, CollectionKind>, SchemaError> {
    let object = value
        .as_object()
        .ok_or_else(|| SchemaError::InvalidRelations("must be an object".to_string()))?;
    object
        .iter()
        .map(|(relation, kind)| {
            let kind = kind
                .as_str()
                .ok_or_else(|| {
                    SchemaError::InvalidRelations(format!("kind of `{relation}` must be a string"))
                })?
                .parse::<CollectionKind>()
                .map_err(|e| SchemaError::InvalidRelations(e.to_string()))?;
            Ok((relation.clone(), kind))
        })
        .collect()
}
