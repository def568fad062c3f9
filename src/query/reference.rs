//! Saved query reference parsing
//!
//! Reads the body of a `saved` clause:
//!
//! ```text
//! { "saved": { "name": "mySavedQueryKey" } }
//! { "saved": { "tags": ["cookery", "sports"] } }
//! { "saved": { "query": { "bool": { ... } } } }
//! ```
//!
//! `name` always wins when present, whatever else the clause carries.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// The key under which a saved query reference is embedded
pub const SAVED_CLAUSE: &str = "saved";

const NAME_FIELD: &str = "name";
const TAGS_FIELD: &str = "tags";
const QUERY_FIELD: &str = "query";

/// A request to resolve one or more saved queries.
#[derive(Debug, Clone, PartialEq)]
pub enum SavedQueryReference {
    /// Exactly one stored query, looked up by key
    ByName(String),
    /// Every stored query carrying any of the tags
    ByTags(BTreeSet<String>),
    /// Every stored query selected by an arbitrary selector document
    BySubquery(Value),
}

impl SavedQueryReference {
    /// Parse the object found under the `saved` key.
    pub fn parse(clause: &Value) -> Result<Self> {
        let Value::Object(fields) = clause else {
            return Err(Error::MalformedQuery(format!(
                "[{}] expects an object, found {}",
                SAVED_CLAUSE,
                value_kind(clause)
            )));
        };
        Self::parse_fields(fields)
    }

    fn parse_fields(fields: &Map<String, Value>) -> Result<Self> {
        let mut name: Option<String> = None;
        let mut tags: Option<BTreeSet<String>> = None;
        let mut query: Option<&Value> = None;

        for (field, value) in fields {
            match (field.as_str(), value) {
                (NAME_FIELD, v) if is_scalar(v) => {
                    name = scalar_text(v);
                }
                (TAGS_FIELD, Value::Array(items)) => {
                    // Nested arrays/objects are skipped, not rejected
                    tags = Some(items.iter().filter_map(scalar_text).collect());
                }
                (QUERY_FIELD, Value::Object(_)) => {
                    query = Some(value);
                }
                // A recognised field holding the wrong shape is ignored
                (TAGS_FIELD | QUERY_FIELD, v) if is_scalar(v) => {}
                _ => return Err(Error::UnsupportedReferenceField(field.clone())),
            }
        }

        match (name, tags, query) {
            (Some(name), _, _) => Ok(Self::ByName(name)),
            (None, Some(_), Some(_)) => Err(Error::MalformedQuery(format!(
                "[{}] accepts only one of [{}] and [{}]",
                SAVED_CLAUSE, TAGS_FIELD, QUERY_FIELD
            ))),
            (None, Some(tags), None) => Ok(Self::ByTags(tags)),
            (None, None, Some(query)) => Ok(Self::BySubquery(query.clone())),
            (None, None, None) => Err(Error::MissingReference),
        }
    }

    /// Selector document sent to the store for the multi-result paths
    pub fn selector(&self) -> Option<Value> {
        match self {
            Self::ByName(_) => None,
            Self::ByTags(tags) => Some(serde_json::json!({ "terms": { "tags": tags } })),
            Self::BySubquery(query) => Some(query.clone()),
        }
    }
}

impl std::fmt::Display for SavedQueryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByName(name) => write!(f, "name:{}", name),
            Self::ByTags(tags) => {
                let tags: Vec<_> = tags.iter().map(String::as_str).collect();
                write!(f, "tags:[{}]", tags.join(","))
            }
            Self::BySubquery(query) => write!(f, "query:{}", query),
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Text of a scalar JSON value, `None` for null and containers.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
