//! JSON query parser
//!
//! Parses a query document into a [`QueryTree`]. Every query is an object
//! with exactly one key naming its type:
//!
//! ```text
//! {"term": {"field": "x"}}
//! {"bool": {"must": [...], "should": [...]}}
//! {"saved": {"name": "mySavedQuery"}}
//! ```
//!
//! `saved` clauses are handed to the [`SavedQueryResolver`], which calls
//! back into this parser for each stored definition it expands.

use serde_json::{Map, Value};

use super::chain::ResolutionChain;
use super::reference::{SAVED_CLAUSE, value_kind};
use super::resolver::{InnerQueryParser, ResolverOptions, SavedQueryResolver};
use super::tree::{BoolQuery, QueryTree, RangeBounds};
use crate::storage::SavedQueryStore;
use crate::{Error, Result};

/// Keys accepted on any leaf query without changing what it matches
const IGNORED_KEYS: &[&str] = &["boost", "_name"];

/// Query document parser with saved query expansion
pub struct QueryParser<'a> {
    resolver: SavedQueryResolver<'a>,
}

impl<'a> QueryParser<'a> {
    /// Create a parser expanding saved queries from `store`
    pub fn new(store: &'a dyn SavedQueryStore) -> Self {
        Self::with_resolver(SavedQueryResolver::new(store))
    }

    pub fn with_options(store: &'a dyn SavedQueryStore, options: ResolverOptions) -> Self {
        Self::with_resolver(SavedQueryResolver::with_options(store, options))
    }

    pub fn with_resolver(resolver: SavedQueryResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Parse a top-level query document.
    ///
    /// Each call gets its own resolution chain, discarded on return.
    /// A `{"query": {...}}` request wrapper is unwrapped.
    pub fn parse(&self, source: &str) -> Result<QueryTree> {
        let document: Value = serde_json::from_str(source)?;
        self.parse_value(&document)
    }

    /// Parse an already decoded top-level document
    pub fn parse_value(&self, document: &Value) -> Result<QueryTree> {
        let mut chain = ResolutionChain::new();
        let query = match document.as_object() {
            Some(fields) if fields.len() == 1 && fields.contains_key("query") => &fields["query"],
            _ => document,
        };
        self.parse_node(query, &mut chain)
    }

    fn parse_node(&self, node: &Value, chain: &mut ResolutionChain) -> Result<QueryTree> {
        let (kind, body) = single_key(node, "query")?;
        match kind {
            "match_all" => expect_object(body, kind).map(|_| QueryTree::MatchAll),
            "match_none" => expect_object(body, kind).map(|_| QueryTree::MatchNone),
            "term" => parse_term(body),
            "terms" => parse_terms(body),
            "match" => parse_match(body),
            "prefix" => parse_prefix(body),
            "range" => parse_range(body),
            "exists" => parse_exists(body),
            "bool" => self.parse_bool(body, chain),
            SAVED_CLAUSE => Ok(self
                .resolver
                .resolve_clause(body, chain, self)?
                .into_query(QueryTree::any_of)),
            other => Err(Error::MalformedQuery(format!("no query registered for [{}]", other))),
        }
    }

    fn parse_bool(&self, body: &Value, chain: &mut ResolutionChain) -> Result<QueryTree> {
        let fields = expect_object(body, "bool")?;
        let mut query = BoolQuery::default();

        for (occur, clauses) in fields {
            let target = match occur.as_str() {
                "must" => &mut query.must,
                "filter" => &mut query.filter,
                "should" => &mut query.should,
                "must_not" => &mut query.must_not,
                "minimum_should_match" => {
                    let minimum = clauses
                        .as_u64()
                        .and_then(|m| u32::try_from(m).ok())
                        .ok_or_else(|| {
                            Error::MalformedQuery(format!(
                                "[bool] minimum_should_match out of range: {}",
                                clauses
                            ))
                        })?;
                    query.minimum_should_match = Some(minimum);
                    continue;
                }
                key if IGNORED_KEYS.contains(&key) => continue,
                other => {
                    return Err(Error::MalformedQuery(format!(
                        "[bool] query does not support [{}]",
                        other
                    )));
                }
            };
            match clauses {
                Value::Array(items) => {
                    for item in items {
                        target.push(self.parse_node(item, chain)?);
                    }
                }
                Value::Object(_) => target.push(self.parse_node(clauses, chain)?),
                other => {
                    return Err(Error::MalformedQuery(format!(
                        "[bool] {} expects an object or array, found {}",
                        occur,
                        value_kind(other)
                    )));
                }
            }
        }

        Ok(QueryTree::Bool(query))
    }
}

impl InnerQueryParser for QueryParser<'_> {
    type Query = QueryTree;

    fn parse_inner(&self, source: &str, chain: &mut ResolutionChain) -> Result<QueryTree> {
        let document: Value = serde_json::from_str(source)?;
        self.parse_node(&document, chain)
    }
}

fn parse_term(body: &Value) -> Result<QueryTree> {
    let (field, value) = field_entry(body, "term")?;
    let value = unwrap_option(value, "value");
    if matches!(value, Value::Array(_) | Value::Object(_) | Value::Null) {
        return Err(Error::MalformedQuery(format!(
            "[term] on [{}] needs a scalar value, found {}",
            field,
            value_kind(value)
        )));
    }
    Ok(QueryTree::Term {
        field: field.to_string(),
        value: value.clone(),
    })
}

fn parse_terms(body: &Value) -> Result<QueryTree> {
    let (field, values) = field_entry(body, "terms")?;
    let Value::Array(values) = values else {
        return Err(Error::MalformedQuery(format!(
            "[terms] on [{}] needs an array, found {}",
            field,
            value_kind(values)
        )));
    };
    Ok(QueryTree::Terms {
        field: field.to_string(),
        values: values.clone(),
    })
}

fn parse_match(body: &Value) -> Result<QueryTree> {
    let (field, value) = field_entry(body, "match")?;
    let text = match unwrap_option(value, "query") {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(Error::MalformedQuery(format!(
                "[match] on [{}] needs text, found {}",
                field,
                value_kind(other)
            )));
        }
    };
    Ok(QueryTree::Match {
        field: field.to_string(),
        text,
    })
}

fn parse_prefix(body: &Value) -> Result<QueryTree> {
    let (field, value) = field_entry(body, "prefix")?;
    let Some(prefix) = unwrap_option(value, "value").as_str() else {
        return Err(Error::MalformedQuery(format!("[prefix] on [{}] needs a string", field)));
    };
    Ok(QueryTree::Prefix {
        field: field.to_string(),
        prefix: prefix.to_string(),
    })
}

fn parse_range(body: &Value) -> Result<QueryTree> {
    let (field, value) = field_entry(body, "range")?;
    let bounds_doc = expect_object(value, "range")?;

    let mut bounds = RangeBounds::default();
    for (key, bound) in bounds_doc {
        let slot = match key.as_str() {
            "gt" => &mut bounds.gt,
            "gte" | "from" => &mut bounds.gte,
            "lt" => &mut bounds.lt,
            "lte" | "to" => &mut bounds.lte,
            "format" | "time_zone" => continue,
            k if IGNORED_KEYS.contains(&k) => continue,
            other => {
                return Err(Error::MalformedQuery(format!(
                    "[range] query does not support [{}]",
                    other
                )));
            }
        };
        if !bound.is_null() {
            *slot = Some(bound.clone());
        }
    }

    if bounds.is_empty() {
        return Err(Error::MalformedQuery(format!("[range] on [{}] has no bounds", field)));
    }
    Ok(QueryTree::Range {
        field: field.to_string(),
        bounds,
    })
}

fn parse_exists(body: &Value) -> Result<QueryTree> {
    let fields = expect_object(body, "exists")?;
    match fields.get("field") {
        Some(Value::String(field)) => Ok(QueryTree::Exists { field: field.clone() }),
        _ => Err(Error::MalformedQuery("[exists] needs a field name".to_string())),
    }
}

fn expect_object<'v>(value: &'v Value, context: &str) -> Result<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        Error::MalformedQuery(format!(
            "[{}] expects an object, found {}",
            context,
            value_kind(value)
        ))
    })
}

/// The only key of an object
fn single_key<'v>(value: &'v Value, context: &str) -> Result<(&'v str, &'v Value)> {
    let fields = expect_object(value, context)?;
    let mut entries = fields.iter();
    match (entries.next(), entries.next()) {
        (Some((key, inner)), None) => Ok((key.as_str(), inner)),
        (None, _) => Err(Error::MalformedQuery(format!("[{}] is empty", context))),
        (Some(_), Some(_)) => Err(Error::MalformedQuery(format!(
            "[{}] must have exactly one key, found {}",
            context,
            fields.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// The single field a leaf query targets, skipping scoring keys
fn field_entry<'v>(body: &'v Value, context: &str) -> Result<(&'v str, &'v Value)> {
    let fields = expect_object(body, context)?;
    let mut targets = fields
        .iter()
        .filter(|(key, _)| !IGNORED_KEYS.contains(&key.as_str()));
    match (targets.next(), targets.next()) {
        (Some((field, value)), None) => Ok((field.as_str(), value)),
        (None, _) => Err(Error::MalformedQuery(format!("[{}] needs a field", context))),
        (Some(_), Some(_)) => Err(Error::MalformedQuery(format!(
            "[{}] must target exactly one field",
            context
        ))),
    }
}

/// `{"field": {"<key>": v, ...}}` long form, or the value itself
fn unwrap_option<'v>(value: &'v Value, key: &str) -> &'v Value {
    match value {
        Value::Object(options) => options.get(key).unwrap_or(&Value::Null),
        other => other,
    }
}
