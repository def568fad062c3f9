//! Executable query tree
//!
//! The output of the bundled [`QueryParser`](super::QueryParser). Saved
//! references never survive into this tree: by the time it is built every
//! `saved` clause has been replaced by the tree of the query it names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node of an executable query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTree {
    /// Matches every document
    MatchAll,
    /// Matches no document
    MatchNone,
    /// Exact value on a field
    Term { field: String, value: Value },
    /// Any of several exact values on a field
    Terms { field: String, values: Vec<Value> },
    /// Analyzed full-text match
    Match { field: String, text: String },
    /// Prefix match on a field
    Prefix { field: String, prefix: String },
    /// Bounded range on a field
    Range { field: String, bounds: RangeBounds },
    /// Field has any value
    Exists { field: String },
    /// Boolean combination
    Bool(BoolQuery),
}

/// Range bounds, each optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
}

impl RangeBounds {
    pub fn is_empty(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }
}

/// Boolean query clauses.
///
/// `should` clauses are optional when `must` or `filter` clauses exist;
/// otherwise at least `minimum_should_match` of them must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<QueryTree>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<QueryTree>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<QueryTree>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<QueryTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    /// A pure disjunction: matches if any member matches.
    ///
    /// With no members it matches nothing.
    pub fn disjunction(members: Vec<QueryTree>) -> Self {
        Self {
            should: members,
            minimum_should_match: Some(1),
            ..Self::default()
        }
    }
}

impl QueryTree {
    /// Wrap members in a disjunction
    pub fn any_of(members: Vec<QueryTree>) -> Self {
        QueryTree::Bool(BoolQuery::disjunction(members))
    }

    /// Total number of nodes, this one included
    pub fn node_count(&self) -> usize {
        match self {
            QueryTree::Bool(b) => {
                1 + b
                    .must
                    .iter()
                    .chain(&b.filter)
                    .chain(&b.should)
                    .chain(&b.must_not)
                    .map(QueryTree::node_count)
                    .sum::<usize>()
            }
            _ => 1,
        }
    }
}
