//! Stored query records
//!
//! A record is the persisted form of a saved query: a unique name, the raw
//! query document it expands to, and an optional set of tags used by the
//! tag-based lookup path.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A saved query definition as held by the store.
///
/// Read-only from the resolver's point of view; records are created and
/// replaced through the store's management operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQueryRecord {
    /// Unique key
    pub name: String,
    /// Raw serialized query document
    #[serde(rename = "querySource")]
    pub query_source: String,
    /// Tags for tag-based lookup
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl StoredQueryRecord {
    /// Create a record without tags
    pub fn new(name: impl Into<String>, query_source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_source: query_source.into(),
            tags: BTreeSet::new(),
        }
    }

    /// Builder-style tag assignment
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Check the record can be stored and later expanded.
    ///
    /// The name must be non-blank and the source must be a JSON object;
    /// whether the object is a valid query is only known at expansion time.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRecord("name must not be empty".to_string()));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidRecord(format!(
                "query \"{}\" has an empty tag",
                self.name
            )));
        }
        let source: serde_json::Value = serde_json::from_str(&self.query_source).map_err(|e| {
            Error::InvalidRecord(format!("querySource of \"{}\" is not JSON: {}", self.name, e))
        })?;
        if !source.is_object() {
            return Err(Error::InvalidRecord(format!(
                "querySource of \"{}\" must be a JSON object",
                self.name
            )));
        }
        Ok(())
    }

    /// Check if the record carries a tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
