//! Storage Layer - saved query definitions
//!
//! The resolver only reads through [`SavedQueryStore`]. The SQLite
//! implementation is the system of record with tables:
//! - saved_queries(name, query_source, updated_at)
//! - saved_query_tags(name, tag)

pub mod schema;
pub mod selector;
pub mod sqlite;

use serde_json::Value;

use crate::Result;
use crate::record::StoredQueryRecord;

pub use selector::SqlPredicate;
pub use sqlite::{SqliteStore, StoreStats};

/// Read access to saved query definitions.
///
/// Implementations must tolerate concurrent readers; the resolver may be
/// driven from many request threads against one store.
pub trait SavedQueryStore: Send + Sync {
    /// Point lookup by unique name
    fn get_by_name(&self, name: &str) -> Result<Option<StoredQueryRecord>>;

    /// Records selected by a selector query document, ordered by name
    fn search(
        &self,
        selector: &Value,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredQueryRecord>>;
}
