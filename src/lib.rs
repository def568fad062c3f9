//! # Savedq - Saved Query Resolution
//!
//! Expands `saved` query references embedded in a query document into
//! fully resolved executable query trees.
//!
//! Savedq provides:
//! - A reference parser for the `{"saved": {...}}` clause (name, tags or selector query)
//! - A resolver that fetches stored definitions and expands them recursively
//! - Cycle detection through an explicit per-parse resolution chain
//! - SQLite-backed storage for saved query definitions
//! - A bundled JSON query parser producing executable query trees

pub mod config;
pub mod query;
pub mod record;
pub mod storage;
pub mod ui;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use query::{
    CompositeResult, InnerQueryParser, QueryParser, QueryTree, ResolutionChain, ResolverOptions,
    SavedQueryReference, SavedQueryResolver,
};
pub use record::StoredQueryRecord;
pub use storage::{SavedQueryStore, SqliteStore};

/// Result type alias for Savedq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Savedq operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("[saved] query does not support [{0}]")]
    UnsupportedReferenceField(String),

    #[error(
        "[saved] query needs either a name:savedQueryName or tags:[savedQueryTag1,...] or query:{{...}} child element to reference saved queries"
    )]
    MissingReference,

    #[error("No saved query with name [{0}]")]
    UnknownSavedQuery(String),

    #[error("[saved] query stack has recursive loop for query \"{name}\", parse stack={chain:?}")]
    CyclicReference { name: String, chain: Vec<String> },

    #[error("[saved] expansion of query \"{name}\" exceeds the maximum depth of {limit}")]
    ExpansionTooDeep { name: String, limit: usize },

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Unsupported selector: {0}")]
    UnsupportedSelector(String),

    #[error("Invalid saved query record: {0}")]
    InvalidRecord(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
