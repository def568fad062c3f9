//! Database schema definitions

/// SQL to create the saved queries table
pub const CREATE_SAVED_QUERIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS saved_queries (
    name TEXT PRIMARY KEY,
    query_source TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// SQL to create the tags table
/// One row per (query, tag) pair
pub const CREATE_SAVED_QUERY_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS saved_query_tags (
    name TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (name, tag)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_saved_query_tags_tag ON saved_query_tags(tag)",
];

/// Columns selected for every record read, aliased against `saved_queries q`
pub const RECORD_COLUMNS: &str = "q.name, q.query_source, \
     (SELECT json_group_array(t.tag) FROM saved_query_tags t WHERE t.name = q.name)";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_SAVED_QUERIES_TABLE, CREATE_SAVED_QUERY_TAGS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
