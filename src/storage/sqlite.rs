//! SQLite storage implementation

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;

use super::selector;
use super::{SavedQueryStore, schema};
use crate::Result;
use crate::record::StoredQueryRecord;

/// How long a reader waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed storage for saved queries
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // A panic mid-statement leaves no partial state behind in SQLite
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Management Operations ==========

    /// Insert or replace a saved query, rewriting its tags
    pub fn put(&self, record: &StoredQueryRecord) -> Result<()> {
        record.validate()?;
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO saved_queries (name, query_source, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![record.name, record.query_source, updated_at],
        )?;
        tx.execute("DELETE FROM saved_query_tags WHERE name = ?1", [&record.name])?;
        {
            let mut stmt = tx.prepare("INSERT INTO saved_query_tags (name, tag) VALUES (?1, ?2)")?;
            for tag in &record.tags {
                stmt.execute(params![record.name, tag])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Stored saved query {} ({} tags)", record.name, record.tags.len());
        Ok(())
    }

    /// Get a saved query by name
    pub fn get(&self, name: &str) -> Result<Option<StoredQueryRecord>> {
        let sql = format!(
            "SELECT {} FROM saved_queries q WHERE q.name = ?1",
            schema::RECORD_COLUMNS
        );
        self.conn()
            .query_row(&sql, [name], row_to_record)
            .optional()
            .map_err(Into::into)
    }

    /// Delete a saved query and its tags, returning whether it existed
    pub fn delete(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM saved_query_tags WHERE name = ?1", [name])?;
        let removed = tx.execute("DELETE FROM saved_queries WHERE name = ?1", [name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// List saved queries, optionally only those carrying a tag
    pub fn list(&self, tag: Option<&str>) -> Result<Vec<StoredQueryRecord>> {
        let conn = self.conn();
        let records = match tag {
            Some(tag) => {
                let sql = format!(
                    "SELECT {} FROM saved_queries q \
                     WHERE EXISTS (SELECT 1 FROM saved_query_tags t \
                     WHERE t.name = q.name AND t.tag = ?1) \
                     ORDER BY q.name",
                    schema::RECORD_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([tag], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM saved_queries q ORDER BY q.name",
                    schema::RECORD_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(records)
    }

    /// Records selected by a selector document, ordered by name
    pub fn search_records(
        &self,
        selector: &Value,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredQueryRecord>> {
        let predicate = selector::compile(selector)?;
        let sql = format!(
            "SELECT {} FROM saved_queries q WHERE {} ORDER BY q.name LIMIT ? OFFSET ?",
            schema::RECORD_COLUMNS,
            predicate.sql
        );

        let mut params = predicate.params;
        // usize beyond i64 would wrap to a negative LIMIT, which SQLite reads as unbounded
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        params.push(rusqlite::types::Value::Integer(limit));
        params.push(rusqlite::types::Value::Integer(offset));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(params), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Count saved queries
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM saved_queries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn();
        let (tag_links, distinct_tags): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT tag) FROM saved_query_tags",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let untagged: i64 = conn.query_row(
            "SELECT COUNT(*) FROM saved_queries q \
             WHERE NOT EXISTS (SELECT 1 FROM saved_query_tags t WHERE t.name = q.name)",
            [],
            |row| row.get(0),
        )?;
        drop(conn);

        Ok(StoreStats {
            queries: self.count()?,
            untagged: untagged as usize,
            tag_links: tag_links as usize,
            distinct_tags: distinct_tags as usize,
        })
    }
}

impl SavedQueryStore for SqliteStore {
    fn get_by_name(&self, name: &str) -> Result<Option<StoredQueryRecord>> {
        self.get(name)
    }

    fn search(
        &self,
        selector: &Value,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredQueryRecord>> {
        self.search_records(selector, offset, limit)
    }
}

/// Helper to convert a row to a StoredQueryRecord
fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<StoredQueryRecord> {
    let tags_json: String = row.get(2)?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StoredQueryRecord {
        name: row.get(0)?,
        query_source: row.get(1)?,
        tags,
    })
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub queries: usize,
    pub untagged: usize,
    pub tag_links: usize,
    pub distinct_tags: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    fn sample_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(&StoredQueryRecord::new("q1", r#"{"term":{"field":"x"}}"#).with_tags(["sports"]))
            .unwrap();
        store
            .put(&StoredQueryRecord::new("q2", r#"{"match_all":{}}"#).with_tags(["sports", "news"]))
            .unwrap();
        store
            .put(&StoredQueryRecord::new("report_daily", r#"{"exists":{"field":"x"}}"#))
            .unwrap();
        store
    }

    #[test]
    fn test_record_crud() {
        let store = sample_store();

        let q1 = store.get("q1").unwrap().unwrap();
        assert_eq!(q1.query_source, r#"{"term":{"field":"x"}}"#);
        assert!(q1.has_tag("sports"));

        let untagged = store.get("report_daily").unwrap().unwrap();
        assert!(untagged.tags.is_empty());

        assert!(store.get("missing").unwrap().is_none());
        assert!(store.delete("q1").unwrap());
        assert!(!store.delete("q1").unwrap());
        assert!(store.get("q1").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_put_replaces_tags() {
        let store = sample_store();
        store
            .put(&StoredQueryRecord::new("q2", "{}").with_tags(["archive"]))
            .unwrap();

        let q2 = store.get("q2").unwrap().unwrap();
        assert_eq!(q2.query_source, "{}");
        assert_eq!(q2.tags.len(), 1);
        assert!(q2.has_tag("archive"));
        assert_eq!(store.list(Some("news")).unwrap().len(), 0);
    }

    #[test]
    fn test_put_rejects_invalid_record() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.put(&StoredQueryRecord::new("bad", "{not json")).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_list_by_tag() {
        let store = sample_store();
        let names: Vec<_> = store
            .list(Some("sports"))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["q1", "q2"]);
        assert_eq!(store.list(None).unwrap().len(), 3);
    }

    #[test]
    fn test_search_by_tags() {
        let store = sample_store();
        let hits = store
            .search(&json!({"terms": {"tags": ["news", "unused"]}}), 0, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "q2");
    }

    #[test]
    fn test_search_by_subquery() {
        let store = sample_store();
        let hits = store
            .search(
                &json!({"bool": {"should": [{"prefix": {"name": "report_"}}, {"term": {"tags": "news"}}]}}),
                0,
                10,
            )
            .unwrap();
        let names: Vec<_> = hits.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["q2", "report_daily"]);

        let hits = store
            .search(&json!({"bool": {"must_not": {"exists": {"field": "tags"}}}}), 0, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "report_daily");
    }

    #[test]
    fn test_search_paging() {
        let store = sample_store();
        let all = json!({"match_all": {}});
        assert_eq!(store.search(&all, 0, 2).unwrap().len(), 2);
        let rest = store.search(&all, 2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "report_daily");

        // Bounds past i64 clamp instead of wrapping into an unbounded LIMIT -1
        assert_eq!(store.search(&all, 0, usize::MAX).unwrap().len(), 3);
        assert!(store.search(&all, usize::MAX, 2).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = sample_store().stats().unwrap();
        assert_eq!(stats.queries, 3);
        assert_eq!(stats.untagged, 1);
        assert_eq!(stats.tag_links, 3);
        assert_eq!(stats.distinct_tags, 2);
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .put(&StoredQueryRecord::new("q1", "{}").with_tags(["a", "b"]))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let q1 = store.get("q1").unwrap().unwrap();
        assert_eq!(q1.tags.len(), 2);
    }
}
