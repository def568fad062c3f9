//! Saved Query Resolver
//!
//! The resolver turns a [`SavedQueryReference`] into expanded query trees.
//! It fetches stored definitions from a [`SavedQueryStore`] and hands each
//! definition's source to an [`InnerQueryParser`], which may call back into
//! the resolver for nested `saved` clauses using the same chain.
//!
//! Resolution paths:
//! 1. Name: one point lookup. Unknown names and cycles are fatal.
//! 2. Tags / selector query: one store search, capped at `max_results`.
//!    Members already on the chain are skipped with a warning; the rest
//!    are combined into a disjunction, which may be empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chain::ResolutionChain;
use super::reference::SavedQueryReference;
use crate::storage::SavedQueryStore;
use crate::{Error, Result};

/// Default cap on the number of stored queries a tag/selector reference may expand
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// Default cap on nested expansion depth
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Capability to parse a raw query document into an executable tree.
///
/// Implementors route any nested `saved` clause back into
/// [`SavedQueryResolver::resolve_clause`], passing `chain` along unchanged.
pub trait InnerQueryParser {
    type Query;

    fn parse_inner(&self, source: &str, chain: &mut ResolutionChain) -> Result<Self::Query>;
}

/// Result of resolving one reference
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeResult<Q> {
    /// Name-based resolution: the one expanded query
    Single(Q),
    /// Tag or selector resolution: OR of every expanded member
    Disjunction(Vec<Q>),
}

impl<Q> CompositeResult<Q> {
    /// Number of expanded queries carried
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Disjunction(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapse into a single query, building disjunctions with `any_of`
    pub fn into_query(self, any_of: impl FnOnce(Vec<Q>) -> Q) -> Q {
        match self {
            Self::Single(query) => query,
            Self::Disjunction(members) => any_of(members),
        }
    }
}

/// Resolver limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Maximum stored queries fetched for a tag/selector reference.
    /// Matches beyond the cap are dropped, with a warning.
    pub max_results: usize,
    /// Maximum nesting of saved queries; `None` leaves only cycle detection
    pub max_depth: Option<usize>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            max_depth: Some(DEFAULT_MAX_DEPTH),
        }
    }
}

/// Expands saved query references against a store
pub struct SavedQueryResolver<'a> {
    store: &'a dyn SavedQueryStore,
    options: ResolverOptions,
}

impl<'a> SavedQueryResolver<'a> {
    /// Create a resolver with default limits
    pub fn new(store: &'a dyn SavedQueryStore) -> Self {
        Self::with_options(store, ResolverOptions::default())
    }

    pub fn with_options(store: &'a dyn SavedQueryStore, options: ResolverOptions) -> Self {
        Self { store, options }
    }

    /// Parse the body of a `saved` clause and resolve it
    pub fn resolve_clause<P>(
        &self,
        clause: &Value,
        chain: &mut ResolutionChain,
        inner: &P,
    ) -> Result<CompositeResult<P::Query>>
    where
        P: InnerQueryParser + ?Sized,
    {
        let reference = SavedQueryReference::parse(clause)?;
        self.resolve(&reference, chain, inner)
    }

    /// Resolve a parsed reference
    pub fn resolve<P>(
        &self,
        reference: &SavedQueryReference,
        chain: &mut ResolutionChain,
        inner: &P,
    ) -> Result<CompositeResult<P::Query>>
    where
        P: InnerQueryParser + ?Sized,
    {
        match reference {
            SavedQueryReference::ByName(name) => self
                .resolve_by_name(name, chain, inner)
                .map(CompositeResult::Single),
            SavedQueryReference::ByTags(_) | SavedQueryReference::BySubquery(_) => {
                let selector = reference
                    .selector()
                    .ok_or_else(|| {
                        Error::MalformedQuery(format!("no selector for {}", reference))
                    })?;
                self.resolve_by_selector(&selector, chain, inner)
                    .map(CompositeResult::Disjunction)
            }
        }
    }

    fn resolve_by_name<P>(
        &self,
        name: &str,
        chain: &mut ResolutionChain,
        inner: &P,
    ) -> Result<P::Query>
    where
        P: InnerQueryParser + ?Sized,
    {
        if chain.contains(name) {
            return Err(Error::CyclicReference {
                name: name.to_string(),
                chain: chain.names().to_vec(),
            });
        }
        self.check_depth(name, chain)?;

        let record = self
            .store
            .get_by_name(name)?
            .ok_or_else(|| Error::UnknownSavedQuery(name.to_string()))?;

        tracing::debug!("Expanding saved query {} (depth {})", name, chain.depth() + 1);
        let mut guard = chain.enter(name);
        inner.parse_inner(&record.query_source, &mut guard)
    }

    fn resolve_by_selector<P>(
        &self,
        selector: &Value,
        chain: &mut ResolutionChain,
        inner: &P,
    ) -> Result<Vec<P::Query>>
    where
        P: InnerQueryParser + ?Sized,
    {
        let limit = self.options.max_results;
        let hits = self.store.search(selector, 0, limit)?;
        if limit > 0 && hits.len() >= limit {
            tracing::warn!(
                "Saved query selector {} hit the limit of {} results; further matches are dropped",
                selector,
                limit
            );
        }

        let mut members = Vec::with_capacity(hits.len());
        for record in hits {
            if chain.contains(&record.name) {
                tracing::warn!(
                    "Saved query stack has recursive loop for query \"{}\", parse stack={}",
                    record.name,
                    chain
                );
                continue;
            }
            self.check_depth(&record.name, chain)?;

            tracing::debug!(
                "Expanding tagged saved query {} (depth {})",
                record.name,
                chain.depth() + 1
            );
            let mut guard = chain.enter(&record.name);
            members.push(inner.parse_inner(&record.query_source, &mut guard)?);
        }

        Ok(members)
    }

    fn check_depth(&self, name: &str, chain: &ResolutionChain) -> Result<()> {
        match self.options.max_depth {
            Some(limit) if chain.depth() >= limit => Err(Error::ExpansionTooDeep {
                name: name.to_string(),
                limit,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoredQueryRecord;
    use crate::testing::capture_warnings;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Map-backed store that understands only tag selectors
    #[derive(Default)]
    struct MapStore {
        records: HashMap<String, StoredQueryRecord>,
        reads: AtomicUsize,
    }

    impl MapStore {
        fn with(records: Vec<StoredQueryRecord>) -> Self {
            Self {
                records: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl SavedQueryStore for MapStore {
        fn get_by_name(&self, name: &str) -> Result<Option<StoredQueryRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.get(name).cloned())
        }

        fn search(
        &self,
        selector: &Value,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredQueryRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let tags: Vec<&str> = selector["terms"]["tags"]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let mut hits: Vec<_> = self
                .records
                .values()
                .filter(|r| tags.iter().any(|t| r.has_tag(t)))
                .cloned()
                .collect();
            hits.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(hits.into_iter().skip(offset).take(limit).collect())
        }
    }

    /// Parses `{"saved": ...}` through the resolver, returns anything else verbatim
    struct EchoParser<'r> {
        resolver: &'r SavedQueryResolver<'r>,
    }

    impl InnerQueryParser for EchoParser<'_> {
        type Query = String;

        fn parse_inner(&self, source: &str, chain: &mut ResolutionChain) -> Result<String> {
            let value: Value = serde_json::from_str(source)?;
            match value.get("saved") {
                Some(clause) => Ok(self
                    .resolver
                    .resolve_clause(clause, chain, self)?
                    .into_query(|members| format!("or({})", members.join(",")))),
                None => Ok(source.to_string()),
            }
        }
    }

    fn resolve(resolver: &SavedQueryResolver<'_>, clause: Value) -> Result<CompositeResult<String>> {
        let parser = EchoParser { resolver };
        let mut chain = ResolutionChain::new();
        let result = resolver.resolve_clause(&clause, &mut chain, &parser);
        assert!(chain.is_empty(), "chain leaked: {}", chain);
        result
    }

    #[test]
    fn test_resolve_by_name() {
        let store = MapStore::with(vec![StoredQueryRecord::new("q1", r#"{"term":{"field":"x"}}"#)]);
        let resolver = SavedQueryResolver::new(&store);

        let result = resolve(&resolver, json!({"name": "q1"})).unwrap();
        assert_eq!(result, CompositeResult::Single(r#"{"term":{"field":"x"}}"#.to_string()));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_name_fails() {
        let store = MapStore::default();
        let resolver = SavedQueryResolver::new(&store);

        let err = resolve(&resolver, json!({"name": "missing"})).unwrap_err();
        assert!(matches!(err, Error::UnknownSavedQuery(ref n) if n == "missing"));
    }

    #[test]
    fn test_nested_name_resolution() {
        let store = MapStore::with(vec![
            StoredQueryRecord::new("outer", r#"{"saved":{"name":"inner"}}"#),
            StoredQueryRecord::new("inner", r#"{"match_all":{}}"#),
        ]);
        let resolver = SavedQueryResolver::new(&store);

        let result = resolve(&resolver, json!({"name": "outer"})).unwrap();
        assert_eq!(result, CompositeResult::Single(r#"{"match_all":{}}"#.to_string()));
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let store = MapStore::with(vec![StoredQueryRecord::new("q1", r#"{"saved":{"name":"q1"}}"#)]);
        let resolver = SavedQueryResolver::new(&store);

        let err = resolve(&resolver, json!({"name": "q1"})).unwrap_err();
        match err {
            Error::CyclicReference { name, chain } => {
                assert_eq!(name, "q1");
                assert_eq!(chain, vec!["q1".to_string()]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_mutual_reference_is_cyclic_from_either_end() {
        let store = MapStore::with(vec![
            StoredQueryRecord::new("a", r#"{"saved":{"name":"b"}}"#),
            StoredQueryRecord::new("b", r#"{"saved":{"name":"a"}}"#),
        ]);
        let resolver = SavedQueryResolver::new(&store);

        for (entry, other) in [("a", "b"), ("b", "a")] {
            let err = resolve(&resolver, json!({ "name": entry })).unwrap_err();
            match err {
                Error::CyclicReference { name, chain } => {
                    assert_eq!(name, entry);
                    assert_eq!(chain, vec![entry.to_string(), other.to_string()]);
                }
                other => panic!("expected cycle, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_resolve_by_tags() {
        let store = MapStore::with(vec![
            StoredQueryRecord::new("q1", r#"{"term":{"a":"1"}}"#).with_tags(["sports"]),
            StoredQueryRecord::new("q2", r#"{"term":{"b":"2"}}"#).with_tags(["sports", "news"]),
            StoredQueryRecord::new("q3", r#"{"term":{"c":"3"}}"#).with_tags(["cookery"]),
        ]);
        let resolver = SavedQueryResolver::new(&store);

        let result = resolve(&resolver, json!({"tags": ["sports"]})).unwrap();
        let CompositeResult::Disjunction(members) = result else {
            panic!("expected disjunction");
        };
        assert_eq!(members.len(), 2);
        assert!(members.contains(&r#"{"term":{"a":"1"}}"#.to_string()));
        assert!(members.contains(&r#"{"term":{"b":"2"}}"#.to_string()));
    }

    #[test]
    fn test_tags_without_matches_yield_empty_disjunction() {
        let store = MapStore::default();
        let resolver = SavedQueryResolver::new(&store);

        let result = resolve(&resolver, json!({"tags": ["nothing"]})).unwrap();
        assert_eq!(result, CompositeResult::Disjunction(Vec::new()));
        assert!(result.is_empty());
    }

    #[test]
    fn test_tag_cycle_is_skipped() {
        // "all" expands every "sports" query, one of which expands "all" again
        let store = MapStore::with(vec![
            StoredQueryRecord::new("all", r#"{"saved":{"tags":["sports"]}}"#),
            StoredQueryRecord::new("q1", r#"{"term":{"a":"1"}}"#).with_tags(["sports"]),
            StoredQueryRecord::new("q2", r#"{"saved":{"name":"all"}}"#).with_tags(["sports"]),
            StoredQueryRecord::new("q3", r#"{"saved":{"tags":["sports"]}}"#).with_tags(["sports"]),
        ]);
        let resolver = SavedQueryResolver::new(&store);

        // q2 re-enters "all" by name: fatal, propagates
        let err = resolve(&resolver, json!({"name": "all"})).unwrap_err();
        assert!(matches!(err, Error::CyclicReference { ref name, .. } if name == "all"));

        // From the tag path q3 re-selects itself and is skipped
        let store = MapStore::with(vec![
            StoredQueryRecord::new("q1", r#"{"term":{"a":"1"}}"#).with_tags(["sports"]),
            StoredQueryRecord::new("q3", r#"{"saved":{"tags":["sports"]}}"#).with_tags(["sports"]),
        ]);
        let resolver = SavedQueryResolver::new(&store);
        let (result, logs) = capture_warnings(|| resolve(&resolver, json!({"tags": ["sports"]})));
        assert!(logs.contains(r#"recursive loop for query "q3""#), "logs: {}", logs);
        let CompositeResult::Disjunction(members) = result.unwrap() else {
            panic!("expected disjunction");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(members[0], r#"{"term":{"a":"1"}}"#);
        // q3 expands q1 and skips itself
        assert_eq!(members[1], r#"or({"term":{"a":"1"}})"#);
    }

    #[test]
    fn test_max_results_truncates() {
        let store = MapStore::with(
            (0..5)
                .map(|i| StoredQueryRecord::new(format!("q{}", i), "{}").with_tags(["t"]))
                .collect(),
        );
        let options = ResolverOptions {
            max_results: 3,
            ..ResolverOptions::default()
        };
        let resolver = SavedQueryResolver::with_options(&store, options);

        let (result, logs) = capture_warnings(|| resolve(&resolver, json!({"tags": ["t"]})));
        assert_eq!(result.unwrap().len(), 3);
        assert!(logs.contains("hit the limit of 3 results"), "logs: {}", logs);

        // Below the cap nothing is reported
        let resolver = SavedQueryResolver::new(&store);
        let (result, logs) = capture_warnings(|| resolve(&resolver, json!({"tags": ["t"]})));
        assert_eq!(result.unwrap().len(), 5);
        assert!(logs.is_empty(), "logs: {}", logs);
    }

    #[test]
    fn test_max_depth_bounds_long_chains() {
        let store = MapStore::with(
            (0..10)
                .map(|i| {
                    StoredQueryRecord::new(
                        format!("q{}", i),
                        format!(r#"{{"saved":{{"name":"q{}"}}}}"#, i + 1),
                    )
                })
                .chain(std::iter::once(StoredQueryRecord::new("q10", "{}")))
                .collect(),
        );

        let unbounded = SavedQueryResolver::with_options(
            &store,
            ResolverOptions {
                max_depth: None,
                ..ResolverOptions::default()
            },
        );
        assert_eq!(
            resolve(&unbounded, json!({"name": "q0"})).unwrap(),
            CompositeResult::Single("{}".to_string())
        );

        let bounded = SavedQueryResolver::with_options(
            &store,
            ResolverOptions {
                max_depth: Some(4),
                ..ResolverOptions::default()
            },
        );
        let err = resolve(&bounded, json!({"name": "q0"})).unwrap_err();
        assert!(matches!(err, Error::ExpansionTooDeep { ref name, limit: 4 } if name == "q4"));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ResolverOptions = serde_json::from_value(json!({"max_results": 50})).unwrap();
        assert_eq!(options.max_results, 50);
        assert_eq!(options.max_depth, Some(DEFAULT_MAX_DEPTH));
    }
}
