//! Selector compilation
//!
//! Turns a selector query document into a SQL predicate over
//! `saved_queries q`. The vocabulary is the subset of query syntax that
//! makes sense against saved query metadata:
//! - `match_all`, `match_none`
//! - `term`, `terms`, `prefix` on `name` or `tags`
//! - `exists` on `name` or `tags`
//! - `ids` (names)
//! - `bool` with `must`, `filter`, `should`, `must_not`

use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::query::reference::{scalar_text, value_kind};
use crate::{Error, Result};

/// A compiled predicate and its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Fields a selector may address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorField {
    Name,
    Tags,
}

impl SelectorField {
    fn parse(field: &str) -> Result<Self> {
        match field {
            "name" => Ok(Self::Name),
            "tags" => Ok(Self::Tags),
            other => Err(Error::UnsupportedSelector(format!(
                "field [{}] is not selectable, use name or tags",
                other
            ))),
        }
    }

    /// Wrap a condition on the field value into a predicate on `q`
    fn predicate(self, condition: &str) -> String {
        match self {
            Self::Name => format!("q.name {}", condition),
            Self::Tags => format!(
                "EXISTS (SELECT 1 FROM saved_query_tags t WHERE t.name = q.name AND t.tag {})",
                condition
            ),
        }
    }
}

/// Compile a selector document
pub fn compile(selector: &Value) -> Result<SqlPredicate> {
    let mut compiler = Compiler::default();
    let sql = compiler.node(selector)?;
    Ok(SqlPredicate {
        sql,
        params: compiler.params,
    })
}

#[derive(Default)]
struct Compiler {
    params: Vec<SqlValue>,
}

impl Compiler {
    fn node(&mut self, node: &Value) -> Result<String> {
        let (kind, body) = single_entry(node, "selector")?;
        match kind {
            "match_all" => Ok("1".to_string()),
            "match_none" => Ok("0".to_string()),
            "term" => self.term(body),
            "terms" => self.terms(body),
            "prefix" => self.prefix(body),
            "exists" => self.exists(body),
            "ids" => self.ids(body),
            "bool" => self.boolean(body),
            other => Err(Error::UnsupportedSelector(format!("[{}] query", other))),
        }
    }

    fn term(&mut self, body: &Value) -> Result<String> {
        let (field, value) = single_entry(body, "term")?;
        let field = SelectorField::parse(field)?;
        // {"field": "v"} or {"field": {"value": "v"}}
        let value = match value {
            Value::Object(inner) => inner.get("value").unwrap_or(&Value::Null),
            other => other,
        };
        let text = scalar_text(value).ok_or_else(|| {
            Error::UnsupportedSelector(format!(
                "[term] needs a scalar value, found {}",
                value_kind(value)
            ))
        })?;
        self.params.push(SqlValue::Text(text));
        Ok(field.predicate("= ?"))
    }

    fn terms(&mut self, body: &Value) -> Result<String> {
        let (field, values) = single_entry(body, "terms")?;
        let field = SelectorField::parse(field)?;
        let Value::Array(values) = values else {
            return Err(Error::UnsupportedSelector(format!(
                "[terms] needs an array, found {}",
                value_kind(values)
            )));
        };
        self.in_list(field, values)
    }

    fn ids(&mut self, body: &Value) -> Result<String> {
        match body.get("values") {
            Some(Value::Array(values)) => self.in_list(SelectorField::Name, values),
            _ => Err(Error::UnsupportedSelector("[ids] needs a values array".to_string())),
        }
    }

    fn in_list(&mut self, field: SelectorField, values: &[Value]) -> Result<String> {
        let texts: Vec<String> = values.iter().filter_map(scalar_text).collect();
        if texts.is_empty() {
            return Ok("0".to_string());
        }
        let placeholders = vec!["?"; texts.len()].join(", ");
        self.params.extend(texts.into_iter().map(SqlValue::Text));
        Ok(field.predicate(&format!("IN ({})", placeholders)))
    }

    fn prefix(&mut self, body: &Value) -> Result<String> {
        let (field, value) = single_entry(body, "prefix")?;
        let field = SelectorField::parse(field)?;
        let value = match value {
            Value::Object(inner) => inner.get("value").unwrap_or(&Value::Null),
            other => other,
        };
        let Some(prefix) = value.as_str() else {
            return Err(Error::UnsupportedSelector("[prefix] needs a string value".to_string()));
        };
        self.params.push(SqlValue::Text(format!("{}%", escape_like(prefix))));
        Ok(field.predicate("LIKE ? ESCAPE '\\'"))
    }

    fn exists(&mut self, body: &Value) -> Result<String> {
        let Some(field) = body.get("field").and_then(Value::as_str) else {
            return Err(Error::UnsupportedSelector("[exists] needs a field".to_string()));
        };
        match SelectorField::parse(field)? {
            SelectorField::Name => Ok("1".to_string()),
            SelectorField::Tags => {
                Ok("EXISTS (SELECT 1 FROM saved_query_tags t WHERE t.name = q.name)".to_string())
            }
        }
    }

    fn boolean(&mut self, body: &Value) -> Result<String> {
        let Value::Object(fields) = body else {
            return Err(Error::UnsupportedSelector("[bool] needs an object".to_string()));
        };
        for occur in fields.keys() {
            match occur.as_str() {
                "must" | "filter" | "should" | "must_not" => {}
                // Scoring knobs have no meaning for selection
                "boost" | "minimum_should_match" => {}
                other => {
                    return Err(Error::UnsupportedSelector(format!(
                        "[bool] does not support [{}]",
                        other
                    )));
                }
            }
        }

        // Params are positional: compile in the order the SQL is assembled
        let required = self.occurrences(fields, &["must", "filter"])?;
        let mut parts: Vec<String> = required.iter().map(|p| format!("({})", p)).collect();
        // should only constrains when nothing else is required
        if required.is_empty() {
            let optional = self.occurrences(fields, &["should"])?;
            if !optional.is_empty() {
                parts.push(format!("({})", optional.join(" OR ")));
            }
        }
        let excluded = self.occurrences(fields, &["must_not"])?;
        if !excluded.is_empty() {
            parts.push(format!("NOT ({})", excluded.join(" OR ")));
        }

        if parts.is_empty() {
            Ok("1".to_string())
        } else {
            Ok(parts.join(" AND "))
        }
    }

    fn occurrences(&mut self, fields: &Map<String, Value>, occurs: &[&str]) -> Result<Vec<String>> {
        let mut compiled = Vec::new();
        for occur in occurs {
            if let Some(clauses) = fields.get(*occur) {
                for clause in clause_list(clauses) {
                    compiled.push(self.node(clause)?);
                }
            }
        }
        Ok(compiled)
    }
}

/// The only key/value pair of an object
fn single_entry<'v>(value: &'v Value, context: &str) -> Result<(&'v str, &'v Value)> {
    let fields: &Map<String, Value> = value.as_object().ok_or_else(|| {
        Error::UnsupportedSelector(format!(
            "[{}] needs an object, found {}",
            context,
            value_kind(value)
        ))
    })?;
    let mut entries = fields.iter();
    match (entries.next(), entries.next()) {
        (Some((key, inner)), None) => Ok((key.as_str(), inner)),
        (None, _) => Err(Error::UnsupportedSelector(format!("[{}] is empty", context))),
        (Some(_), Some(_)) => Err(Error::UnsupportedSelector(format!(
            "[{}] must have exactly one key",
            context
        ))),
    }
}

/// A clause position may hold one clause or an array of them
fn clause_list(clauses: &Value) -> Vec<&Value> {
    match clauses {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_terms_on_tags() {
        let predicate = compile(&json!({"terms": {"tags": ["sports", "news"]}})).unwrap();
        assert_eq!(
            predicate.sql,
            "EXISTS (SELECT 1 FROM saved_query_tags t WHERE t.name = q.name AND t.tag IN (?, ?))"
        );
        assert_eq!(predicate.params, vec![text("sports"), text("news")]);
    }

    #[test]
    fn test_empty_terms_matches_nothing() {
        let predicate = compile(&json!({"terms": {"tags": []}})).unwrap();
        assert_eq!(predicate.sql, "0");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn test_term_long_form() {
        let predicate = compile(&json!({"term": {"name": {"value": "q1"}}})).unwrap();
        assert_eq!(predicate.sql, "q.name = ?");
        assert_eq!(predicate.params, vec![text("q1")]);
    }

    #[test]
    fn test_prefix_escapes_wildcards() {
        let predicate = compile(&json!({"prefix": {"name": "50%_off"}})).unwrap();
        assert_eq!(predicate.sql, "q.name LIKE ? ESCAPE '\\'");
        assert_eq!(predicate.params, vec![text("50\\%\\_off%")]);
    }

    #[test]
    fn test_bool_params_follow_clause_order() {
        let predicate = compile(&json!({
            "bool": {
                "must": [{"term": {"tags": "sports"}}],
                "must_not": {"ids": {"values": ["q9"]}}
            }
        }))
        .unwrap();
        assert_eq!(
            predicate.sql,
            "(EXISTS (SELECT 1 FROM saved_query_tags t WHERE t.name = q.name AND t.tag = ?)) AND NOT (q.name IN (?))"
        );
        assert_eq!(predicate.params, vec![text("sports"), text("q9")]);
    }

    #[test]
    fn test_bool_should_only_when_nothing_required() {
        let predicate = compile(&json!({
            "bool": {"should": [{"term": {"name": "a"}}, {"term": {"name": "b"}}]}
        }))
        .unwrap();
        assert_eq!(predicate.sql, "(q.name = ? OR q.name = ?)");

        let predicate = compile(&json!({"bool": {}})).unwrap();
        assert_eq!(predicate.sql, "1");
    }

    #[test]
    fn test_unsupported_selectors() {
        for selector in [
            json!({"match": {"name": "x"}}),
            json!({"term": {"querySource": "x"}}),
            json!({"term": {"name": "a", "tags": "b"}}),
            json!({"bool": {"nope": []}}),
            json!({}),
            json!("name"),
        ] {
            let err = compile(&selector).unwrap_err();
            assert!(matches!(err, Error::UnsupportedSelector(_)), "{}", selector);
        }
    }
}
