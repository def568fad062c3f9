use owo_colors::OwoColorize;
use tabled::{settings::Style, Table, Tabled};

use crate::record::StoredQueryRecord;
use crate::ui::{theme, Icons};

/// Longest query source shown in a listing before it is cut
const SOURCE_PREVIEW_CHARS: usize = 60;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
pub struct QueryRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Tags")]
    pub tags: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

impl QueryRow {
    fn from_record(record: &StoredQueryRecord) -> Self {
        let tags = if record.tags.is_empty() {
            String::new()
        } else {
            let joined: Vec<_> = record.tags.iter().map(String::as_str).collect();
            format!("{} {}", Icons::TAG, joined.join(", ").style(theme().tag.clone()))
        };
        Self {
            name: record.name.style(theme().query_name.clone()).to_string(),
            tags,
            source: preview(&record.query_source),
        }
    }
}

pub fn queries_table(records: &[StoredQueryRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let rows: Vec<_> = records.iter().map(QueryRow::from_record).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    if stats.is_empty() {
        return String::new();
    }
    let rows: Vec<_> = stats
        .iter()
        .map(|(label, value)| TableRow {
            metric: label.to_string(),
            value: value.clone(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Single-line, length-capped view of a query source
fn preview(source: &str) -> String {
    let compact: String = source.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= SOURCE_PREVIEW_CHARS {
        return compact;
    }
    let cut: String = compact.chars().take(SOURCE_PREVIEW_CHARS - 1).collect();
    format!("{}…", cut)
}
