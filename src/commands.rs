use std::path::Path;

use crate::{OutputMode, emit_success};
use owo_colors::OwoColorize;
use savedq::config::{SavedqConfig, default_database_path_in, ensure_db_dir, write_config};
use savedq::storage::SqliteStore;
use savedq::ui::{self, Icons, banner, header, info, section, success};
use savedq::{QueryParser, ResolverOptions, StoredQueryRecord};

pub fn run_init(
    config_path: &Path,
    database: Option<&Path>,
    force: bool,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let database = database
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_database_path_in(Path::new(".")));
    let config = SavedqConfig {
        database: Some(database.display().to_string()),
        ..SavedqConfig::default()
    };

    write_config(config_path, &config, force)?;
    ensure_db_dir(&database)?;
    SqliteStore::open(&database)?;

    if output_mode.is_human() {
        header("Initialized savedq");
        success(&format!("Wrote {}", config_path.display()));
        info("Database", &database.display().to_string());
    } else {
        emit_success(
            output_mode,
            "init",
            serde_json::json!({
                "config": config_path.display().to_string(),
                "database": database.display().to_string(),
            }),
        )?;
    }
    Ok(())
}

pub fn run_put(
    store: &SqliteStore,
    name: String,
    source: String,
    tags: Vec<String>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let record = StoredQueryRecord::new(name, source).with_tags(tags);
    let replaced = store.get(&record.name)?.is_some();
    store.put(&record)?;

    if output_mode.is_human() {
        let verb = if replaced { "Replaced" } else { "Stored" };
        success(&format!("{} saved query {}", verb, record.name.bold()));
    } else {
        emit_success(
            output_mode,
            "put",
            serde_json::json!({ "record": record, "replaced": replaced }),
        )?;
    }
    Ok(())
}

pub fn run_get(store: &SqliteStore, name: &str, output_mode: OutputMode) -> anyhow::Result<()> {
    let record = store
        .get(name)?
        .ok_or_else(|| savedq::Error::UnknownSavedQuery(name.to_string()))?;

    if output_mode.is_human() {
        section(&record.name);
        let tags: Vec<_> = record.tags.iter().map(String::as_str).collect();
        info("Tags", &if tags.is_empty() { ui::dim("(none)") } else { tags.join(", ") });
        println!("{}", pretty_source(&record.query_source));
    } else {
        emit_success(output_mode, "get", serde_json::to_value(&record)?)?;
    }
    Ok(())
}

pub fn run_delete(store: &SqliteStore, name: &str, output_mode: OutputMode) -> anyhow::Result<()> {
    let removed = store.delete(name)?;

    if output_mode.is_human() {
        if removed {
            success(&format!("Deleted saved query {}", name.bold()));
        } else {
            ui::warn(&format!("No saved query named {}", name));
        }
    } else {
        emit_success(
            output_mode,
            "delete",
            serde_json::json!({ "name": name, "removed": removed }),
        )?;
    }
    Ok(())
}

pub fn run_list(
    store: &SqliteStore,
    tag: Option<&str>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let records = store.list(tag)?;

    if output_mode.is_human() {
        if records.is_empty() {
            println!("{} No saved queries found.", Icons::CROSS);
        } else {
            println!("{}", ui::queries_table(&records));
            println!("{}", ui::muted(&format!("{} saved queries", records.len())));
        }
    } else {
        emit_success(output_mode, "list", serde_json::to_value(&records)?)?;
    }
    Ok(())
}

pub fn run_expand(
    store: &SqliteStore,
    options: ResolverOptions,
    document: &str,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let parser = QueryParser::with_options(store, options);
    let tree = parser.parse(document)?;

    if output_mode.is_human() {
        banner(
            &format!("{} Expanded query", Icons::SEARCH),
            &format!("{} nodes", tree.node_count()),
        );
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        emit_success(output_mode, "expand", serde_json::to_value(&tree)?)?;
    }
    Ok(())
}

pub fn run_stats(
    store: &SqliteStore,
    database: &Path,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let stats = store.stats()?;

    if output_mode.is_human() {
        println!("{} Savedq Statistics ({})", Icons::STATS, database.display());
        let rows = [
            ("Queries", stats.queries.to_string()),
            ("Untagged", stats.untagged.to_string()),
            ("Tag assignments", stats.tag_links.to_string()),
            ("Distinct tags", stats.distinct_tags.to_string()),
        ];
        println!("{}", ui::stats_table(&rows));
    } else {
        emit_success(output_mode, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

/// Stored sources are kept verbatim; pretty-print when they parse
fn pretty_source(source: &str) -> String {
    serde_json::from_str::<serde_json::Value>(source)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| source.to_string())
}
