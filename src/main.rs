//! Savedq CLI - manage saved queries and expand query documents

mod commands;

use clap::{Parser, Subcommand};
use savedq::config::{default_config_path, ensure_db_dir, load_config};
use savedq::storage::SqliteStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "savedq")]
#[command(version)]
#[command(about = "Saved query store and resolver - expand named and tagged query references")]
#[command(long_about = r#"
Savedq stores query documents under a name and optional tags, and expands
"saved" references inside other query documents:
  { "saved": { "name": "mySavedQuery" } }
  { "saved": { "tags": ["cookery", "sports"] } }
  { "saved": { "query": { "prefix": { "name": "report_" } } } }

Example usage:
  savedq put --name q1 --source '{"term":{"field":"x"}}' --tag sports
  savedq expand --query '{"saved":{"tags":["sports"]}}'
  savedq list --tag sports
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Store or replace a saved query
    Put {
        /// Unique name of the saved query
        #[arg(short, long)]
        name: String,

        /// Query document as JSON
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        source: Option<String>,

        /// Read the query document from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Show a saved query
    Get {
        /// Name of the saved query
        name: String,
    },

    /// Delete a saved query
    Delete {
        /// Name of the saved query
        name: String,
    },

    /// List saved queries
    List {
        /// Only queries carrying this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Expand every saved reference in a query document
    Expand {
        /// Query document as JSON
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        query: Option<String>,

        /// Read the query document from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum saved queries expanded per tag/query reference
        #[arg(long)]
        max_results: Option<usize>,

        /// Maximum saved query nesting depth
        #[arg(long, conflicts_with = "no_depth_limit")]
        max_depth: Option<usize>,

        /// Rely on cycle detection alone
        #[arg(long)]
        no_depth_limit: bool,
    },

    /// Show statistics about the saved query store
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

pub fn emit_success(
    output_mode: OutputMode,
    command: &str,
    data: serde_json::Value,
) -> anyhow::Result<()> {
    if !output_mode.is_human() {
        let envelope = serde_json::json!({
            "ok": true,
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

fn emit_error(command: &str, error: &anyhow::Error) {
    let envelope = serde_json::json!({
        "ok": false,
        "command": command,
        "error": error.to_string(),
    });
    println!("{}", envelope);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let command_name = command_name(&cli.command);

    match run(cli, output_mode) {
        Ok(()) => Ok(()),
        Err(e) if !output_mode.is_human() => {
            emit_error(command_name, &e);
            std::process::exit(1);
        }
        Err(e) => {
            savedq::ui::error(&e.to_string());
            std::process::exit(1);
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init { .. } => "init",
        Commands::Put { .. } => "put",
        Commands::Get { .. } => "get",
        Commands::Delete { .. } => "delete",
        Commands::List { .. } => "list",
        Commands::Expand { .. } => "expand",
        Commands::Stats => "stats",
    }
}

fn run(cli: Cli, output_mode: OutputMode) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);

    if let Commands::Init { force } = cli.command {
        return commands::run_init(&config_path, cli.database.as_deref(), force, output_mode);
    }

    let config = load_config(Some(&config_path))?.unwrap_or_default();
    let database = cli
        .database
        .unwrap_or_else(|| config.database_path(Path::new(".")));
    ensure_db_dir(&database)?;
    tracing::debug!("Using database {}", database.display());
    let store = SqliteStore::open(&database)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Put { name, source, file, tags } => {
            let source = read_document(source, file)?;
            commands::run_put(&store, name, source, tags, output_mode)
        }

        Commands::Get { name } => commands::run_get(&store, &name, output_mode),

        Commands::Delete { name } => commands::run_delete(&store, &name, output_mode),

        Commands::List { tag } => commands::run_list(&store, tag.as_deref(), output_mode),

        Commands::Expand { query, file, max_results, max_depth, no_depth_limit } => {
            let document = read_document(query, file)?;
            let mut options = config.resolver.clone();
            if let Some(max_results) = max_results {
                options.max_results = max_results;
            }
            if no_depth_limit {
                options.max_depth = None;
            } else if max_depth.is_some() {
                options.max_depth = max_depth;
            }
            commands::run_expand(&store, options, &document, output_mode)
        }

        Commands::Stats => commands::run_stats(&store, &database, output_mode),
    }
}

/// Inline JSON argument or file contents
fn read_document(inline: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    match (inline, file) {
        (Some(inline), _) => Ok(inline),
        (None, Some(path)) => Ok(std::fs::read_to_string(&path)?),
        (None, None) => anyhow::bail!("either an inline document or --file is required"),
    }
}
