//! Tender analytics: aggregation compilation for the search engine and
//! tabular export of tender documents.
//!
//! The library half is [`analytics`] and [`export`]; the `tenders` binary is
//! a thin CLI over both, defined here so it can be tested in-process.

pub mod analytics;
pub mod config;
pub mod export;
pub mod model;

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::analytics::{
    AggregationCompiler, AggregationError, AggregationRef, CATALOG, ParseContext, QueryFilter,
    StatsQuery,
};
use crate::config::{AppConfig, ConfigError};
use crate::export::{ColumnCodec, EntityKind, ExportEngine, ExportError};

// =============================================================================
// CLI definition
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tenders",
    version,
    about = "Compile tender statistics queries and export tenders to CSV"
)]
pub struct Cli {
    /// Machine-readable output (JSON on stdout, JSON errors on stderr)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.config/tenders/config.toml)
    #[arg(long, global = true, env = config::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the aggregation catalog
    Aggregations,

    /// Print the engine request for a set of aggregations
    Request {
        /// Aggregation id, or `id:name[,key=weight...]` for parameterized ones
        #[arg(long = "agg", required = true, value_parser = <AggregationRef as std::str::FromStr>::from_str)]
        aggs: Vec<AggregationRef>,

        /// JSON file with an array of query filters
        #[arg(long)]
        filters: Option<PathBuf>,
    },

    /// Normalize an engine response into flat statistics
    Parse {
        #[arg(long = "agg", required = true, value_parser = <AggregationRef as std::str::FromStr>::from_str)]
        aggs: Vec<AggregationRef>,

        #[arg(long)]
        filters: Option<PathBuf>,

        /// JSON file with the engine's raw response
        #[arg(long)]
        answer: PathBuf,

        /// Entries kept in top-N lists (overrides config)
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Flatten JSON-lines tender documents into CSV
    Export {
        /// Input file, one JSON document per line (stdin when omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t)]
        entity: EntityKind,
    },

    /// Print the CSV header of an entity kind
    Header {
        #[arg(long, value_enum, default_value_t)]
        entity: EntityKind,
    },
}

// =============================================================================
// Errors
// =============================================================================

/// A CLI failure with its process exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn new(code: i32, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            hint: None,
            retryable: false,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn io(err: anyhow::Error) -> Self {
        Self::new(1, "io", format!("{err:#}"))
    }

    pub fn to_json(&self) -> Value {
        json!({ "error": self })
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\nhint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CliError {}

impl From<AggregationError> for CliError {
    fn from(err: AggregationError) -> Self {
        if err.is_structural() {
            let hint = match &err {
                AggregationError::UnknownAggregation(_) => {
                    Some("run `tenders aggregations` to list valid ids")
                }
                AggregationError::MissingParameter { .. } => {
                    Some("pass parameters as `--agg id:name[,key=weight...]`")
                }
                _ => None,
            };
            let cli = Self::new(2, "aggregation", err.to_string());
            match hint {
                Some(hint) => cli.with_hint(hint),
                None => cli,
            }
        } else {
            Self::new(3, "malformed-answer", err.to_string())
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::new(1, "config", err.to_string())
    }
}

impl From<ExportError> for CliError {
    fn from(err: ExportError) -> Self {
        let retryable = matches!(err, ExportError::Cancelled(_));
        let mut cli = Self::new(1, "export", err.to_string());
        cli.retryable = retryable;
        cli
    }
}

// =============================================================================
// Parsing and dispatch
// =============================================================================

#[derive(Debug, Clone)]
pub struct ParsedCli {
    pub cli: Cli,
}

/// Parse raw process arguments.
///
/// Help and version requests come back as an error with code 0 whose message
/// is the text to print.
pub fn parse_cli(raw_args: Vec<String>) -> Result<ParsedCli, CliError> {
    match Cli::try_parse_from(raw_args) {
        Ok(cli) => Ok(ParsedCli { cli }),
        Err(err) => {
            use clap::error::ErrorKind;
            let code = match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 2,
            };
            Err(CliError::new(code, "usage", err.render().to_string()))
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` applies unless `-v` is given.
pub fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let cli = parsed.cli;
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    debug!(?config, "loaded configuration");

    let Some(command) = cli.command else {
        return Err(CliError::new(2, "usage", "no command given")
            .with_hint("run `tenders --help` for the list of commands"));
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        Commands::Aggregations => list_aggregations(&mut out, cli.json),
        Commands::Request { aggs, filters } => {
            let query = stats_query(&aggs, filters.as_deref())?;
            print_json(&mut out, &query.body()?)
        }
        Commands::Parse {
            aggs,
            filters,
            answer,
            top_n,
        } => {
            let query = stats_query(&aggs, filters.as_deref())?;
            let response = read_json(&answer).map_err(CliError::io)?;
            let ctx = ParseContext {
                top_n: top_n.unwrap_or(config.analytics.top_n),
                total_hits: None,
            };
            let stats = query.normalize(&response, &ctx)?;
            print_json(&mut out, &json!(stats))
        }
        Commands::Export {
            input,
            output,
            entity,
        } => run_export(&config, entity, input.as_deref(), output.as_deref(), cli.json),
        Commands::Header { entity } => {
            let header = entity.block().header();
            if cli.json {
                print_json(&mut out, &json!(header))
            } else {
                let codec = ColumnCodec::new(config.export.codec.clone());
                write_out(&mut out, &codec.encode_line(&header))
            }
        }
    }
}

fn stats_query(aggs: &[AggregationRef], filters: Option<&Path>) -> Result<StatsQuery, CliError> {
    let filters: Vec<QueryFilter> = match filters {
        Some(path) => {
            let value = read_json(path).map_err(CliError::io)?;
            serde_json::from_value(value).map_err(|e| {
                CliError::new(2, "usage", format!("invalid filters in {}: {e}", path.display()))
            })?
        }
        None => Vec::new(),
    };
    Ok(StatsQuery::new(&AggregationCompiler::default(), aggs, filters)?)
}

fn list_aggregations(out: &mut impl Write, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let entries: Vec<Value> = CATALOG
            .specs()
            .map(|spec| {
                json!({
                    "id": spec.id,
                    "parameterized": spec.is_parameterized(),
                    "description": spec.kind.description(),
                })
            })
            .collect();
        return print_json(out, &json!(entries));
    }
    let mut text = String::new();
    for spec in CATALOG.specs() {
        let marker = if spec.is_parameterized() { " (param)" } else { "" };
        text.push_str(&format!(
            "{:<24}{}\n",
            format!("{}{marker}", spec.id),
            spec.kind.description()
        ));
    }
    write_out(out, &text)
}

fn run_export(
    config: &AppConfig,
    entity: EntityKind,
    input: Option<&Path>,
    output: Option<&Path>,
    as_json: bool,
) -> Result<(), CliError> {
    let codec = ColumnCodec::new(config.export.codec.clone());
    let engine = ExportEngine::new(entity.block(), codec).with_batch_size(config.export.batch_size);
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path)
                .with_context(|| format!("opening {}", path.display()))
                .map_err(CliError::io)?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };
    let progress = |records: usize, rows: usize| debug!(records, rows, "export progress");

    let stats = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))
                .map_err(CliError::io)?;
            engine.execute(reader, file, progress, None)?
        }
        None => engine.execute(reader, std::io::stdout().lock(), progress, None)?,
    };
    info!(%entity, rows = stats.rows_written, "export complete");

    if output.is_some() {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if as_json {
            print_json(
                &mut out,
                &json!({
                    "records_read": stats.records_read,
                    "records_skipped": stats.records_skipped,
                    "rows_written": stats.rows_written,
                }),
            )?;
        } else {
            write_out(
                &mut out,
                &format!(
                    "exported {} rows from {} records ({} skipped)\n",
                    stats.rows_written, stats.records_read, stats.records_skipped
                ),
            )?;
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing JSON in {}", path.display()))
}

fn print_json(out: &mut impl Write, value: &Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .context("serializing output")
        .map_err(CliError::io)?;
    write_out(out, &format!("{text}\n"))
}

fn write_out(out: &mut impl Write, text: &str) -> Result<(), CliError> {
    out.write_all(text.as_bytes())
        .context("writing to stdout")
        .map_err(CliError::io)
}
