//! Chronoscope CLI
//!
//! Command-line interface for searching git history.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use chronoscope_core::{
    EngineConfig, GitProvider, IndexStatus, Orchestrator, ProgressSink, ProgressUpdate,
    QueryOutcome, QueryState, SearchQuery, SearchResult,
};

/// Rewrites a single progress line on stderr
struct ProgressLine;

impl ProgressSink for ProgressLine {
    fn on_progress(&self, _query_id: Uuid, update: ProgressUpdate) {
        eprint!(
            "\r{:>5.1}% {}/{} commits, {} results",
            update.percent, update.completed, update.total, update.results
        );
    }
}

/// Chronoscope - search git history
#[derive(Parser)]
#[command(name = "chronoscope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search git history by author, message, date, path, extension and content")]
struct Cli {
    /// Repository to search (any path inside it)
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Index directory (overrides CHRONOSCOPE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search query
    Search(SearchArgs),

    /// Manage the search index
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Index new commits, or everything with --full
    Build {
        #[arg(long)]
        full: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show index health and size
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Default)]
struct SearchArgs {
    /// Commit id prefix
    #[arg(long = "commit")]
    commit_id: Option<String>,

    /// Author name or email substring
    #[arg(long)]
    author: Option<String>,

    /// Author regex
    #[arg(long, conflicts_with = "author")]
    author_regex: Option<String>,

    /// Message substring
    #[arg(long)]
    message: Option<String>,

    /// Message regex
    #[arg(long, conflicts_with = "message")]
    message_regex: Option<String>,

    /// Earliest commit date (YYYY-MM-DD or RFC 3339), inclusive
    #[arg(long)]
    since: Option<String>,

    /// Latest commit date (YYYY-MM-DD or RFC 3339), inclusive
    #[arg(long)]
    until: Option<String>,

    /// Path glob, e.g. "src/**/*.rs"
    #[arg(long)]
    path: Option<String>,

    /// Path regex
    #[arg(long, conflicts_with = "path")]
    path_regex: Option<String>,

    /// File extension; repeatable
    #[arg(long = "ext")]
    extensions: Vec<String>,

    /// File content substring
    #[arg(long)]
    content: Option<String>,

    /// File content regex
    #[arg(long, conflicts_with = "content")]
    content_regex: Option<String>,

    /// Enable fuzzy matching with the given similarity threshold
    #[arg(long, num_args = 0..=1, default_missing_value = "0.8")]
    fuzzy: Option<f64>,

    /// Only commits matching every given criterion
    #[arg(long)]
    all: bool,

    #[arg(long, default_value = "0")]
    offset: usize,

    #[arg(long, default_value = "20")]
    limit: usize,

    /// Give up after this many milliseconds, keeping partial results
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Search without the persistent index
    #[arg(long)]
    no_index: bool,

    /// Show progress on stderr
    #[arg(long)]
    progress: bool,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }

    match cli.command {
        Commands::Search(args) => run_search(&cli.repo, config, args).await,
        Commands::Index { command } => match command {
            IndexCommands::Build { full, json } => run_index_build(&cli.repo, config, full, json).await,
            IndexCommands::Status { json } => run_index_status(&cli.repo, config, json),
        },
    }
}

fn orchestrator(
    repo: &Path,
    config: EngineConfig,
    indexed: bool,
    progress: bool,
) -> anyhow::Result<Orchestrator> {
    let provider = Arc::new(
        GitProvider::open(repo).with_context(|| format!("opening repository {}", repo.display()))?,
    );
    let mut builder = Orchestrator::builder(provider)
        .config(config)
        .with_default_searchers()?;
    if indexed {
        builder = builder.persistent_index();
    }
    if progress {
        builder = builder.progress_sink(Arc::new(ProgressLine));
    }
    Ok(builder.build()?)
}

/// Run search command
async fn run_search(repo: &Path, config: EngineConfig, args: SearchArgs) -> anyhow::Result<()> {
    let query = build_query(&args)?;
    let orchestrator = orchestrator(repo, config, !args.no_index, args.progress)?;
    let outcome = orchestrator.search(query).await?;
    if args.progress {
        eprintln!();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, args.offset);
    }

    if outcome.status == QueryState::Failed {
        bail!("query failed");
    }
    Ok(())
}

/// Run index build command
async fn run_index_build(repo: &Path, config: EngineConfig, full: bool, json: bool) -> anyhow::Result<()> {
    let orchestrator = orchestrator(repo, config, true, false)?;
    let report = if full {
        orchestrator.rebuild_index().await?
    } else {
        orchestrator.build_index().await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== Index Build ===".cyan().bold());
    println!();
    println!("{}: {}", "Mode".white().bold(), if report.full_rebuild { "full" } else { "incremental" });
    println!("{}: {}", "Commits Indexed".white().bold(), report.commits_indexed);
    println!("{}: {}", "Terms Added".white().bold(), report.terms_added);
    println!("{}: {}ms", "Duration".white().bold(), report.duration_ms);
    println!("{}: {}", "Generation".white().bold(), report.generation);
    Ok(())
}

/// Run index status command
fn run_index_status(repo: &Path, config: EngineConfig, json: bool) -> anyhow::Result<()> {
    let orchestrator = orchestrator(repo, config, true, false)?;
    let status = orchestrator.index_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_index_status(&status);
    }
    Ok(())
}

fn build_query(args: &SearchArgs) -> anyhow::Result<SearchQuery> {
    let mut builder = SearchQuery::builder()
        .offset(args.offset)
        .limit(args.limit)
        .require_all(args.all);

    if let Some(prefix) = &args.commit_id {
        builder = builder.commit_id(prefix);
    }
    if let Some(author) = &args.author {
        builder = builder.author(author);
    }
    if let Some(author) = &args.author_regex {
        builder = builder.author_regex(author);
    }
    if let Some(message) = &args.message {
        builder = builder.message(message);
    }
    if let Some(message) = &args.message_regex {
        builder = builder.message_regex(message);
    }
    if let Some(since) = &args.since {
        builder = builder.since(parse_date(since, false)?);
    }
    if let Some(until) = &args.until {
        builder = builder.until(parse_date(until, true)?);
    }
    if let Some(glob) = &args.path {
        builder = builder.path_glob(glob);
    }
    if let Some(regex) = &args.path_regex {
        builder = builder.path_regex(regex);
    }
    if !args.extensions.is_empty() {
        builder = builder.extensions(args.extensions.iter().map(String::as_str));
    }
    if let Some(content) = &args.content {
        builder = builder.content(content);
    }
    if let Some(content) = &args.content_regex {
        builder = builder.content_regex(content);
    }
    if let Some(threshold) = args.fuzzy {
        builder = builder.fuzzy(threshold);
    }
    if let Some(ms) = args.timeout_ms {
        builder = builder.max_duration(Duration::from_millis(ms));
    }

    Ok(builder.build()?)
}

/// A date or timestamp; bare dates cover the whole day
fn parse_date(raw: &str, end_of_day: bool) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}': expected YYYY-MM-DD or RFC 3339"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .context("invalid time of day")?;
    Ok(date.and_time(time).and_utc())
}

fn print_outcome(outcome: &QueryOutcome, offset: usize) {
    let status = match outcome.status {
        QueryState::Completed => "COMPLETED".green().bold(),
        QueryState::Cancelled | QueryState::TimedOut => outcome.status.to_string().to_uppercase().yellow().bold(),
        _ => outcome.status.to_string().to_uppercase().red().bold(),
    };

    if outcome.results.is_empty() {
        println!("{}", "No matches found.".dimmed());
    }
    for (i, result) in outcome.results.iter().enumerate() {
        print_result(offset + i + 1, result);
    }

    println!();
    println!(
        "{} {} of {} matches in {}ms{}",
        status,
        outcome.results.len(),
        outcome.total_matches,
        outcome.elapsed.as_millis(),
        if outcome.from_cache { " (cached)" } else { "" }
    );
    for warning in &outcome.warnings {
        println!("  {} {}", "!".yellow().bold(), warning.yellow());
    }
    for error in &outcome.errors {
        println!("  {} {}: {}", "x".red().bold(), error.searcher.red(), error.message);
    }
}

fn print_result(rank: usize, result: &SearchResult) {
    let id = &result.commit_id[..result.commit_id.len().min(10)];
    println!(
        "{:>3}. {} {:.3} {} {}",
        rank,
        id.yellow(),
        result.score,
        result.commit_time.format("%Y-%m-%d").to_string().dimmed(),
        result.summary.white().bold()
    );
    if let Some(path) = &result.file_path {
        match result.line_number {
            Some(line) => println!("     {}:{}", path.cyan(), line),
            None => println!("     {}", path.cyan()),
        }
    }
    if let Some(snippet) = &result.snippet {
        println!("     {}", snippet.dimmed());
    }
}

fn print_index_status(status: &IndexStatus) {
    println!("{}", "=== Index Status ===".cyan().bold());
    println!();
    let health = if status.healthy { "HEALTHY".green().bold() } else { "NEEDS REBUILD".red().bold() };
    println!("{}: {}", "Status".white().bold(), health);
    if let Some(location) = &status.location {
        println!("{}: {}", "Location".white().bold(), location.display());
    }
    println!(
        "{}: {}",
        "Last Indexed Commit".white().bold(),
        status.last_indexed_commit.as_deref().unwrap_or("none")
    );
    println!("{}: {}", "Generation".white().bold(), status.generation);
    println!("{}: {}", "Commits".white().bold(), status.commit_count);
    println!("{}: {}", "Documents".white().bold(), status.document_count);
    println!("{}: {}", "Terms".white().bold(), status.term_count);
    println!("{}: {}", "Postings".white().bold(), status.posting_count);
    println!("{}: {:.1}", "Avg Document Length".white().bold(), status.average_document_length);
    if let Some(build) = &status.last_build {
        println!(
            "{}: {} ({} commits, {}ms)",
            "Last Build".white().bold(),
            build.completed_at.format("%Y-%m-%d %H:%M:%S"),
            build.commits_indexed,
            build.duration_ms
        );
    }
}
