//! fileindex - Builds a persistent, hashed index of every file under a directory.
//!
//! Usage:
//!   fidx scan [PATH]         Index a directory (home directory by default)
//!   fidx recent              List the most recently modified indexed files
//!   fidx extensions          List the extensions present in the index
//!   fidx clear               Remove every record from the index
//!   fidx --help              Show help

mod settings;

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, OptionExt, Result, bail};
use itertools::Itertools;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing_subscriber::EnvFilter;

use fileindex_core::{DEMO_CAP, IndexStore, ScanConfig, ScanMetadata, ScanOutcome};
use fileindex_scan::{JobController, JobStatus};
use fileindex_store::SqliteStore;

use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "fileindex",
    version,
    about = "Builds a persistent, hashed index of every file under a directory",
    long_about = "fileindex walks a directory tree and records the path, size, timestamps \
                  and BLAKE3 content hash of every file in a SQLite database.\n\n\
                  Rescanning a tree updates records in place; nothing is duplicated."
)]
struct Cli {
    /// Index database (overrides the settings file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Settings file (defaults to <config dir>/fileindex/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a directory tree
    Scan(ScanArgs),

    /// List the most recently modified indexed files
    Recent {
        /// Number of files to list
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the distinct extensions in the index
    Extensions {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove every record from the index
    Clear,
}

#[derive(Args)]
struct ScanArgs {
    /// Directory to index (defaults to the settings root, then $HOME)
    path: Option<PathBuf>,

    /// Stop after the demo cap of files
    #[arg(long, conflicts_with = "cap")]
    demo: bool,

    /// Stop after this many files
    #[arg(long)]
    cap: Option<u64>,

    /// Clear the index before scanning
    #[arg(long)]
    wipe: bool,

    /// Skip hidden files and directories
    #[arg(long)]
    no_hidden: bool,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Glob pattern for names to skip (repeatable)
    #[arg(short, long = "ignore")]
    ignore: Vec<String>,

    /// Threads for directory reads (0 = auto)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Print the final metadata as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    match cli.command {
        Command::Scan(args) => run_scan(&settings, args).await?,
        Command::Recent { limit, format } => run_recent(&settings, limit, format)?,
        Command::Extensions { format } => run_extensions(&settings, format)?,
        Command::Clear => run_clear(&settings)?,
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let default_filter =
        format!("fileindex={level},fileindex_scan={level},fileindex_store={level}");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(settings: &Settings) -> Result<Arc<SqliteStore>> {
    if let Some(parent) = settings.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&settings.db_path)
        .with_context(|| format!("Failed to open index {}", settings.db_path.display()))?;
    Ok(Arc::new(store))
}

/// Run one indexing job, showing live progress until it ends.
async fn run_scan(settings: &Settings, args: ScanArgs) -> Result<()> {
    let store = open_store(settings)?;
    let controller = JobController::new(store.clone());
    controller
        .clear_and_reinitialize(args.wipe)
        .context("Failed to prepare the index")?;

    let root = settings
        .resolve_root(args.path)
        .ok_or_eyre("No directory given and no home directory found")?;
    let max_files = match (args.cap, args.demo || settings.demo_mode) {
        (Some(cap), _) => Some(cap),
        (None, true) => Some(DEMO_CAP),
        (None, false) => None,
    };
    let ignore_patterns = settings
        .ignore_patterns
        .iter()
        .cloned()
        .chain(args.ignore)
        .collect::<Vec<_>>();

    let config = ScanConfig::builder()
        .root(root)
        .max_files(max_files)
        .include_hidden(settings.include_hidden && !args.no_hidden)
        .follow_symlinks(settings.follow_symlinks || args.follow_symlinks)
        .ignore_patterns(ignore_patterns)
        .exclude_paths(database_files(store.path())?)
        .threads(args.threads)
        .build()
        .context("Invalid scan configuration")?;

    eprintln!("Scanning {}...", config.root.display());
    controller.start_with_config(config)?;

    let status = follow_job(&controller, tokio::signal::ctrl_c(), print_progress).await;
    eprintln!();

    let meta = status.metadata.ok_or_eyre("Scan finished without metadata")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&*meta)?);
    } else {
        print_summary(&meta, store.count()?);
    }

    if let Some(ScanOutcome::Failed { message }) = &meta.outcome {
        bail!("Scan failed: {message}");
    }
    Ok(())
}

/// Relay status updates until the job ends. The first completion of `stop`
/// asks the job to stop; it is polled in place so a signal is never missed.
async fn follow_job<S, F>(controller: &JobController, stop: S, mut on_update: F) -> JobStatus
where
    S: Future,
    F: FnMut(&JobStatus),
{
    let mut updates = WatchStream::new(controller.subscribe());
    tokio::pin!(stop);
    let mut stop_sent = false;
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(status) => {
                    on_update(&status);
                    if !status.is_active() {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut stop, if !stop_sent => {
                stop_sent = true;
                eprintln!();
                eprintln!("Stopping after the current file...");
                controller.request_stop();
            }
        }
    }
    controller.wait_until_idle().await
}

/// The database file and the sidecar files SQLite keeps next to it.
fn database_files(db_path: &Path) -> Result<Vec<PathBuf>> {
    let db_path = db_path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", db_path.display()))?;
    let mut files = vec![db_path.clone()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = OsString::from(db_path.as_os_str());
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    Ok(files)
}

fn print_progress(status: &JobStatus) {
    let Some(meta) = status.metadata.as_deref() else {
        return;
    };
    eprint!(
        "\r [{}] {} files, {} indexed, {} skipped",
        status.state,
        meta.file_count,
        format_size(meta.bytes_indexed),
        meta.skipped
    );
    let _ = std::io::stderr().flush();
}

fn print_summary(meta: &ScanMetadata, total_records: u64) {
    let outcome = match &meta.outcome {
        Some(ScanOutcome::Completed) => "completed".to_string(),
        Some(ScanOutcome::CapReached) => "stopped at file cap".to_string(),
        Some(ScanOutcome::Stopped) => "stopped on request".to_string(),
        Some(ScanOutcome::Failed { message }) => format!("failed: {message}"),
        None => "unfinished".to_string(),
    };

    println!("{}", "─".repeat(60));
    println!(" {} - {}", meta.root.display(), outcome);
    println!(
        " {} files indexed ({}), {} without hash, {} skipped",
        meta.file_count,
        format_size(meta.bytes_indexed),
        meta.hash_failures,
        meta.skipped
    );
    println!(
        " Scanned in {:.2}s, {} records in index",
        meta.elapsed().num_milliseconds() as f64 / 1000.0,
        total_records
    );
    println!("{}", "─".repeat(60));

    if meta.file_type_histogram.is_empty() {
        return;
    }
    println!();
    println!(" File types:");
    for (ext, count) in meta
        .file_type_histogram
        .iter()
        .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
    {
        println!("   {:<16} {:>8}", display_extension(ext), count);
    }
}

/// List the most recently modified files.
fn run_recent(settings: &Settings, limit: usize, format: OutputFormat) -> Result<()> {
    let store = open_store(settings)?;
    let records = store.list_recent(limit)?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!(" Index is empty.");
                return Ok(());
            }
            println!(
                " {:<32} {:>10}  {:<20}  Path",
                "Name", "Size", "Modified"
            );
            println!("{}", "─".repeat(100));
            for record in &records {
                println!(
                    " {:<32} {:>10}  {:<20}  {}",
                    truncate(&record.name, 32),
                    format_size(record.size),
                    record.modified.format("%Y-%m-%d %H:%M:%S"),
                    record.path.display()
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// List the extensions present in the index.
fn run_extensions(settings: &Settings, format: OutputFormat) -> Result<()> {
    let store = open_store(settings)?;
    let extensions = store.list_distinct_extensions()?;

    match format {
        OutputFormat::Text => {
            for ext in &extensions {
                println!("{}", display_extension(ext));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&extensions)?);
        }
    }

    Ok(())
}

/// Empty the index.
fn run_clear(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let before = store.count()?;
    JobController::new(store)
        .clear_and_reinitialize(true)
        .context("Failed to clear the index")?;
    eprintln!("Removed {before} records from {}", settings.db_path.display());
    Ok(())
}

fn display_extension(ext: &str) -> &str {
    if ext.is_empty() { "(none)" } else { ext }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
