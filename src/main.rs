//! rustwos - corresponding-author scraper for paper spreadsheets
//!
//! ## Usage
//!
//! ### Scrape corresponding authors
//! ```bash
//! rustwos scrape papers.csv --mode skip_marked --output papers_with_authors.csv
//! ```
//!
//! ### Mark them in the author list
//! ```bash
//! rustwos mark papers_with_authors.csv --output papers_marked.csv
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rustwos::annotate;
use rustwos::batch::{self, BatchOptions, RunMode};
use rustwos::cookies::CookieManager;
use rustwos::extractor::{PolitenessDelay, SessionOptions, WosSessionFactory};
use rustwos::records::{ColumnNames, PaperTable};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Web of Science corresponding-author scraper and author-list annotator
#[derive(Parser)]
#[command(name = "rustwos")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up corresponding authors for every paper
    Scrape {
        /// Input CSV with title and author columns
        input: PathBuf,

        /// complete: reprocess every row; skip_marked: skip rows already annotated
        #[arg(long, value_enum, default_value_t = ModeArg::SkipMarked)]
        mode: ModeArg,

        /// Final output CSV
        #[arg(short, long, default_value = "papers_with_authors.csv")]
        output: PathBuf,

        /// Progress file written during the run
        #[arg(long, default_value = "papers_progress.csv")]
        checkpoint: PathBuf,

        /// Save progress after this many rows
        #[arg(long, default_value = "5")]
        checkpoint_interval: usize,

        /// Proxy URL (e.g., http://127.0.0.1:7890)
        #[arg(long)]
        proxy: Option<String>,

        /// Mirror site URL
        #[arg(long)]
        base_url: Option<String>,

        /// Cookie file (default: ~/.wos_cookies.json)
        #[arg(long)]
        cookie_file: Option<PathBuf>,

        /// Minimum pause before each request, in milliseconds
        #[arg(long, default_value = "2000")]
        min_delay_ms: u64,

        /// Maximum pause before each request, in milliseconds
        #[arg(long, default_value = "5000")]
        max_delay_ms: u64,

        /// Seconds to wait for a CAPTCHA to be solved before retrying (0 fails at once)
        #[arg(long, default_value = "30")]
        captcha_wait_secs: u64,

        #[command(flatten)]
        columns: ColumnArgs,
    },

    /// Mark corresponding authors with '*' and drop the helper columns
    Mark {
        /// CSV produced by `scrape`
        input: PathBuf,

        /// Output CSV
        #[arg(short, long, default_value = "papers_marked.csv")]
        output: PathBuf,

        #[command(flatten)]
        columns: ColumnArgs,
    },

    /// Manage cookies
    Cookies {
        /// Cookie file (default: ~/.wos_cookies.json)
        #[arg(long, global = true)]
        cookie_file: Option<PathBuf>,

        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Complete,
    #[value(name = "skip_marked")]
    SkipMarked,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Complete => RunMode::Complete,
            ModeArg::SkipMarked => RunMode::SkipMarked,
        }
    }
}

#[derive(Args)]
struct ColumnArgs {
    /// Title column name
    #[arg(long, default_value = "title")]
    title_column: String,

    /// Full author list column name
    #[arg(long, default_value = "authors")]
    authors_column: String,

    /// Corresponding author column name
    #[arg(long, default_value = "corresponding_authors")]
    corresponding_column: String,

    /// Processing status column name
    #[arg(long, default_value = "status")]
    status_column: String,
}

impl From<ColumnArgs> for ColumnNames {
    fn from(args: ColumnArgs) -> Self {
        Self {
            title: args.title_column,
            authors: args.authors_column,
            corresponding: args.corresponding_column,
            status: args.status_column,
        }
    }
}

#[derive(Subcommand)]
enum CookieAction {
    /// Clear stored cookies
    Clear,
    /// Show cookie file path
    Path,
    /// Read a JSON cookie array from stdin and store it
    Import,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_file.as_deref())?;

    let outcome = match cli.command {
        Commands::Scrape {
            input,
            mode,
            output,
            checkpoint,
            checkpoint_interval,
            proxy,
            base_url,
            cookie_file,
            min_delay_ms,
            max_delay_ms,
            captcha_wait_secs,
            columns,
        } => {
            let session_options = SessionOptions {
                base_url,
                proxy,
                delay: PolitenessDelay::new(
                    Duration::from_millis(min_delay_ms),
                    Duration::from_millis(max_delay_ms),
                ),
                cookie_file,
                captcha_wait: Duration::from_secs(captcha_wait_secs),
                ..Default::default()
            };
            let batch_options = BatchOptions {
                mode: mode.into(),
                checkpoint_path: checkpoint,
                checkpoint_interval,
                columns: columns.into(),
                ..Default::default()
            };
            run_scrape(&input, &output, session_options, batch_options).await
        }
        Commands::Mark {
            input,
            output,
            columns,
        } => run_mark(&input, &output, &columns.into()),
        Commands::Cookies {
            cookie_file,
            action,
        } => handle_cookies(action, cookie_file),
    };

    if let Err(e) = &outcome {
        error!(error = %format!("{:#}", e), "Run failed");
    }
    outcome
}

/// Console logging, plus a plain-text copy in `log_file` when given.
fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::io::stdout.and(Mutex::new(file)))
                .init();
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .init();
        }
    }
    Ok(())
}

// ============================================================================
// Scrape
// ============================================================================

async fn run_scrape(
    input: &Path,
    output: &Path,
    session_options: SessionOptions,
    batch_options: BatchOptions,
) -> Result<()> {
    let mut table = PaperTable::load(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    println!("Loaded {} papers from {}", table.len(), input.display());
    println!("Mode: {}", batch_options.mode);

    let factory = WosSessionFactory::new(session_options);
    let summary = batch::run_batch(&mut table, &factory, &batch_options)
        .await
        .with_context(|| {
            format!(
                "Scrape aborted; progress is in {}",
                batch_options.checkpoint_path.display()
            )
        })?;

    table
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("\n========== Scrape complete ==========");
    println!("Total papers:    {}", summary.total);
    println!("Succeeded:       {}", summary.success);
    println!("Failed:          {}", summary.failed);
    println!("Already marked:  {}", summary.already_marked);
    println!("Skipped (empty): {}", summary.skipped);
    if !summary.failed_rows.is_empty() {
        let rows: Vec<String> = summary.failed_rows.iter().map(|r| r.to_string()).collect();
        println!("Failed rows:     {}", rows.join(", "));
    }
    println!("Elapsed:         {}", summary.elapsed_display());
    println!("\n✓ Results in: {}", output.display());
    Ok(())
}

// ============================================================================
// Mark
// ============================================================================

fn run_mark(input: &Path, output: &Path, columns: &ColumnNames) -> Result<()> {
    let mut table = PaperTable::load(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let authors = table.require_column(&columns.authors)?;
    let changed = match table.column_index(&columns.corresponding) {
        Some(corresponding) => annotate::mark_table(&mut table, authors, corresponding),
        None => {
            info!(column = %columns.corresponding, "No corresponding-author column, nothing to mark");
            0
        }
    };

    for column in [&columns.corresponding, &columns.status] {
        if table.drop_column(column) {
            println!("Dropped column '{}'", column);
        }
    }

    table
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Marked corresponding authors in {} of {} rows. Saved: {}",
        changed,
        table.len(),
        output.display()
    );
    Ok(())
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: CookieAction, cookie_file: Option<PathBuf>) -> Result<()> {
    let manager = CookieManager::from_path_or_default(cookie_file);

    match action {
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
        }
        CookieAction::Import => {
            println!("Export cookies for webofscience.clarivate.cn from your browser");
            println!("and paste them as a JSON array, then press Enter:");
            println!("Format: [{{\"name\":\"SID\",\"value\":\"xxx\",\"domain\":\".clarivate.cn\"}},...]");

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            let input = input.trim();
            if input.is_empty() {
                println!("No cookies provided.");
                return Ok(());
            }

            let count = manager
                .import_json(input)
                .context("Failed to parse cookies; expected a JSON array")?;
            println!("Saved {} cookies to {:?}", count, manager.path());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookies_accepts_cookie_file() -> Result<()> {
        let cli = Cli::try_parse_from([
            "rustwos",
            "cookies",
            "import",
            "--cookie-file",
            "/tmp/wos.json",
        ])?;
        match cli.command {
            Commands::Cookies {
                cookie_file,
                action: CookieAction::Import,
            } => assert_eq!(cookie_file, Some(PathBuf::from("/tmp/wos.json"))),
            _ => panic!("expected cookies import"),
        }
        Ok(())
    }

    #[test]
    fn test_scrape_captcha_wait_default() -> Result<()> {
        let cli = Cli::try_parse_from(["rustwos", "scrape", "papers.csv"])?;
        match cli.command {
            Commands::Scrape {
                captcha_wait_secs,
                mode,
                ..
            } => {
                assert_eq!(captcha_wait_secs, 30);
                assert_eq!(RunMode::from(mode), RunMode::SkipMarked);
            }
            _ => panic!("expected scrape"),
        }
        Ok(())
    }
}
