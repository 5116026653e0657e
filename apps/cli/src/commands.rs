//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use mfdocs_core::{ArtifactOutcome, ProgressReporter, RunSummary};
use mfdocs_shared::{AppConfig, DocumentType, RunConfig, init_config, load_config};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// mfdocs — download KIM and SID documents for every listed mutual fund.
#[derive(Parser)]
#[command(
    name = "mfdocs",
    version,
    about = "Resumable downloader for mutual-fund KIM and SID documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Walk the portal and download every fund's documents, resuming if possible.
    Run {
        /// Directory for downloaded PDFs (defaults to config, then `downloads`).
        #[arg(short, long)]
        download_dir: Option<PathBuf>,

        /// Progress checkpoint file.
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Show the browser window.
        #[arg(long)]
        headed: bool,

        /// Path to the Chrome/Chromium executable.
        #[arg(long, env = "MFDOCS_CHROME")]
        chrome: Option<String>,
    },

    /// Show the saved progress checkpoint.
    Status {
        /// Progress checkpoint file.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Forget saved progress so the next run starts from the beginning.
    Reset {
        /// Progress checkpoint file.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Download one document URL directly.
    Fetch {
        /// Document URL.
        url: String,

        /// File name to save it under.
        filename: String,

        /// Directory for downloaded PDFs.
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mfdocs=info",
        1 => "mfdocs=debug",
        _ => "mfdocs=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            download_dir,
            checkpoint,
            headed,
            chrome,
        } => {
            let mut config = run_config(download_dir, checkpoint)?;
            if headed {
                config.browser.headless = false;
            }
            if chrome.is_some() {
                config.browser.executable = chrome;
            }
            cmd_run(&config).await
        }
        Command::Status { checkpoint } => cmd_status(&run_config(None, checkpoint)?),
        Command::Reset { checkpoint } => cmd_reset(&run_config(None, checkpoint)?),
        Command::Fetch {
            url,
            filename,
            download_dir,
        } => cmd_fetch(&run_config(download_dir, None)?, &url, &filename).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Config file values, overridden by whichever flags were given.
fn run_config(download_dir: Option<PathBuf>, checkpoint: Option<PathBuf>) -> Result<RunConfig> {
    let mut config = RunConfig::from(&load_config()?);
    if let Some(dir) = download_dir {
        config.download_dir = dir;
    }
    if let Some(path) = checkpoint {
        config.checkpoint_file = path;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &RunConfig) -> Result<()> {
    info!(
        download_dir = %config.download_dir.display(),
        checkpoint = %config.checkpoint_file.display(),
        headless = config.browser.headless,
        "starting run"
    );

    let progress = CliProgress::new();
    let result = mfdocs_core::harvest(config, Box::new(progress.clone())).await;
    progress.spinner.finish_and_clear();

    print_summary(&result?, config);
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &RunConfig) {
    println!();
    if summary.completed {
        println!("  All document types processed.");
    } else {
        println!("  Run stopped before the end; run again to resume.");
    }
    println!("  Directory:  {}", config.download_dir.display());
    println!("  Funds:      {}", summary.records.len());
    for outcome in ArtifactOutcome::ALL {
        let count = summary.count(outcome);
        if count > 0 {
            println!("    {:<16}{count}", outcome.label());
        }
    }
    if summary.funds_skipped > 0 || summary.categories_skipped > 0 {
        println!(
            "  Resumed:    skipped {} categories, {} funds",
            summary.categories_skipped, summary.funds_skipped
        );
    }
    if !summary.errors.is_empty() {
        println!(
            "  Failures:   {} funds, {} categories",
            summary.funds_failed, summary.categories_failed
        );
        for (location, error) in &summary.errors {
            println!("    {location}: {error}");
        }
    }
    println!("  Time:       {:.1}s", summary.duration.as_secs_f64());
    println!();
}

fn cmd_status(config: &RunConfig) -> Result<()> {
    match mfdocs_core::progress_status(config) {
        Some(checkpoint) => {
            println!("Next up: {checkpoint}");
            if let Some(saved_at) = checkpoint.saved_at {
                println!("Saved:   {}", saved_at.to_rfc3339());
            }
            println!("File:    {}", config.checkpoint_file.display());
        }
        None => println!("No saved progress."),
    }
    Ok(())
}

fn cmd_reset(config: &RunConfig) -> Result<()> {
    if mfdocs_core::reset_progress(config)? {
        println!("Progress cleared: {}", config.checkpoint_file.display());
    } else {
        println!("No saved progress to clear.");
    }
    Ok(())
}

async fn cmd_fetch(config: &RunConfig, url: &str, filename: &str) -> Result<()> {
    let path = mfdocs_core::fetch_document(config, url, filename).await?;
    println!("Saved: {}", path.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
#[derive(Clone)]
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, doc_type: DocumentType) {
        self.spinner.set_message(format!("Opening {doc_type} listing"));
    }

    fn category(&self, doc_type: DocumentType, index: usize, total: usize, name: &str) {
        self.spinner
            .set_message(format!("{doc_type} [{}/{total}] {name}", index + 1));
    }

    fn fund(
        &self,
        doc_type: DocumentType,
        category_index: usize,
        index: usize,
        total: usize,
        name: &str,
    ) {
        self.spinner.set_message(format!(
            "{doc_type} category {} fund [{}/{total}] {name}",
            category_index + 1,
            index + 1
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
