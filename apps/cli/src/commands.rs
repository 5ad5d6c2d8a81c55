//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use ratsarchiv_core::{CrawlSummary, ProgressReporter, UnitOutcome, harvest, resume_point};
use ratsarchiv_crawler::{BinaryFetcher, DownloadOutcome, HttpFetcher, HttpSession};
use ratsarchiv_shared::{
    AppConfig, HarvestConfig, MeetingRecord, MonthUnit, WalkDirection, init_config, load_config,
    validate_credentials, validate_source,
};
use ratsarchiv_storage::{CompletenessLedger, FailureLedger, OutputLayout};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Ratsarchiv: mirror a council calendar with all its documents.
#[derive(Parser)]
#[command(
    name = "ratsarchiv",
    version,
    about = "Resumable month-by-month harvester for council meeting calendars.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Walk the calendar and download everything not yet marked complete.
    Run {
        /// Output directory (defaults to [output].directory).
        #[arg(short, long)]
        out: Option<String>,

        /// Walk direction: backward or forward.
        #[arg(short, long)]
        direction: Option<WalkDirection>,

        /// Maximum number of months to visit.
        #[arg(short, long)]
        max_months: Option<u32>,

        /// Starting month as YYYY-MM (defaults to the resume point on disk).
        #[arg(short, long)]
        start: Option<String>,

        /// Hard time budget per document download, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the month the next run would start from.
    Next {
        /// Output directory (defaults to [output].directory).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Show the most recent entries of the failure ledger.
    Failures {
        /// Output directory (defaults to [output].directory).
        #[arg(short, long)]
        out: Option<String>,

        /// Number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
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
        0 => "ratsarchiv=info",
        1 => "ratsarchiv=debug",
        _ => "ratsarchiv=trace",
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
            out,
            direction,
            max_months,
            start,
            timeout_ms,
        } => {
            let overrides = RunOverrides {
                out,
                direction,
                max_months,
                start,
                timeout_ms,
            };
            cmd_run(overrides).await
        }
        Command::Next { out } => cmd_next(out.as_deref()).await,
        Command::Failures { out, limit } => cmd_failures(out.as_deref(), limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Flags of `run` that override the config file.
struct RunOverrides {
    out: Option<String>,
    direction: Option<WalkDirection>,
    max_months: Option<u32>,
    start: Option<String>,
    timeout_ms: Option<u64>,
}

fn output_root(config: &AppConfig, out: Option<&str>) -> PathBuf {
    PathBuf::from(out.unwrap_or(&config.output.directory))
}

async fn cmd_run(overrides: RunOverrides) -> Result<()> {
    let config = load_config()?;
    validate_source(&config)?;
    let credentials = validate_credentials(&config)?;

    Url::parse(&config.source.calendar_url)
        .map_err(|e| eyre!("invalid calendar_url '{}': {e}", config.source.calendar_url))?;

    let mut harvest_config = HarvestConfig::from(&config);
    harvest_config.output_root = output_root(&config, overrides.out.as_deref());
    if let Some(direction) = overrides.direction {
        harvest_config.direction = direction;
    }
    if let Some(max) = overrides.max_months {
        harvest_config.max_units = max;
    }
    if let Some(ms) = overrides.timeout_ms {
        harvest_config.download_timeout = Duration::from_millis(ms);
    }

    let start = overrides
        .start
        .as_deref()
        .map(MonthUnit::parse_year_month)
        .transpose()?;

    let mut session = HttpSession::new()?;
    if let (Some(login_url), Some(credentials)) =
        (config.source.login_url.as_deref(), credentials.as_ref())
    {
        info!(login_url, user = %credentials.username, "signing in");
        session.sign_in(login_url, credentials).await?;
    }

    info!(calendar = %config.source.calendar_url, "opening calendar");
    session.load(&config.source.calendar_url).await?;

    let fetcher: Arc<dyn BinaryFetcher> = Arc::new(HttpFetcher::new()?);
    let reporter = CliProgress::new();

    let summary = harvest(&harvest_config, &mut session, fetcher, start, &reporter).await?;

    // Print summary
    println!();
    println!("  Harvest finished: {}", summary.stop_reason);
    println!("  Run:        {}", summary.run_id);
    println!("  Months:     {} visited", summary.units_visited);
    println!("  Completed:  {}", summary.units_completed);
    println!("  Skipped:    {}", summary.units_skipped);
    println!("  Incomplete: {}", summary.units_failed);
    println!(
        "  Documents:  {} downloaded, {} failed",
        summary.documents_downloaded, summary.documents_failed
    );
    println!("  Output:     {}", harvest_config.output_root.display());
    println!();

    if summary.documents_failed > 0 {
        println!("  See `ratsarchiv failures` for the failed documents.");
        println!();
    }

    Ok(())
}

async fn cmd_next(out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let root = output_root(&config, out);
    let ledger = CompletenessLedger::new(OutputLayout::new(&root));

    let unit = resume_point(&ledger);

    println!("{unit}");
    println!("  Folder: {}", ledger.layout().month_dir(&unit).display());
    Ok(())
}

async fn cmd_failures(out: Option<&str>, limit: usize) -> Result<()> {
    let config = load_config()?;
    let root = output_root(&config, out);
    let ledger = FailureLedger::new(OutputLayout::new(&root).failure_log_path());

    let records = ledger.read_all()?;
    if records.is_empty() {
        println!("No failures recorded in {}", ledger.path().display());
        return Ok(());
    }

    let skip = records.len().saturating_sub(limit);
    println!(
        "Showing {} of {} failures from {}",
        records.len() - skip,
        records.len(),
        ledger.path().display()
    );
    println!();
    for record in &records[skip..] {
        println!(
            "  {}  {} / {} / {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.month,
            record.meeting,
            record.agenda_item
        );
        println!("      {}: {}", record.document, record.reason);
    }
    println!();

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
struct CliProgress {
    spinner: ProgressBar,
    documents: AtomicU32,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            documents: AtomicU32::new(0),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn unit_started(&self, unit: &MonthUnit) {
        self.spinner.set_message(format!("{unit}"));
    }

    fn unit_finished(&self, unit: &MonthUnit, outcome: UnitOutcome) {
        let status = match outcome {
            UnitOutcome::Completed => "complete",
            UnitOutcome::Skipped => "already complete",
            UnitOutcome::Incomplete => "incomplete",
        };
        self.spinner.println(format!("  {unit}: {status}"));
    }

    fn meeting_started(&self, record: &MeetingRecord) {
        self.spinner
            .set_message(format!("{:02}. {}", record.day, record.title));
    }

    fn document_finished(&self, name: &str, outcome: &DownloadOutcome) {
        if outcome.is_downloaded() {
            let n = self.documents.fetch_add(1, Ordering::Relaxed) + 1;
            self.spinner.set_message(format!("[{n}] {name}"));
        } else {
            self.spinner.println(format!(
                "    failed: {name} ({})",
                outcome.reason.as_deref().unwrap_or("unknown")
            ));
        }
    }

    fn done(&self, _summary: &CrawlSummary) {
        self.spinner.finish_and_clear();
    }
}
