//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use jobradar_core::{
    Notifier, ProgressReporter, RunOptions, RunSummary, StdoutNotifier, notifier_from_config,
    run_ingestion,
};
use jobradar_crawler::{AdapterRegistry, Fetcher};
use jobradar_shared::{AppConfig, AtsType, Company, Source, init_config, load_config, load_config_from};
use jobradar_storage::{JobStore, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// JobRadar: watch job boards for new senior technology roles.
#[derive(Parser)]
#[command(
    name = "jobradar",
    version,
    about = "Aggregate job postings from ATS boards and job sites, and report new relevant roles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.jobradar/jobradar.toml).
    #[arg(long, global = true, env = "JOBRADAR_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Run one ingestion pass over the configured sources.
    Run {
        /// Fetch and classify without writing to the database or notifying.
        #[arg(long)]
        dry_run: bool,

        /// Only run these sources (repeatable). Defaults to `pipeline.sources`.
        #[arg(long = "source", short)]
        sources: Vec<Source>,
    },

    /// Manage tracked companies.
    Companies {
        #[command(subcommand)]
        action: CompaniesAction,
    },

    /// Inspect stored job postings.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum CompaniesAction {
    /// List tracked companies.
    List,
    /// Add a company, or update the one with the same ticker.
    Add {
        #[arg(long)]
        ticker: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        website: Option<String>,

        /// workday, greenhouse, lever, smartrecruiters, successfactors, icims, jobvite.
        #[arg(long)]
        ats_type: Option<String>,

        /// Careers board URL for the ATS.
        #[arg(long)]
        board_url: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List the most recently seen jobs.
    List {
        #[arg(long)]
        source: Option<Source>,

        #[arg(long, default_value = "50")]
        limit: usize,
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
        0 => "jobradar=info",
        1 => "jobradar=debug",
        _ => "jobradar=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run { dry_run, sources } => {
            let config = load(config_path.as_ref())?;
            cmd_run(&config, dry_run, sources).await
        }
        Command::Companies { action } => {
            let config = load(config_path.as_ref())?;
            match action {
                CompaniesAction::List => cmd_companies_list(&config).await,
                CompaniesAction::Add {
                    ticker,
                    name,
                    website,
                    ats_type,
                    board_url,
                } => {
                    let company = Company {
                        id: String::new(),
                        ticker,
                        name,
                        website_url: website,
                        ats_type: ats_type
                            .as_deref()
                            .map(AtsType::parse_lenient)
                            .unwrap_or_default(),
                        ats_board_url: board_url,
                    };
                    cmd_companies_add(&config, company).await
                }
            }
        }
        Command::Jobs { action } => {
            let config = load(config_path.as_ref())?;
            match action {
                JobsAction::List { source, limit } => cmd_jobs_list(&config, source, limit).await,
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path.as_ref()),
            ConfigAction::Show => cmd_config_show(config_path.as_ref()),
        },
    }
}

fn load(path: Option<&PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.database.resolved_path()?;
    info!(path = %path.display(), "opening database");
    Ok(Storage::open(&path).await?)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, dry_run: bool, sources: Vec<Source>) -> Result<()> {
    let store: Arc<dyn JobStore> = Arc::new(open_storage(config).await?);
    let fetcher = Arc::new(Fetcher::new(&config.http)?);
    let registry = Arc::new(AdapterRegistry::new(config, fetcher));

    // A dry run never notifies, so it must not require the webhook env var.
    let notifier: Box<dyn Notifier> = if dry_run {
        Box::new(StdoutNotifier)
    } else {
        notifier_from_config(config)?
    };

    let options = RunOptions { dry_run, sources };
    let reporter = CliProgress::new();
    let summary = run_ingestion(config, &options, store, registry, notifier.as_ref(), &reporter).await?;

    print_summary(&summary);
    if summary.dry_run {
        if let Some(report) = &summary.report {
            println!("{}", report.to_text());
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    println!();
    if summary.dry_run {
        println!("  Dry run (nothing persisted, no notification)");
    }
    println!("  Sources:    {} processed, {} failed", stats.sources_processed, stats.sources_failed);
    println!("  Jobs:       {}", stats.total_jobs);
    println!("  New:        {}", stats.new_jobs);
    println!("  Relevant:   {}", stats.relevant_new);
    println!("  Dropped:    {} malformed, {} duplicate", stats.malformed_dropped, stats.duplicates_dropped);
    println!("  Notified:   {}", if summary.notified { "yes" } else { "no" });
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    for failure in &summary.failures {
        println!("  Failed:     {}: {}", failure.target, failure.error);
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    total: AtomicUsize,
    finished: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            total: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn targets_planned(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn target_finished(&self, target: &str, ok: bool) {
        let current = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        let status = if ok { "done" } else { "failed" };
        self.spinner
            .set_message(format!("Sources [{current}/{total}] {target} {status}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// companies / jobs
// ---------------------------------------------------------------------------

async fn cmd_companies_list(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let companies = storage.fetch_companies().await?;
    if companies.is_empty() {
        println!("No companies tracked. Add one with `jobradar companies add`.");
        return Ok(());
    }

    println!("{:<8} {:<32} {:<12} BOARD", "TICKER", "NAME", "ATS");
    for c in &companies {
        println!(
            "{:<8} {:<32} {:<12} {}",
            c.ticker,
            c.name,
            c.ats_type,
            c.ats_board_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_companies_add(config: &AppConfig, company: Company) -> Result<()> {
    if company.ticker.trim().is_empty() || company.name.trim().is_empty() {
        return Err(eyre!("--ticker and --name must not be empty"));
    }
    if company.ats_type.source().is_some() && company.ats_board_url.is_none() {
        tracing::warn!(
            ticker = %company.ticker,
            ats = %company.ats_type,
            "no --board-url given; this company will be skipped by ATS sources"
        );
    }

    let storage = open_storage(config).await?;
    let stored = storage.upsert_companies(std::slice::from_ref(&company)).await?;
    for c in &stored {
        println!("Saved {} ({}) as {}", c.name, c.ticker, c.id);
    }
    Ok(())
}

async fn cmd_jobs_list(config: &AppConfig, source: Option<Source>, limit: usize) -> Result<()> {
    let storage = open_storage(config).await?;
    let rows = storage.list_jobs(source, limit).await?;
    if rows.is_empty() {
        println!("No jobs stored yet. Run `jobradar run` first.");
        return Ok(());
    }

    println!("{:<18} {:<10} {:<24} {:<40} LOCATION", "SOURCE", "SEEN", "COMPANY", "TITLE");
    for row in &rows {
        let job = &row.job;
        println!(
            "{:<18} {:<10} {:<24} {:<40} {}",
            job.source,
            row.updated_at.format("%Y-%m-%d"),
            truncate(&job.company, 24),
            truncate(&job.title, 40),
            job.location
        );
    }

    let counts = storage.count_jobs_by_source().await?;
    let totals: Vec<String> = counts.iter().map(|(s, n)| format!("{s}={n}")).collect();
    println!();
    println!("  Stored: {}", totals.join(", "));
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(path: Option<&PathBuf>) -> Result<()> {
    let path = match path {
        None => init_config()?,
        Some(p) => {
            if !p.exists() {
                if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(p, toml::to_string_pretty(&AppConfig::default())?)?;
            }
            p.clone()
        }
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&PathBuf>) -> Result<()> {
    let config = load(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
