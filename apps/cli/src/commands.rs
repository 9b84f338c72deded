//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tilescout_fetch::RenderClient;
use tilescout_pipeline::{PipelineRunner, QualityGate};
use tilescout_shared::{AppConfig, expand_home, init_config, load_config};
use tilescout_sitemap::{Freshness, SitemapService};
use tilescout_storage::Storage;
use tokio::sync::watch;
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TileScout — crawl a product catalog into a local database.
#[derive(Parser)]
#[command(
    name = "tilescout",
    version,
    about = "Acquire product catalog data from a rendered storefront into a local database.",
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
    /// Download the sitemap and seed or reconcile the URL frontier.
    Ingest {
        /// Sitemap URL (defaults to sitemap.url from config).
        sitemap_url: Option<String>,

        /// Database path override.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run the acquisition pipeline over the frontier.
    Run {
        /// URLs per scheduling batch.
        #[arg(long)]
        batch_size: Option<u32>,

        /// Concurrent page pipelines.
        #[arg(long)]
        concurrency: Option<u32>,

        /// Stop after this many page outcomes.
        #[arg(long)]
        max_pages: Option<u64>,

        /// Database path override.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show frontier and checkpoint status.
    Status {
        /// Database path override.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Grade recent extraction quality.
    Quality {
        /// Database path override.
        #[arg(long)]
        db: Option<PathBuf>,
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
        0 => "tilescout=info",
        1 => "tilescout=debug",
        _ => "tilescout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest { sitemap_url, db } => cmd_ingest(sitemap_url.as_deref(), db).await,
        Command::Run {
            batch_size,
            concurrency,
            max_pages,
            db,
        } => cmd_run(batch_size, concurrency, max_pages, db).await,
        Command::Status { db } => cmd_status(db).await,
        Command::Quality { db } => cmd_quality(db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn db_path(config: &AppConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| expand_home(&config.store.db_path))
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(sitemap_url: Option<&str>, db: Option<PathBuf>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(url) = sitemap_url {
        Url::parse(url).map_err(|e| eyre!("invalid sitemap URL '{url}': {e}"))?;
        config.sitemap.url = url.to_string();
    }
    if config.sitemap.url.is_empty() {
        return Err(eyre!(
            "no sitemap URL: pass one or set sitemap.url in the config file"
        ));
    }

    let storage = Storage::open(&db_path(&config, db)).await?;
    let service = SitemapService::new(config.sitemap.clone())?;

    info!(url = %config.sitemap.url, "ingesting sitemap");
    let progress = spinner("Downloading sitemap…");
    let summary = service.ingest(&storage).await?;
    progress.finish_and_clear();

    println!();
    println!("  Sitemap ingested!");
    println!("  Discovered: {}", summary.discovered);
    println!("  Added:      {}", summary.added);
    println!("  Removed:    {}", summary.removed);
    println!("  Restored:   {}", summary.restored);
    println!();

    Ok(())
}

async fn cmd_run(
    batch_size: Option<u32>,
    concurrency: Option<u32>,
    max_pages: Option<u64>,
    db: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(b) = batch_size {
        config.scheduler.batch_size = b;
    }
    if let Some(c) = concurrency {
        config.scheduler.concurrency = c;
    }

    let storage = Arc::new(Storage::open(&db_path(&config, db)).await?);

    // Refresh the sitemap if it has gone stale; a down sitemap host only
    // blocks a first-ever run.
    if !config.sitemap.url.is_empty() {
        let service = SitemapService::new(config.sitemap.clone())?;
        match service.refresh_if_stale(&storage).await? {
            Freshness::Fresh => {}
            Freshness::Refreshed(summary) => {
                info!(added = summary.added, removed = summary.removed, "sitemap refreshed");
            }
            Freshness::Degraded => {
                println!("  Warning: sitemap unreachable, crawling stored URLs");
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing in-flight work");
            let _ = shutdown_tx.send(true);
        }
    });

    let fetcher = RenderClient::new(&config.fetch)?;
    let runner = PipelineRunner::new(
        Arc::clone(&storage),
        fetcher,
        config.scheduler.clone(),
        &config.fetch,
        shutdown_rx,
    );

    info!(
        batch_size = config.scheduler.batch_size,
        concurrency = config.scheduler.concurrency,
        "starting acquisition run"
    );
    let counters = runner.run(max_pages).await?;

    let report = QualityGate::new(config.quality.clone()).sample(&storage).await?;

    println!();
    println!("  Run finished!");
    println!("  Attempted: {}", counters.attempted);
    println!("  Completed: {}", counters.completed);
    println!("  Failed:    {}", counters.failed);
    println!(
        "  Quality:   {} ({}/{} recent records ≥ {} fields)",
        report.level, report.acceptable, report.sampled, report.min_fields
    );
    println!();

    Ok(())
}

async fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(&config, db)).await?;

    let counts = storage.status_counts().await?;
    println!();
    println!("  Frontier");
    println!("  Pending:     {}", counts.pending);
    println!("  In progress: {}", counts.in_progress);
    println!("  Completed:   {}", counts.completed);
    println!("  Failed:      {}", counts.failed);
    println!("  Removed:     {}", counts.removed);
    println!("  Total:       {}", counts.total);

    match storage.sitemap_last_refreshed().await? {
        Some(ts) => println!("  Sitemap:     refreshed {}", ts.to_rfc3339()),
        None => println!("  Sitemap:     never ingested"),
    }

    match storage.read_checkpoint().await? {
        Some(checkpoint) => {
            println!(
                "  Checkpoint:  {} pending, written {} (attempted {}, completed {}, failed {})",
                checkpoint.pending.len(),
                checkpoint.written_at.to_rfc3339(),
                checkpoint.counters.attempted,
                checkpoint.counters.completed,
                checkpoint.counters.failed,
            );
        }
        None => println!("  Checkpoint:  none (last run drained cleanly)"),
    }
    println!();

    Ok(())
}

async fn cmd_quality(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(&config, db)).await?;

    let report = QualityGate::new(config.quality.clone()).sample(&storage).await?;

    println!();
    println!("  Extraction quality: {}", report.level);
    println!(
        "  {}/{} sampled records have ≥ {} of 20 fields ({:.0}%)",
        report.acceptable,
        report.sampled,
        report.min_fields,
        report.ratio * 100.0
    );
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
