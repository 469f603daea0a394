//! diskstrata - versioned disk usage snapshots with scheduled rescans.
//!
//! Usage:
//!   diskstrata scan [PATH]         Scan once and record a snapshot
//!   diskstrata run                 Run the scheduler until Ctrl-C
//!   diskstrata history             List recent scans
//!   diskstrata tree                Show the latest completed tree
//!   diskstrata diff OLDER NEWER    Compare two scans
//!   diskstrata delete ID           Delete a scan and its folders
//!   diskstrata settings            Show or change scheduler settings

mod logging;
mod output;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;

use diskstrata_core::{AppConfig, ScanId, Settings};
use diskstrata_query::SnapshotQueryService;
use diskstrata_scan::{ScanEngine, ScanEvent, recover_stale_scans};
use diskstrata_schedule::ScanScheduler;
use diskstrata_store::{ScanLock, SqliteStore};

/// Minimum time between two progress redraws.
const PROGRESS_REDRAW: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(
    name = "diskstrata",
    version,
    about = "Versioned disk usage snapshots",
    long_about = "diskstrata records the size of every folder under a root as a \
                  versioned snapshot, rescans on a schedule, and lets you browse \
                  and compare past snapshots."
)]
struct Cli {
    /// Snapshot database (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan once and record a snapshot
    Scan {
        /// Path to scan (defaults to the configured root)
        path: Option<PathBuf>,
    },

    /// Run the scheduler until interrupted
    Run,

    /// List recent scans
    History {
        /// Number of scans to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a snapshot's folder tree
    Tree {
        /// Scan to show (defaults to the latest completed scan)
        #[arg(long)]
        scan: Option<u64>,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: usize,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Compare the top-level folders of two scans
    Diff {
        older: u64,
        newer: u64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a scan and all of its folders
    Delete { id: u64 },

    /// Show or change scheduler settings
    Settings {
        /// Hours between scheduled scans
        #[arg(long)]
        interval: Option<u32>,

        /// Enable or disable scheduled scans
        #[arg(long)]
        auto_scan: Option<bool>,

        /// Root folder for scheduled scans
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Config and store shared by all commands.
struct App {
    config: AppConfig,
    db_path: PathBuf,
    store: Arc<SqliteStore>,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::load_default()?,
        };
        let db = cli.db.clone().unwrap_or_else(|| config.database_path());
        let store = SqliteStore::open(&db)
            .wrap_err_with(|| format!("Failed to open database {}", db.display()))?;
        Ok(Self {
            config,
            db_path: db,
            store: Arc::new(store),
        })
    }

    /// Keep other diskstrata processes from scanning this database.
    fn lock_scans(&self) -> Result<ScanLock> {
        ScanLock::try_acquire(&self.db_path)
            .wrap_err("Another scan or scheduler is using this database")
    }

    fn query(&self) -> SnapshotQueryService<SqliteStore> {
        SnapshotQueryService::new(Arc::clone(&self.store))
    }

    fn engine(&self) -> ScanEngine<SqliteStore> {
        ScanEngine::new(Arc::clone(&self.store)).with_config(self.config.scan.clone())
    }

    /// Stored settings, or the configured defaults if none were saved.
    fn settings(&self) -> Result<Settings> {
        Ok(self
            .query()
            .settings()?
            .unwrap_or_else(|| self.config.default_settings()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.verbose);
    let app = App::open(&cli)?;

    match cli.command {
        Command::Scan { path } => run_scan(&app, path).await?,
        Command::Run => run_scheduler(&app).await?,
        Command::History { count, format } => run_history(&app, count, format)?,
        Command::Tree {
            scan,
            depth,
            top,
            format,
        } => run_tree(&app, scan.map(ScanId::new), depth, top, format)?,
        Command::Diff {
            older,
            newer,
            format,
        } => run_diff(&app, ScanId::new(older), ScanId::new(newer), format)?,
        Command::Delete { id } => run_delete(&app, ScanId::new(id))?,
        Command::Settings {
            interval,
            auto_scan,
            root,
        } => run_settings(&app, interval, auto_scan, root)?,
    }

    Ok(())
}

/// Run one scan with live progress; Ctrl-C cancels it.
async fn run_scan(app: &App, path: Option<PathBuf>) -> Result<()> {
    let root = match path {
        Some(path) => path.canonicalize().context("Invalid path")?,
        None => app.settings()?.scan_root_path,
    };
    let _lock = app.lock_scans()?;
    eprintln!("Scanning {}...", root.display());

    let engine = Arc::new(app.engine());
    let mut events = engine.subscribe();
    let progress_task = tokio::spawn(async move {
        let mut last_draw: Option<Instant> = None;
        loop {
            match events.recv().await {
                Ok(ScanEvent::Progress(progress)) => {
                    if last_draw.is_none_or(|t| t.elapsed() >= PROGRESS_REDRAW) {
                        eprint!("\r{}", output::progress_line(&progress));
                        let _ = std::io::stderr().flush();
                        last_draw = Some(Instant::now());
                    }
                }
                Ok(ScanEvent::Finished(_)) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
        eprintln!();
    });

    let interrupt = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine.cancel_scan();
            }
        })
    };

    let report = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.start_scan(root))
            .await
            .context("Scan task panicked")??
    };
    interrupt.abort();
    let _ = progress_task.await;

    output::print_scan_summary(&report.scan, report.warnings.len());
    Ok(())
}

/// Recover stale scans, then schedule scans until Ctrl-C.
async fn run_scheduler(app: &App) -> Result<()> {
    let _lock = app.lock_scans()?;
    recover_stale_scans(&*app.store, Utc::now()).context("Failed to recover stale scans")?;

    let engine = Arc::new(app.engine());
    let scheduler = ScanScheduler::new(engine, app.config.scheduler_config());
    let shutdown = CancellationToken::new();

    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        })
    };

    scheduler.run(shutdown).await;
    signal.abort();
    Ok(())
}

fn run_history(app: &App, count: usize, format: OutputFormat) -> Result<()> {
    let scans = app.query().recent_scans(count)?;
    match format {
        OutputFormat::Text => output::print_history(&scans),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&scans)?),
    }
    Ok(())
}

fn run_tree(
    app: &App,
    scan: Option<ScanId>,
    depth: usize,
    top: usize,
    format: OutputFormat,
) -> Result<()> {
    let tree = app.query().load_tree(scan, depth)?;
    match (format, tree) {
        (OutputFormat::Json, tree) => println!("{}", serde_json::to_string_pretty(&tree)?),
        (OutputFormat::Text, Some(tree)) => output::print_tree(&tree, top),
        (OutputFormat::Text, None) => match scan {
            Some(id) => println!("Scan {id} has no folders."),
            None => println!("No completed scan yet. Run `diskstrata scan` first."),
        },
    }
    Ok(())
}

fn run_diff(app: &App, older: ScanId, newer: ScanId, format: OutputFormat) -> Result<()> {
    let query = app.query();
    for id in [older, newer] {
        if query.scan(id)?.is_none() {
            bail!("Scan {id} not found");
        }
    }

    let comparison = query.compare_scans(older, newer)?;
    match format {
        OutputFormat::Text => output::print_comparison(&comparison),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&comparison)?),
    }
    Ok(())
}

fn run_delete(app: &App, id: ScanId) -> Result<()> {
    if !app.query().delete_scan(id)? {
        bail!("Scan {id} not found");
    }
    println!("Deleted scan {id}");
    Ok(())
}

fn run_settings(
    app: &App,
    interval: Option<u32>,
    auto_scan: Option<bool>,
    root: Option<PathBuf>,
) -> Result<()> {
    let mut settings = app.settings()?;
    let changed = interval.is_some() || auto_scan.is_some() || root.is_some();

    if let Some(hours) = interval {
        if hours == 0 {
            bail!("Interval must be at least one hour");
        }
        settings.scan_interval_hours = hours;
        if let Some(last) = settings.last_scan_time {
            settings.next_scan_time = Some(last + settings.interval());
        }
    }
    if let Some(enabled) = auto_scan {
        settings.auto_scan_enabled = enabled;
    }
    if let Some(root) = root {
        settings.scan_root_path = root;
    }

    if changed {
        app.query().update_settings(&settings)?;
        info!("Settings updated");
    }
    output::print_settings(&settings);
    Ok(())
}
