use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shelfsync::clock::{Clock, SystemClock};
use shelfsync::config::Config;
use shelfsync::download::{DirectoryDownloadIndex, DownloadIndex};
use shelfsync::media::{CategoryId, Chapter, Episode, LibraryItem, MediaKind, Track};
use shelfsync::preferences::PreferenceManager;
use shelfsync::scheduler::{AlwaysSatisfied, JobChain, RefreshJob, RefreshScheduler};
use shelfsync::source::{LocalSource, SourceRegistry};
use shelfsync::storage::{Database, DatabaseError};
use shelfsync::sync::{LibraryPreferences, LibraryRefreshCoordinator};

/// Get the config directory path (~/.config/shelfsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("shelfsync"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Manga,
    Anime,
    Audiobook,
    All,
}

impl KindArg {
    fn kinds(self) -> Vec<MediaKind> {
        match self {
            KindArg::Manga => vec![MediaKind::Manga],
            KindArg::Anime => vec![MediaKind::Anime],
            KindArg::Audiobook => vec![MediaKind::Audiobook],
            KindArg::All => MediaKind::ALL.to_vec(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "shelfsync",
    about = "Refresh a manga, anime and audiobook library against its sources"
)]
struct Args {
    /// Config file (defaults to ~/.config/shelfsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Collection to refresh
    #[arg(long, value_enum, default_value = "all")]
    kind: KindArg,

    /// Only refresh entries in this category
    #[arg(long, value_name = "ID")]
    category: Option<CategoryId>,

    /// Keep running and refresh periodically until Ctrl-C
    #[arg(long)]
    watch: bool,
}

/// Shared collaborators every per-kind coordinator is built from.
struct Wiring {
    db: Database,
    sources: SourceRegistry,
    downloads: Arc<dyn DownloadIndex>,
    clock: Arc<dyn Clock>,
    prefs: LibraryPreferences,
    report_dir: PathBuf,
}

impl Wiring {
    fn coordinator<I: LibraryItem>(&self) -> Arc<dyn RefreshJob> {
        let coordinator = LibraryRefreshCoordinator::<I>::new(
            Arc::new(self.db.clone()),
            self.sources.clone(),
            self.downloads.clone(),
            self.clock.clone(),
            self.prefs.clone(),
        )
        .with_report_dir(&self.report_dir);
        Arc::new(coordinator)
    }

    fn job(&self, kind: MediaKind) -> Arc<dyn RefreshJob> {
        match kind {
            MediaKind::Manga => self.coordinator::<Chapter>(),
            MediaKind::Anime => self.coordinator::<Episode>(),
            MediaKind::Audiobook => self.coordinator::<Track>(),
        }
    }
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of shelfsync appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let paths = config.paths.resolve(&config_dir);

    if args.reset_db && paths.database.exists() {
        std::fs::remove_file(&paths.database).context("Failed to delete database")?;
        println!("Database reset.");
    }
    for dir in [&paths.downloads, &paths.reports, &paths.local_source] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let db = open_database(&paths.database).await?;
    let preferences = match PreferenceManager::load(&config, &db).await {
        Ok(pm) => pm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load stored preferences, using config only");
            PreferenceManager::from_config(&config)
        }
    };

    let mut sources = SourceRegistry::new();
    sources.register(Arc::new(LocalSource::new(&paths.local_source)));

    let wiring = Wiring {
        db: db.clone(),
        sources,
        downloads: Arc::new(DirectoryDownloadIndex::new(&paths.downloads, db.clone())),
        clock: Arc::new(SystemClock),
        prefs: preferences.library_preferences(),
        report_dir: paths.reports.clone(),
    };
    let jobs: Vec<Arc<dyn RefreshJob>> = args
        .kind
        .kinds()
        .into_iter()
        .map(|kind| wiring.job(kind))
        .collect();
    let chain: Arc<dyn RefreshJob> = Arc::new(JobChain::new(jobs));

    if !args.watch {
        let cancel = CancellationToken::new();
        let run = chain.run(args.category, cancel.clone());
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => result?,
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelling refresh...");
                cancel.cancel();
                run.await?;
            }
        }
        println!("Refresh finished.");
        return Ok(());
    }

    let scheduler = RefreshScheduler::new(chain, Arc::new(AlwaysSatisfied));
    scheduler.start_now(args.category);
    let ticker = match preferences.refresh_interval() {
        Some(every) => {
            println!("Refreshing every {} hours. Press Ctrl-C to stop.", every.as_secs() / 3600);
            Some(scheduler.schedule_periodic(every, preferences.job_constraints()))
        }
        None => {
            println!("Periodic refresh disabled. Press Ctrl-C to stop.");
            None
        }
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    scheduler.cancel();
    scheduler.wait_idle().await;

    println!("Goodbye!");
    Ok(())
}
