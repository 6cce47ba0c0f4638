use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use company_id_resolver::{
    config::{Config, defaults::MAX_SYNC_BUDGET},
    database::{Database, repositories::CompanyNameIndexSeaOrmRepository},
    deferred::{DeferredResolutionQueue, DeferredResolutionWorker},
    models::ResolutionStrategy,
    normalization::NameNormalizer,
    observability::init_meter_provider,
    repositories::ResolutionCache,
    services::{CompanyIdResolver, DataRow, EqcProvider, OverrideTable, UnknownCompanyExporter},
    sources::ReqwestTransport,
    utils::TemporaryIdGenerator,
};

#[derive(Parser)]
#[command(name = "company-id-resolver")]
#[command(version)]
#[command(about = "Resolve free-text company names into stable company identifiers")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "company-id-resolver.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a JSON-lines file of rows and write the enriched rows
    Resolve {
        /// Input rows, one JSON object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output rows, one JSON object per line
        #[arg(short, long)]
        output: PathBuf,

        /// External lookup budget for this run (overrides eqc.sync_budget)
        #[arg(long, value_name = "CALLS")]
        sync_budget: Option<u32>,
    },
    /// Drain the deferred resolution queue until interrupted
    Worker,
    /// Print deferred queue counts per status
    QueueStatus,
    /// Give every failed deferred entry a fresh schedule
    RequeueFailed,
}

/// Shared stores built once from configuration
struct Components {
    normalizer: NameNormalizer,
    cache: Arc<CompanyNameIndexSeaOrmRepository>,
    queue: Arc<DeferredResolutionQueue>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);
    let meter_provider = init_meter_provider();

    info!("Starting company-id-resolver v{}", env!("CARGO_PKG_VERSION"));
    let config = Config::load_from_file(&cli.config)?;

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    let components = build_components(&config, &database);

    let result = match cli.command {
        Command::Resolve {
            input,
            output,
            sync_budget,
        } => run_resolve(&config, &components, &input, &output, sync_budget).await,
        Command::Worker => run_worker(&config, &components).await,
        Command::QueueStatus => run_queue_status(&components).await,
        Command::RequeueFailed => {
            let requeued = components.queue.requeue_failed().await?;
            println!("requeued {requeued} failed entries");
            Ok(())
        }
    };

    if let Err(e) = meter_provider.shutdown() {
        warn!("Meter provider shutdown failed: {}", e);
    }
    result
}

fn init_logging(level: &str, format: LogFormat) {
    let log_filter = format!("company_id_resolver={level}");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with((format == LogFormat::Text).then(tracing_subscriber::fmt::layer))
        .with((format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json()))
        .init();
}

fn build_components(config: &Config, database: &Database) -> Components {
    let normalizer = NameNormalizer::with_lowercase(config.resolution.lowercase);
    let cache = Arc::new(CompanyNameIndexSeaOrmRepository::new(database.connection()));
    let queue = Arc::new(DeferredResolutionQueue::from_config(
        database.connection(),
        cache.clone(),
        normalizer,
        &config.queue,
    ));
    Components {
        normalizer,
        cache,
        queue,
    }
}

fn build_provider(config: &Config, components: &Components) -> Result<Arc<EqcProvider>> {
    let transport = ReqwestTransport::new(&config.eqc.base_url, config.eqc.timeout)
        .context("Failed to build EQC transport")?;
    let cache: Arc<dyn ResolutionCache> = components.cache.clone();
    let provider = EqcProvider::from_config(&config.eqc, Arc::new(transport), components.normalizer)
        .with_cache(cache);
    Ok(Arc::new(provider))
}

async fn run_resolve(
    config: &Config,
    components: &Components,
    input: &Path,
    output: &Path,
    sync_budget: Option<u32>,
) -> Result<()> {
    let temp_ids = TemporaryIdGenerator::new(config.resolution.salt.clone(), components.normalizer)?;
    let overrides = match &config.resolution.overrides_path {
        Some(path) => OverrideTable::load(path)?,
        None => OverrideTable::default(),
    };

    let mut resolver = CompanyIdResolver::new(temp_ids)
        .with_overrides(overrides)
        .with_cache(components.cache.clone())
        .with_provider(build_provider(config, components)?)
        .with_queue(components.queue.clone());
    if config.export.enabled {
        resolver = resolver.with_exporter(UnknownCompanyExporter::new(
            config.export.directory.clone(),
        ));
    }

    let mut strategy = ResolutionStrategy::from_config(config);
    if let Some(budget) = sync_budget {
        anyhow::ensure!(
            budget <= MAX_SYNC_BUDGET,
            "--sync-budget {} exceeds maximum {}",
            budget,
            MAX_SYNC_BUDGET
        );
        strategy = strategy.with_sync_budget(budget);
    }

    let rows = read_rows(input).await?;
    info!("Resolving {} rows from {}", rows.len(), input.display());
    let resolved = resolver.resolve_batch(rows, &strategy).await?;
    write_rows(output, &resolved.rows).await?;

    info!(
        run_id = %resolved.run_id,
        rows = resolved.rows.len(),
        output = %output.display(),
        "Resolution run complete"
    );
    if let Some(path) = resolved.export_path {
        info!("Unknown companies exported to {}", path.display());
    }
    Ok(())
}

async fn run_worker(config: &Config, components: &Components) -> Result<()> {
    let provider = build_provider(config, components)?;
    let worker = DeferredResolutionWorker::new(components.queue.clone(), provider, &config.queue);

    let cancellation_token = CancellationToken::new();
    let shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    worker.run(cancellation_token).await
}

async fn run_queue_status(components: &Components) -> Result<()> {
    let counts = components.queue.status_counts().await?;
    let cached = components.cache.count().await?;
    let report = serde_json::json!({
        "queue": counts,
        "depth": counts.depth(),
        "cached_names": cached,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn read_rows(path: &Path) -> Result<Vec<DataRow>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<DataRow>(line)
                .with_context(|| format!("{}:{}: not a JSON object", path.display(), index + 1))
        })
        .collect()
}

async fn write_rows(path: &Path, rows: &[DataRow]) -> Result<()> {
    let mut buffer = String::new();
    for row in rows {
        buffer.push_str(&serde_json::to_string(row)?);
        buffer.push('\n');
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, buffer)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
