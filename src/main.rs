use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trendcast::cache::ResultCache;
use trendcast::combine::DataCombiner;
use trendcast::config::Config;
use trendcast::models::Window;
use trendcast::normalize::RecordNormalizer;
use trendcast::pipeline::{Pipeline, PipelineRequest};
use trendcast::source::{load_sources, RecordSource};

#[derive(Parser)]
#[command(
    name = "trendcast",
    version,
    about = "Entity mention forecasting over multi-source time series",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); falls back to environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (overrides the configured log level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: combine, derive features, and forecast
    Forecast {
        /// JSON file holding source batches (mapping + raw rows)
        #[arg(short, long)]
        sources: PathBuf,

        /// Entities to forecast (repeatable)
        #[arg(short, long, required = true)]
        entity: Vec<String>,

        /// Window start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Window end (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,

        /// Forecast horizon in cadence steps (overrides config)
        #[arg(long)]
        horizon: Option<usize>,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Combine sources into per-entity series without forecasting
    Combine {
        /// JSON file holding source batches (mapping + raw rows)
        #[arg(short, long)]
        sources: PathBuf,

        /// Entities to combine (repeatable)
        #[arg(short, long, required = true)]
        entity: Vec<String>,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env()?,
    };
    config.validate()?;

    // The config's [logging] section sets the defaults; CLI flags win
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(format, level)?;

    if let Err(e) = trendcast::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    tracing::info!("trendcast starting");

    match cli.command {
        Commands::Forecast {
            sources,
            entity,
            from,
            to,
            horizon,
            output,
        } => {
            tracing::info!(
                sources = %sources.display(),
                entities = entity.len(),
                from = %from,
                to = %to,
                horizon = ?horizon,
                "Starting forecast command"
            );
            forecast(&config, sources, entity, from, to, horizon, output).await?;
        }

        Commands::Combine {
            sources,
            entity,
            output,
        } => {
            tracing::info!(
                sources = %sources.display(),
                entities = entity.len(),
                "Starting combine command"
            );
            combine(&config, sources, entity, output).await?;
        }
    }

    tracing::info!("trendcast completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(format!("trendcast={level},warn"));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn forecast(
    config: &Config,
    sources_path: PathBuf,
    entities: Vec<String>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    horizon: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let sources: Vec<Arc<dyn RecordSource>> = load_sources(&sources_path)
        .await?
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn RecordSource>)
        .collect();

    let cache = Arc::new(ResultCache::new(config.cache.ttl()));
    let pipeline = Pipeline::new(config, cache)?;

    let request = PipelineRequest {
        entities,
        window: Window::new(from, to),
        horizon,
    };

    let report = pipeline.run(request, &sources).await;
    let stats = &report.stats;
    tracing::info!(
        ready = stats.ready_count,
        unavailable = stats.unavailable_count,
        skipped = stats.records_skipped,
        "Forecast finished"
    );

    write_json(&report.outcomes, output)
}

async fn combine(
    config: &Config,
    sources_path: PathBuf,
    entities: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let sources = load_sources(&sources_path).await?;
    let combiner = DataCombiner::new(config.combine.conflict_policy()?)?;

    let mut records = Vec::new();
    for source in &sources {
        let normalizer = RecordNormalizer::new(source.mapping().clone());
        let mut outcome = normalizer.normalize_batch(source.rows());
        records.append(&mut outcome.records);
    }

    let series: Vec<_> = entities
        .iter()
        .map(|entity_id| combiner.combine(entity_id, &records))
        .collect();

    write_json(&series, output)
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}
