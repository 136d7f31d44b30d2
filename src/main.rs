//! Command-line entry point: parse arguments, load configuration,
//! connect the repository, and drive the scan → indicate → persist
//! pipeline until every stage drains or the run is interrupted.

use clap::Parser;
use miette::IntoDiagnostic;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uniquefile::indicator::{parse_indicator, Indicator, INDICATOR_NAMES};
use uniquefile::pipeline::{default_workers, Pipeline, PipelineConfig};
use uniquefile::repository::SqlRepository;
use uniquefile::uri::ResourceUri;
use uniquefile::{AppError, Config};

/// Identify unique files in a system.
#[derive(Debug, Parser)]
#[command(name = "uniquefile", version, about)]
struct Cli {
    /// One or more URIs to scan through.
    #[arg(value_name = "URI", required = true)]
    uris: Vec<String>,

    /// Log filter (e.g. warn, info, debug, or a tracing directive).
    #[arg(long, value_name = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Append log output to this file instead of stderr.
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Limit the number of indicate workers.
    #[arg(short = 'w', long, value_name = "NUM_WORKERS")]
    workers: Option<usize>,

    /// Indicators to use to scan files (repeatable): length, crc32, sha256.
    #[arg(short = 'i', long = "indicator", value_name = "INDICATOR")]
    indicators: Vec<String>,

    /// Initialize the database schema before scanning.
    #[arg(short = 'I', long = "initialize")]
    initialize: bool,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let roots = cli
        .uris
        .iter()
        .map(|raw| raw.parse::<ResourceUri>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut indicators: Vec<Arc<dyn Indicator>> = Vec::with_capacity(cli.indicators.len());
    for name in &cli.indicators {
        let indicator = parse_indicator(name).ok_or_else(|| {
            AppError::config(format!(
                "no such indicator: {name:?} (expected one of {})",
                INDICATOR_NAMES.join(", ")
            ))
        })?;
        indicators.push(indicator);
    }
    if indicators.is_empty() {
        warn!("no indicators configured; resources will be recorded without indications");
    }

    let config = Config::load(&Config::default_path()?)?;
    let repository = Arc::new(SqlRepository::connect(&config.db).await?);
    if cli.initialize {
        repository.initialize().await?;
    }

    let workers = cli.workers.unwrap_or_else(default_workers);
    let pipeline = Pipeline::new(repository, indicators, PipelineConfig { workers });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting the pipeline down");
            interrupt.cancel();
        }
    });

    pipeline.run(roots, cancel).await?;
    Ok(())
}

fn init_tracing(cli: &Cli) -> miette::Result<()> {
    let filter = EnvFilter::try_new(&cli.log_level)
        .map_err(|err| AppError::config(format!("invalid logging level {:?}: {err}", cli.log_level)))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .into_diagnostic()?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
