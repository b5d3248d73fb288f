mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use cli::{Cli, Commands};
use listing_harvester::application::{HarvestOptions, HarvestRun, RecordEnricher};
use listing_harvester::domain::SnapshotStore;
use listing_harvester::infrastructure::{
    AppConfig, ConfigManager, HttpImageFetcher, JsonFileListingSource, JsonSnapshotStore,
    LocalImageStore, RetryPolicy, RetryingListingSource, export_csv, init_logging_with_config,
    log_system_info, relink_local_images,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::new(path),
        None => ConfigManager::with_default_path()?,
    };
    let mut config = manager.initialize_on_first_run().await?;

    if let Commands::Run {
        source,
        concurrency,
        no_csv,
    } = &cli.command
    {
        if let Some(source) = source {
            config.paths.source_path.clone_from(source);
        }
        if let Some(concurrency) = concurrency {
            config.enrichment.concurrency = *concurrency;
        }
        if *no_csv {
            config.paths.export_csv = false;
        }
    }
    config.validate().context("Invalid configuration")?;

    if matches!(cli.command, Commands::PrintConfig) {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    match cli.command {
        Commands::Run { .. } => run_harvest(&config).await,
        Commands::ExportCsv { output } => {
            let path = output.unwrap_or_else(|| config.paths.csv_path.clone());
            let snapshot = snapshot_store(&config).load().await?;
            export_csv(snapshot.iter(), &path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Relink => {
            let store = snapshot_store(&config);
            let mut snapshot = store.load().await?;
            let report =
                relink_local_images(&mut snapshot, &LocalImageStore::new(&config.paths.images_dir))
                    .await;
            if report.updated > 0 {
                store.save(&snapshot, &[]).await?;
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::PrintConfig => Ok(ExitCode::SUCCESS),
    }
}

fn snapshot_store(config: &AppConfig) -> JsonSnapshotStore {
    JsonSnapshotStore::new(&config.paths.snapshot_path, &config.paths.new_batch_path)
}

async fn run_harvest(config: &AppConfig) -> Result<ExitCode> {
    let source = RetryingListingSource::new(
        JsonFileListingSource::new(&config.paths.source_path),
        RetryPolicy::from_config(&config.source_retry),
    );
    let fetcher = HttpImageFetcher::from_http_config(&config.http)?;
    let enricher = RecordEnricher::from_config(
        Arc::new(fetcher),
        &config.enrichment,
        LocalImageStore::new(&config.paths.images_dir),
    );

    let run = HarvestRun::new(
        Arc::new(source),
        Arc::new(snapshot_store(config)),
        Arc::new(enricher),
        HarvestOptions::from_config(config),
    );

    match run.execute().await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_fatal() => {
            error!("❌ {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!("❌ {}", e);
            info!("Prior snapshot left unchanged");
            Ok(ExitCode::SUCCESS)
        }
    }
}
