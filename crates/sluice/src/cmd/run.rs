//! Run command - the pipeline daemon
//!
//! Builds the environment from configuration, spawns the three concurrent
//! streams (enrich pipeline, asset refresh, metrics reporting), then waits
//! for a shutdown signal or for the source to end. Teardown order: the
//! pipeline runtime executes its own choreography (source, enrich drain,
//! sink flush, ack drain), then the side streams stop, the assets unload
//! and the final metrics flush happens.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use sluice_assets::AssetManager;
use sluice_config::Config;
use sluice_metrics::MetricsReporter;
use sluice_pipeline::PipelineRuntime;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::environment::Environment;

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        concurrency = config.pipeline.concurrency,
        ordered = config.pipeline.ordered,
        "sluice starting"
    );

    let environment = Environment::build(config)
        .await
        .context("failed to build the pipeline environment")?;

    let Environment {
        config,
        metrics,
        metrics_backends,
        exception,
        gate,
        asset_manager,
        dispatcher,
        sinks,
        source,
        ..
    } = environment;

    let cancel = CancellationToken::new();

    // Side stream: periodic asset refresh.
    let asset_directory = config.assets.directory.clone();
    let asset_task = tokio::spawn(asset_manager.run(cancel.clone()));

    // Side stream: periodic metrics reporting.
    let reporter = MetricsReporter::new(
        std::sync::Arc::clone(&metrics),
        metrics_backends,
        config.monitoring.metrics.period,
    );
    let metrics_task = tokio::spawn(reporter.run(cancel.clone()));

    // The enrich stream.
    let runtime = PipelineRuntime::new(
        source,
        dispatcher,
        sinks,
        gate,
        std::sync::Arc::clone(&metrics),
        exception,
        &config.pipeline,
        &config.output,
    );
    let mut pipeline_task = tokio::spawn(runtime.run(cancel.clone()));

    // Run until the pipeline ends on its own (source closed, fatal
    // error) or a signal asks for shutdown.
    let joined = tokio::select! {
        joined = &mut pipeline_task => joined,
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping pipeline...");
            cancel.cancel();
            pipeline_task.await
        }
    };

    let pipeline_result = joined.context("pipeline task panicked")?;

    // Stop the side streams and release remaining resources.
    cancel.cancel();
    if let Err(e) = tokio::time::timeout(Duration::from_secs(5), asset_task).await {
        warn!(error = %e, "asset refresh loop did not stop in time");
    }
    AssetManager::unload(&asset_directory).await;

    // The reporter flushes a final delta on cancellation.
    if let Err(e) = tokio::time::timeout(Duration::from_secs(5), metrics_task).await {
        warn!(error = %e, "metrics reporter did not stop in time");
    }

    pipeline_result.context("pipeline failed")?;
    info!("sluice shutdown complete");
    Ok(())
}

/// Load configuration: an explicit path must exist; otherwise try the
/// default locations and fall back to built-in defaults.
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            info!(config = %path.display(), "using config file");
            Config::from_file(&path).context("failed to load configuration")
        }
        None => {
            let default_paths = [
                PathBuf::from("configs/sluice.toml"),
                PathBuf::from("sluice.toml"),
            ];
            for path in &default_paths {
                if path.exists() {
                    info!(config = %path.display(), "using config file");
                    return Config::from_file(path).context("failed to load configuration");
                }
            }
            info!("no config file found, using defaults (stdin → stdout)");
            Ok(Config::default())
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
