//! The environment bundle
//!
//! Everything the pipeline needs, acquired once from parsed configuration
//! in dependency order: metrics and exception reporting first, then the
//! schema client, the registry and pause gate, the asset manager (with
//! its fatal initial load), the sinks, the dispatcher, and finally the
//! source. Any failure aborts startup with a descriptive message.

use std::sync::Arc;

use anyhow::{Context, Result};
use sluice_assets::{AssetManager, PauseGate, RefreshHandle};
use sluice_config::{Config, InputConfig, OutputConfig, OutputTarget};
use sluice_enrich::{
    shared, Dispatcher, EnrichmentRegistry, PermissiveSchemaClient, PiiExtractor, SharedRegistry,
};
use sluice_metrics::{
    LogReporter, MetricsBackend, PipelineMetrics, SharedExceptionReporter, StatsdBackend,
    StdoutBackend, WebhookReporter,
};
use sluice_model::{JsonPayloadDecoder, Processor};
use sluice_pipeline::PipelineSinks;
use sluice_sinks::{FileProducer, Sink, StdoutProducer, StreamProducer, TcpProducer};
use sluice_sources::{FileSource, RecordSource, StdinSource, TcpSource};
use tracing::info;

pub struct Environment {
    pub config: Config,
    pub processor: Processor,
    pub metrics: Arc<PipelineMetrics>,
    pub metrics_backends: Vec<Box<dyn MetricsBackend>>,
    pub exception: SharedExceptionReporter,
    pub gate: Arc<PauseGate>,
    pub registry: SharedRegistry,
    pub asset_manager: AssetManager,
    pub refresh_handle: RefreshHandle,
    pub dispatcher: Arc<Dispatcher>,
    pub sinks: PipelineSinks,
    pub source: Box<dyn RecordSource>,
}

impl Environment {
    /// Acquire every resource. The asset manager's initial load runs
    /// here, so a pipeline that starts has all its assets on disk.
    pub async fn build(config: Config) -> Result<Self> {
        let processor = Processor::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

        let metrics = Arc::new(PipelineMetrics::new());
        let metrics_backends = build_metrics_backends(&config).await?;

        let exception: SharedExceptionReporter = match &config.monitoring.exception {
            Some(exception_config) => Arc::new(WebhookReporter::new(
                &exception_config.endpoint,
                format!("{}-{}", processor.name, processor.version),
            )),
            None => Arc::new(LogReporter),
        };

        let schema_client = Arc::new(PermissiveSchemaClient);

        let gate = PauseGate::new();
        let registry = shared(EnrichmentRegistry::empty());

        let (mut asset_manager, refresh_handle) = AssetManager::new(
            &config.assets,
            config.enrichments.clone(),
            Arc::clone(&registry),
            Arc::clone(&gate),
        )
        .context("failed to initialize the asset manager")?;

        asset_manager
            .initial_load()
            .await
            .context("initial asset load failed")?;

        let pii = PiiExtractor::from_configs(&config.enrichments);
        if config.output.pii.is_some() && pii.is_none() {
            anyhow::bail!(
                "output.pii is configured but no pii_pseudonymization enrichment selects fields"
            );
        }

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(JsonPayloadDecoder),
            Arc::clone(&registry),
            schema_client,
            pii,
            Arc::clone(&exception),
            processor.clone(),
            config.output.good.record_byte_limit,
        ));

        let sinks = PipelineSinks {
            good: build_sink("good", &config.output.good).await?,
            pii: match &config.output.pii {
                Some(pii_config) => Some(build_sink("pii", pii_config).await?),
                None => None,
            },
            bad: build_sink("bad", &config.output.bad).await?,
        };

        let source = build_source(&config.input);

        info!(
            source = source.name(),
            enrichments = ?registry.load().names(),
            pii_output = config.output.pii.is_some(),
            "environment ready"
        );

        Ok(Self {
            config,
            processor,
            metrics,
            metrics_backends,
            exception,
            gate,
            registry,
            asset_manager,
            refresh_handle,
            dispatcher,
            sinks,
            source,
        })
    }
}

async fn build_metrics_backends(config: &Config) -> Result<Vec<Box<dyn MetricsBackend>>> {
    let metrics_config = &config.monitoring.metrics;
    let mut backends: Vec<Box<dyn MetricsBackend>> = Vec::new();

    if metrics_config.stdout {
        backends.push(Box::new(StdoutBackend));
    }
    if let Some(statsd_config) = &metrics_config.statsd {
        let backend = StatsdBackend::connect(statsd_config)
            .await
            .context("failed to connect the statsd metrics backend")?;
        backends.push(Box::new(backend));
    }

    Ok(backends)
}

async fn build_sink(name: &str, config: &OutputConfig) -> Result<Sink> {
    let producer: Arc<dyn StreamProducer> = match &config.target {
        OutputTarget::Tcp { target } => Arc::new(
            TcpProducer::new(target.clone())
                .with_context(|| format!("invalid {name} output target"))?,
        ),
        OutputTarget::File { path } => Arc::new(
            FileProducer::open(path)
                .await
                .with_context(|| format!("failed to open {name} output file"))?,
        ),
        OutputTarget::Stdout => Arc::new(StdoutProducer::new()),
    };

    Ok(Sink::spawn(name, config, producer))
}

fn build_source(config: &InputConfig) -> Box<dyn RecordSource> {
    match config {
        InputConfig::File {
            path,
            initial_position,
            checkpoint_settings,
        } => Box::new(FileSource::new(
            path.clone(),
            *initial_position,
            checkpoint_settings.clone(),
        )),
        InputConfig::Tcp { address, port } => Box::new(TcpSource::new(address.clone(), *port)),
        InputConfig::Stdin => Box::new(StdinSource),
    }
}
