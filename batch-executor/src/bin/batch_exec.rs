//! Execute a file of sub-requests against a batch endpoint.
//!
//! Configuration comes from `--flags`, `BATCH_EXECUTOR_*` variables, or a
//! config file. One JSON line per delivered item is written to stdout; the
//! process exits non-zero when configuration is unusable or a batch call
//! fails. With the `metrics` feature, the Prometheus exposition is written to
//! `BATCH_EXECUTOR_METRICS_PATH` when set.

use std::io;
#[cfg(feature = "metrics")]
use std::path::PathBuf;
use std::sync::Arc;

use batch_executor::domain::ports::BatchMetrics;
#[cfg(not(feature = "metrics"))]
use batch_executor::domain::ports::NoOpBatchMetrics;
use batch_executor::domain::{BatchRequestFactory, BatchRequestPorts};
#[cfg(feature = "metrics")]
use batch_executor::inbound::cli::write_metrics;
use batch_executor::inbound::cli::{CliError, execute_requests, http_transport, load_requests};
#[cfg(feature = "metrics")]
use batch_executor::outbound::metrics::PrometheusBatchMetrics;
use batch_executor::settings::BatchExecutorSettings;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
#[cfg(feature = "metrics")]
use tracing::debug;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> io::Result<()> {
    if let Err(init_error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(io::stderr)
        .try_init()
    {
        warn!(error = %init_error, "tracing init failed");
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| io::Error::other(format!("create Tokio runtime: {source}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let settings = BatchExecutorSettings::load()
        .map_err(|source| io::Error::other(format!("load settings: {source}")))?;
    let exporter = MetricsExporter::new(&settings)?;

    let outcome = run(&settings, exporter.recorder()).await;
    exporter.flush()?;
    outcome.map_err(|failure| {
        error!(error = %failure, "batch run failed");
        io::Error::other(failure.to_string())
    })
}

async fn run(
    settings: &BatchExecutorSettings,
    metrics: Arc<dyn BatchMetrics>,
) -> Result<(), CliError> {
    let requests = load_requests(settings.requests_path()?)?;
    let transport = Arc::new(http_transport(settings)?);
    let factory = BatchRequestFactory::new(
        BatchRequestPorts::new(transport, metrics),
        settings.max_batch_size()?,
    );

    let mut stdout = io::stdout().lock();
    execute_requests(&factory, settings.context(), requests, &mut stdout).await?;
    Ok(())
}

#[cfg(feature = "metrics")]
struct MetricsExporter {
    registry: prometheus::Registry,
    recorder: Arc<PrometheusBatchMetrics>,
    path: Option<PathBuf>,
}

#[cfg(feature = "metrics")]
impl MetricsExporter {
    fn new(settings: &BatchExecutorSettings) -> io::Result<Self> {
        let registry = prometheus::Registry::new();
        let recorder = PrometheusBatchMetrics::new(&registry, settings.metric_namespace())
            .map_err(|source| io::Error::other(format!("register metrics: {source}")))?;
        Ok(Self {
            registry,
            recorder: Arc::new(recorder),
            path: settings.metrics_path().map(PathBuf::from),
        })
    }

    fn recorder(&self) -> Arc<dyn BatchMetrics> {
        self.recorder.clone()
    }

    /// Write the text exposition of everything recorded to the configured
    /// metrics file. Nothing is written when no file is configured.
    fn flush(&self) -> io::Result<()> {
        let Some(path) = self.path.as_deref() else {
            debug!("no metrics path configured; exposition skipped");
            return Ok(());
        };
        let exposition = prometheus::TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|source| io::Error::other(format!("encode metrics: {source}")))?;
        write_metrics(path, &exposition).map_err(|failure| io::Error::other(failure.to_string()))
    }
}

#[cfg(not(feature = "metrics"))]
struct MetricsExporter;

#[cfg(not(feature = "metrics"))]
impl MetricsExporter {
    #[expect(
        clippy::unnecessary_wraps,
        reason = "mirrors the fallible constructor used with the metrics feature"
    )]
    const fn new(_settings: &BatchExecutorSettings) -> io::Result<Self> {
        Ok(Self)
    }

    #[expect(clippy::unused_self, reason = "matches the metrics-enabled accessor")]
    fn recorder(&self) -> Arc<dyn BatchMetrics> {
        Arc::new(NoOpBatchMetrics)
    }

    #[expect(
        clippy::unnecessary_wraps,
        clippy::unused_self,
        reason = "mirrors the fallible flush used with the metrics feature"
    )]
    const fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
