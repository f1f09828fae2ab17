//! Process-scoped metrics state.
//!
//! Families are registered once at startup and live until the process
//! exits. Pipeline code calls the free functions in this module
//! unconditionally: until [`init`] succeeds they do nothing.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use prometheus::Registry;
use tracing::info;

use crate::collector::PipelineCollector;
use crate::config::MetricsConfig;
use crate::error::{MetricsError, Result};
use crate::exporter::Exporter;
use crate::hooks::{ExtractionReport, Instruments};
use crate::source::PipelineSource;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Everything the metrics subsystem owns: the write-side instruments and the
/// read-side exporter.
#[derive(Clone)]
pub struct Metrics {
    instruments: Instruments,
    exporter: Arc<Exporter>,
}

impl Metrics {
    /// Build and register every family in a fresh registry.
    pub fn new(
        config: &MetricsConfig,
        source: Arc<dyn PipelineSource>,
        started: Instant,
    ) -> Result<Self> {
        Self::with_registry(config, source, started, Registry::new())
    }

    /// Build and register every family in `registry`.
    ///
    /// Registering into a registry that already holds these families fails
    /// with [`MetricsError::Registration`].
    pub fn with_registry(
        config: &MetricsConfig,
        source: Arc<dyn PipelineSource>,
        started: Instant,
        registry: Registry,
    ) -> Result<Self> {
        config.validate()?;

        let instruments = Instruments::new(config)?;
        instruments.register(&registry)?;

        let bridge = PipelineCollector::new(&config.namespace, source)?;
        let exporter = Exporter::new(registry, bridge, started)?;

        Ok(Self {
            instruments,
            exporter: Arc::new(exporter),
        })
    }

    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    pub fn exporter(&self) -> Arc<Exporter> {
        Arc::clone(&self.exporter)
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

/// Initialize process-wide metrics. Called once on startup.
///
/// With `enabled = false` nothing is built or registered, `Ok(None)` is
/// returned and the hooks stay no-ops. A second successful call fails with
/// [`MetricsError::AlreadyInitialized`] and leaves the registered state
/// untouched.
pub fn init(
    config: &MetricsConfig,
    source: Arc<dyn PipelineSource>,
    started: Instant,
) -> Result<Option<&'static Metrics>> {
    if !config.enabled {
        info!("Metrics disabled");
        return Ok(None);
    }
    if METRICS.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let metrics = Metrics::new(config, source, started)?;
    METRICS
        .set(metrics)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    info!(namespace = %config.namespace, "Metrics initialized");
    METRICS.get().ok_or(MetricsError::AlreadyInitialized).map(Some)
}

/// The process-wide metrics, if [`init`] has succeeded.
pub fn get() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Observe one completed extraction. No-op before [`init`].
pub fn record_extraction(app: &str, url: &str, report: &ExtractionReport) {
    if let Some(metrics) = METRICS.get() {
        metrics.instruments.record_extraction(app, url, report);
    }
}

/// Observe one upstream queue request. No-op before [`init`].
pub fn record_queue_fetch(app: &str, url: &str, queue_size: usize, start: Instant) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .instruments
            .record_queue_fetch(app, url, queue_size, start);
    }
}
