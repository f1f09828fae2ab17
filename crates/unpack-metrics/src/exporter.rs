//! Prometheus exporter.
//!
//! Gathers the registered families and the pipeline bridge into one scrape
//! and encodes it in Prometheus text format.

use std::sync::Arc;
use std::time::Instant;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

use crate::collector::{PipelineCollector, UptimeCollector};
use crate::error::{MetricsError, Result};

/// Prometheus exporter.
pub struct Exporter {
    registry: Registry,
    bridge: PipelineCollector,
}

impl Exporter {
    /// Create an exporter around `registry`, registering the uptime counter in
    /// it under the bridge's namespace.
    ///
    /// The bridge is kept out of the registry so a failed read can fail the
    /// whole scrape instead of being swallowed by `Registry::gather`.
    pub fn new(registry: Registry, bridge: PipelineCollector, started: Instant) -> Result<Self> {
        let uptime = UptimeCollector::new(bridge.namespace(), started)?;
        registry.register(Box::new(uptime))?;

        Ok(Self { registry, bridge })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bridge(&self) -> &PipelineCollector {
        &self.bridge
    }

    /// Every family for one scrape: the bridge first, then the registry.
    pub fn gather(&self) -> Result<Vec<MetricFamily>> {
        let mut families = self.bridge.families().inspect_err(|e| {
            error!(error = %e, "Metrics collection failed");
        })?;
        families.extend(self.registry.gather());
        Ok(families)
    }

    /// Export metrics in Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let families = self.gather()?;
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encode(e.to_string()))
    }

    /// Content type of [`Exporter::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

/// Shared handle served by the HTTP layer.
pub type SharedExporter = Arc<Exporter>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BufferChannel, PipelineState};
    use crate::status::ItemStatus;

    fn exporter(state: Arc<PipelineState>, namespace: &str) -> Exporter {
        let bridge = PipelineCollector::new(namespace, state).unwrap();
        Exporter::new(Registry::new(), bridge, Instant::now()).unwrap()
    }

    #[test]
    fn test_export_empty() {
        let output = exporter(Arc::new(PipelineState::new()), "unpackerr")
            .render()
            .unwrap();

        assert!(output.contains("# HELP unpackerr_gauges"));
        assert!(output.contains("# TYPE unpackerr_gauges gauge"));
        assert!(output.contains("# TYPE unpackerr_counters counter"));
        assert!(output.contains("unpackerr_gauges{name=\"waiting\"} 0"));
        assert!(output.contains("unpackerr_buffers{name=\"xtractr_updates\"} 0"));
        assert!(output.contains("# TYPE unpackerr_uptime_seconds_total counter"));
    }

    #[test]
    fn test_export_with_data() {
        let state = Arc::new(PipelineState::new());
        state.items().set_status("a", ItemStatus::Extracted);
        state.items().set_status("b", ItemStatus::Extracted);
        state.items().set_status("c", ItemStatus::DeleteFailed);
        state.webhooks().record(true);
        state.set_buffer_probe(BufferChannel::FolderUpdates, || 2);

        let output = exporter(state, "unpackerr").render().unwrap();

        assert!(output.contains("unpackerr_gauges{name=\"extracted\"} 2"));
        assert!(output.contains("unpackerr_gauges{name=\"failed\"} 1"));
        assert!(output.contains("unpackerr_counters{name=\"hook_ok\"} 1"));
        assert!(output.contains("unpackerr_buffers{name=\"folder_updates\"} 2"));
    }

    #[test]
    fn test_custom_namespace() {
        let output = exporter(Arc::new(PipelineState::new()), "custom")
            .render()
            .unwrap();

        assert!(output.contains("custom_gauges"));
        assert!(output.contains("custom_uptime_seconds_total"));
        assert!(!output.contains("unpackerr_"));
    }

    #[test]
    fn test_uptime_follows_bridge_namespace() {
        let registry = Registry::new();
        let bridge = PipelineCollector::new("xtract", Arc::new(PipelineState::new())).unwrap();
        let exporter = Exporter::new(registry.clone(), bridge, Instant::now()).unwrap();

        assert_eq!(exporter.bridge().namespace(), "xtract");
        assert_eq!(registry.gather().len(), 1);
        assert!(exporter
            .render()
            .unwrap()
            .contains("# TYPE xtract_uptime_seconds_total counter"));
    }

    #[test]
    fn test_content_type() {
        let exporter = exporter(Arc::new(PipelineState::new()), "unpackerr");
        assert!(exporter.content_type().starts_with("text/plain"));
    }
}
