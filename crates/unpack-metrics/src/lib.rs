//! # Unpack Metrics
//!
//! Pull-based Prometheus metrics for an archive extraction pipeline.
//!
//! ## Features
//!
//! - Instrumentation hooks for finished extractions and upstream queue fetches
//! - On-demand snapshot of items per pipeline status bucket
//! - A collector bridge that exports the snapshot, hook outcomes and channel
//!   depths through three fixed `name`-labelled families
//! - Fail-closed text exposition and an `axum` `/metrics` route
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Instant;
//! use unpack_metrics::{ItemStatus, MetricsConfig, PipelineState};
//!
//! let state = Arc::new(PipelineState::new());
//! let config = MetricsConfig::from_env_or_default();
//! let metrics = unpack_metrics::init(&config, state.clone(), Instant::now())?;
//!
//! state.items().set_status("Some.Release", ItemStatus::Queued);
//! unpack_metrics::record_queue_fetch("sonarr", "http://sonarr:8989", 3, Instant::now());
//!
//! if let Some(metrics) = metrics {
//!     let text = metrics.exporter().render()?;
//! }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod global;
pub mod hooks;
pub mod logging;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod status;

pub use collector::{
    BridgeFamily, MetricDescriptor, MetricKind, Observation, PipelineCollector, UptimeCollector,
};
pub use config::MetricsConfig;
pub use error::{MetricsError, Result, SourceError};
pub use exporter::{Exporter, SharedExporter};
pub use global::{Metrics, get, init, record_extraction, record_queue_fetch};
pub use hooks::{ExtractionReport, Instruments};
pub use snapshot::{StatsSnapshot, snapshot};
pub use source::{
    BufferChannel, BufferDepths, HookCounts, HookTally, ItemTable, PipelineSource, PipelineState,
    channel_depth,
};
pub use status::{Bucket, ItemStatus};
