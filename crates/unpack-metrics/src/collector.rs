//! Pull-side collectors.
//!
//! [`PipelineCollector`] exports the item snapshot, hook outcomes, process
//! counters and channel depths through three fixed families that fan out over
//! a `name` label. New buckets or channels become new label values, never new
//! families.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Counter, IntCounterVec, IntGaugeVec, Opts};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MetricsError, Result};
use crate::snapshot::snapshot;
use crate::source::{BufferChannel, PipelineSource};

/// Label key shared by the bridge families.
pub const NAME_LABEL: &str = "name";

/// Number of observations produced by one [`PipelineCollector::collect`].
pub const OBSERVATIONS_PER_COLLECT: usize = 18;

/// Kind of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        })
    }
}

/// The three families owned by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeFamily {
    /// Monotonic totals: hook outcomes, retries, finished items.
    Counters,
    /// Items per status bucket.
    Gauges,
    /// Channel buffer depths.
    Buffers,
}

impl BridgeFamily {
    pub const ALL: [BridgeFamily; 3] = [Self::Counters, Self::Gauges, Self::Buffers];

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counters => MetricKind::Counter,
            Self::Gauges | Self::Buffers => MetricKind::Gauge,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Counters => "counters",
            Self::Gauges => "gauges",
            Self::Buffers => "buffers",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::Counters => "Pipeline queue counters",
            Self::Gauges => "Pipeline queue gauges",
            Self::Buffers => "Pipeline channel buffer gauges",
        }
    }
}

/// Static description of one family the bridge can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDescriptor {
    pub family: BridgeFamily,
    /// Fully-qualified metric name.
    pub name: String,
    pub help: &'static str,
    pub kind: MetricKind,
    /// The single variable label key.
    pub label: &'static str,
}

/// One value emitted by a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub family: BridgeFamily,
    /// Value of the `name` label.
    pub name: &'static str,
    pub value: u64,
}

impl Observation {
    fn new(family: BridgeFamily, name: &'static str, value: u64) -> Self {
        Self {
            family,
            name,
            value,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.family.kind()
    }
}

/// Bridge between the pipeline's state and the pull-based exposition.
///
/// Performs no background work and keeps no history: every collection reads
/// the source afresh.
pub struct PipelineCollector {
    namespace: String,
    source: Arc<dyn PipelineSource>,
    descriptors: Vec<MetricDescriptor>,
    descs: Vec<Desc>,
}

impl PipelineCollector {
    pub fn new(namespace: &str, source: Arc<dyn PipelineSource>) -> Result<Self> {
        let descriptors: Vec<MetricDescriptor> = BridgeFamily::ALL
            .into_iter()
            .map(|family| MetricDescriptor {
                family,
                name: format!("{}_{}", namespace, family.suffix()),
                help: family.help(),
                kind: family.kind(),
                label: NAME_LABEL,
            })
            .collect();

        let descs = descriptors
            .iter()
            .map(|d| {
                Desc::new(
                    d.name.clone(),
                    d.help.to_string(),
                    vec![d.label.to_string()],
                    HashMap::new(),
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            namespace: namespace.to_string(),
            source,
            descriptors,
            descs,
        })
    }

    /// Prefix shared by every family this bridge exports.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The fixed descriptor set. Never changes after construction.
    pub fn describe(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    /// Descriptor of `family`.
    pub fn descriptor(&self, family: BridgeFamily) -> Option<&MetricDescriptor> {
        self.descriptors.iter().find(|d| d.family == family)
    }

    /// Read the source once and return a complete set of observations.
    ///
    /// Fails as a whole if any read fails; a partial set is never returned.
    pub fn collect(&self) -> Result<Vec<Observation>> {
        let source = self.source.as_ref();
        let stats = snapshot(source)?;
        let retries = source
            .retries()
            .map_err(|e| MetricsError::read("retry counter", e))?;
        let finished = source
            .finished()
            .map_err(|e| MetricsError::read("finished counter", e))?;
        let depths = source
            .buffer_depths()
            .map_err(|e| MetricsError::read("buffer depths", e))?;

        let mut observations = Vec::with_capacity(OBSERVATIONS_PER_COLLECT);

        for (bucket, count) in stats.buckets() {
            observations.push(Observation::new(BridgeFamily::Gauges, bucket.label(), count));
        }

        observations.extend([
            Observation::new(BridgeFamily::Counters, "hook_ok", stats.hook_ok),
            Observation::new(BridgeFamily::Counters, "hook_fail", stats.hook_fail),
            Observation::new(BridgeFamily::Counters, "cmd_ok", stats.cmd_ok),
            Observation::new(BridgeFamily::Counters, "cmd_fail", stats.cmd_fail),
            Observation::new(BridgeFamily::Counters, "retries", retries),
            Observation::new(BridgeFamily::Counters, "finished", finished),
        ]);

        for channel in BufferChannel::ALL {
            observations.push(Observation::new(
                BridgeFamily::Buffers,
                channel.label(),
                depths.get(channel),
            ));
        }

        debug!(
            observations = observations.len(),
            items = stats.total_items(),
            "Collected pipeline metrics"
        );
        Ok(observations)
    }

    /// Collect and materialise the observations as metric families.
    pub fn families(&self) -> Result<Vec<MetricFamily>> {
        let observations = self.collect()?;

        let counters = IntCounterVec::new(self.opts(BridgeFamily::Counters)?, &[NAME_LABEL])?;
        let gauges = IntGaugeVec::new(self.opts(BridgeFamily::Gauges)?, &[NAME_LABEL])?;
        let buffers = IntGaugeVec::new(self.opts(BridgeFamily::Buffers)?, &[NAME_LABEL])?;

        for observation in &observations {
            let labels = [observation.name];
            match observation.family {
                BridgeFamily::Counters => counters
                    .with_label_values(&labels)
                    .inc_by(observation.value),
                BridgeFamily::Gauges => gauges
                    .with_label_values(&labels)
                    .set(clamp_i64(observation.value)),
                BridgeFamily::Buffers => buffers
                    .with_label_values(&labels)
                    .set(clamp_i64(observation.value)),
            }
        }

        let mut families = counters.collect();
        families.extend(gauges.collect());
        families.extend(buffers.collect());
        Ok(families)
    }

    fn opts(&self, family: BridgeFamily) -> Result<Opts> {
        let descriptor = self.descriptor(family).ok_or_else(|| {
            MetricsError::Encode(format!("no descriptor for {} family", family.suffix()))
        })?;
        Ok(Opts::new(descriptor.name.clone(), descriptor.help))
    }
}

impl fmt::Debug for PipelineCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCollector")
            .field("namespace", &self.namespace)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

/// Lets the bridge be registered in any `prometheus` registry.
///
/// A registry cannot fail a gather, so a failed read drops all three bridge
/// families from that gather instead of emitting a subset.
impl Collector for PipelineCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self.families() {
            Ok(families) => families,
            Err(e) => {
                warn!(error = %e, "Dropping pipeline metrics from this gather");
                Vec::new()
            }
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Exports the seconds elapsed since the process started as a counter.
#[derive(Debug)]
pub struct UptimeCollector {
    started: Instant,
    name: String,
    desc: Desc,
}

impl UptimeCollector {
    const HELP: &'static str = "Duration the service has been running in seconds";

    pub fn new(namespace: &str, started: Instant) -> Result<Self> {
        let name = format!("{namespace}_uptime_seconds_total");
        let desc = Desc::new(name.clone(), Self::HELP.to_string(), vec![], HashMap::new())?;
        Ok(Self {
            started,
            name,
            desc,
        })
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Collector for UptimeCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match Counter::with_opts(Opts::new(self.name.clone(), Self::HELP)) {
            Ok(counter) => {
                counter.inc_by(self.uptime_seconds());
                counter.collect()
            }
            Err(e) => {
                warn!(error = %e, "Failed to build uptime counter");
                Vec::new()
            }
        }
    }
}
