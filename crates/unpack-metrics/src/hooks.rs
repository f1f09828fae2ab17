//! Instrumentation hooks called by pipeline workers as events complete.
//!
//! Each hook is a handful of label lookups plus atomic updates inside the
//! `prometheus` families. Workers may call them concurrently with any mix of
//! `(app, url)` labels.

use std::time::{Duration, Instant};

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::config::MetricsConfig;
use crate::error::Result;

const LABELS: &[&str] = &["app", "url"];

/// What one finished extraction reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Archives opened.
    pub archives_read: u64,
    /// Extra archives found inside the extracted output and opened too.
    pub extras_read: u64,
    /// Bytes written to disk.
    pub bytes_written: u64,
    /// Files written to disk.
    pub files_extracted: u64,
    /// Wall time spent extracting.
    pub elapsed: Duration,
}

/// Metric families fed by the instrumentation hooks, labelled by `(app, url)`.
#[derive(Clone)]
pub struct Instruments {
    app_queues: IntGaugeVec,
    app_requests: HistogramVec,
    archives_read: IntCounterVec,
    bytes_written: IntCounterVec,
    extract_time: HistogramVec,
    files_extracted: IntCounterVec,
}

impl Instruments {
    /// Build the families. Nothing is registered yet.
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        let ns = config.namespace.as_str();

        Ok(Self {
            app_queues: IntGaugeVec::new(
                Opts::new("app_queue_size", "The total number of items queued in an upstream app")
                    .namespace(ns),
                LABELS,
            )?,
            app_requests: HistogramVec::new(
                HistogramOpts::new(
                    "app_queue_fetch_time_seconds",
                    "The duration of queue fetch API requests to upstream apps",
                )
                .namespace(ns)
                .buckets(config.fetch_buckets.clone()),
                LABELS,
            )?,
            archives_read: IntCounterVec::new(
                Opts::new("archives_read_total", "The total number of archive files read")
                    .namespace(ns),
                LABELS,
            )?,
            bytes_written: IntCounterVec::new(
                Opts::new("bytes_written_total", "The total number bytes written to disk")
                    .namespace(ns),
                LABELS,
            )?,
            extract_time: HistogramVec::new(
                HistogramOpts::new("extract_time_seconds", "The duration of extractions")
                    .namespace(ns)
                    .buckets(config.extract_buckets.clone()),
                LABELS,
            )?,
            files_extracted: IntCounterVec::new(
                Opts::new("files_extracted_total", "The total number files written to disk")
                    .namespace(ns),
                LABELS,
            )?,
        })
    }

    /// Register every family with `registry`.
    ///
    /// Fails if any family name is already taken there.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.app_queues.clone()))?;
        registry.register(Box::new(self.app_requests.clone()))?;
        registry.register(Box::new(self.archives_read.clone()))?;
        registry.register(Box::new(self.bytes_written.clone()))?;
        registry.register(Box::new(self.extract_time.clone()))?;
        registry.register(Box::new(self.files_extracted.clone()))?;
        Ok(())
    }

    /// Observe one completed extraction. For folder-watch extractions `url`
    /// is the watched path.
    pub fn record_extraction(&self, app: &str, url: &str, report: &ExtractionReport) {
        let labels = [app, url];

        self.archives_read
            .with_label_values(&labels)
            .inc_by(report.archives_read + report.extras_read);
        self.bytes_written
            .with_label_values(&labels)
            .inc_by(report.bytes_written);
        self.extract_time
            .with_label_values(&labels)
            .observe(report.elapsed.as_secs_f64());
        self.files_extracted
            .with_label_values(&labels)
            .inc_by(report.files_extracted);
    }

    /// Observe one upstream queue request that started at `start`.
    pub fn record_queue_fetch(&self, app: &str, url: &str, queue_size: usize, start: Instant) {
        let labels = [app, url];

        self.app_queues
            .with_label_values(&labels)
            .set(i64::try_from(queue_size).unwrap_or(i64::MAX));
        self.app_requests
            .with_label_values(&labels)
            .observe(start.elapsed().as_secs_f64());
    }

    // ========== Accessors ==========

    pub fn archives_read(&self, app: &str, url: &str) -> u64 {
        self.archives_read.with_label_values(&[app, url]).get()
    }

    pub fn bytes_written(&self, app: &str, url: &str) -> u64 {
        self.bytes_written.with_label_values(&[app, url]).get()
    }

    pub fn files_extracted(&self, app: &str, url: &str) -> u64 {
        self.files_extracted.with_label_values(&[app, url]).get()
    }

    pub fn queue_size(&self, app: &str, url: &str) -> i64 {
        self.app_queues.with_label_values(&[app, url]).get()
    }

    /// Number of extraction durations observed for `(app, url)`.
    pub fn extractions_observed(&self, app: &str, url: &str) -> u64 {
        self.extract_time
            .with_label_values(&[app, url])
            .get_sample_count()
    }

    /// Number of queue fetches observed for `(app, url)`.
    pub fn queue_fetches_observed(&self, app: &str, url: &str) -> u64 {
        self.app_requests
            .with_label_values(&[app, url])
            .get_sample_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn instruments() -> Instruments {
        Instruments::new(&MetricsConfig::default()).unwrap()
    }

    fn report(files: u64) -> ExtractionReport {
        ExtractionReport {
            archives_read: 2,
            extras_read: 1,
            bytes_written: 4096,
            files_extracted: files,
            elapsed: Duration::from_secs(42),
        }
    }

    #[test]
    fn test_record_extraction() {
        let instruments = instruments();
        instruments.record_extraction("sonarr", "http://sonarr:8989", &report(5));

        assert_eq!(instruments.archives_read("sonarr", "http://sonarr:8989"), 3);
        assert_eq!(instruments.bytes_written("sonarr", "http://sonarr:8989"), 4096);
        assert_eq!(instruments.files_extracted("sonarr", "http://sonarr:8989"), 5);
        assert_eq!(instruments.extractions_observed("sonarr", "http://sonarr:8989"), 1);

        // Other label sets are untouched.
        assert_eq!(instruments.files_extracted("radarr", "http://sonarr:8989"), 0);
    }

    #[test]
    fn test_record_queue_fetch() {
        let instruments = instruments();
        let start = Instant::now();
        instruments.record_queue_fetch("radarr", "http://radarr:7878", 12, start);
        instruments.record_queue_fetch("radarr", "http://radarr:7878", 4, start);

        assert_eq!(instruments.queue_size("radarr", "http://radarr:7878"), 4);
        assert_eq!(instruments.queue_fetches_observed("radarr", "http://radarr:7878"), 2);
    }

    #[test]
    fn test_concurrent_extractions_same_labels() {
        let instruments = Arc::new(instruments());

        let handles: Vec<_> = [3u64, 8u64]
            .into_iter()
            .map(|files| {
                let instruments = Arc::clone(&instruments);
                thread::spawn(move || {
                    instruments.record_extraction("lidarr", "/downloads", &report(files));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(instruments.files_extracted("lidarr", "/downloads"), 11);
        assert_eq!(instruments.archives_read("lidarr", "/downloads"), 6);
        assert_eq!(instruments.extractions_observed("lidarr", "/downloads"), 2);
    }

    #[test]
    fn test_many_workers_many_labels() {
        let instruments = instruments();

        thread::scope(|scope| {
            for worker in 0..8 {
                let instruments = &instruments;
                scope.spawn(move || {
                    let app = if worker % 2 == 0 { "sonarr" } else { "radarr" };
                    for _ in 0..100 {
                        instruments.record_extraction(app, "/data", &report(1));
                    }
                });
            }
        });

        assert_eq!(instruments.files_extracted("sonarr", "/data"), 400);
        assert_eq!(instruments.files_extracted("radarr", "/data"), 400);
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        let instruments = instruments();
        instruments.register(&registry).unwrap();
        assert!(instruments.register(&registry).is_err());
    }
}
