//! Process-wide initialization tests.
//!
//! Everything lives in one test because the state under test is a process
//! global and test functions in one binary run concurrently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use unpack_metrics::{
    ExtractionReport, ItemStatus, MetricsConfig, MetricsError, PipelineState, get, init,
    record_extraction, record_queue_fetch,
};

#[test]
fn test_hooks_before_and_after_init() {
    unpack_metrics::logging::init(None);

    // Before init the hooks are silent no-ops.
    assert!(get().is_none());
    record_extraction(
        "sonarr",
        "http://sonarr:8989",
        &ExtractionReport {
            files_extracted: 10,
            ..Default::default()
        },
    );
    record_queue_fetch("sonarr", "http://sonarr:8989", 5, Instant::now());
    assert!(get().is_none());

    let state = Arc::new(PipelineState::new());
    state.items().set_status("Show.S01E01", ItemStatus::Queued);
    let metrics = init(&MetricsConfig::default(), state.clone(), Instant::now())
        .unwrap()
        .unwrap();

    // Nothing recorded before init leaked into the fresh families.
    assert_eq!(
        metrics
            .instruments()
            .files_extracted("sonarr", "http://sonarr:8989"),
        0
    );

    record_extraction(
        "sonarr",
        "http://sonarr:8989",
        &ExtractionReport {
            archives_read: 1,
            extras_read: 2,
            bytes_written: 1 << 20,
            files_extracted: 4,
            elapsed: Duration::from_secs(90),
        },
    );
    record_queue_fetch("sonarr", "http://sonarr:8989", 7, Instant::now());

    let instruments = metrics.instruments();
    assert_eq!(instruments.files_extracted("sonarr", "http://sonarr:8989"), 4);
    assert_eq!(instruments.archives_read("sonarr", "http://sonarr:8989"), 3);
    assert_eq!(instruments.queue_size("sonarr", "http://sonarr:8989"), 7);

    // A second init is refused and the original state keeps working.
    let err = init(&MetricsConfig::default(), state, Instant::now()).unwrap_err();
    assert!(matches!(err, MetricsError::AlreadyInitialized));
    assert!(std::ptr::eq(get().unwrap(), metrics));

    let output = metrics.exporter().render().unwrap();
    assert!(output.contains("unpackerr_gauges{name=\"queued\"} 1"));
    assert!(output.contains(
        "unpackerr_app_queue_size{app=\"sonarr\",url=\"http://sonarr:8989\"} 7"
    ));
}
