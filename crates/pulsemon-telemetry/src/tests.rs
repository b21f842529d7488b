use crate::aggregate::{compute_aggregate, compute_session_metrics, peak_concurrency, percentile};
use crate::buffer::SampleBuffer;
use crate::recorder::{SampleOutcome, SampleRecorder, SampleScope, UNSAMPLED_ID};
use chrono::{Duration, Utc};
use pulsemon_common::types::Sample;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

fn make_sample(operation: &str, duration_ms: f64, success: bool, start_secs_ago: i64) -> Sample {
    let started = Utc::now() - Duration::seconds(start_secs_ago);
    Sample {
        id: pulsemon_common::id::next_id(),
        operation: operation.to_string(),
        started_at: started,
        ended_at: Some(started + Duration::milliseconds(duration_ms as i64)),
        duration_ms: Some(duration_ms),
        success: Some(success),
        error: None,
        metadata: HashMap::new(),
        session_id: Some("sess-1".to_string()),
        actor_id: Some("actor-1".to_string()),
        resources: None,
    }
}

#[test]
fn percentile_uses_nearest_rank() {
    let durations: Vec<f64> = (1..=10).map(|v| (v * 10) as f64).collect();
    // n=10: p95 index ceil(9.5)-1 = 9, p99 index ceil(9.9)-1 = 9
    assert_eq!(percentile(&durations, 0.95), 100.0);
    assert_eq!(percentile(&durations, 0.99), 100.0);
    // p50 index ceil(5)-1 = 4
    assert_eq!(percentile(&durations, 0.50), 50.0);
}

#[test]
fn percentile_degenerate_inputs() {
    assert_eq!(percentile(&[], 0.95), 0.0);
    assert_eq!(percentile(&[42.0], 0.95), 42.0);
    assert_eq!(percentile(&[42.0], 0.99), 42.0);
}

#[test]
fn aggregate_of_skewed_fixture() {
    // 19 fast samples and one 9s outlier, one failure among them.
    pulsemon_common::id::init(1, 1);
    let mut samples: Vec<Sample> = (0..19)
        .map(|i| make_sample("export_config", 100.0, i != 0, 60 - i))
        .collect();
    samples.push(make_sample("export_config", 9000.0, true, 40));

    let agg = compute_aggregate("export_config", &samples, Utc::now(), Utc::now());
    assert_eq!(agg.sample_count, 20);
    assert_eq!(agg.failure_count, 1);
    assert_eq!(agg.error_rate, 0.05);
    assert!((agg.mean_ms - 545.0).abs() < f64::EPSILON);
    assert_eq!(agg.min_ms, 100.0);
    assert_eq!(agg.max_ms, 9000.0);
    // sorted index ceil(20*0.95)-1 = 18 is still a fast sample
    assert_eq!(agg.p95_ms, 100.0);
    assert_eq!(agg.p99_ms, 9000.0);
}

#[test]
fn throughput_spans_first_to_last_start() {
    pulsemon_common::id::init(1, 1);
    // 11 samples starting one second apart: span 10s
    let samples: Vec<Sample> = (0..11)
        .map(|i| make_sample("sync_records", 50.0, true, 10 - i))
        .collect();
    let agg = compute_aggregate("sync_records", &samples, Utc::now(), Utc::now());
    assert!((agg.throughput_per_sec - 1.1).abs() < 0.01);
}

#[test]
fn throughput_zero_span_is_zero() {
    pulsemon_common::id::init(1, 1);
    let base = Utc::now();
    let samples: Vec<Sample> = (0..3)
        .map(|_| {
            let mut s = make_sample("sync_records", 50.0, true, 0);
            s.started_at = base;
            s
        })
        .collect();
    let agg = compute_aggregate("sync_records", &samples, Utc::now(), Utc::now());
    assert_eq!(agg.throughput_per_sec, 0.0);
}

#[test]
fn peak_concurrency_counts_overlap() {
    pulsemon_common::id::init(1, 1);
    let base = Utc::now();
    let mut a = make_sample("op", 0.0, true, 0);
    a.started_at = base;
    a.ended_at = Some(base + Duration::seconds(10));
    let mut b = make_sample("op", 0.0, true, 0);
    b.started_at = base + Duration::seconds(2);
    b.ended_at = Some(base + Duration::seconds(8));
    let mut c = make_sample("op", 0.0, true, 0);
    c.started_at = base + Duration::seconds(4);
    c.ended_at = Some(base + Duration::seconds(6));

    assert_eq!(peak_concurrency(&[a, b, c]), 3);
}

#[test]
fn peak_concurrency_end_processed_before_start_at_same_instant() {
    pulsemon_common::id::init(1, 1);
    let base = Utc::now();
    let mut a = make_sample("op", 0.0, true, 0);
    a.started_at = base;
    a.ended_at = Some(base + Duration::seconds(5));
    // b starts exactly when a ends: not counted as overlapping
    let mut b = make_sample("op", 0.0, true, 0);
    b.started_at = base + Duration::seconds(5);
    b.ended_at = Some(base + Duration::seconds(10));

    assert_eq!(peak_concurrency(&[a, b]), 1);
}

#[test]
fn session_metrics_counts_are_consistent() {
    pulsemon_common::id::init(1, 1);
    let mut samples = vec![
        make_sample("create_widget", 100.0, true, 30),
        make_sample("deploy_widget", 200.0, false, 20),
        make_sample("verify_widget", 300.0, true, 10),
    ];
    samples[2].actor_id = Some("actor-2".to_string());

    let metrics = compute_session_metrics("sess-1", &samples, 4).unwrap();
    assert_eq!(metrics.operation_count, 3);
    assert_eq!(
        metrics.success_count + metrics.failure_count,
        metrics.operation_count
    );
    assert_eq!(metrics.failure_count, 1);
    assert_eq!(metrics.distinct_actors, 2);
    assert_eq!(metrics.artifact_count, 4);
    assert!((metrics.mean_duration_ms - 200.0).abs() < f64::EPSILON);
}

#[test]
fn session_metrics_empty_is_none() {
    assert!(compute_session_metrics("sess-9", &[], 0).is_none());
}

#[test]
fn recorder_start_end_produces_buffered_sample() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(100));
    let recorder = SampleRecorder::new(buffer.clone(), 1.0);

    let id = recorder.start("deploy_widget", SampleScope::in_session("sess-1", "actor-1"));
    assert_ne!(id, UNSAMPLED_ID);
    recorder.end(&id, SampleOutcome::ok());

    let drained = buffer.drain();
    assert_eq!(drained.len(), 1);
    let sample = &drained[0];
    assert_eq!(sample.operation, "deploy_widget");
    assert_eq!(sample.success, Some(true));
    assert!(sample.duration_ms.is_some());
    assert!(sample.ended_at.is_some());
    assert!(sample.resources.is_some());
    assert_eq!(sample.session_id.as_deref(), Some("sess-1"));
}

#[test]
fn recorder_zero_rate_returns_sentinel() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(100));
    let recorder = SampleRecorder::new(buffer.clone(), 0.0);

    let id = recorder.start("deploy_widget", SampleScope::default());
    assert_eq!(id, UNSAMPLED_ID);
    // All further calls with the sentinel are no-ops
    recorder.end(&id, SampleOutcome::ok());
    assert!(buffer.is_empty());
}

#[test]
fn recorder_rejects_empty_operation_name() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(100));
    let recorder = SampleRecorder::new(buffer.clone(), 1.0);

    let id = recorder.start("  ", SampleScope::default());
    assert_eq!(id, UNSAMPLED_ID);
    assert!(buffer.is_empty());
}

#[test]
fn recorder_end_unknown_id_is_noop() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(100));
    let recorder = SampleRecorder::new(buffer.clone(), 1.0);

    recorder.end("does-not-exist", SampleOutcome::ok());
    assert!(buffer.is_empty());
}

#[test]
fn track_records_failure_and_reraises() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(100));
    let recorder = SampleRecorder::new(buffer.clone(), 1.0);

    let result: Result<(), String> = recorder.track("deploy_widget", SampleScope::default(), || {
        Err("deployment rejected".to_string())
    });
    assert_eq!(result.unwrap_err(), "deployment rejected");

    let drained = buffer.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].success, Some(false));
    assert_eq!(drained[0].error.as_deref(), Some("deployment rejected"));
}

#[test]
fn buffer_drain_is_exact() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(100));
    let recorder = SampleRecorder::new(buffer.clone(), 1.0);

    let mut drained = Vec::new();
    for i in 0..250 {
        let id = recorder.start("bulk_import", SampleScope::default());
        recorder.end(&id, SampleOutcome::ok());
        // Emulate the flush scheduler reacting to the threshold signal.
        if (i + 1) % 100 == 0 {
            drained.extend(buffer.drain());
        }
    }
    drained.extend(buffer.drain());

    assert_eq!(drained.len(), 250);
    let ids: HashSet<&str> = drained.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), 250, "no duplicates");
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn buffer_signals_at_threshold() {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(10));

    let waiter = buffer.clone();
    let handle = tokio::spawn(async move {
        waiter.threshold_reached().await;
        waiter.drain().len()
    });

    for _ in 0..10 {
        buffer.append(make_sample("bulk_import", 1.0, true, 0));
    }

    let drained = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("threshold signal should fire")
        .unwrap();
    assert_eq!(drained, 10);
}

#[test]
fn requeue_front_preserves_order() {
    pulsemon_common::id::init(1, 1);
    let buffer = SampleBuffer::new(100);
    buffer.append(make_sample("a", 1.0, true, 3));
    let batch = buffer.drain();
    buffer.append(make_sample("b", 1.0, true, 1));
    buffer.requeue_front(batch);

    let all = buffer.drain();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].operation, "a");
    assert_eq!(all[1].operation, "b");
}
