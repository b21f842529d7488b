use chrono::{DateTime, Utc};
use pulsemon_common::types::{AggregateMetrics, Sample, SessionMetrics};
use std::collections::HashSet;

/// Nearest-rank percentile: the value at index `ceil(n * p) - 1` of the
/// ascending-sorted input. Empty input yields 0; a single element is every
/// percentile of itself.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (n as f64 * p).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

/// Samples per second across the span between the first and last sample
/// start; 0 when the span is 0.
pub fn throughput_per_sec(samples: &[Sample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let first = samples.iter().map(|s| s.started_at).min();
    let last = samples.iter().map(|s| s.started_at).max();
    let (Some(first), Some(last)) = (first, last) else {
        return 0.0;
    };
    let span_ms = (last - first).num_milliseconds();
    if span_ms <= 0 {
        return 0.0;
    }
    samples.len() as f64 / (span_ms as f64 / 1000.0)
}

/// Maximum number of samples in flight at any instant.
///
/// Each start is a +1 event and each end a -1 event; events are sorted by
/// `(time, delta)`, so an end at a timestamp is processed before a start at
/// the same timestamp and a back-to-back end/start pair does not count as
/// overlapping.
pub fn peak_concurrency(samples: &[Sample]) -> u32 {
    let mut events: Vec<(DateTime<Utc>, i32)> = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        events.push((sample.started_at, 1));
        events.push((sample.ended_at.unwrap_or(sample.started_at), -1));
    }
    events.sort_by_key(|&(ts, delta)| (ts, delta));

    let mut running = 0i32;
    let mut peak = 0i32;
    for (_, delta) in events {
        running += delta;
        peak = peak.max(running);
    }
    peak.max(0) as u32
}

/// Computes rolling statistics for one operation over a window of samples.
///
/// Degenerate inputs (empty set, missing durations) produce zero/neutral
/// values rather than an error.
pub fn compute_aggregate(
    operation: &str,
    samples: &[Sample],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> AggregateMetrics {
    let sample_count = samples.len() as u64;
    let success_count = samples
        .iter()
        .filter(|s| s.success == Some(true))
        .count() as u64;
    let failure_count = sample_count - success_count;

    let mut durations: Vec<f64> = samples.iter().filter_map(|s| s.duration_ms).collect();
    durations.sort_by(|a, b| a.total_cmp(b));

    let (mean_ms, min_ms, max_ms) = if durations.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = durations.iter().sum();
        (
            sum / durations.len() as f64,
            durations[0],
            durations[durations.len() - 1],
        )
    };

    AggregateMetrics {
        operation: operation.to_string(),
        period_start,
        period_end,
        sample_count,
        success_count,
        failure_count,
        mean_ms,
        min_ms,
        max_ms,
        p95_ms: percentile(&durations, 0.95),
        p99_ms: percentile(&durations, 0.99),
        error_rate: if sample_count == 0 {
            0.0
        } else {
            failure_count as f64 / sample_count as f64
        },
        throughput_per_sec: throughput_per_sec(samples),
        peak_concurrency: peak_concurrency(samples),
    }
}

/// Derives per-session statistics from the session's samples. Returns
/// `None` when the session has no samples, so callers can distinguish
/// "unknown session" from an empty result.
pub fn compute_session_metrics(
    session_id: &str,
    samples: &[Sample],
    artifact_count: u64,
) -> Option<SessionMetrics> {
    if samples.is_empty() {
        return None;
    }

    let started_at = samples.iter().map(|s| s.started_at).min()?;
    let ended_at = samples
        .iter()
        .map(|s| s.ended_at.unwrap_or(s.started_at))
        .max()?;

    let operation_count = samples.len() as u64;
    let success_count = samples
        .iter()
        .filter(|s| s.success == Some(true))
        .count() as u64;

    let durations: Vec<f64> = samples.iter().filter_map(|s| s.duration_ms).collect();
    let mean_duration_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let distinct_actors = samples
        .iter()
        .filter_map(|s| s.actor_id.as_deref())
        .collect::<HashSet<_>>()
        .len() as u64;

    Some(SessionMetrics {
        session_id: session_id.to_string(),
        started_at,
        ended_at,
        duration_ms: (ended_at - started_at).num_milliseconds() as f64,
        operation_count,
        success_count,
        failure_count: operation_count - success_count,
        distinct_actors,
        artifact_count,
        mean_duration_ms,
        resource_deltas: samples.iter().filter_map(|s| s.resources).collect(),
    })
}
