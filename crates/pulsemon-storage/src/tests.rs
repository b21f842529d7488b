use crate::engine::SqliteStorageEngine;
use crate::{SampleQuery, StorageEngine};
use chrono::{Duration, Utc};
use pulsemon_common::types::{ActiveAlert, AggregateMetrics, ResourceUsage, Sample, Severity};
use std::collections::HashMap;
use tempfile::TempDir;

fn setup() -> (TempDir, SqliteStorageEngine) {
    pulsemon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let engine = SqliteStorageEngine::new(dir.path()).unwrap();
    (dir, engine)
}

fn make_sample(operation: &str, duration_ms: f64, success: bool, secs_ago: i64) -> Sample {
    let started = Utc::now() - Duration::seconds(secs_ago);
    Sample {
        id: pulsemon_common::id::next_id(),
        operation: operation.to_string(),
        started_at: started,
        ended_at: Some(started + Duration::milliseconds(duration_ms as i64)),
        duration_ms: Some(duration_ms),
        success: Some(success),
        error: if success {
            None
        } else {
            Some("boom".to_string())
        },
        metadata: HashMap::new(),
        session_id: Some("sess-1".to_string()),
        actor_id: Some("actor-1".to_string()),
        resources: Some(ResourceUsage {
            cpu_usage_percent: 1.5,
            rss_mb: 4.0,
            virtual_mb: 0.0,
            system_used_mb: 3.0,
        }),
    }
}

#[test]
fn write_and_query_samples() {
    let (_dir, engine) = setup();

    let samples: Vec<Sample> = vec![
        make_sample("deploy_widget", 120.0, true, 30),
        make_sample("deploy_widget", 340.0, false, 20),
        make_sample("query_records", 45.0, true, 10),
    ];
    engine.write_samples(&samples).unwrap();

    let query = SampleQuery {
        operation: Some("deploy_widget".to_string()),
        session_id: None,
        from: Utc::now() - Duration::minutes(5),
        to: Utc::now() + Duration::seconds(1),
    };
    let results = engine.query_samples(&query).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].started_at <= results[1].started_at);
    assert_eq!(results[0].duration_ms, Some(120.0));
    let res = results[0].resources.unwrap();
    assert_eq!(res.rss_mb, 4.0);

    let ops = engine
        .distinct_operations(Utc::now() - Duration::minutes(5), Utc::now())
        .unwrap();
    assert_eq!(ops, vec!["deploy_widget", "query_records"]);
}

#[test]
fn query_samples_by_session() {
    let (_dir, engine) = setup();

    let mut other = make_sample("deploy_widget", 90.0, true, 5);
    other.session_id = Some("sess-2".to_string());
    engine
        .write_samples(&[make_sample("deploy_widget", 100.0, true, 10), other])
        .unwrap();

    let query = SampleQuery {
        operation: None,
        session_id: Some("sess-2".to_string()),
        from: Utc::now() - Duration::minutes(5),
        to: Utc::now() + Duration::seconds(1),
    };
    let results = engine.query_samples(&query).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].session_id.as_deref(), Some("sess-2"));
}

#[test]
fn query_empty_result() {
    let (_dir, engine) = setup();

    let query = SampleQuery {
        operation: Some("nonexistent".to_string()),
        session_id: None,
        from: Utc::now() - Duration::hours(1),
        to: Utc::now(),
    };
    assert!(engine.query_samples(&query).unwrap().is_empty());
}

#[test]
fn write_and_query_aggregates() {
    let (_dir, engine) = setup();

    let now = Utc::now();
    let aggregate = AggregateMetrics {
        operation: "deploy_widget".to_string(),
        period_start: now - Duration::minutes(1),
        period_end: now,
        sample_count: 20,
        success_count: 19,
        failure_count: 1,
        mean_ms: 545.0,
        min_ms: 100.0,
        max_ms: 9000.0,
        p95_ms: 100.0,
        p99_ms: 9000.0,
        error_rate: 0.05,
        throughput_per_sec: 2.5,
        peak_concurrency: 3,
    };
    engine.write_aggregate(&aggregate).unwrap();

    let results = engine
        .query_aggregates(
            "deploy_widget",
            now - Duration::minutes(5),
            now + Duration::seconds(1),
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].sample_count, 20);
    assert_eq!(results[0].error_rate, 0.05);
    assert_eq!(results[0].peak_concurrency, 3);
}

#[test]
fn write_and_acknowledge_alert() {
    let (_dir, engine) = setup();

    let now = Utc::now();
    let alert = ActiveAlert {
        id: "alert-1".to_string(),
        severity: Severity::Critical,
        component: "cpu".to_string(),
        message: "cpu above threshold".to_string(),
        created_at: now,
        acknowledged: false,
        acknowledged_by: None,
        acknowledged_at: None,
        count: 1,
        first_seen: now,
        last_seen: now,
    };
    engine.write_alert(&alert).unwrap();

    assert!(engine.acknowledge_alert("alert-1", "operator", now).unwrap());
    assert!(!engine.acknowledge_alert("missing", "operator", now).unwrap());
}

#[test]
fn count_artifacts_for_session() {
    let (dir, engine) = setup();

    // Artifacts are written by an external collaborator; emulate one.
    let partition = dir
        .path()
        .join(format!("{}.db", Utc::now().format("%Y-%m-%d")));
    engine.write_samples(&[make_sample("deploy_widget", 10.0, true, 1)]).unwrap();
    let conn = rusqlite::Connection::open(partition).unwrap();
    conn.execute(
        "INSERT INTO artifacts (id, session_id, kind, created_at) VALUES ('a1', 'sess-1', 'widget', 0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO artifacts (id, session_id, kind, created_at) VALUES ('a2', 'sess-1', 'widget', 0)",
        [],
    )
    .unwrap();
    drop(conn);

    assert_eq!(engine.count_session_artifacts("sess-1").unwrap(), 2);
    assert_eq!(engine.count_session_artifacts("sess-9").unwrap(), 0);
}
