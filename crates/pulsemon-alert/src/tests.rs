use crate::bottleneck::BottleneckDetector;
use crate::manager::{AlertManager, AlertOutcome};
use chrono::{Duration, Utc};
use pulsemon_common::types::{Sample, Severity};
use std::collections::HashMap;

fn make_sample(operation: &str, duration_ms: f64, success: bool) -> Sample {
    let started = Utc::now();
    Sample {
        id: pulsemon_common::id::next_id(),
        operation: operation.to_string(),
        started_at: started,
        ended_at: Some(started + Duration::milliseconds(duration_ms as i64)),
        duration_ms: Some(duration_ms),
        success: Some(success),
        error: None,
        metadata: HashMap::new(),
        session_id: None,
        actor_id: None,
        resources: None,
    }
}

#[test]
fn latency_rule_grades_by_mean() {
    pulsemon_common::id::init(1, 1);
    let detector = BottleneckDetector::default();

    let medium: Vec<Sample> = (0..5).map(|_| make_sample("slow_op", 6_000.0, true)).collect();
    let findings = detector.detect(&medium);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Medium);
    assert!((findings[0].average_delay_ms - 1_000.0).abs() < f64::EPSILON);

    let high: Vec<Sample> = (0..5).map(|_| make_sample("slow_op", 20_000.0, true)).collect();
    assert_eq!(detector.detect(&high)[0].severity, Severity::High);

    let critical: Vec<Sample> = (0..5).map(|_| make_sample("slow_op", 35_000.0, true)).collect();
    assert_eq!(detector.detect(&critical)[0].severity, Severity::Critical);
}

#[test]
fn fast_consistent_operation_yields_no_findings() {
    pulsemon_common::id::init(1, 1);
    let detector = BottleneckDetector::default();
    let samples: Vec<Sample> = (0..10).map(|_| make_sample("fast_op", 100.0, true)).collect();
    assert!(detector.detect(&samples).is_empty());
}

#[test]
fn skewed_fixture_reports_variance_but_not_latency() {
    // 19 fast samples, one 9s outlier, one failure: mean 545ms stays below
    // the latency floor while variance blows past 2x the mean.
    pulsemon_common::id::init(1, 1);
    let detector = BottleneckDetector::default();

    let mut samples: Vec<Sample> = (0..19)
        .map(|i| make_sample("export_config", 100.0, i != 0))
        .collect();
    samples.push(make_sample("export_config", 9_000.0, true));

    let findings = detector.detect(&samples);
    assert_eq!(findings.len(), 1, "expected only the variance finding");
    assert_eq!(findings[0].severity, Severity::Medium);
    assert_eq!(findings[0].average_delay_ms, 0.0);
    assert!(findings[0].impact.contains("variance"));
}

#[test]
fn error_rate_rule_grades_by_ratio() {
    pulsemon_common::id::init(1, 1);
    let detector = BottleneckDetector::default();

    // 3 of 10 failed: above 0.25, at or below 0.50
    let mut samples: Vec<Sample> = (0..7).map(|_| make_sample("flaky_op", 50.0, true)).collect();
    samples.extend((0..3).map(|_| make_sample("flaky_op", 50.0, false)));
    let findings = detector.detect(&samples);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::High);
    assert_eq!(findings[0].occurrences, 3);

    // 6 of 10 failed: critical
    let mut samples: Vec<Sample> = (0..4).map(|_| make_sample("flaky_op", 50.0, true)).collect();
    samples.extend((0..6).map(|_| make_sample("flaky_op", 50.0, false)));
    assert_eq!(detector.detect(&samples)[0].severity, Severity::Critical);
}

#[test]
fn findings_sorted_by_severity_stable() {
    pulsemon_common::id::init(1, 1);
    let detector = BottleneckDetector::default();

    // first_op: medium latency only; second_op: critical error rate
    let mut samples: Vec<Sample> = (0..5).map(|_| make_sample("first_op", 6_000.0, true)).collect();
    samples.extend((0..4).map(|_| make_sample("second_op", 50.0, false)));
    samples.extend((0..2).map(|_| make_sample("second_op", 50.0, true)));

    let findings = detector.detect(&samples);
    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].operation, "second_op");
    assert_eq!(findings[0].severity, Severity::Critical);
    assert_eq!(findings[1].operation, "first_op");
}

#[test]
fn repeat_breach_deduplicates_into_count() {
    pulsemon_common::id::init(1, 1);
    let mut manager = AlertManager::new(24);
    let now = Utc::now();

    let first = manager.trigger("cpu", Severity::Critical, "cpu at 96%", now);
    assert!(matches!(first, AlertOutcome::Created(_)));

    let second = manager.trigger("cpu", Severity::Critical, "cpu at 97%", now);
    let AlertOutcome::Repeated(alert) = second else {
        panic!("second breach should dedupe");
    };
    assert_eq!(alert.count, 2);
    assert_eq!(manager.len(), 1);
}

#[test]
fn distinct_keys_create_distinct_alerts() {
    pulsemon_common::id::init(1, 1);
    let mut manager = AlertManager::new(24);
    let now = Utc::now();

    manager.trigger("cpu", Severity::Critical, "cpu at 96%", now);
    manager.trigger("cpu", Severity::Medium, "cpu trending up", now);
    manager.trigger("memory", Severity::Critical, "memory at 92%", now);
    assert_eq!(manager.len(), 3);
}

#[test]
fn acknowledge_unknown_id_mutates_nothing() {
    pulsemon_common::id::init(1, 1);
    let mut manager = AlertManager::new(24);
    let now = Utc::now();
    manager.trigger("cpu", Severity::Critical, "cpu at 96%", now);

    assert!(manager.acknowledge("no-such-id", "operator", now).is_none());
    assert!(!manager.active_alerts()[0].acknowledged);
}

#[test]
fn acknowledge_is_idempotent() {
    pulsemon_common::id::init(1, 1);
    let mut manager = AlertManager::new(24);
    let now = Utc::now();
    let outcome = manager.trigger("cpu", Severity::Critical, "cpu at 96%", now);
    let id = outcome.alert().id.clone();

    let first = manager.acknowledge(&id, "operator", now).unwrap();
    assert!(first.acknowledged);
    assert_eq!(first.acknowledged_by.as_deref(), Some("operator"));

    let second = manager.acknowledge(&id, "someone-else", now).unwrap();
    assert!(second.acknowledged);
    // First acknowledgment wins; the second is a no-op.
    assert_eq!(second.acknowledged_by.as_deref(), Some("operator"));
}

#[test]
fn cleanup_removes_only_acknowledged_and_expired() {
    pulsemon_common::id::init(1, 1);
    let mut manager = AlertManager::new(24);
    let old = Utc::now() - Duration::hours(30);

    let acked_old = manager.trigger("cpu", Severity::Critical, "cpu at 96%", old);
    let id = acked_old.alert().id.clone();
    manager.acknowledge(&id, "operator", old);

    // Unacknowledged alert of the same age must survive.
    manager.trigger("memory", Severity::Critical, "memory at 92%", old);
    // Acknowledged but recent alert must survive.
    let recent = manager.trigger("disk", Severity::High, "disk at 85%", Utc::now());
    let recent_id = recent.alert().id.clone();
    manager.acknowledge(&recent_id, "operator", Utc::now());

    let removed = manager.cleanup(Utc::now());
    assert_eq!(removed, 1);
    assert_eq!(manager.len(), 2);
    let components: Vec<String> = manager
        .active_alerts()
        .iter()
        .map(|a| a.component.clone())
        .collect();
    assert!(components.contains(&"memory".to_string()));
    assert!(components.contains(&"disk".to_string()));
}

#[test]
fn active_alerts_sorted_by_severity() {
    pulsemon_common::id::init(1, 1);
    let mut manager = AlertManager::new(24);
    let now = Utc::now();
    manager.trigger("queue", Severity::Low, "queue depth rising", now);
    manager.trigger("cpu", Severity::Critical, "cpu at 96%", now);
    manager.trigger("disk", Severity::High, "disk at 85%", now);

    let alerts = manager.active_alerts();
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[1].severity, Severity::High);
    assert_eq!(alerts[2].severity, Severity::Low);
}
