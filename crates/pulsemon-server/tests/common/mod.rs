use chrono::{DateTime, Duration, Utc};
use pulsemon_alert::manager::AlertManager;
use pulsemon_analysis::history::MetricHistory;
use pulsemon_common::types::{ActiveAlert, AggregateMetrics, Sample};
use pulsemon_server::config::ServerConfig;
use pulsemon_server::state::AppState;
use pulsemon_storage::{SampleQuery, StorageEngine};
use pulsemon_telemetry::buffer::SampleBuffer;
use pulsemon_telemetry::recorder::SampleRecorder;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

/// In-memory storage double that records every call, used to assert flush
/// exactness and to drive the schedulers without SQLite.
#[derive(Default)]
pub struct RecordingStorage {
    pub samples: Mutex<Vec<Sample>>,
    pub aggregates: Mutex<Vec<AggregateMetrics>>,
    pub alerts: Mutex<Vec<ActiveAlert>>,
    pub fail_writes: AtomicBool,
}

impl RecordingStorage {
    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn distinct_sample_ids(&self) -> usize {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.id.clone())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl StorageEngine for RecordingStorage {
    fn write_samples(&self, samples: &[Sample]) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            anyhow::bail!("storage unavailable");
        }
        self.samples.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }

    fn query_samples(&self, query: &SampleQuery) -> anyhow::Result<Vec<Sample>> {
        let mut matching: Vec<Sample> = self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.started_at >= query.from && s.started_at <= query.to)
            .filter(|s| {
                query
                    .operation
                    .as_ref()
                    .map_or(true, |op| &s.operation == op)
            })
            .filter(|s| {
                query
                    .session_id
                    .as_ref()
                    .map_or(true, |session| s.session_id.as_ref() == Some(session))
            })
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.started_at);
        Ok(matching)
    }

    fn distinct_operations(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<String>> {
        let names: BTreeSet<String> = self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.started_at >= from && s.started_at <= to)
            .map(|s| s.operation.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn write_aggregate(&self, aggregate: &AggregateMetrics) -> anyhow::Result<()> {
        self.aggregates.lock().unwrap().push(aggregate.clone());
        Ok(())
    }

    fn query_aggregates(
        &self,
        operation: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AggregateMetrics>> {
        Ok(self
            .aggregates
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.operation == operation && a.period_start >= from && a.period_start <= to
            })
            .cloned()
            .collect())
    }

    fn write_alert(&self, alert: &ActiveAlert) -> anyhow::Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn acknowledge_alert(
        &self,
        alert_id: &str,
        who: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut alerts = self.alerts.lock().unwrap();
        let mut found = false;
        for alert in alerts.iter_mut().filter(|a| a.id == alert_id) {
            alert.acknowledged = true;
            alert.acknowledged_by = Some(who.to_string());
            alert.acknowledged_at = Some(at);
            found = true;
        }
        Ok(found)
    }

    fn count_session_artifacts(&self, _session_id: &str) -> anyhow::Result<u64> {
        Ok(0)
    }

    fn cleanup(&self, _retention_days: u32) -> anyhow::Result<u32> {
        Ok(0)
    }

    fn prune_aggregates(&self, retention_days: u32) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let mut aggregates = self.aggregates.lock().unwrap();
        let before = aggregates.len();
        aggregates.retain(|a| a.period_start >= cutoff);
        Ok((before - aggregates.len()) as u64)
    }
}

/// Thresholds far above anything the test host can produce, so only
/// deliberately crafted data raises alerts.
pub fn quiet_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.thresholds.cpu_percent = 10_000.0;
    config.thresholds.memory_percent = 10_000.0;
    config.thresholds.disk_percent = 10_000.0;
    config.thresholds.response_time_ms = 1_000_000.0;
    config.thresholds.error_rate = 1.0;
    config.thresholds.queue_depth = 1_000_000.0;
    config
}

pub fn build_state(storage: Arc<RecordingStorage>, config: ServerConfig) -> AppState {
    pulsemon_common::id::init(1, 1);
    let buffer = Arc::new(SampleBuffer::new(config.sampling.flush_threshold));
    let recorder = Arc::new(SampleRecorder::new(buffer.clone(), config.sampling.rate));
    let (broadcast_tx, _) = broadcast::channel(256);
    AppState {
        storage,
        buffer,
        recorder,
        alerts: Arc::new(Mutex::new(AlertManager::new(
            config.alerting.retention_hours,
        ))),
        history: Arc::new(RwLock::new(MetricHistory::new(config.history.window_size))),
        metric_specs: Arc::new(config.metric_specs()),
        failing: Arc::new(Mutex::new(HashSet::new())),
        broadcast: broadcast_tx,
        config: Arc::new(config),
        start_time: Utc::now(),
    }
}

/// A finished sample with a crafted duration, started just now so the
/// schedulers' time windows include it.
pub fn finished_sample(operation: &str, duration_ms: f64, success: bool) -> Sample {
    let started = Utc::now();
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
            Some("synthetic failure".to_string())
        },
        metadata: Default::default(),
        session_id: Some("sess-test".to_string()),
        actor_id: Some("actor-test".to_string()),
        resources: None,
    }
}
