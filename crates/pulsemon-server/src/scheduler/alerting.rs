use crate::gateway::PushMessage;
use crate::probe::SystemProbe;
use crate::state::AppState;
use chrono::{Duration as ChronoDuration, Utc};
use pulsemon_alert::bottleneck::BottleneckDetector;
use pulsemon_alert::manager::AlertOutcome;
use pulsemon_common::types::{HealthStatus, Sample, Severity};
use pulsemon_storage::SampleQuery;
use std::sync::Mutex;
use tokio::time::{interval, Duration};

/// The monitoring tick: ingests the latest metric values into history,
/// classifies health, runs bottleneck detection, drives the alert
/// manager, and broadcasts the resulting state.
pub struct AlertingScheduler {
    state: AppState,
    probe: Mutex<SystemProbe>,
    detector: BottleneckDetector,
    interval_secs: u64,
    lookback_secs: u64,
}

impl AlertingScheduler {
    pub fn new(state: AppState, interval_secs: u64, lookback_secs: u64) -> Self {
        Self {
            state,
            probe: Mutex::new(SystemProbe::new()),
            detector: BottleneckDetector::default(),
            interval_secs,
            lookback_secs,
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval_secs,
            lookback_secs = self.lookback_secs,
            "Alerting scheduler started"
        );
        let mut tick = interval(Duration::from_secs(self.interval_secs));
        loop {
            tick.tick().await;
            self.tick_once();
        }
    }

    /// One monitoring pass. Failures in one stage are isolated: a storage
    /// error marks the affected components unknown and the rest of the
    /// tick proceeds.
    pub fn tick_once(&self) {
        let now = Utc::now();
        self.ingest_system_reading();
        let samples = self.ingest_operation_stats();

        // Classify after ingesting, so health reflects this tick's values.
        let (components, overall) = self.state.compute_health();

        for component in &components {
            if component.status == HealthStatus::Critical {
                self.raise(&component.component, Severity::Critical, &component.detail);
            }
        }

        if let Some(samples) = samples {
            for finding in self.detector.detect(&samples) {
                self.raise(&finding.operation, finding.severity, &finding.impact);
            }
        }

        self.state.lock_alerts().cleanup(now);

        let _ = self.state.broadcast.send(PushMessage::HealthUpdate {
            components,
            overall,
            timestamp: now,
        });
    }

    /// Pushes machine-level gauges into the metric history.
    fn ingest_system_reading(&self) {
        let reading = self
            .probe
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .read();

        let mut history = self
            .state
            .history
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push("cpu", reading.cpu_percent);
        history.push("memory", reading.memory_percent);
        history.push("disk", reading.disk_percent);
        history.push("queue_depth", self.state.buffer.len() as f64);

        let mut failing = self.state.lock_failing();
        for key in ["cpu", "memory", "disk", "queue_depth"] {
            failing.remove(key);
        }
    }

    /// Derives response-time and error-rate values from the samples stored
    /// over the lookback window. Returns the samples for bottleneck
    /// detection, or `None` when the storage query failed.
    fn ingest_operation_stats(&self) -> Option<Vec<Sample>> {
        let now = Utc::now();
        let query = SampleQuery {
            operation: None,
            session_id: None,
            from: now - ChronoDuration::seconds(self.lookback_secs as i64),
            to: now,
        };

        let samples = match self.state.storage.query_samples(&query) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(error = %e, "Monitoring tick could not read samples");
                let mut failing = self.state.lock_failing();
                failing.insert("response_time".to_string());
                failing.insert("error_rate".to_string());
                let _ = self.state.broadcast.send(PushMessage::PipelineError {
                    component: "response_time".to_string(),
                    message: format!("sample query failed: {e}"),
                    timestamp: now,
                });
                return None;
            }
        };

        {
            let mut failing = self.state.lock_failing();
            failing.remove("response_time");
            failing.remove("error_rate");
        }

        if !samples.is_empty() {
            let durations: Vec<f64> = samples.iter().filter_map(|s| s.duration_ms).collect();
            let failures = samples.iter().filter(|s| s.success == Some(false)).count();

            let mut history = self
                .state
                .history
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !durations.is_empty() {
                let mean = durations.iter().sum::<f64>() / durations.len() as f64;
                history.push("response_time", mean);
            }
            history.push("error_rate", failures as f64 / samples.len() as f64);
        }

        Some(samples)
    }

    /// Feeds one breach into the alert manager, persisting and notifying
    /// only for newly created alerts.
    fn raise(&self, component: &str, severity: Severity, message: &str) {
        let outcome = self
            .state
            .lock_alerts()
            .trigger(component, severity, message, Utc::now());

        let alert = outcome.alert().clone();
        if let Err(e) = self.state.storage.write_alert(&alert) {
            tracing::warn!(component, error = %e, "Failed to persist alert");
        }
        if let AlertOutcome::Created(alert) = outcome {
            let _ = self.state.broadcast.send(PushMessage::NewAlert { alert });
        }
    }
}
