use crate::config::ServerConfig;
use crate::gateway::PushMessage;
use chrono::{DateTime, Utc};
use pulsemon_alert::manager::AlertManager;
use pulsemon_analysis::forecast::Forecaster;
use pulsemon_analysis::health::{classify_component, overall_status};
use pulsemon_analysis::history::MetricHistory;
use pulsemon_analysis::trend;
use pulsemon_common::types::{
    ActiveAlert, ComponentHealth, HealthStatus, MetricSpec, PredictedIssue, TrendReport,
};
use pulsemon_storage::StorageEngine;
use pulsemon_telemetry::buffer::SampleBuffer;
use pulsemon_telemetry::recorder::SampleRecorder;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageEngine>,
    pub buffer: Arc<SampleBuffer>,
    pub recorder: Arc<SampleRecorder>,
    pub alerts: Arc<Mutex<AlertManager>>,
    pub history: Arc<RwLock<MetricHistory>>,
    pub metric_specs: Arc<Vec<MetricSpec>>,
    /// Components whose pipeline failed on the last tick; they report
    /// status unknown instead of a stale value.
    pub failing: Arc<Mutex<HashSet<String>>>,
    pub broadcast: broadcast::Sender<PushMessage>,
    pub config: Arc<ServerConfig>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn lock_alerts(&self) -> MutexGuard<'_, AlertManager> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lock_failing(&self) -> MutexGuard<'_, HashSet<String>> {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Classifies every declared metric from the latest history value.
    pub fn compute_health(&self) -> (Vec<ComponentHealth>, HealthStatus) {
        let now = Utc::now();
        let history = self
            .history
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let failing = self.lock_failing();

        let components: Vec<ComponentHealth> = self
            .metric_specs
            .iter()
            .map(|spec| {
                let latest = if failing.contains(&spec.key) {
                    None
                } else {
                    history.latest(&spec.key)
                };
                let (direction, _) =
                    trend::classify(&history.values(&spec.key), spec.higher_is_better);
                classify_component(spec, latest, direction, now)
            })
            .collect();

        let overall = overall_status(&components);
        (components, overall)
    }

    /// Trend reports for the requested metric keys; an empty filter means
    /// every declared metric.
    pub fn compute_trends(&self, metrics: &[String]) -> Vec<TrendReport> {
        let history = self
            .history
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.metric_specs
            .iter()
            .filter(|spec| metrics.is_empty() || metrics.contains(&spec.key))
            .map(|spec| trend::report(&spec.key, &history.values(&spec.key), spec.higher_is_better))
            .collect()
    }

    /// Runs one forecast pass over every declared metric. Metrics with
    /// insufficient history or no ceiling are omitted.
    pub fn compute_forecasts(&self, horizon_hours: Option<f64>) -> Vec<PredictedIssue> {
        let sample_interval_ms = (self.config.alerting.interval_secs * 1000) as i64;
        let horizon_hours = horizon_hours.unwrap_or(self.config.prediction.horizon_hours);
        let forecaster = Forecaster {
            window: self.config.prediction.window,
            horizon_units: horizon_hours * 3600.0 * 1000.0 / sample_interval_ms as f64,
            sample_interval_ms,
        };

        let now = Utc::now();
        let history = self
            .history
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.metric_specs
            .iter()
            .filter_map(|spec| forecaster.forecast(spec, &history.values(&spec.key), now))
            .collect()
    }

    /// Acknowledges an alert in the in-memory registry, writes the change
    /// through to storage, and notifies observers. Returns the updated
    /// alert, or `None` for an unknown id.
    pub fn acknowledge_alert(&self, alert_id: &str, who: &str) -> Option<ActiveAlert> {
        let now = Utc::now();
        let alert = self.lock_alerts().acknowledge(alert_id, who, now)?;

        if let Err(e) = self.storage.acknowledge_alert(alert_id, who, now) {
            tracing::warn!(alert_id, error = %e, "Failed to persist acknowledgment");
        }
        let _ = self.broadcast.send(PushMessage::AlertAcknowledged {
            id: alert_id.to_string(),
            who: who.to_string(),
            at: now,
        });
        Some(alert)
    }
}
