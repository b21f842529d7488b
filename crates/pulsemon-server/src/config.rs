use anyhow::{Context, Result};
use pulsemon_common::error::MonitorError;
use pulsemon_common::types::{IssueKind, MetricSpec};
use serde::{Deserialize, Serialize};

macro_rules! config_bail {
    ($($arg:tt)*) => {
        return Err(MonitorError::Configuration(format!($($arg)*)))
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Probability in [0, 1] that an operation is recorded at all.
    #[serde(default = "default_sampling_rate")]
    pub rate: f64,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Buffer size that triggers an immediate flush.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_aggregation_interval_secs")]
    pub interval_secs: u64,
    /// Days of raw sample partitions to keep.
    #[serde(default = "default_raw_retention_days")]
    pub raw_retention_days: u32,
    /// Days of aggregate snapshots to keep; may be shorter than the raw
    /// retention since aggregates are always recomputable.
    #[serde(default = "default_aggregate_retention_days")]
    pub aggregate_retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_alerting_interval_secs")]
    pub interval_secs: u64,
    /// Hours an acknowledged alert survives before cleanup removes it.
    #[serde(default = "default_alert_retention_hours")]
    pub retention_hours: i64,
    /// Seconds of recent samples the bottleneck detector scans each tick.
    #[serde(default = "default_bottleneck_lookback_secs")]
    pub bottleneck_lookback_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    #[serde(default = "default_prediction_interval_secs")]
    pub interval_secs: u64,
    /// How many of the most recent history values feed each fit.
    #[serde(default = "default_prediction_window")]
    pub window: usize,
    #[serde(default = "default_horizon_hours")]
    pub horizon_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Most recent values kept per metric series.
    #[serde(default = "default_history_window")]
    pub window_size: usize,
}

/// Per-component thresholds. Missing thresholds are a startup error, not a
/// silent default to "no alerting".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
    #[serde(default = "default_disk_percent")]
    pub disk_percent: f64,
    #[serde(default = "default_response_time_ms")]
    pub response_time_ms: f64,
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    /// Optional: only monitored when the embedding application reports a
    /// cache hit rate.
    #[serde(default)]
    pub cache_hit_rate_percent: Option<f64>,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate: default_sampling_rate(),
            flush_interval_secs: default_flush_interval_secs(),
            flush_threshold: default_flush_threshold(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_aggregation_interval_secs(),
            raw_retention_days: default_raw_retention_days(),
            aggregate_retention_days: default_aggregate_retention_days(),
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_alerting_interval_secs(),
            retention_hours: default_alert_retention_hours(),
            bottleneck_lookback_secs: default_bottleneck_lookback_secs(),
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_prediction_interval_secs(),
            window: default_prediction_window(),
            horizon_hours: default_horizon_hours(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_history_window(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            disk_percent: default_disk_percent(),
            response_time_ms: default_response_time_ms(),
            error_rate: default_error_rate(),
            cache_hit_rate_percent: None,
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            sampling: SamplingConfig::default(),
            aggregation: AggregationConfig::default(),
            alerting: AlertingConfig::default(),
            prediction: PredictionConfig::default(),
            history: HistoryConfig::default(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Fails fast on configuration that would make health states
    /// meaningless at runtime.
    pub fn validate(&self) -> std::result::Result<(), MonitorError> {
        if !(0.0..=1.0).contains(&self.sampling.rate) {
            config_bail!(
                "sampling.rate must be within [0, 1], got {}",
                self.sampling.rate
            );
        }
        if self.sampling.flush_threshold == 0 {
            config_bail!("sampling.flush_threshold must be at least 1");
        }
        for (name, value) in [
            ("sampling.flush_interval_secs", self.sampling.flush_interval_secs),
            ("aggregation.interval_secs", self.aggregation.interval_secs),
            ("alerting.interval_secs", self.alerting.interval_secs),
            ("prediction.interval_secs", self.prediction.interval_secs),
        ] {
            if value == 0 {
                config_bail!("{name} must be at least 1 second");
            }
        }
        if self.alerting.retention_hours <= 0 {
            config_bail!("alerting.retention_hours must be positive");
        }
        if self.prediction.window < 2 {
            config_bail!("prediction.window must be at least 2");
        }
        if self.prediction.horizon_hours <= 0.0 {
            config_bail!("prediction.horizon_hours must be positive");
        }
        if self.history.window_size < 2 {
            config_bail!("history.window_size must be at least 2");
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.cpu_percent", t.cpu_percent),
            ("thresholds.memory_percent", t.memory_percent),
            ("thresholds.disk_percent", t.disk_percent),
            ("thresholds.response_time_ms", t.response_time_ms),
            ("thresholds.queue_depth", t.queue_depth),
        ] {
            if value <= 0.0 {
                config_bail!("{name} must be positive, got {value}");
            }
        }
        if !(0.0..=1.0).contains(&t.error_rate) || t.error_rate == 0.0 {
            config_bail!(
                "thresholds.error_rate must be within (0, 1], got {}",
                t.error_rate
            );
        }
        if let Some(rate) = t.cache_hit_rate_percent {
            if !(0.0..=100.0).contains(&rate) || rate == 0.0 {
                config_bail!(
                    "thresholds.cache_hit_rate_percent must be within (0, 100], got {rate}"
                );
            }
        }
        Ok(())
    }

    /// The declared metric set derived from the threshold table. Direction
    /// and forecast ceilings are explicit per metric.
    pub fn metric_specs(&self) -> Vec<MetricSpec> {
        let t = &self.thresholds;
        let mut specs = vec![
            MetricSpec {
                key: "cpu".to_string(),
                threshold: t.cpu_percent,
                higher_is_better: false,
                ceiling: Some(100.0),
                kind: IssueKind::ResourceExhaustion,
            },
            MetricSpec {
                key: "memory".to_string(),
                threshold: t.memory_percent,
                higher_is_better: false,
                ceiling: Some(100.0),
                kind: IssueKind::ResourceExhaustion,
            },
            MetricSpec {
                key: "disk".to_string(),
                threshold: t.disk_percent,
                higher_is_better: false,
                ceiling: Some(100.0),
                kind: IssueKind::ResourceExhaustion,
            },
            MetricSpec {
                key: "response_time".to_string(),
                threshold: t.response_time_ms,
                higher_is_better: false,
                ceiling: Some(t.response_time_ms),
                kind: IssueKind::Degradation,
            },
            MetricSpec {
                key: "error_rate".to_string(),
                threshold: t.error_rate,
                higher_is_better: false,
                ceiling: Some(t.error_rate),
                kind: IssueKind::ErrorSpike,
            },
            MetricSpec {
                key: "queue_depth".to_string(),
                threshold: t.queue_depth,
                higher_is_better: false,
                ceiling: Some(t.queue_depth),
                kind: IssueKind::CapacityLimit,
            },
        ];
        if let Some(rate) = t.cache_hit_rate_percent {
            specs.push(MetricSpec {
                key: "cache_hit_rate".to_string(),
                threshold: rate,
                higher_is_better: true,
                ceiling: None,
                kind: IssueKind::Degradation,
            });
        }
        specs
    }
}

fn default_http_port() -> u16 {
    9400
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_flush_threshold() -> usize {
    100
}

fn default_aggregation_interval_secs() -> u64 {
    60
}

fn default_raw_retention_days() -> u32 {
    7
}

fn default_aggregate_retention_days() -> u32 {
    30
}

fn default_alerting_interval_secs() -> u64 {
    10
}

fn default_alert_retention_hours() -> i64 {
    24
}

fn default_bottleneck_lookback_secs() -> u64 {
    300
}

fn default_prediction_interval_secs() -> u64 {
    60
}

fn default_prediction_window() -> usize {
    20
}

fn default_horizon_hours() -> f64 {
    24.0
}

fn default_history_window() -> usize {
    100
}

fn default_cpu_percent() -> f64 {
    80.0
}

fn default_memory_percent() -> f64 {
    85.0
}

fn default_disk_percent() -> f64 {
    90.0
}

fn default_response_time_ms() -> f64 {
    5000.0
}

fn default_error_rate() -> f64 {
    0.1
}

fn default_queue_depth() -> f64 {
    1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_sampling_rate_is_rejected() {
        let mut config = ServerConfig::default();
        config.sampling.rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut config = ServerConfig::default();
        config.thresholds.cpu_percent = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = ServerConfig::default();
        config.alerting.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cache_hit_rate_is_declared_inverse() {
        let mut config = ServerConfig::default();
        config.thresholds.cache_hit_rate_percent = Some(70.0);
        let specs = config.metric_specs();
        let hit_rate = specs.iter().find(|s| s.key == "cache_hit_rate").unwrap();
        assert!(hit_rate.higher_is_better);
        // Without the option set, the metric is not monitored at all.
        let default_specs = ServerConfig::default().metric_specs();
        assert!(default_specs.iter().all(|s| s.key != "cache_hit_rate"));
    }
}
