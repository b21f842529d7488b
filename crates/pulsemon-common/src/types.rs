use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recorded operation execution with timing, outcome, and resource delta.
///
/// Created by the sample recorder when an operation starts (`ended_at`,
/// `duration_ms`, and `success` unset), finalized exactly once when it ends,
/// and immutable from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub success: Option<bool>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub session_id: Option<String>,
    pub actor_id: Option<String>,
    /// Resource-usage delta (end snapshot minus start snapshot). Fields may
    /// be negative when the process released memory during the operation.
    pub resources: Option<ResourceUsage>,
}

/// Process and system resource figures captured by the resource probe.
///
/// When attached to a [`Sample`] this holds the delta between the end and
/// start snapshots, not an absolute reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_usage_percent: f64,
    pub rss_mb: f64,
    pub virtual_mb: f64,
    pub system_used_mb: f64,
}

impl ResourceUsage {
    /// Component-wise difference, used to turn two absolute snapshots into
    /// the per-operation delta stored on a sample.
    pub fn delta(end: &ResourceUsage, start: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            cpu_usage_percent: end.cpu_usage_percent - start.cpu_usage_percent,
            rss_mb: end.rss_mb - start.rss_mb,
            virtual_mb: end.virtual_mb - start.virtual_mb,
            system_used_mb: end.system_used_mb - start.system_used_mb,
        }
    }
}

/// Statistics derived from a set of samples for one operation over a window.
///
/// Always recomputable from stored samples; persisted snapshots carry the
/// period they were computed over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub operation: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub sample_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_rate: f64,
    /// Samples per second across the observed span; 0 when the span is 0.
    pub throughput_per_sec: f64,
    pub peak_concurrency: u32,
}

/// Statistics derived for one session across all of its operations.
///
/// Invariant: `success_count + failure_count == operation_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub operation_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub distinct_actors: u64,
    pub artifact_count: u64,
    pub mean_duration_ms: f64,
    pub resource_deltas: Vec<ResourceUsage>,
}

/// Severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use pulsemon_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank used for ordering findings (critical=4 … low=1).
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// A detected anomaly (high latency, high variance, or high error rate)
/// for an operation. Recomputed on every detection pass, never stored as
/// mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub operation: String,
    pub severity: Severity,
    pub impact: String,
    pub occurrences: u64,
    /// Mean delay beyond the triggering threshold, in milliseconds. 0 for
    /// findings that flag a condition rather than a latency excess.
    pub average_delay_ms: f64,
    pub recommendation: String,
}

/// A live, deduplicated record of an ongoing threshold breach.
///
/// At most one active alert exists per (component, severity) key; repeat
/// breaches increment `count` instead of creating duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub id: String,
    pub severity: Severity,
    pub component: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Qualitative health classification for a component or the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Directional classification of a metric over recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

/// Current health of one monitored component, recomputed every monitoring
/// tick from the latest metric-history value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub value: f64,
    pub threshold: f64,
    pub status: HealthStatus,
    pub trend: TrendDirection,
    pub last_updated: DateTime<Utc>,
    pub detail: String,
}

/// Trend report for one metric, as returned to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub metric: String,
    pub direction: TrendDirection,
    /// Relative change between the recent and older halves of the history.
    pub pct_change: f64,
    pub data_points: usize,
}

/// Category of a predicted issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ResourceExhaustion,
    Degradation,
    CapacityLimit,
    ErrorSpike,
}

/// Forecast output: a predicted time-to-exhaustion or degradation for a
/// metric based on linear extrapolation. Recomputed each prediction cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedIssue {
    pub kind: IssueKind,
    pub component: String,
    pub description: String,
    /// Likelihood in [0.1, 0.9]; closer predicted times score higher.
    pub probability: f64,
    pub estimated_at: DateTime<Utc>,
    pub severity: Severity,
    pub recommendations: Vec<String>,
}

/// Declaration of a monitored metric.
///
/// Direction is an explicit property: `higher_is_better` decides how trend
/// and health classification interpret movement, instead of inferring it
/// from the metric name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Metric key, also used as the component name in health and alerts
    /// (e.g., `"cpu"`, `"memory"`, `"response_time"`).
    pub key: String,
    pub threshold: f64,
    pub higher_is_better: bool,
    /// Hard ceiling the forecaster extrapolates toward, when exhaustion is
    /// meaningful for this metric (e.g., 100.0 for a percentage).
    pub ceiling: Option<f64>,
    pub kind: IssueKind,
}
