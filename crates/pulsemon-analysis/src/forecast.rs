use chrono::{DateTime, Duration, Utc};
use pulsemon_common::types::{IssueKind, MetricSpec, PredictedIssue, Severity};

/// Minimum history length before a forecast is attempted; shorter series
/// are omitted from the output rather than reported as zero.
pub const MIN_FORECAST_POINTS: usize = 10;

/// Ordinary-least-squares fit of `y = slope * x + intercept` over index
/// positions 0..n-1.
#[derive(Debug, Clone, Copy)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

pub fn ols_fit(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let n_f = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    // x is a strictly increasing index, so the denominator is nonzero for
    // n >= 2; the guard stays as a belt against future refactors.
    let denom = n_f * sum_x2 - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    Some(LinearFit {
        slope,
        intercept: (sum_y - slope * sum_x) / n_f,
    })
}

/// Units (sample intervals) until the series reaches `ceiling` at its
/// fitted slope. `None` when the series is flat or falling, or when the
/// latest value already sits at or past the ceiling.
pub fn time_to_limit(values: &[f64], ceiling: f64) -> Option<f64> {
    let fit = ols_fit(values)?;
    if fit.slope <= 0.0 {
        return None;
    }
    let current = *values.last()?;
    let remaining = ceiling - current;
    if remaining <= 0.0 {
        return None;
    }
    Some(remaining / fit.slope)
}

/// Linear-extrapolation forecaster for resource exhaustion and its
/// relatives.
pub struct Forecaster {
    /// How many of the most recent history values feed the fit.
    pub window: usize,
    /// Forecast horizon, in sample-interval units.
    pub horizon_units: f64,
    pub sample_interval_ms: i64,
}

impl Forecaster {
    /// Runs one forecast pass for a metric. Emits a [`PredictedIssue`] only
    /// when the fitted line crosses the metric's ceiling within the
    /// horizon.
    pub fn forecast(
        &self,
        spec: &MetricSpec,
        values: &[f64],
        now: DateTime<Utc>,
    ) -> Option<PredictedIssue> {
        let ceiling = spec.ceiling?;
        if values.len() < MIN_FORECAST_POINTS {
            return None;
        }
        let window_start = values.len().saturating_sub(self.window);
        let window = &values[window_start..];

        let ttl = time_to_limit(window, ceiling)?;
        if ttl <= 0.0 || ttl >= self.horizon_units {
            return None;
        }

        let probability = (1.0 - ttl / self.horizon_units).clamp(0.1, 0.9);
        let estimated_at =
            now + Duration::milliseconds((ttl * self.sample_interval_ms as f64) as i64);
        let severity = if ttl < self.horizon_units * 0.25 {
            Severity::Critical
        } else if ttl < self.horizon_units * 0.5 {
            Severity::High
        } else {
            Severity::Medium
        };

        let hours_remaining =
            ttl * self.sample_interval_ms as f64 / 1000.0 / 3600.0;
        Some(PredictedIssue {
            kind: spec.kind,
            component: spec.key.clone(),
            description: format!(
                "{} predicted to reach {ceiling:.0} in {hours_remaining:.1} hours",
                spec.key
            ),
            probability,
            estimated_at,
            severity,
            recommendations: recommendations_for(spec.kind),
        })
    }
}

fn recommendations_for(kind: IssueKind) -> Vec<String> {
    match kind {
        IssueKind::ResourceExhaustion => vec![
            "Scale up the constrained resource before the projected time".to_string(),
            "Review retention settings and release unused capacity".to_string(),
        ],
        IssueKind::Degradation => vec![
            "Profile the slowest operations of the affected component".to_string(),
            "Check for recent deploys that correlate with the slowdown".to_string(),
        ],
        IssueKind::CapacityLimit => vec![
            "Add workers or shed load before the queue saturates".to_string(),
        ],
        IssueKind::ErrorSpike => vec![
            "Inspect error logs for the dominant failure signature".to_string(),
            "Consider rolling back the most recent change".to_string(),
        ],
    }
}
