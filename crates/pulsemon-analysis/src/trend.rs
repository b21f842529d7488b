use pulsemon_common::error::MonitorError;
use pulsemon_common::types::{TrendDirection, TrendReport};

/// Below this many data points a series always classifies as stable.
pub const MIN_TREND_POINTS: usize = 10;

/// Relative change below which movement is treated as noise.
pub const STABLE_BAND: f64 = 0.05;

/// Classifies a metric's direction by comparing the mean of the most recent
/// ⌈N/2⌉ values against the mean of the preceding ⌊N/2⌋.
///
/// Returns the direction and the relative change. A zero older-half mean is
/// reported as stable rather than propagating a NaN or infinity.
pub fn classify(values: &[f64], higher_is_better: bool) -> (TrendDirection, f64) {
    let n = values.len();
    if n < MIN_TREND_POINTS {
        return (TrendDirection::Stable, 0.0);
    }

    let older = &values[..n / 2];
    let recent = &values[n / 2..];
    let older_avg = older.iter().sum::<f64>() / older.len() as f64;
    let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;

    if older_avg.abs() < f64::EPSILON {
        // A zero baseline has no defined percentage change; surface the
        // degenerate case instead of letting NaN/Infinity escape.
        let err = MonitorError::Computation {
            metric: "trend".to_string(),
            detail: "older-half mean is zero, classifying as stable".to_string(),
        };
        tracing::debug!(error = %err, "Degenerate trend input");
        return (TrendDirection::Stable, 0.0);
    }

    let pct_change = (recent_avg - older_avg) / older_avg;
    if pct_change.abs() < STABLE_BAND {
        return (TrendDirection::Stable, pct_change);
    }

    let rising = pct_change > 0.0;
    let direction = if rising == higher_is_better {
        TrendDirection::Improving
    } else {
        TrendDirection::Degrading
    };
    (direction, pct_change)
}

/// Builds the observer-facing trend report for one metric series.
pub fn report(metric: &str, values: &[f64], higher_is_better: bool) -> TrendReport {
    let (direction, pct_change) = classify(values, higher_is_better);
    TrendReport {
        metric: metric.to_string(),
        direction,
        pct_change,
        data_points: values.len(),
    }
}
