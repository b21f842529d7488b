use chrono::{DateTime, Utc};
use pulsemon_common::types::{ComponentHealth, HealthStatus, MetricSpec, TrendDirection};

/// Fraction of the threshold at which a component enters the warning band.
pub const WARNING_FRACTION: f64 = 0.8;

/// Classifies one component from the latest metric-history value.
///
/// `latest == None` means the component has not produced a measurement yet
/// (or its pipeline is failing) and classifies as unknown rather than as a
/// stale healthy/critical value.
pub fn classify_component(
    spec: &MetricSpec,
    latest: Option<f64>,
    trend: TrendDirection,
    now: DateTime<Utc>,
) -> ComponentHealth {
    let Some(value) = latest else {
        return ComponentHealth {
            component: spec.key.clone(),
            value: 0.0,
            threshold: spec.threshold,
            status: HealthStatus::Unknown,
            trend,
            last_updated: now,
            detail: "no measurements yet".to_string(),
        };
    };

    let status = if spec.higher_is_better {
        // Mirrored bands: breach means falling below the threshold.
        if value < spec.threshold {
            HealthStatus::Critical
        } else if value < spec.threshold / WARNING_FRACTION {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    } else if value > spec.threshold {
        HealthStatus::Critical
    } else if value > spec.threshold * WARNING_FRACTION {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    let detail = match status {
        HealthStatus::Critical => format!(
            "value {value:.2} breaches threshold {:.2}",
            spec.threshold
        ),
        HealthStatus::Warning => format!(
            "value {value:.2} approaching threshold {:.2}",
            spec.threshold
        ),
        _ => format!("value {value:.2} within threshold {:.2}", spec.threshold),
    };

    ComponentHealth {
        component: spec.key.clone(),
        value,
        threshold: spec.threshold,
        status,
        trend,
        last_updated: now,
        detail,
    }
}

/// Combines component states into one overall classification: critical
/// dominates, then warning, then all-healthy; anything mixed or incomplete
/// is unknown.
pub fn overall_status(components: &[ComponentHealth]) -> HealthStatus {
    if components
        .iter()
        .any(|c| c.status == HealthStatus::Critical)
    {
        return HealthStatus::Critical;
    }
    if components.iter().any(|c| c.status == HealthStatus::Warning) {
        return HealthStatus::Warning;
    }
    if !components.is_empty()
        && components
            .iter()
            .all(|c| c.status == HealthStatus::Healthy)
    {
        return HealthStatus::Healthy;
    }
    HealthStatus::Unknown
}
