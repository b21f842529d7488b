use chrono::{DateTime, Duration, Utc};
use pulsemon_common::id;
use pulsemon_common::types::{ActiveAlert, Severity};
use std::collections::HashMap;
use tracing;

/// Key: (component, severity bucket)
type AlertKey = (String, Severity);

/// Result of feeding one breach into the manager.
#[derive(Debug, Clone)]
pub enum AlertOutcome {
    /// First breach for this key: a new alert was created and should be
    /// persisted and pushed to observers.
    Created(ActiveAlert),
    /// Repeat breach: the existing alert's count and last-seen were
    /// updated, no new notification is due.
    Repeated(ActiveAlert),
}

impl AlertOutcome {
    pub fn alert(&self) -> &ActiveAlert {
        match self {
            AlertOutcome::Created(alert) | AlertOutcome::Repeated(alert) => alert,
        }
    }
}

/// Stateful registry of active alerts.
///
/// At most one active alert exists per (component, severity) key; repeat
/// breaches increment the existing entry. Acknowledged alerts are removed
/// once older than the retention window; unacknowledged alerts are never
/// silently dropped.
pub struct AlertManager {
    active: HashMap<AlertKey, ActiveAlert>,
    retention: Duration,
}

impl AlertManager {
    pub fn new(retention_hours: i64) -> Self {
        Self {
            active: HashMap::new(),
            retention: Duration::hours(retention_hours),
        }
    }

    /// Registers a threshold breach. Creates a new alert for an unseen key
    /// or increments the existing one.
    pub fn trigger(
        &mut self,
        component: &str,
        severity: Severity,
        message: &str,
        now: DateTime<Utc>,
    ) -> AlertOutcome {
        let key = (component.to_string(), severity);
        if let Some(existing) = self.active.get_mut(&key) {
            existing.count += 1;
            existing.last_seen = now;
            existing.message = message.to_string();
            return AlertOutcome::Repeated(existing.clone());
        }

        let alert = ActiveAlert {
            id: id::next_id(),
            severity,
            component: component.to_string(),
            message: message.to_string(),
            created_at: now,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            count: 1,
            first_seen: now,
            last_seen: now,
        };
        tracing::info!(component, severity = %severity, "Alert raised");
        self.active.insert(key, alert.clone());
        AlertOutcome::Created(alert)
    }

    /// Acknowledges an alert by id. Returns the updated alert, or `None`
    /// for an unknown id (no state is mutated). Acknowledging twice leaves
    /// the alert acknowledged both times.
    pub fn acknowledge(
        &mut self,
        alert_id: &str,
        who: &str,
        now: DateTime<Utc>,
    ) -> Option<ActiveAlert> {
        let alert = self.active.values_mut().find(|a| a.id == alert_id)?;
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_by = Some(who.to_string());
            alert.acknowledged_at = Some(now);
            tracing::info!(alert_id, who, "Alert acknowledged");
        }
        Some(alert.clone())
    }

    /// Removes alerts that are acknowledged and older than the retention
    /// window. Returns how many were removed.
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let before = self.active.len();
        self.active
            .retain(|_, alert| !(alert.acknowledged && now - alert.created_at > retention));
        let removed = before - self.active.len();
        if removed > 0 {
            tracing::debug!(removed, "Expired acknowledged alerts");
        }
        removed
    }

    /// Current alerts, highest severity first, most recently seen first
    /// within a severity.
    pub fn active_alerts(&self) -> Vec<ActiveAlert> {
        let mut alerts: Vec<ActiveAlert> = self.active.values().cloned().collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.last_seen.cmp(&a.last_seen))
        });
        alerts
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
