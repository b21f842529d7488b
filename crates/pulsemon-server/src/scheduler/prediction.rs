use crate::gateway::PushMessage;
use crate::state::AppState;
use chrono::Utc;
use pulsemon_common::types::PredictedIssue;
use tokio::time::{interval, Duration};

/// Runs the forecast pass on its own cadence and broadcasts the predicted
/// issues to observers.
pub struct PredictionScheduler {
    state: AppState,
    interval_secs: u64,
}

impl PredictionScheduler {
    pub fn new(state: AppState, interval_secs: u64) -> Self {
        Self {
            state,
            interval_secs,
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval_secs,
            "Prediction scheduler started"
        );
        let mut tick = interval(Duration::from_secs(self.interval_secs));
        loop {
            tick.tick().await;
            self.tick_once();
        }
    }

    /// One prediction pass over every declared metric.
    pub fn tick_once(&self) -> Vec<PredictedIssue> {
        let issues = self.state.compute_forecasts(None);
        if !issues.is_empty() {
            for issue in &issues {
                tracing::warn!(
                    component = %issue.component,
                    probability = issue.probability,
                    estimated_at = %issue.estimated_at,
                    "Predicted issue"
                );
            }
        }
        let _ = self.state.broadcast.send(PushMessage::ForecastUpdate {
            issues: issues.clone(),
            timestamp: Utc::now(),
        });
        issues
    }
}
