use anyhow::Result;
use chrono::{DateTime, Utc};
use pulsemon_storage::{SampleQuery, StorageEngine};
use pulsemon_telemetry::aggregate::compute_aggregate;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};

/// Computes and persists per-operation aggregates for the samples stored
/// since the last tick, then runs retention cleanup.
pub struct AggregationScheduler {
    storage: Arc<dyn StorageEngine>,
    interval_secs: u64,
    raw_retention_days: u32,
    aggregate_retention_days: u32,
    last_tick: Mutex<DateTime<Utc>>,
}

impl AggregationScheduler {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        interval_secs: u64,
        raw_retention_days: u32,
        aggregate_retention_days: u32,
    ) -> Self {
        Self {
            storage,
            interval_secs,
            raw_retention_days,
            aggregate_retention_days,
            last_tick: Mutex::new(Utc::now()),
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval_secs,
            retention_days = self.raw_retention_days,
            "Aggregation scheduler started"
        );
        let mut tick = interval(Duration::from_secs(self.interval_secs));
        // The immediate first tick would aggregate an empty window.
        tick.tick().await;
        loop {
            tick.tick().await;
            match self.tick_once() {
                Ok(count) if count > 0 => {
                    tracing::debug!(operations = count, "Aggregation tick completed")
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Aggregation tick failed"),
            }
        }
    }

    /// One aggregation pass. On failure the window is not advanced, so the
    /// next tick retries the same span. Returns the number of operations
    /// aggregated.
    pub fn tick_once(&self) -> Result<usize> {
        let since = *self
            .last_tick
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Utc::now();

        let operations = self.storage.distinct_operations(since, now)?;
        let mut aggregated = 0usize;
        for operation in operations {
            let samples = self.storage.query_samples(&SampleQuery {
                operation: Some(operation.clone()),
                session_id: None,
                from: since,
                to: now,
            })?;
            if samples.is_empty() {
                continue;
            }
            let aggregate = compute_aggregate(&operation, &samples, since, now);
            self.storage.write_aggregate(&aggregate)?;
            aggregated += 1;
        }

        match self.storage.cleanup(self.raw_retention_days) {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "Cleaned up expired partitions")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Retention cleanup failed"),
        }
        match self.storage.prune_aggregates(self.aggregate_retention_days) {
            Ok(deleted) if deleted > 0 => {
                tracing::info!(deleted, "Pruned expired aggregate snapshots")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Aggregate pruning failed"),
        }

        *self
            .last_tick
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
        Ok(aggregated)
    }
}
