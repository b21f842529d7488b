//! Persistence layer for samples, aggregate snapshots, and alert events.
//!
//! The default implementation ([`engine::SqliteStorageEngine`]) uses daily
//! time-partitioned SQLite databases with WAL mode for concurrent reads.
//! The recorder and the schedulers only see the [`StorageEngine`] trait, so
//! tests substitute in-memory doubles.

pub mod engine;
pub mod error;
pub mod partition;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pulsemon_common::types::{ActiveAlert, AggregateMetrics, Sample};

/// Parameters for a time-range sample query.
///
/// # Examples
///
/// ```
/// use pulsemon_storage::SampleQuery;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let query = SampleQuery {
///     operation: Some("deploy_widget".into()),
///     session_id: None,
///     from: now - Duration::hours(1),
///     to: now,
/// };
/// assert!(query.session_id.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SampleQuery {
    /// Restrict to one operation name; `None` matches all operations.
    pub operation: Option<String>,
    /// Restrict to one session; `None` matches all sessions.
    pub session_id: Option<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Persistence backend for the monitoring pipeline.
///
/// Implementations must be safe to share across threads (`Send + Sync`):
/// the flush scheduler, the aggregation scheduler, and gateway request
/// handlers all hold the same engine concurrently.
pub trait StorageEngine: Send + Sync {
    /// Writes a batch of finished samples drained from the write buffer.
    fn write_samples(&self, samples: &[Sample]) -> Result<()>;

    /// Queries samples matching the given operation/session filters and
    /// time range, ordered by start time ascending.
    fn query_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>>;

    /// Returns distinct operation names observed in the given time range.
    fn distinct_operations(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<String>>;

    /// Persists an aggregate snapshot for later on-demand reads.
    fn write_aggregate(&self, aggregate: &AggregateMetrics) -> Result<()>;

    /// Queries aggregate snapshots for one operation in a time range,
    /// ordered by period start ascending.
    fn query_aggregates(
        &self,
        operation: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregateMetrics>>;

    /// Persists an alert (insert or update by id).
    fn write_alert(&self, alert: &ActiveAlert) -> Result<()>;

    /// Marks a stored alert acknowledged. Returns true if found.
    fn acknowledge_alert(&self, alert_id: &str, who: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Returns the number of derived artifacts recorded for a session.
    fn count_session_artifacts(&self, session_id: &str) -> Result<u64>;

    /// Removes partitions older than `retention_days`. Returns the number
    /// of partitions removed.
    fn cleanup(&self, retention_days: u32) -> Result<u32>;

    /// Deletes aggregate snapshots older than `retention_days` without
    /// touching raw samples. Aggregates are cheap derived rows, so they
    /// may be pruned on a shorter schedule than the partitions holding
    /// them. Returns the number of rows deleted.
    fn prune_aggregates(&self, retention_days: u32) -> Result<u64>;
}
