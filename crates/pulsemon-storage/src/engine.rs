use crate::partition::PartitionManager;
use crate::{SampleQuery, StorageEngine};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pulsemon_common::types::{ActiveAlert, AggregateMetrics, ResourceUsage, Sample};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Daily-partitioned SQLite persistence for the monitoring pipeline.
pub struct SqliteStorageEngine {
    partitions: PartitionManager,
}

impl SqliteStorageEngine {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            partitions: PartitionManager::new(data_dir)?,
        })
    }
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Sample, String, Option<String>)> {
    let id: String = row.get(0)?;
    let operation: String = row.get(1)?;
    let started_ms: i64 = row.get(2)?;
    let ended_ms: Option<i64> = row.get(3)?;
    let duration_ms: Option<f64> = row.get(4)?;
    let success: Option<i64> = row.get(5)?;
    let error: Option<String> = row.get(6)?;
    let metadata_str: String = row.get(7)?;
    let session_id: Option<String> = row.get(8)?;
    let actor_id: Option<String> = row.get(9)?;
    let resources_str: Option<String> = row.get(10)?;

    let sample = Sample {
        id,
        operation,
        started_at: DateTime::from_timestamp_millis(started_ms).unwrap_or_default(),
        ended_at: ended_ms.and_then(DateTime::from_timestamp_millis),
        duration_ms,
        success: success.map(|v| v != 0),
        error,
        metadata: HashMap::new(),
        session_id,
        actor_id,
        resources: None,
    };
    Ok((sample, metadata_str, resources_str))
}

impl StorageEngine for SqliteStorageEngine {
    fn write_samples(&self, samples: &[Sample]) -> Result<()> {
        // Group by partition day so one transaction covers each database.
        let mut by_partition: HashMap<String, Vec<&Sample>> = HashMap::new();
        for sample in samples {
            let key = self.partitions.get_or_create(sample.started_at)?;
            by_partition.entry(key).or_default().push(sample);
        }

        for (key, chunk) in by_partition {
            self.partitions.with_partition(&key, |conn| {
                let tx = conn.unchecked_transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT OR REPLACE INTO samples
                         (id, operation, started_at, ended_at, duration_ms, success, error,
                          metadata, session_id, actor_id, resources)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    )?;
                    for sample in &chunk {
                        let metadata_json = serde_json::to_string(&sample.metadata)?;
                        let resources_json = sample
                            .resources
                            .as_ref()
                            .map(serde_json::to_string)
                            .transpose()?;
                        stmt.execute(rusqlite::params![
                            &sample.id,
                            &sample.operation,
                            sample.started_at.timestamp_millis(),
                            sample.ended_at.map(|t| t.timestamp_millis()),
                            sample.duration_ms,
                            sample.success.map(i64::from),
                            &sample.error,
                            metadata_json,
                            &sample.session_id,
                            &sample.actor_id,
                            resources_json,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })?;
        }
        Ok(())
    }

    fn query_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>> {
        let keys = self.partitions.partitions_in_range(query.from, query.to)?;
        let mut results = Vec::new();
        let from_ms = query.from.timestamp_millis();
        let to_ms = query.to.timestamp_millis();

        for key in keys {
            self.partitions.with_partition(&key, |conn| {
                let mut sql = String::from(
                    "SELECT id, operation, started_at, ended_at, duration_ms, success, error,
                            metadata, session_id, actor_id, resources
                     FROM samples WHERE started_at >= ?1 AND started_at <= ?2",
                );
                let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
                    vec![Box::new(from_ms), Box::new(to_ms)];

                if let Some(op) = &query.operation {
                    params.push(Box::new(op.clone()));
                    sql.push_str(&format!(" AND operation = ?{}", params.len()));
                }
                if let Some(session) = &query.session_id {
                    params.push(Box::new(session.clone()));
                    sql.push_str(&format!(" AND session_id = ?{}", params.len()));
                }
                sql.push_str(" ORDER BY started_at ASC");

                let mut stmt = conn.prepare_cached(&sql)?;
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let rows = stmt.query_map(param_refs.as_slice(), sample_from_row)?;
                for row in rows {
                    let (mut sample, metadata_str, resources_str) = row?;
                    sample.metadata = serde_json::from_str(&metadata_str).unwrap_or_default();
                    sample.resources = resources_str
                        .as_deref()
                        .and_then(|s| serde_json::from_str::<ResourceUsage>(s).ok());
                    results.push(sample);
                }
                Ok(())
            })?;
        }

        results.sort_by_key(|s| s.started_at);
        Ok(results)
    }

    fn distinct_operations(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<String>> {
        let keys = self.partitions.partitions_in_range(from, to)?;
        let mut names = BTreeSet::new();
        let from_ms = from.timestamp_millis();
        let to_ms = to.timestamp_millis();

        for key in keys {
            self.partitions.with_partition(&key, |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT DISTINCT operation FROM samples
                     WHERE started_at >= ?1 AND started_at <= ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![from_ms, to_ms], |row| {
                    row.get::<_, String>(0)
                })?;
                for row in rows {
                    names.insert(row?);
                }
                Ok(())
            })?;
        }
        Ok(names.into_iter().collect())
    }

    fn write_aggregate(&self, aggregate: &AggregateMetrics) -> Result<()> {
        let key = self.partitions.get_or_create(aggregate.period_start)?;
        self.partitions.with_partition(&key, |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO aggregates
                 (operation, period_start, period_end, sample_count, success_count,
                  failure_count, mean_ms, min_ms, max_ms, p95_ms, p99_ms, error_rate,
                  throughput_per_sec, peak_concurrency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    &aggregate.operation,
                    aggregate.period_start.timestamp_millis(),
                    aggregate.period_end.timestamp_millis(),
                    aggregate.sample_count,
                    aggregate.success_count,
                    aggregate.failure_count,
                    aggregate.mean_ms,
                    aggregate.min_ms,
                    aggregate.max_ms,
                    aggregate.p95_ms,
                    aggregate.p99_ms,
                    aggregate.error_rate,
                    aggregate.throughput_per_sec,
                    aggregate.peak_concurrency,
                ],
            )?;
            Ok(())
        })
    }

    fn query_aggregates(
        &self,
        operation: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregateMetrics>> {
        let keys = self.partitions.partitions_in_range(from, to)?;
        let mut results = Vec::new();
        let from_ms = from.timestamp_millis();
        let to_ms = to.timestamp_millis();

        for key in keys {
            self.partitions.with_partition(&key, |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT operation, period_start, period_end, sample_count, success_count,
                            failure_count, mean_ms, min_ms, max_ms, p95_ms, p99_ms, error_rate,
                            throughput_per_sec, peak_concurrency
                     FROM aggregates
                     WHERE operation = ?1 AND period_start >= ?2 AND period_start <= ?3
                     ORDER BY period_start ASC",
                )?;
                let rows = stmt.query_map(rusqlite::params![operation, from_ms, to_ms], |row| {
                    let period_start: i64 = row.get(1)?;
                    let period_end: i64 = row.get(2)?;
                    Ok(AggregateMetrics {
                        operation: row.get(0)?,
                        period_start: DateTime::from_timestamp_millis(period_start)
                            .unwrap_or_default(),
                        period_end: DateTime::from_timestamp_millis(period_end)
                            .unwrap_or_default(),
                        sample_count: row.get(3)?,
                        success_count: row.get(4)?,
                        failure_count: row.get(5)?,
                        mean_ms: row.get(6)?,
                        min_ms: row.get(7)?,
                        max_ms: row.get(8)?,
                        p95_ms: row.get(9)?,
                        p99_ms: row.get(10)?,
                        error_rate: row.get(11)?,
                        throughput_per_sec: row.get(12)?,
                        peak_concurrency: row.get(13)?,
                    })
                })?;
                for row in rows {
                    results.push(row?);
                }
                Ok(())
            })?;
        }

        results.sort_by_key(|a| a.period_start);
        Ok(results)
    }

    fn write_alert(&self, alert: &ActiveAlert) -> Result<()> {
        let key = self.partitions.get_or_create(alert.created_at)?;
        self.partitions.with_partition(&key, |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO alerts
                 (id, severity, component, message, created_at, acknowledged,
                  acknowledged_by, acknowledged_at, count, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    &alert.id,
                    alert.severity.to_string(),
                    &alert.component,
                    &alert.message,
                    alert.created_at.timestamp_millis(),
                    alert.acknowledged as i64,
                    &alert.acknowledged_by,
                    alert.acknowledged_at.map(|t| t.timestamp_millis()),
                    alert.count,
                    alert.first_seen.timestamp_millis(),
                    alert.last_seen.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
    }

    fn acknowledge_alert(&self, alert_id: &str, who: &str, at: DateTime<Utc>) -> Result<bool> {
        // Alerts are keyed by id, not time, so scan every partition on disk.
        for key in self.partitions.all_partitions()? {
            let updated = self.partitions.with_partition(&key, |conn| {
                let updated = conn.execute(
                    "UPDATE alerts SET acknowledged = 1, acknowledged_by = ?1, acknowledged_at = ?2
                     WHERE id = ?3",
                    rusqlite::params![who, at.timestamp_millis(), alert_id],
                )?;
                Ok(updated > 0)
            })?;
            if updated {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn count_session_artifacts(&self, session_id: &str) -> Result<u64> {
        let mut total = 0u64;
        for key in self.partitions.all_partitions()? {
            total += self.partitions.with_partition(&key, |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM artifacts WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })?;
        }
        Ok(total)
    }

    fn cleanup(&self, retention_days: u32) -> Result<u32> {
        self.partitions.cleanup_older_than(retention_days)
    }

    fn prune_aggregates(&self, retention_days: u32) -> Result<u64> {
        let cutoff_ms = (Utc::now() - chrono::Duration::days(retention_days as i64))
            .timestamp_millis();
        let mut deleted = 0u64;
        for key in self.partitions.all_partitions()? {
            deleted += self.partitions.with_partition(&key, |conn| {
                let changed = conn.execute(
                    "DELETE FROM aggregates WHERE period_start < ?1",
                    rusqlite::params![cutoff_ms],
                )?;
                Ok(changed as u64)
            })?;
        }
        Ok(deleted)
    }
}
