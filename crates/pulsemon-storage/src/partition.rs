use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing;

const SAMPLES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    id TEXT PRIMARY KEY,
    operation TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    ended_at INTEGER,
    duration_ms REAL,
    success INTEGER,
    error TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    session_id TEXT,
    actor_id TEXT,
    resources TEXT
);
CREATE INDEX IF NOT EXISTS idx_samples_op_time
    ON samples(operation, started_at);
CREATE INDEX IF NOT EXISTS idx_samples_session
    ON samples(session_id);
CREATE INDEX IF NOT EXISTS idx_samples_time
    ON samples(started_at);
";

const AGGREGATES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS aggregates (
    operation TEXT NOT NULL,
    period_start INTEGER NOT NULL,
    period_end INTEGER NOT NULL,
    sample_count INTEGER NOT NULL,
    success_count INTEGER NOT NULL,
    failure_count INTEGER NOT NULL,
    mean_ms REAL NOT NULL,
    min_ms REAL NOT NULL,
    max_ms REAL NOT NULL,
    p95_ms REAL NOT NULL,
    p99_ms REAL NOT NULL,
    error_rate REAL NOT NULL,
    throughput_per_sec REAL NOT NULL,
    peak_concurrency INTEGER NOT NULL,
    PRIMARY KEY (operation, period_start)
);
CREATE INDEX IF NOT EXISTS idx_aggregates_time ON aggregates(period_start);
";

const ALERTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    severity TEXT NOT NULL,
    component TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    acknowledged INTEGER NOT NULL DEFAULT 0,
    acknowledged_by TEXT,
    acknowledged_at INTEGER,
    count INTEGER NOT NULL DEFAULT 1,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_component ON alerts(component);
CREATE INDEX IF NOT EXISTS idx_alerts_time ON alerts(created_at);
";

const ARTIFACTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifacts_session ON artifacts(session_id);
";

/// Manages one SQLite database per UTC day, opening them lazily and
/// removing whole partitions once they age out of retention.
pub struct PartitionManager {
    data_dir: PathBuf,
    connections: Mutex<HashMap<String, Connection>>,
}

impl PartitionManager {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Lock the connections map, recovering from a poisoned Mutex if necessary.
    fn lock_connections(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn partition_key(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%d").to_string()
    }

    fn partition_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.db"))
    }

    fn open_partition(&self, path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SAMPLES_SCHEMA)?;
        conn.execute_batch(AGGREGATES_SCHEMA)?;
        conn.execute_batch(ALERTS_SCHEMA)?;
        conn.execute_batch(ARTIFACTS_SCHEMA)?;
        Ok(conn)
    }

    pub fn get_or_create(&self, ts: DateTime<Utc>) -> Result<String> {
        let key = Self::partition_key(ts);
        let mut conns = self.lock_connections();
        if !conns.contains_key(&key) {
            let conn = self.open_partition(&self.partition_path(&key))?;
            tracing::info!(partition = %key, "Created new partition");
            conns.insert(key.clone(), conn);
        }
        Ok(key)
    }

    pub fn with_partition<F, R>(&self, key: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conns = self.lock_connections();
        let conn = conns
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Partition {key} not found"))?;
        f(conn)
    }

    pub fn partitions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let from_date = from.date_naive();
        let to_date = to.date_naive();
        let mut keys = Vec::new();
        let mut date = from_date;
        while date <= to_date {
            let key = date.format("%Y-%m-%d").to_string();
            let path = self.partition_path(&key);
            if path.exists() {
                // Ensure it's loaded
                let mut conns = self.lock_connections();
                if !conns.contains_key(&key) {
                    let conn = self.open_partition(&path)?;
                    conns.insert(key.clone(), conn);
                }
                keys.push(key);
            }
            date = date.succ_opt().unwrap_or(date);
        }
        Ok(keys)
    }

    /// Returns the keys of every partition currently on disk, loading each
    /// into the connection cache. Used for id-based lookups that cannot be
    /// narrowed to a time range (alert acknowledgment, artifact counts).
    pub fn all_partitions(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let entries = std::fs::read_dir(&self.data_dir)?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(date_str) = name.strip_suffix(".db") {
                if NaiveDate::parse_from_str(date_str, "%Y-%m-%d").is_ok() {
                    let mut conns = self.lock_connections();
                    if !conns.contains_key(date_str) {
                        let conn = self.open_partition(&entry.path())?;
                        conns.insert(date_str.to_string(), conn);
                    }
                    keys.push(date_str.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn cleanup_older_than(&self, retention_days: u32) -> Result<u32> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let cutoff_date = cutoff.date_naive();
        let mut removed = 0u32;

        // Collect expired partition dates first
        let mut expired_dates: Vec<(String, PathBuf)> = Vec::new();
        let entries = std::fs::read_dir(&self.data_dir)?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(date_str) = name.strip_suffix(".db") {
                if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                    if date < cutoff_date {
                        expired_dates.push((date_str.to_string(), entry.path()));
                    }
                }
            }
        }

        // Delete expired partitions (best-effort: log errors, don't abort)
        for (date_str, db_path) in &expired_dates {
            // Remove from connection cache (drops the Connection, triggering WAL checkpoint)
            {
                let mut conns = self.lock_connections();
                conns.remove(date_str.as_str());
            }

            if let Err(e) = std::fs::remove_file(db_path) {
                tracing::error!(partition = %date_str, error = %e, "Failed to remove partition file");
                continue;
            }
            // Clean up SQLite WAL mode auxiliary files
            let wal_path = self.data_dir.join(format!("{date_str}.db-wal"));
            let shm_path = self.data_dir.join(format!("{date_str}.db-shm"));
            if wal_path.exists() {
                if let Err(e) = std::fs::remove_file(&wal_path) {
                    tracing::warn!(path = %wal_path.display(), error = %e, "Failed to remove WAL file");
                }
            }
            if shm_path.exists() {
                if let Err(e) = std::fs::remove_file(&shm_path) {
                    tracing::warn!(path = %shm_path.display(), error = %e, "Failed to remove SHM file");
                }
            }

            tracing::info!(partition = %date_str, "Removed expired partition");
            removed += 1;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_removes_expired_partitions_and_wal_files() {
        let tmp = TempDir::new().unwrap();
        let pm = PartitionManager::new(tmp.path()).unwrap();

        // Create a partition 10 days ago (should be cleaned with retention_days=7)
        let old_ts = Utc::now() - Duration::days(10);
        let old_key = pm.get_or_create(old_ts).unwrap();
        let old_db = tmp.path().join(format!("{old_key}.db"));

        // Create today's partition (should NOT be cleaned)
        let today_key = pm.get_or_create(Utc::now()).unwrap();
        let today_db = tmp.path().join(format!("{today_key}.db"));

        assert!(old_db.exists(), "old partition should exist");
        assert!(today_db.exists(), "today partition should exist");

        // Simulate WAL/SHM files for the old partition
        let old_wal = tmp.path().join(format!("{old_key}.db-wal"));
        let old_shm = tmp.path().join(format!("{old_key}.db-shm"));
        std::fs::write(&old_wal, b"wal data").unwrap();
        std::fs::write(&old_shm, b"shm data").unwrap();

        let removed = pm.cleanup_older_than(7).unwrap();

        assert_eq!(removed, 1);
        assert!(!old_db.exists(), "old .db should be deleted");
        assert!(!old_wal.exists(), "old .db-wal should be deleted");
        assert!(!old_shm.exists(), "old .db-shm should be deleted");
        assert!(today_db.exists(), "today partition should still exist");
    }

    #[test]
    fn test_cleanup_keeps_recent_partitions() {
        let tmp = TempDir::new().unwrap();
        let pm = PartitionManager::new(tmp.path()).unwrap();

        for i in 0..3 {
            let ts = Utc::now() - Duration::days(i);
            pm.get_or_create(ts).unwrap();
        }

        let removed = pm.cleanup_older_than(7).unwrap();
        assert_eq!(removed, 0);
    }
}
