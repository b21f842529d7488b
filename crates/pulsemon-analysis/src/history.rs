use std::collections::{HashMap, VecDeque};

/// Bounded per-metric history: the most recent `capacity` values, oldest
/// evicted first.
///
/// Owned by the monitoring tick (the single writer); readers take value
/// snapshots rather than borrowing into the deque.
pub struct MetricHistory {
    capacity: usize,
    series: HashMap<String, VecDeque<f64>>,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    pub fn push(&mut self, key: &str, value: f64) {
        let series = self
            .series
            .entry(key.to_string())
            .or_insert_with(VecDeque::new);
        series.push_back(value);
        while series.len() > self.capacity {
            series.pop_front();
        }
    }

    /// Copy-on-read snapshot of one series, oldest first.
    pub fn values(&self, key: &str) -> Vec<f64> {
        self.series
            .get(key)
            .map(|series| series.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, key: &str) -> Option<f64> {
        self.series.get(key).and_then(|series| series.back()).copied()
    }

    pub fn len(&self, key: &str) -> usize {
        self.series.get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.series.keys().cloned().collect();
        keys.sort();
        keys
    }
}
