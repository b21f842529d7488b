use pulsemon_common::types::{Bottleneck, Sample, Severity};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Scans a batch of samples, grouped by operation, for latency, variance,
/// and error-rate anomalies.
///
/// The three rules are evaluated independently, so one operation can yield
/// zero, one, or several findings in a single pass. Findings are ephemeral:
/// each pass recomputes them from scratch.
pub struct BottleneckDetector {
    /// Mean duration above which the latency rule fires at all.
    pub latency_floor_ms: f64,
    pub latency_high_ms: f64,
    pub latency_critical_ms: f64,
    /// Variance rule fires when population variance exceeds this multiple
    /// of the mean.
    pub variance_factor: f64,
    pub error_rate_floor: f64,
    pub error_rate_high: f64,
    pub error_rate_critical: f64,
}

impl Default for BottleneckDetector {
    fn default() -> Self {
        Self {
            latency_floor_ms: 5_000.0,
            latency_high_ms: 15_000.0,
            latency_critical_ms: 30_000.0,
            variance_factor: 2.0,
            error_rate_floor: 0.10,
            error_rate_high: 0.25,
            error_rate_critical: 0.50,
        }
    }
}

impl BottleneckDetector {
    /// Evaluates all rules over the batch and returns findings sorted by
    /// severity, highest first. The sort is stable, so equally severe
    /// findings keep the order the operations first appeared in the batch.
    pub fn detect(&self, samples: &[Sample]) -> Vec<Bottleneck> {
        // Group while preserving first-seen operation order.
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&Sample>> = HashMap::new();
        for sample in samples {
            let entry = groups.entry(sample.operation.as_str()).or_default();
            if entry.is_empty() {
                order.push(sample.operation.as_str());
            }
            entry.push(sample);
        }

        let mut findings = Vec::new();
        for operation in order {
            let group = &groups[operation];
            if let Some(finding) = self.latency_finding(operation, group) {
                findings.push(finding);
            }
            if let Some(finding) = self.variance_finding(operation, group) {
                findings.push(finding);
            }
            if let Some(finding) = self.error_rate_finding(operation, group) {
                findings.push(finding);
            }
        }

        findings.sort_by_key(|b| Reverse(b.severity.rank()));
        findings
    }

    fn latency_finding(&self, operation: &str, group: &[&Sample]) -> Option<Bottleneck> {
        let durations: Vec<f64> = group.iter().filter_map(|s| s.duration_ms).collect();
        if durations.is_empty() {
            return None;
        }
        let mean = durations.iter().sum::<f64>() / durations.len() as f64;
        if mean <= self.latency_floor_ms {
            return None;
        }

        let severity = if mean > self.latency_critical_ms {
            Severity::Critical
        } else if mean > self.latency_high_ms {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(Bottleneck {
            operation: operation.to_string(),
            severity,
            impact: format!(
                "mean duration {:.1}s across {} samples",
                mean / 1000.0,
                durations.len()
            ),
            occurrences: durations.len() as u64,
            average_delay_ms: mean - self.latency_floor_ms,
            recommendation: format!(
                "Profile {operation} and move long-running work off the critical path"
            ),
        })
    }

    fn variance_finding(&self, operation: &str, group: &[&Sample]) -> Option<Bottleneck> {
        let durations: Vec<f64> = group.iter().filter_map(|s| s.duration_ms).collect();
        if durations.is_empty() {
            return None;
        }
        let n = durations.len() as f64;
        let mean = durations.iter().sum::<f64>() / n;
        let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        if variance <= self.variance_factor * mean {
            return None;
        }

        Some(Bottleneck {
            operation: operation.to_string(),
            severity: Severity::Medium,
            impact: format!(
                "duration variance {variance:.0} exceeds {}x the mean ({mean:.0}ms)",
                self.variance_factor
            ),
            occurrences: durations.len() as u64,
            // The variance rule flags inconsistency, not a latency excess.
            average_delay_ms: 0.0,
            recommendation: format!(
                "Investigate inconsistent execution paths or contention in {operation}"
            ),
        })
    }

    fn error_rate_finding(&self, operation: &str, group: &[&Sample]) -> Option<Bottleneck> {
        if group.is_empty() {
            return None;
        }
        let total = group.len() as f64;
        let failures = group.iter().filter(|s| s.success == Some(false)).count() as f64;
        let error_rate = failures / total;
        if error_rate <= self.error_rate_floor {
            return None;
        }

        let severity = if error_rate > self.error_rate_critical {
            Severity::Critical
        } else if error_rate > self.error_rate_high {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(Bottleneck {
            operation: operation.to_string(),
            severity,
            impact: format!(
                "{:.0}% of {} executions failed",
                error_rate * 100.0,
                group.len()
            ),
            occurrences: failures as u64,
            average_delay_ms: 0.0,
            recommendation: format!("Inspect recent errors for {operation} and add retries or fixes"),
        })
    }
}
