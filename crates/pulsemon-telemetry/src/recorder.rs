use crate::buffer::SampleBuffer;
use crate::resource::ResourceProbe;
use chrono::Utc;
use pulsemon_common::error::MonitorError;
use pulsemon_common::id;
use pulsemon_common::types::{ResourceUsage, Sample};
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// Sentinel returned by [`SampleRecorder::start`] when the operation was
/// not sampled. Every later call carrying it is a no-op.
pub const UNSAMPLED_ID: &str = "";

/// Attribution attached to a sample at start time.
#[derive(Debug, Clone, Default)]
pub struct SampleScope {
    pub metadata: HashMap<String, serde_json::Value>,
    pub session_id: Option<String>,
    pub actor_id: Option<String>,
}

impl SampleScope {
    pub fn in_session(session_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            metadata: HashMap::new(),
            session_id: Some(session_id.into()),
            actor_id: Some(actor_id.into()),
        }
    }
}

/// Result reported when an operation ends.
#[derive(Debug, Clone, Default)]
pub struct SampleOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SampleOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

struct PendingSample {
    sample: Sample,
    start_resources: ResourceUsage,
}

/// Records the start and end of operations and hands finished samples to
/// the shared write buffer.
///
/// `start` and `end` only touch in-memory state; all storage I/O happens in
/// the background flush. A recording failure is logged and swallowed so
/// observability never breaks the observed system.
pub struct SampleRecorder {
    buffer: Arc<SampleBuffer>,
    pending: Mutex<HashMap<String, PendingSample>>,
    probe: Mutex<ResourceProbe>,
    sampling_rate: f64,
}

impl SampleRecorder {
    pub fn new(buffer: Arc<SampleBuffer>, sampling_rate: f64) -> Self {
        Self {
            buffer,
            pending: Mutex::new(HashMap::new()),
            probe: Mutex::new(ResourceProbe::new()),
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingSample>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_snapshot(&self) -> ResourceUsage {
        self.probe
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot()
    }

    /// Begins recording one unit of work. Returns the sample id, or the
    /// unsampled sentinel when the operation is not selected by the
    /// sampling rate or the input is malformed.
    pub fn start(&self, operation: &str, scope: SampleScope) -> String {
        if operation.trim().is_empty() {
            let err = MonitorError::InvalidInput {
                what: "operation name",
                detail: "must not be empty".to_string(),
            };
            tracing::warn!(error = %err, "Sample rejected, operation proceeds uninstrumented");
            return UNSAMPLED_ID.to_string();
        }
        if self.sampling_rate < 1.0 && rand::thread_rng().gen::<f64>() >= self.sampling_rate {
            return UNSAMPLED_ID.to_string();
        }

        let id = id::next_id();
        let start_resources = self.take_snapshot();
        let sample = Sample {
            id: id.clone(),
            operation: operation.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            error: None,
            metadata: scope.metadata,
            session_id: scope.session_id,
            actor_id: scope.actor_id,
            resources: None,
        };
        self.lock_pending().insert(
            id.clone(),
            PendingSample {
                sample,
                start_resources,
            },
        );
        id
    }

    /// Finalizes a sample: fixes duration and outcome, stores the resource
    /// delta, and appends it to the write buffer. A no-op for the unsampled
    /// sentinel and for ids that were never started.
    pub fn end(&self, sample_id: &str, outcome: SampleOutcome) {
        if sample_id == UNSAMPLED_ID {
            return;
        }
        let Some(pending) = self.lock_pending().remove(sample_id) else {
            tracing::debug!(sample_id, "end() called for unknown sample id");
            return;
        };

        let PendingSample {
            mut sample,
            start_resources,
        } = pending;
        let now = Utc::now();
        let elapsed = now - sample.started_at;
        sample.ended_at = Some(now);
        sample.duration_ms = Some(elapsed.num_microseconds().unwrap_or(0) as f64 / 1000.0);
        sample.success = Some(outcome.success);
        sample.error = outcome.error;
        sample.metadata.extend(outcome.metadata);

        let end_resources = self.take_snapshot();
        sample.resources = Some(ResourceUsage::delta(&end_resources, &start_resources));

        self.buffer.append(sample);
    }

    /// Runs `f` between `start` and `end`. On error the sample is ended
    /// with the error text and the error is returned unchanged.
    pub fn track<T, E, F>(&self, operation: &str, scope: SampleScope, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let id = self.start(operation, scope);
        match f() {
            Ok(value) => {
                self.end(&id, SampleOutcome::ok());
                Ok(value)
            }
            Err(e) => {
                self.end(&id, SampleOutcome::failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Async counterpart of [`track`](Self::track).
    pub async fn track_async<T, E, Fut>(
        &self,
        operation: &str,
        scope: SampleScope,
        fut: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let id = self.start(operation, scope);
        match fut.await {
            Ok(value) => {
                self.end(&id, SampleOutcome::ok());
                Ok(value)
            }
            Err(e) => {
                self.end(&id, SampleOutcome::failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Number of started-but-not-ended samples, used by shutdown logging.
    pub fn in_flight(&self) -> usize {
        self.lock_pending().len()
    }
}
