use pulsemon_common::error::MonitorError;
use pulsemon_storage::StorageEngine;
use pulsemon_telemetry::buffer::SampleBuffer;
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Drains the sample buffer to storage on a fixed interval, or sooner when
/// the buffer crosses its flush threshold.
pub struct FlushScheduler {
    buffer: Arc<SampleBuffer>,
    storage: Arc<dyn StorageEngine>,
    interval_secs: u64,
}

impl FlushScheduler {
    pub fn new(
        buffer: Arc<SampleBuffer>,
        storage: Arc<dyn StorageEngine>,
        interval_secs: u64,
    ) -> Self {
        Self {
            buffer,
            storage,
            interval_secs,
        }
    }

    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval_secs, "Flush scheduler started");
        let mut tick = interval(Duration::from_secs(self.interval_secs));
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.buffer.threshold_reached() => {}
            }
            self.flush_once();
        }
    }

    /// Performs one flush. On a storage failure the batch is requeued at
    /// the front of the buffer and retried on the next tick; the failure
    /// never propagates to recording callers. Returns how many samples
    /// were written.
    pub fn flush_once(&self) -> usize {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return 0;
        }
        match self.storage.write_samples(&batch) {
            Ok(()) => {
                tracing::debug!(count = batch.len(), "Flushed samples");
                batch.len()
            }
            Err(e) => {
                let err = MonitorError::TransientIo {
                    context: "sample flush",
                    source: e,
                };
                tracing::warn!(
                    count = batch.len(),
                    error = %err,
                    "Flush failed, batch requeued for next tick"
                );
                self.buffer.requeue_front(batch);
                0
            }
        }
    }
}
