use pulsemon_common::types::Sample;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// In-memory write buffer between the recorder and the flush scheduler.
///
/// Many in-flight operations append concurrently; the flush scheduler holds
/// the only drain path. Appends are FIFO within the buffer, and a drain
/// swaps the whole vector out atomically so no sample is lost or written
/// twice.
pub struct SampleBuffer {
    samples: Mutex<Vec<Sample>>,
    flush_threshold: usize,
    notify: Notify,
}

impl SampleBuffer {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
            flush_threshold,
            notify: Notify::new(),
        }
    }

    fn lock_samples(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a finished sample. When the buffer reaches the flush
    /// threshold the flush scheduler is woken; the append itself returns
    /// immediately either way.
    pub fn append(&self, sample: Sample) {
        let len = {
            let mut samples = self.lock_samples();
            samples.push(sample);
            samples.len()
        };
        if len >= self.flush_threshold {
            self.notify.notify_one();
        }
    }

    /// Takes the entire buffered batch, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.lock_samples())
    }

    /// Puts a drained batch back at the front of the buffer after a failed
    /// flush, preserving FIFO order ahead of samples appended since.
    pub fn requeue_front(&self, mut batch: Vec<Sample>) {
        let mut samples = self.lock_samples();
        batch.append(&mut samples);
        *samples = batch;
    }

    pub fn len(&self) -> usize {
        self.lock_samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_samples().is_empty()
    }

    /// Resolves when an append crosses the flush threshold.
    pub async fn threshold_reached(&self) {
        self.notify.notified().await;
    }
}
