//! Sample recording and aggregation for the monitoring pipeline.
//!
//! The [`recorder::SampleRecorder`] is the foundational primitive: callers
//! bracket each unit of work with `start`/`end` (or the `track` wrappers)
//! and finished samples land in a shared [`buffer::SampleBuffer`]. A flush
//! scheduler drains the buffer to storage in the background; recording
//! itself never performs I/O and never fails the instrumented operation.

pub mod aggregate;
pub mod buffer;
pub mod recorder;
pub mod resource;

#[cfg(test)]
mod tests;
