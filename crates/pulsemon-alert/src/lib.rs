//! Bottleneck detection and alert lifecycle management.
//!
//! The [`bottleneck::BottleneckDetector`] scans batches of samples for
//! latency, variance, and error-rate anomalies and emits ranked findings.
//! The [`manager::AlertManager`] keeps the registry of active alerts keyed
//! by (component, severity): it deduplicates repeat breaches, exposes
//! acknowledgment, and expires acknowledged alerts past retention.

pub mod bottleneck;
pub mod manager;

#[cfg(test)]
mod tests;
