//! Independent periodic tasks driving the monitoring pipeline.
//!
//! Each concern gets its own scheduler with its own natural period and
//! failure isolation: flush (short, plus a buffer-threshold wakeup),
//! aggregation (longer, also runs retention cleanup), alerting (the
//! monitoring tick), and prediction. Every scheduler is spawned separately
//! from `main` and aborted independently on shutdown.

pub mod aggregation;
pub mod alerting;
pub mod flush;
pub mod prediction;
