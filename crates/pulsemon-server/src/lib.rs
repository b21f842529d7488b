//! The pulsemon server: wires the recorder, storage, alerting, and
//! analysis crates together, drives them from independent tick schedulers,
//! and exposes state to observers over REST and a WebSocket broadcast
//! gateway.

pub mod api;
pub mod app;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod probe;
pub mod scheduler;
pub mod state;
