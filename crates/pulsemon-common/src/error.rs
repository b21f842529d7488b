/// Error taxonomy for the monitoring pipeline.
///
/// Instrumentation failures must never change the behavior of the
/// instrumented operation, so most of these are logged at the point of
/// failure rather than propagated to callers. The exception is
/// [`MonitorError::Configuration`], which aborts startup: silently running
/// without thresholds would produce meaningless health states.
///
/// # Examples
///
/// ```rust
/// use pulsemon_common::error::MonitorError;
///
/// let err = MonitorError::InvalidInput {
///     what: "operation name",
///     detail: "must not be empty".to_string(),
/// };
/// assert!(err.to_string().contains("operation name"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A storage flush or query failed. Logged and retried on the next
    /// tick; never crashes the recorder.
    #[error("transient I/O failure in {context}: {source}")]
    TransientIo {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Malformed sample or metadata rejected at the API boundary. The
    /// surrounding operation proceeds uninstrumented.
    #[error("invalid input: {what}: {detail}")]
    InvalidInput { what: &'static str, detail: String },

    /// Degenerate statistics (e.g., an empty series). Handled by returning
    /// zero/neutral defaults; callers should not see this in practice.
    #[error("computation failed for {metric}: {detail}")]
    Computation { metric: String, detail: String },

    /// Missing or invalid threshold configuration. Fails fast at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Convenience `Result` alias for monitoring operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
