//! Typed errors surfaced by the metrics engine.
//!
//! Callers need to distinguish "the input stream is corrupt" from "the
//! query parameters are wrong", so these are concrete variants rather
//! than opaque `anyhow` errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// The decoded event stream for one entity violated an ordering or
    /// referential invariant. The whole stream is rejected; no partial
    /// aggregation is attempted over corrupt data.
    #[error("malformed event stream: {reason}")]
    MalformedStream { reason: String },

    /// A caller-supplied query interval was non-positive or fell outside
    /// the trace bounds. Rejected before any aggregation work.
    #[error("invalid query interval: start={start} dur={dur}: {reason}")]
    InvalidInterval { start: i64, dur: i64, reason: String },
}

impl MetricsError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        MetricsError::MalformedStream {
            reason: reason.into(),
        }
    }
}
