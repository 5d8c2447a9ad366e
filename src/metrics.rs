//! Metric helpers for `querywire`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled the helpers compile to nothing.

use crate::frame::FrameMode;

/// Name of the counter tracking row events delivered to callers.
pub const ROWS_EMITTED: &str = "querywire_rows_emitted_total";
/// Name of the counter tracking reconstructed values handed to the decoder.
pub const VALUES_DECODED: &str = "querywire_values_decoded_total";
/// Name of the counter tracking streams ended by an error.
pub const STREAM_ERRORS: &str = "querywire_stream_errors_total";

/// Record a row delivered by a stream in `mode`.
pub fn inc_rows(mode: FrameMode) {
    #[cfg(feature = "metrics")]
    metrics::counter!(ROWS_EMITTED, "mode" => mode.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = mode;
}

/// Record a value handed to the row decoder.
pub fn inc_values(mode: FrameMode) {
    #[cfg(feature = "metrics")]
    metrics::counter!(VALUES_DECODED, "mode" => mode.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = mode;
}

/// Record a stream that ended with an error.
pub fn inc_errors(mode: FrameMode) {
    #[cfg(feature = "metrics")]
    metrics::counter!(STREAM_ERRORS, "mode" => mode.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = mode;
}
