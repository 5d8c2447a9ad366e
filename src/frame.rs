//! Reconstruction of JSON values from transport fragments.
//!
//! A streaming query response is a JSON array that is opened once and never
//! closed within a single buffer. Each HTTP chunk normally carries one
//! element plus framing: the opening `[`, a trailing `,` or newline, or the
//! closing `]`. WebSocket frames carry one value each with no array framing.
//!
//! [`FrameReconstructor`] removes that framing and parses what is left,
//! appending complete values to a caller-owned queue. Three modes are
//! supported:
//!
//! - [`FrameMode::Chunked`]: every fragment is self-contained once framing is stripped. Values
//!   split across fragments are a framing defect.
//! - [`FrameMode::Coalesced`]: fragments accumulate in a buffer and values are drained as soon as
//!   they are complete, using [`JsonArrayCodec`].
//! - [`FrameMode::WebSocket`]: every fragment is one value, no stripping.

use std::collections::VecDeque;

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::Decoder;

use crate::error::FramingError;

pub mod codec;

pub use codec::{DEFAULT_MAX_BUFFERED, JsonArrayCodec};

/// How fragments delivered by a transport map onto values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameMode {
    /// Chunked HTTP body, one value per chunk.
    #[default]
    Chunked,
    /// Chunked HTTP body, values may span chunks.
    Coalesced,
    /// WebSocket text frames, one value per frame.
    WebSocket,
}

impl FrameMode {
    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chunked => "chunked",
            Self::Coalesced => "coalesced",
            Self::WebSocket => "websocket",
        }
    }
}

/// Strip chunk framing from a fragment, returning the candidate value text.
///
/// Returns `None` for fragments that are pure framing noise: `",\n"`,
/// `"\n"`, a lone bracket or separator, or whitespace.
///
/// ```
/// use querywire::frame::strip_chunk_framing;
///
/// assert_eq!(
///     strip_chunk_framing("[{\"header\":{}},\n"),
///     Some("{\"header\":{}}")
/// );
/// assert_eq!(strip_chunk_framing(",\n"), None);
/// assert_eq!(strip_chunk_framing("]"), None);
/// ```
#[must_use]
pub fn strip_chunk_framing(fragment: &str) -> Option<&str> {
    if fragment == ",\n" || fragment == "\n" {
        return None;
    }

    let mut text = fragment.trim();
    let opens = text.starts_with('[');
    let closes = text.ends_with(']');
    if opens && !closes {
        text = text[1..].trim_start();
    } else if !opens && closes {
        text = text[..text.len() - 1].trim_end();
    }

    // Separators may sit on either side of an element.
    text = text.strip_suffix(',').map_or(text, str::trim_end);
    text = text.strip_prefix(',').map_or(text, str::trim_start);

    (!text.is_empty()).then_some(text)
}

/// Turns an ordered sequence of fragments into complete JSON values.
///
/// One reconstructor serves exactly one query; it keeps the unconsumed text
/// of [`FrameMode::Coalesced`] sessions and is discarded with the session.
#[derive(Debug)]
pub struct FrameReconstructor {
    mode: FrameMode,
    codec: JsonArrayCodec,
    buffer: BytesMut,
    fragments: usize,
}

impl FrameReconstructor {
    /// Create a reconstructor for the given transport mode.
    #[must_use]
    pub fn new(mode: FrameMode) -> Self { Self::with_codec(mode, JsonArrayCodec::default()) }

    /// Create a reconstructor whose coalescing buffer uses `codec`.
    #[must_use]
    pub fn with_codec(mode: FrameMode, codec: JsonArrayCodec) -> Self {
        Self {
            mode,
            codec,
            buffer: BytesMut::new(),
            fragments: 0,
        }
    }

    /// Returns the transport mode.
    #[must_use]
    pub fn mode(&self) -> FrameMode { self.mode }

    /// Returns the number of bytes waiting to complete a value.
    #[must_use]
    pub fn buffered(&self) -> usize { self.buffer.len() }

    /// Returns the number of fragments pushed so far.
    #[must_use]
    pub fn fragments(&self) -> usize { self.fragments }

    /// Feed one fragment, appending every value it completes to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] if the fragment cannot be parsed. The
    /// reconstructor must not be used after an error.
    pub fn push(&mut self, fragment: &str, out: &mut VecDeque<Value>) -> Result<(), FramingError> {
        self.fragments = self.fragments.saturating_add(1);
        tracing::trace!(
            fragment.index = self.fragments,
            fragment.bytes = fragment.len(),
            mode = self.mode.as_str(),
            "fragment received"
        );

        match self.mode {
            FrameMode::Chunked => {
                let Some(text) = strip_chunk_framing(fragment) else {
                    return Ok(());
                };
                match parse(text)? {
                    // A whole array delivered in one chunk.
                    Value::Array(values) => out.extend(values),
                    value => out.push_back(value),
                }
                Ok(())
            }
            FrameMode::WebSocket => {
                let text = fragment.trim();
                if !text.is_empty() {
                    out.push_back(parse(text)?);
                }
                Ok(())
            }
            FrameMode::Coalesced => {
                self.buffer.extend_from_slice(fragment.as_bytes());
                while let Some(value) = self.codec.decode(&mut self.buffer)? {
                    out.push_back(value);
                }
                Ok(())
            }
        }
    }

    /// Signal the end of input, appending any value completed by it.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::Truncated`] if buffered text never formed a
    /// complete value.
    pub fn finish(&mut self, out: &mut VecDeque<Value>) -> Result<(), FramingError> {
        if self.mode != FrameMode::Coalesced {
            return Ok(());
        }
        while let Some(value) = self.codec.decode_eof(&mut self.buffer)? {
            out.push_back(value);
        }
        Ok(())
    }
}

fn parse(text: &str) -> Result<Value, FramingError> {
    serde_json::from_str(text).map_err(|source| FramingError::Malformed {
        text: text.to_owned(),
        source,
    })
}
