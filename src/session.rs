//! Per-query decode state.
//!
//! A [`QuerySession`] pairs a [`FrameReconstructor`] with a [`RowDecoder`]
//! for one logical query. It owns the retained header, the header flag and
//! the unconsumed text buffer; nothing in it is shared between queries.

use std::collections::VecDeque;

use serde_json::Value;

use crate::{
    envelope::{Envelope, Header, Row},
    error::QueryError,
    frame::{FrameMode, FrameReconstructor},
    metrics,
};

/// Outcome of decoding one value.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// The value was the header; nothing is emitted for it.
    Header,
    /// The value was a data row.
    Row(Row),
    /// The server marked the response complete.
    Finished,
}

/// Header/data state machine over a sequence of values.
///
/// The first non-error value becomes the header and is suppressed; every
/// later value is a data row. An error value ends decoding for good.
#[derive(Debug, Default)]
pub struct RowDecoder {
    header: Option<Header>,
    rows: usize,
    terminated: bool,
}

impl RowDecoder {
    /// Create a decoder that has not yet seen a header.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Returns the header, once received.
    #[must_use]
    pub fn header(&self) -> Option<&Header> { self.header.as_ref() }

    /// Returns `true` once the header has been consumed.
    #[must_use]
    pub fn header_set(&self) -> bool { self.header.is_some() }

    /// Returns the number of rows decoded so far.
    #[must_use]
    pub fn rows(&self) -> usize { self.rows }

    /// Returns `true` after an error or a final message.
    #[must_use]
    pub fn is_terminated(&self) -> bool { self.terminated }

    /// Decode one value.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Server`] for an error envelope, or the
    /// classification error for a value that is not a valid envelope. The
    /// decoder is terminated afterwards. Values received after termination
    /// are ignored and reported as [`Decoded::Finished`].
    pub fn decode(&mut self, value: Value) -> Result<Decoded, QueryError> {
        if self.terminated {
            return Ok(Decoded::Finished);
        }

        let envelope = match Envelope::classify(value, self.header_set()) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.terminated = true;
                return Err(error);
            }
        };

        match envelope {
            Envelope::Error(message) => {
                self.terminated = true;
                tracing::warn!(error = %message, rows = self.rows, "server reported query error");
                Err(QueryError::Server { message })
            }
            Envelope::Header(header) => {
                tracing::debug!(header.columns = header.len(), "query header received");
                self.header = Some(header);
                Ok(Decoded::Header)
            }
            Envelope::Row(row) => {
                self.rows = self.rows.saturating_add(1);
                Ok(Decoded::Row(row))
            }
            Envelope::Final(message) => {
                self.terminated = true;
                tracing::debug!(message = %message, rows = self.rows, "server ended response");
                Ok(Decoded::Finished)
            }
        }
    }
}

/// Ephemeral state for one active query.
#[derive(Debug)]
pub struct QuerySession {
    frames: FrameReconstructor,
    decoder: RowDecoder,
    pending: VecDeque<Value>,
    closed: bool,
}

impl QuerySession {
    /// Create a session for fragments delivered in `mode`.
    #[must_use]
    pub fn new(mode: FrameMode) -> Self { Self::with_frames(FrameReconstructor::new(mode)) }

    /// Create a session around an existing reconstructor.
    #[must_use]
    pub fn with_frames(frames: FrameReconstructor) -> Self {
        Self {
            frames,
            decoder: RowDecoder::new(),
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// Returns the transport mode of this session.
    #[must_use]
    pub fn mode(&self) -> FrameMode { self.frames.mode() }

    /// Returns the header, once received.
    #[must_use]
    pub fn header(&self) -> Option<&Header> { self.decoder.header() }

    /// Returns the number of rows decoded so far.
    #[must_use]
    pub fn rows(&self) -> usize { self.decoder.rows() }

    /// Returns `true` once no further rows can be produced.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.decoder.is_terminated() || (self.closed && self.pending.is_empty())
    }

    /// Feed one transport fragment.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Framing`] if the fragment cannot be parsed.
    /// Values still queued from earlier fragments are discarded with it.
    pub fn push_fragment(&mut self, fragment: &str) -> Result<(), QueryError> {
        if self.closed || self.decoder.is_terminated() {
            return Ok(());
        }
        if let Err(error) = self.frames.push(fragment, &mut self.pending) {
            return Err(self.fail(error.into()));
        }
        Ok(())
    }

    /// Signal that the transport has closed.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Framing`] if buffered text never completed.
    pub fn finish(&mut self) -> Result<(), QueryError> {
        if self.closed || self.decoder.is_terminated() {
            return Ok(());
        }
        if let Err(error) = self.frames.finish(&mut self.pending) {
            return Err(self.fail(error.into()));
        }
        self.closed = true;
        Ok(())
    }

    /// Decode queued values until a row or an error is produced.
    ///
    /// Returns `None` when the queue is exhausted. After an error no further
    /// rows are produced, even for values already queued.
    pub fn next_row(&mut self) -> Option<Result<Row, QueryError>> {
        while !self.decoder.is_terminated() {
            let value = self.pending.pop_front()?;
            metrics::inc_values(self.mode());
            match self.decoder.decode(value) {
                Ok(Decoded::Row(row)) => return Some(Ok(row)),
                Ok(Decoded::Header) => {}
                Ok(Decoded::Finished) => self.pending.clear(),
                Err(error) => return Some(Err(self.fail(error))),
            }
        }
        None
    }

    fn fail(&mut self, error: QueryError) -> QueryError {
        self.pending.clear();
        self.closed = true;
        error
    }
}
