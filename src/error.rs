//! Error types for query streams.
//!
//! [`FramingError`] covers failures while turning transport fragments into
//! JSON values. [`QueryError`] is the single error surfaced by a row stream:
//! framing defects, in-band server errors and transport failures all end the
//! stream through it.

use std::{fmt, io, str::Utf8Error};

use serde::Deserialize;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised while reconstructing JSON values from fragments.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Text left after framing characters were removed is not valid JSON.
    #[error("malformed value {text:?}: {source}")]
    Malformed {
        /// Candidate value text that failed to parse.
        text: String,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },

    /// Input ended while a value was still incomplete.
    #[error("input ended mid-value with {buffered} bytes buffered")]
    Truncated {
        /// Bytes held in the buffer when the input ended.
        buffered: usize,
    },

    /// An incomplete value grew beyond the buffer limit.
    #[error("incomplete value exceeds {max} bytes")]
    Oversized {
        /// Configured buffer limit.
        max: usize,
    },

    /// I/O failure reported through the codec interface.
    #[error("framing i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Error object returned by the server when it rejects a statement.
///
/// The same object shape is sometimes nested inside an in-band
/// `errorMessage` field.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    /// Error family reported by the server (`@type`).
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,
    /// Numeric error code.
    #[serde(rename = "error_code", default)]
    pub error_code: Option<u32>,
    /// Human-readable message.
    pub message: String,
    /// Server-side stack trace lines, if any.
    #[serde(default)]
    pub stack_trace: Vec<String>,
    /// Statement that caused the error.
    #[serde(default)]
    pub statement_text: Option<String>,
    /// Entities related to the failure.
    #[serde(default)]
    pub entities: Vec<String>,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code {
            Some(code) => write!(f, "{} (error code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors that end a query or its row stream.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A fragment could not be turned into a JSON value.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A value could not be read as a query envelope.
    #[error("value is not a query envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The server reported an error inside the response stream.
    #[error("server error: {message}")]
    Server {
        /// Message carried by the error envelope.
        message: String,
    },

    /// A data envelope carried neither a row nor an error.
    #[error("data envelope carried no row")]
    MissingRow,

    /// The server refused the query with a structured error body.
    #[error("query rejected: {0}")]
    Rejected(ServerError),

    /// The server refused the query with an unstructured body.
    #[error("query rejected with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// HTTP transport failure.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport failure.
    #[error("websocket transport error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),

    /// The transport delivered bytes that are not UTF-8 text.
    #[error("transport delivered invalid UTF-8")]
    Utf8(#[source] Utf8Error),

    /// The WebSocket handshake did not finish within the connect timeout.
    #[error("websocket connect timed out")]
    ConnectTimeout,

    /// The query request could not be encoded.
    #[error("failed to encode query request")]
    Encode(#[source] serde_json::Error),

    /// An endpoint URL is unusable.
    #[error("invalid endpoint url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as supplied.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<tungstenite::Error> for QueryError {
    fn from(error: tungstenite::Error) -> Self { Self::WebSocket(Box::new(error)) }
}

impl QueryError {
    /// Returns the server-supplied message for in-band and rejection errors.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message } => Some(message),
            Self::Rejected(error) => Some(&error.message),
            _ => None,
        }
    }

    /// Returns `true` if the error came from the transport rather than the
    /// stream content.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Utf8(_) | Self::ConnectTimeout
        )
    }
}
