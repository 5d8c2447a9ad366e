//! Decoded forms of the values carried by a query response.
//!
//! The server does not tag its values with a kind. An [`Envelope`] is
//! classified by field presence first (an error always wins) and by position
//! second: the first envelope of a session is the header, every later one is
//! a data row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{QueryError, ServerError};

/// Column names mapped to their declared types, in server order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    columns: Map<String, Value>,
}

impl Header {
    /// Build a header from a column mapping.
    #[must_use]
    pub fn new(columns: Map<String, Value>) -> Self { Self { columns } }

    /// Declared type of `column`, if the header lists it as a string.
    #[must_use]
    pub fn declared_type(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(Value::as_str)
    }

    /// Iterate over `(name, declared type)` pairs in server order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, kind)| (name.as_str(), kind))
    }

    /// Number of entries in the header.
    #[must_use]
    pub fn len(&self) -> usize { self.columns.len() }

    /// Returns `true` if the header carried no column mapping.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.columns.is_empty() }

    // Headers that are not `{ "header": {..} }` (WebSocket schema frames)
    // still occupy the header position but carry no mapping.
    fn from_value(value: &Value) -> Self {
        match value.get("header") {
            Some(Value::Object(columns)) => Self::new(columns.clone()),
            _ => {
                tracing::debug!("header value carried no column mapping");
                Self::default()
            }
        }
    }
}

/// One data row: column values in header order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<Value>,
}

impl Row {
    /// Build a row from its column values.
    #[must_use]
    pub fn new(columns: Vec<Value>) -> Self { Self { columns } }

    /// Column values in order.
    #[must_use]
    pub fn columns(&self) -> &[Value] { &self.columns }

    /// Consume the row, returning its column values.
    #[must_use]
    pub fn into_columns(self) -> Vec<Value> { self.columns }
}

impl From<Vec<Value>> for Row {
    fn from(columns: Vec<Value>) -> Self { Self::new(columns) }
}

#[derive(Deserialize)]
struct DataEnvelope {
    row: Row,
}

/// Structural interpretation of one value.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// Column descriptor sent before any row.
    Header(Header),
    /// A data row.
    Row(Row),
    /// An in-band error; always terminal.
    Error(String),
    /// Explicit end of a bounded response, for example after `LIMIT`.
    Final(String),
}

impl Envelope {
    /// Classify `value`, given whether the session has already seen its
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingRow`] when a data-position value carries
    /// neither a row nor an error, and [`QueryError::Envelope`] when its row
    /// is malformed.
    pub fn classify(value: Value, header_set: bool) -> Result<Self, QueryError> {
        if let Some(message) = error_message(&value) {
            return Ok(Self::Error(message));
        }
        if !header_set {
            return Ok(Self::Header(Header::from_value(&value)));
        }
        if value.get("row").is_none() {
            if let Some(message) = value.get("finalMessage").and_then(Value::as_str) {
                return Ok(Self::Final(message.to_owned()));
            }
            return Err(QueryError::MissingRow);
        }
        let envelope: DataEnvelope = serde_json::from_value(value).map_err(QueryError::Envelope)?;
        Ok(Self::Row(envelope.row))
    }

    /// Encode the envelope in its wire shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Header(header) => json!({ "header": header.columns }),
            Self::Row(row) => json!({ "row": row }),
            Self::Error(message) => json!({ "errorMessage": message }),
            Self::Final(message) => json!({ "finalMessage": message }),
        }
    }
}

/// Extract a non-empty error message from an envelope.
///
/// Any `errorMessage` other than `null` or `""` is an error. Server error
/// objects contribute their `message`; other shapes are reported as their
/// JSON text. A bare server error object carrying `error_code` and `message`
/// is an error as well.
fn error_message(value: &Value) -> Option<String> {
    let message = match value.get("errorMessage") {
        None | Some(Value::Null) => {
            if value.get("error_code").is_none() {
                return None;
            }
            server_error(value)
        }
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(fields)) if fields.is_empty() => None,
        Some(nested @ Value::Object(_)) => Some(
            server_error(nested)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| nested.to_string()),
        ),
        Some(other) => Some(other.to_string()),
    };
    message.filter(|message| !message.is_empty())
}

fn server_error(value: &Value) -> Option<String> {
    ServerError::deserialize(value)
        .ok()
        .map(|error| error.message)
}
