//! Query request body.

use std::collections::BTreeMap;

use serde::Serialize;

/// A statement plus optional streams properties, as sent to the server.
///
/// # Examples
///
/// ```
/// use querywire::QueryRequest;
///
/// let request = QueryRequest::new("SELECT * FROM users EMIT CHANGES;")
///     .with_property("ksql.streams.auto.offset.reset", "earliest");
/// let body = serde_json::to_string(&request).expect("serialisable");
/// assert!(body.contains("\"streamsProperties\""));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    ksql: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    streams_properties: BTreeMap<String, String>,
}

impl QueryRequest {
    /// Request running `ksql` with no properties.
    #[must_use]
    pub fn new(ksql: impl Into<String>) -> Self {
        Self {
            ksql: ksql.into(),
            streams_properties: BTreeMap::new(),
        }
    }

    /// Set a streams property, replacing any previous value for `key`.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.streams_properties.insert(key.into(), value.into());
        self
    }

    /// Statement text.
    #[must_use]
    pub fn ksql(&self) -> &str { &self.ksql }

    /// Streams properties sent with the statement.
    #[must_use]
    pub fn streams_properties(&self) -> &BTreeMap<String, String> { &self.streams_properties }
}
