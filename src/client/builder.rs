//! Builder for configuring a query client.

use std::time::Duration;

use super::{ClientConfig, QueryClient};
use crate::error::QueryError;

/// Builder for [`QueryClient`].
///
/// Settings are validated when [`build`](Self::build) is called.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use querywire::QueryClientBuilder;
///
/// let client = QueryClientBuilder::new("http://localhost:8088")
///     .connect_timeout(Duration::from_secs(5))
///     .build()
///     .expect("valid configuration");
/// assert_eq!(client.config().websocket_url().as_str(), "ws://localhost:8088/");
/// ```
#[derive(Clone, Debug)]
#[must_use]
pub struct QueryClientBuilder {
    base_url: String,
    websocket_url: Option<String>,
    content_type: Option<String>,
    coalesce_chunks: bool,
    max_buffered: Option<usize>,
    connect_timeout: Option<Duration>,
}

impl QueryClientBuilder {
    /// Start configuring a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            websocket_url: None,
            content_type: None,
            coalesce_chunks: false,
            max_buffered: None,
            connect_timeout: None,
        }
    }

    /// Use `url` for push queries instead of deriving it from the base URL.
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Override the content type sent with pull queries.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Decode pull query bodies as one continuous array rather than one
    /// value set per chunk.
    ///
    /// Use this when an intermediary may split or merge chunks.
    pub fn coalesce_chunks(mut self, coalesce: bool) -> Self {
        self.coalesce_chunks = coalesce;
        self
    }

    /// Limit the bytes buffered for one incomplete value when coalescing.
    pub fn max_buffered(mut self, max: usize) -> Self {
        self.max_buffered = Some(max);
        self
    }

    /// Fail connection attempts that take longer than `timeout`.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Validate the settings and create the client.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidUrl`] for an unusable base or WebSocket
    /// URL, or [`QueryError::Http`] if the HTTP client cannot be created.
    pub fn build(self) -> Result<QueryClient, QueryError> {
        let mut config = ClientConfig::new(&self.base_url)?;
        if let Some(url) = &self.websocket_url {
            config.set_websocket_url(url)?;
        }
        if let Some(content_type) = self.content_type {
            config.set_content_type(content_type);
        }
        if let Some(max) = self.max_buffered {
            config.set_max_buffered(max);
        }
        config.set_coalesce_chunks(self.coalesce_chunks);
        config.set_connect_timeout(self.connect_timeout);

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            http = http.connect_timeout(timeout);
        }
        Ok(QueryClient::from_parts(http.build()?, config))
    }
}
