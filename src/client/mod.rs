//! HTTP and WebSocket query client.
//!
//! [`QueryClient`] issues pull queries over a chunked HTTP response and push
//! queries over a WebSocket, returning a [`RowStream`] for each. The client
//! holds no per-query state; every call gets its own session.

use std::sync::Arc;

use reqwest::{
    StatusCode,
    header::{ACCEPT, CONTENT_TYPE},
};
use tracing::Instrument;

mod builder;
mod config;
mod request;

pub use builder::QueryClientBuilder;
pub use config::{ClientConfig, DEFAULT_CONTENT_TYPE};
pub use request::QueryRequest;

use crate::{
    error::{QueryError, ServerError},
    frame::FrameMode,
    stream::RowStream,
    transport::{chunk_fragments, text_fragments},
};

/// Client for a query server's pull and push endpoints.
///
/// Cloning is cheap; clones share the connection pool.
///
/// # Examples
///
/// ```no_run
/// use futures::TryStreamExt;
/// use querywire::{QueryClient, QueryRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), querywire::QueryError> {
/// let client = QueryClient::new("http://localhost:8088")?;
/// let mut rows = client
///     .pull_query(&QueryRequest::new("SELECT * FROM users WHERE id = 1;"))
///     .await?;
/// while let Some(row) = rows.try_next().await? {
///     println!("{:?}", row.columns());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct QueryClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl QueryClient {
    /// Start configuring a client for the server at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> QueryClientBuilder {
        QueryClientBuilder::new(base_url)
    }

    /// Create a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidUrl`] if `base_url` is unusable.
    pub fn new(base_url: &str) -> Result<Self, QueryError> { Self::builder(base_url).build() }

    pub(crate) fn from_parts(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
        }
    }

    /// Returns the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig { &self.config }

    /// Run a bounded query and stream its rows.
    ///
    /// The stream ends when the server completes the response.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Rejected`] or [`QueryError::Status`] if the
    /// server refuses the query, and [`QueryError::Http`] if the request
    /// fails.
    pub async fn pull_query(&self, request: &QueryRequest) -> Result<RowStream, QueryError> {
        let url = self.config.query_url()?;
        let body = serde_json::to_vec(request).map_err(QueryError::Encode)?;
        let span = tracing::debug_span!("client.pull_query", url = %url);

        async {
            let response = self
                .http
                .post(url)
                .header(CONTENT_TYPE, self.config.content_type())
                .header(ACCEPT, self.config.content_type())
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await?;
                return Err(rejection(status, body));
            }

            tracing::debug!(
                status = status.as_u16(),
                mode = self.config.pull_frame_mode().as_str(),
                "pull query accepted"
            );
            Ok(RowStream::with_frames(
                chunk_fragments(response.bytes_stream()),
                self.config.pull_frames(),
            ))
        }
        .instrument(span)
        .await
    }

    /// Start a continuous query and stream its rows as they arrive.
    ///
    /// The stream stays open until it is dropped or cancelled, the server
    /// closes the socket, or an error arrives.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ConnectTimeout`] if the handshake exceeds the
    /// configured timeout and [`QueryError::WebSocket`] if it fails.
    pub async fn push_query(&self, request: &QueryRequest) -> Result<RowStream, QueryError> {
        let payload = serde_json::to_string(request).map_err(QueryError::Encode)?;
        let url = self.config.push_query_url(&payload)?;
        let span = tracing::debug_span!("client.push_query", url = %self.config.websocket_url());

        async {
            let connect = tokio_tungstenite::connect_async(url.as_str());
            let (socket, response) = match self.config.connect_timeout() {
                Some(limit) => tokio::time::timeout(limit, connect)
                    .await
                    .map_err(|_| QueryError::ConnectTimeout)??,
                None => connect.await?,
            };

            tracing::debug!(
                status = response.status().as_u16(),
                "push query connected"
            );
            Ok(RowStream::new(text_fragments(socket), FrameMode::WebSocket))
        }
        .instrument(span)
        .await
    }
}

fn rejection(status: StatusCode, body: String) -> QueryError {
    match serde_json::from_str::<ServerError>(&body) {
        Ok(error) => {
            tracing::warn!(status = status.as_u16(), error = %error, "query rejected");
            QueryError::Rejected(error)
        }
        Err(_) => {
            tracing::warn!(status = status.as_u16(), "query rejected with unstructured body");
            QueryError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }
}
