//! Endpoint and framing configuration for query clients.

use std::time::Duration;

use reqwest::Url;

use crate::{
    error::QueryError,
    frame::{DEFAULT_MAX_BUFFERED, FrameMode, FrameReconstructor, JsonArrayCodec},
};

/// Content type sent with pull queries unless overridden.
pub const DEFAULT_CONTENT_TYPE: &str = "application/vnd.ksql.v1+json";

const QUERY_PATH: &str = "query";
const PUSH_QUERY_PATH: &str = "ws/query";

/// Resolved client settings.
///
/// Built through [`QueryClientBuilder`](super::QueryClientBuilder); both base
/// URLs are validated and normalised to end with `/` so endpoint paths join
/// beneath them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: Url,
    websocket_url: Url,
    content_type: String,
    coalesce_chunks: bool,
    max_buffered: usize,
    connect_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Configuration with defaults for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidUrl`] if `base_url` is not an absolute
    /// `http` or `https` URL.
    pub fn new(base_url: &str) -> Result<Self, QueryError> {
        let base_url = parse_base(base_url, &["http", "https"])?;
        let websocket_url = websocket_base(&base_url)?;
        Ok(Self {
            base_url,
            websocket_url,
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            coalesce_chunks: false,
            max_buffered: DEFAULT_MAX_BUFFERED,
            connect_timeout: None,
        })
    }

    /// Base URL for HTTP requests.
    #[must_use]
    pub fn base_url(&self) -> &Url { &self.base_url }

    /// Base URL for WebSocket requests.
    #[must_use]
    pub fn websocket_url(&self) -> &Url { &self.websocket_url }

    /// Content type sent with pull queries.
    #[must_use]
    pub fn content_type(&self) -> &str { &self.content_type }

    /// Whether pull query bodies are decoded as one continuous array.
    #[must_use]
    pub fn coalesce_chunks(&self) -> bool { self.coalesce_chunks }

    /// Buffer limit for coalesced decoding.
    #[must_use]
    pub fn max_buffered(&self) -> usize { self.max_buffered }

    /// Timeout for establishing a connection, if any.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> { self.connect_timeout }

    /// Framing used for pull query bodies.
    #[must_use]
    pub fn pull_frame_mode(&self) -> FrameMode {
        if self.coalesce_chunks {
            FrameMode::Coalesced
        } else {
            FrameMode::Chunked
        }
    }

    pub(crate) fn set_websocket_url(&mut self, url: &str) -> Result<(), QueryError> {
        self.websocket_url = parse_base(url, &["ws", "wss"])?;
        Ok(())
    }

    pub(crate) fn set_content_type(&mut self, content_type: String) {
        self.content_type = content_type;
    }

    pub(crate) fn set_coalesce_chunks(&mut self, coalesce: bool) { self.coalesce_chunks = coalesce; }

    pub(crate) fn set_max_buffered(&mut self, max: usize) { self.max_buffered = max; }

    pub(crate) fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.connect_timeout = timeout;
    }

    pub(crate) fn pull_frames(&self) -> FrameReconstructor {
        FrameReconstructor::with_codec(
            self.pull_frame_mode(),
            JsonArrayCodec::new(self.max_buffered),
        )
    }

    pub(crate) fn query_url(&self) -> Result<Url, QueryError> { join(&self.base_url, QUERY_PATH) }

    pub(crate) fn push_query_url(&self, request: &str) -> Result<Url, QueryError> {
        let mut url = join(&self.websocket_url, PUSH_QUERY_PATH)?;
        url.query_pairs_mut().append_pair("request", request);
        Ok(url)
    }
}

fn invalid(url: &str, reason: impl Into<String>) -> QueryError {
    QueryError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.into(),
    }
}

fn parse_base(raw: &str, schemes: &[&str]) -> Result<Url, QueryError> {
    let mut url = Url::parse(raw).map_err(|error| invalid(raw, error.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(
            raw,
            format!("expected one of {schemes:?}, got {:?}", url.scheme()),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(raw, "base url must not carry a query or fragment"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn websocket_base(base: &Url) -> Result<Url, QueryError> {
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| invalid(base.as_str(), "cannot derive websocket url"))?;
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url, QueryError> {
    base.join(path)
        .map_err(|error| invalid(base.as_str(), error.to_string()))
}
