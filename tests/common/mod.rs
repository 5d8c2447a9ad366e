//! Shared utilities for integration tests.
//!
//! Provides in-memory fragment sources and a helper to bind a listener on an
//! unused local port.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::net::{Ipv4Addr, SocketAddr};

use futures::{StreamExt, stream};
use querywire::{FragmentSource, QueryError};
use tokio::{net::TcpListener, sync::mpsc};

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A source that yields `fragments` and then ends.
pub fn fragments(fragments: &[&str]) -> FragmentSource {
    let owned: Vec<Result<String, QueryError>> = fragments
        .iter()
        .map(|fragment| Ok((*fragment).to_owned()))
        .collect();
    stream::iter(owned).boxed()
}

/// A source fed through a channel; it stays open while the sender lives.
pub fn channel_source() -> (mpsc::UnboundedSender<Result<String, QueryError>>, FragmentSource) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let source = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
    (tx, source)
}

/// Bind a TCP listener to a free local port.
pub async fn unused_listener() -> TestResult<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}
