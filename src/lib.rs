#![doc(html_root_url = "https://docs.rs/querywire/latest")]
//! Public API for the `querywire` library.
//!
//! This crate turns the streaming responses of a ksqlDB-style query server
//! into typed row streams. A pull query arrives as a chunked HTTP body that
//! spells out a JSON array one element at a time; a push query arrives as
//! WebSocket text frames. Both are reduced to a [`RowStream`] of [`Row`]s,
//! with the column [`Header`] consumed along the way.
//!
//! The pieces compose bottom-up:
//!
//! - [`frame`] rebuilds complete JSON values from transport fragments.
//! - [`envelope`] classifies each value as header, row, error or final message.
//! - [`session`] holds the per-query decode state.
//! - [`stream`] drives a session from a transport as a [`futures::Stream`].
//! - [`transport`] adapts HTTP bodies and WebSocket sockets into fragments.
//! - [`client`] issues pull and push queries.

pub mod client;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod session;
pub mod stream;
pub mod transport;

pub use client::{ClientConfig, QueryClient, QueryClientBuilder, QueryRequest};
pub use envelope::{Envelope, Header, Row};
pub use error::{FramingError, QueryError, ServerError};
pub use frame::{FrameMode, FrameReconstructor, JsonArrayCodec};
pub use session::{Decoded, QuerySession, RowDecoder};
pub use stream::{FragmentSource, RowStream};
