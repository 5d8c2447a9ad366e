//! Adapters turning transport payloads into fragment sources.
//!
//! Each adapter yields one fragment per transport unit: one body chunk for
//! chunked HTTP, one text frame for WebSocket. Framing is left to
//! [`FrameReconstructor`](crate::frame::FrameReconstructor).

pub mod http;
pub mod websocket;

pub use http::chunk_fragments;
pub use websocket::text_fragments;
