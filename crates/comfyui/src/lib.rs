//! ComfyUI REST and WebSocket client library.
//!
//! Provides the HTTP API wrapper (asset upload, workflow submission,
//! history retrieval, artifact download), a WebSocket client that turns
//! the event channel into a stream of typed messages, and parsers for
//! the engine's message and history payloads.

pub mod api;
pub mod client;
pub mod history;
pub mod messages;
