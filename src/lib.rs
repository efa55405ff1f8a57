//! Causerie is a streaming relay between chat front-ends and LLM provider APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns configuration, provider selection, and the upstream
//!   streaming client that turns an SSE response into text fragments.
//! - [`server`] exposes the relay over HTTP: request validation, system
//!   prompt injection, and the streamed plain-text reply with its in-band
//!   mid-stream failure marker.
//! - [`store`] is the session-side message store that consumes the relayed
//!   byte stream and grows a placeholder assistant message in place, along
//!   with the per-message reaction state.
//! - [`api`] defines the wire payloads shared with OpenAI-compatible
//!   providers.
//!
//! The runtime entrypoint lives in the binary crate (`src/main.rs`), which
//! loads configuration from the environment once and starts the axum
//! server; nothing below the entrypoint touches process-global state.

pub mod api;
pub mod core;
pub mod server;
pub mod store;
pub mod utils;
