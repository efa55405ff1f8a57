//! HTTP surface of the relay.
//!
//! Handlers are stateless across calls; the shared [`AppState`] holds only
//! the immutable provider selector and a cloned HTTP client, so any number
//! of chat requests can stream concurrently.

pub mod chat;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::core::config::RelayConfig;
use crate::core::providers::ProviderSelector;

#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<ProviderSelector>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            selector: Arc::new(ProviderSelector::new(config)),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat::handle))
        .with_state(state)
}
