//! The chat relay endpoint.
//!
//! `POST /api/chat` accepts a message history plus generation parameters,
//! prepends the system prompt, and forwards the provider's fragments as a
//! single plain-text byte stream. Errors that occur before any byte has
//! been written are structured JSON responses; once the stream is
//! committed, failure degrades to the in-band marker because the response
//! status can no longer change.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::chat_stream::{open_chat_stream, FragmentEvent};
use crate::core::constants::{DEFAULT_TEMPERATURE, STREAM_ERROR_MARKER};
use crate::server::AppState;

#[derive(Deserialize)]
pub struct ChatPayload {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub async fn handle(
    State(state): State<AppState>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    if payload.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Messages are required");
    }

    // The system prompt is part of the outbound payload only; it never
    // appears in any caller-visible message list.
    let mut outbound = payload.messages;
    let system_prompt = payload
        .system_prompt
        .as_deref()
        .unwrap_or_else(|| state.selector.default_system_prompt());
    let system_prompt = system_prompt.trim();
    if !system_prompt.is_empty() {
        outbound.insert(
            0,
            ChatMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            },
        );
    }

    if !state.selector.has_credentials() {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API key is not configured",
        );
    }

    let mut profile = state.selector.select();
    if let Some(model) = payload.model {
        if !model.trim().is_empty() {
            profile.model = model;
        }
    }

    debug!(
        provider = profile.id,
        model = %profile.model,
        messages = outbound.len(),
        "opening provider stream"
    );

    let rx = match open_chat_stream(&state.client, &profile, outbound, payload.temperature).await {
        Ok(rx) => rx,
        Err(err) => {
            warn!(provider = profile.id, error = %err, "provider request failed before streaming");
            let status = err
                .status_code()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return error_response(status, err.to_string());
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(relay_stream(rx)),
    )
        .into_response()
}

/// Turn the fragment channel into a response body stream. Fragments are
/// forwarded verbatim in arrival order; a terminal failure becomes the
/// in-band marker followed by end-of-stream.
fn relay_stream(
    rx: mpsc::UnboundedReceiver<FragmentEvent>,
) -> impl futures_util::Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Some(FragmentEvent::Fragment(text)) => Some((Ok(Bytes::from(text)), Some(rx))),
            Some(FragmentEvent::Failed(err)) => {
                warn!(error = %err, "provider stream failed mid-response");
                Some((Ok(Bytes::from_static(STREAM_ERROR_MARKER.as_bytes())), None))
            }
            Some(FragmentEvent::Done) | None => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::core::config::RelayConfig;
    use crate::server;

    fn relay_app(base_url: &str, api_key: Option<&str>) -> Router {
        let config = RelayConfig {
            provider: "deepseek".to_string(),
            deepseek_api_key: api_key.map(str::to_string),
            deepseek_base_url: base_url.to_string(),
            ..RelayConfig::default()
        };
        server::router(AppState::new(config))
    }

    async fn post_chat(app: Router, body: Value) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Stub provider that records the request body and replies with a
    /// fixed SSE stream.
    async fn spawn_upstream(sse_body: &'static str) -> (String, Arc<Mutex<Option<Value>>>) {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move |Json(body): Json<Value>| {
                let captured = captured_clone.clone();
                async move {
                    captured.lock().unwrap().replace(body);
                    (
                        [(header::CONTENT_TYPE, "text/event-stream")],
                        sse_body,
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    #[tokio::test]
    async fn empty_message_list_is_rejected_without_a_provider_call() {
        // Unroutable upstream: the test fails loudly if a call is attempted.
        let app = relay_app("http://127.0.0.1:1", Some("sk-test"));
        let response = post_chat(app, json!({ "messages": [] })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "Messages are required");
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let app = relay_app("http://127.0.0.1:1", Some("sk-test"));
        let response = post_chat(app, json!({ "model": "gpt-4o" })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_stream() {
        let app = relay_app("http://127.0.0.1:1", None);
        let response = post_chat(
            app,
            json!({ "messages": [{ "role": "user", "content": "Hello" }] }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "API key is not configured");
    }

    #[tokio::test]
    async fn fragments_are_relayed_verbatim_in_order() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
                   data: [DONE]\n\n";
        let (base_url, _) = spawn_upstream(sse).await;

        let app = relay_app(&base_url, Some("sk-test"));
        let response = post_chat(
            app,
            json!({ "messages": [{ "role": "user", "content": "Hello" }] }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(body_string(response).await, "Hi there");
    }

    #[tokio::test]
    async fn mid_stream_failure_appends_the_in_band_marker() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Partial\"}}]}\n\n\
                   data: {\"error\":{\"message\":\"upstream exploded\"}}\n\n";
        let (base_url, _) = spawn_upstream(sse).await;

        let app = relay_app(&base_url, Some("sk-test"));
        let response = post_chat(
            app,
            json!({ "messages": [{ "role": "user", "content": "Hello" }] }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            format!("Partial{STREAM_ERROR_MARKER}")
        );
    }

    #[tokio::test]
    async fn system_prompt_is_trimmed_and_prepended() {
        let (base_url, captured) = spawn_upstream("data: [DONE]\n\n").await;
        let app = relay_app(&base_url, Some("sk-test"));

        let response = post_chat(
            app,
            json!({
                "messages": [{ "role": "user", "content": "Hello" }],
                "system_prompt": "  Be terse.  "
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        // Drain the body so the upstream exchange is complete.
        let _ = body_string(response).await;

        let captured = captured.lock().unwrap().take().unwrap();
        let messages = captured["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be terse.");
        assert_eq!(messages[1]["role"], "user");
    }

    #[tokio::test]
    async fn blank_system_prompt_is_not_injected() {
        let (base_url, captured) = spawn_upstream("data: [DONE]\n\n").await;
        let app = relay_app(&base_url, Some("sk-test"));

        let response = post_chat(
            app,
            json!({
                "messages": [{ "role": "user", "content": "Hello" }],
                "system_prompt": "   "
            }),
        )
        .await;
        let _ = body_string(response).await;

        let captured = captured.lock().unwrap().take().unwrap();
        let messages = captured["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[tokio::test]
    async fn temperature_and_model_are_applied_upstream() {
        let (base_url, captured) = spawn_upstream("data: [DONE]\n\n").await;
        let app = relay_app(&base_url, Some("sk-test"));

        let response = post_chat(
            app,
            json!({
                "messages": [{ "role": "user", "content": "Hello" }],
                "model": "deepseek-reasoner",
                "temperature": 9.0
            }),
        )
        .await;
        let _ = body_string(response).await;

        let captured = captured.lock().unwrap().take().unwrap();
        assert_eq!(captured["model"], "deepseek-reasoner");
        assert_eq!(captured["temperature"], 2.0);
        assert_eq!(captured["max_tokens"], 2048);
        assert_eq!(captured["stream"], true);
    }

    #[tokio::test]
    async fn upstream_status_passes_through_before_streaming() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": { "message": "rate limited" } })),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let app = relay_app(&format!("http://{addr}"), Some("sk-test"));
        let response = post_chat(
            app,
            json!({ "messages": [{ "role": "user", "content": "Hello" }] }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("rate limited"));
    }
}
