//! Upstream streaming client.
//!
//! [`open_chat_stream`] performs the provider's `chat/completions` call and
//! turns the SSE response into a channel of plain text fragments. Failures
//! before the first byte surface as a [`ProviderError`] return value;
//! failures after that arrive in-band as a terminal
//! [`FragmentEvent::Failed`].

use std::error::Error;
use std::fmt;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::constants::{MAX_COMPLETION_TOKENS, TEMPERATURE_MAX, TEMPERATURE_MIN};
use crate::core::providers::ProviderProfile;
use crate::utils::url::construct_api_url;

#[derive(Debug)]
pub enum FragmentEvent {
    /// One incremental piece of generated text, always non-empty.
    Fragment(String),
    /// Terminal failure; no further events follow.
    Failed(ProviderError),
    /// Clean end of the fragment sequence.
    Done,
}

#[derive(Debug)]
pub enum ProviderError {
    /// The request never produced a usable response (connect failure,
    /// timeout, TLS, or a transport error mid-body).
    Connect(reqwest::Error),
    /// The provider answered with a non-success status before streaming.
    Status { status: u16, message: String },
    /// The provider broke the stream contract (error payload or
    /// unparseable data where a delta was expected).
    Upstream(String),
}

impl ProviderError {
    /// Upstream-supplied HTTP status, when there is one to pass through.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Connect(e) => write!(f, "provider request failed: {e}"),
            ProviderError::Status { status, message } => {
                write!(f, "provider returned status {status}: {message}")
            }
            ProviderError::Upstream(message) => write!(f, "provider stream error: {message}"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProviderError::Connect(e) => Some(e),
            _ => None,
        }
    }
}

/// Clamp a requested temperature into the range the providers accept.
/// Out-of-range values are silently adjusted rather than rejected.
pub fn clamp_temperature(temperature: f64) -> f64 {
    temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX)
}

/// Pull a human-readable summary out of a provider error body.
///
/// Providers wrap failures in a few different JSON shapes
/// (`{"error":{"message":..}}`, `{"error":".."}`, `{"message":".."}`);
/// anything else is returned trimmed as-is.
fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .or_else(|| {
                value.get("error").and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.to_string()),
                    serde_json::Value::Object(map) => map
                        .get("message")
                        .and_then(|message| message.as_str().map(str::to_owned)),
                    _ => None,
                })
            })
            .or_else(|| value.get("message").and_then(|v| v.as_str().map(str::to_owned)));

        if let Some(summary) = summary {
            let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                return collapsed;
            }
        }
    }

    trimmed.to_string()
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Handle one SSE `data:` payload. Returns true when the stream is over
/// and the pump task should stop reading.
fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<FragmentEvent>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(FragmentEvent::Done);
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        let _ = tx.send(FragmentEvent::Fragment(content.clone()));
                    }
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let _ = tx.send(FragmentEvent::Failed(ProviderError::Upstream(
                summarize_error_body(payload),
            )));
            true
        }
    }
}

fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<FragmentEvent>) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

/// Open a streaming completion against `profile` and return a receiver of
/// fragment events.
///
/// The HTTP exchange up to the response headers happens before this
/// function returns, so callers can still produce a structured error
/// response: a connect failure or non-success status comes back as
/// `Err(ProviderError)` and no event channel is created.
pub async fn open_chat_stream(
    client: &reqwest::Client,
    profile: &ProviderProfile,
    messages: Vec<ChatMessage>,
    temperature: f64,
) -> Result<mpsc::UnboundedReceiver<FragmentEvent>, ProviderError> {
    let request = ChatRequest {
        model: profile.model.clone(),
        messages,
        temperature: clamp_temperature(temperature),
        max_tokens: MAX_COMPLETION_TOKENS,
        stream: true,
    };

    let chat_url = construct_api_url(&profile.base_url, "chat/completions");
    let response = client
        .post(chat_url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", profile.api_key))
        .json(&request)
        .send()
        .await
        .map_err(ProviderError::Connect)?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message: summarize_error_body(&body),
        });
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump_fragments(response, tx));
    Ok(rx)
}

/// Read the SSE body line-by-line and forward content deltas.
async fn pump_fragments(response: reqwest::Response, tx: mpsc::UnboundedSender<FragmentEvent>) {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk_bytes) => {
                buffer.extend_from_slice(&chunk_bytes);

                while let Some(newline_pos) = memchr(b'\n', &buffer) {
                    let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                        Ok(s) => s.trim(),
                        Err(e) => {
                            debug!(error = %e, "invalid UTF-8 in provider stream, dropping line");
                            buffer.drain(..=newline_pos);
                            continue;
                        }
                    };

                    let should_end = process_sse_line(line_str, &tx);
                    buffer.drain(..=newline_pos);
                    if should_end {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(FragmentEvent::Failed(ProviderError::Connect(e)));
                return;
            }
        }
    }

    // Connection closed without an explicit [DONE]; treat as completion.
    let _ = tx.send(FragmentEvent::Done);
}
