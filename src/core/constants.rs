//! Shared constants used across the relay and the session store.

use std::time::Duration;

/// Instruction prepended to every outbound message list when the request
/// does not carry its own system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, accurate answers, and say so when you are unsure.";

/// Sampling temperature applied when the request omits one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Inclusive temperature range accepted by the upstream providers.
/// Out-of-range values are clamped, never rejected.
pub const TEMPERATURE_MIN: f64 = 0.1;
pub const TEMPERATURE_MAX: f64 = 2.0;

/// Completion-length cap forwarded upstream with every request.
pub const MAX_COMPLETION_TOKENS: u32 = 2048;

/// Literal notice appended to an already-committed response stream when the
/// upstream provider fails mid-response. Once streaming has begun there is
/// no out-of-band channel left, so this marker is the wire-level failure
/// convention shared with the session store.
pub const STREAM_ERROR_MARKER: &str = "\n\n[Error: Stream processing failed]";

/// Fixed apology shown in place of an assistant reply when a send fails.
pub const SEND_FAILURE_NOTICE: &str = "Sorry, an error occurred. Please try again.";

/// Content of the assistant message a fresh session starts with.
pub const SESSION_GREETING: &str =
    "Hello! I'm an AI assistant. What would you like to discuss?";

/// How long a message keeps its `copied` flag before it auto-resets.
pub const COPY_RESET_DELAY: Duration = Duration::from_millis(2000);
