//! Relay configuration.
//!
//! Configuration is resolved once, at the entrypoint, and handed to the
//! components that need it. Nothing below `main` reads the process
//! environment, which keeps the selector and the relay handlers pure with
//! respect to their inputs.

use std::env;

use crate::core::constants::DEFAULT_SYSTEM_PROMPT;

pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Provider flag; the literal `deepseek` selects DeepSeek, anything
    /// else falls through to OpenAI.
    pub provider: String,
    pub deepseek_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepseek_base_url: String,
    pub openai_base_url: String,
    /// Default system prompt used when a request does not supply one.
    pub system_prompt: String,
}

impl RelayConfig {
    /// Read configuration from the environment. Call this from `main` only.
    pub fn from_env() -> Self {
        Self {
            provider: env::var("LLM_PROVIDER").unwrap_or_default(),
            deepseek_api_key: env::var("DEEPSEEK_API_KEY").ok(),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            deepseek_base_url: env::var("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_DEEPSEEK_BASE_URL.to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            deepseek_api_key: None,
            openai_api_key: None,
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
