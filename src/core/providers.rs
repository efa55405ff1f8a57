//! Provider selection.
//!
//! The selector is a pure function of the [`RelayConfig`] it was built
//! with: it decides which upstream provider a request goes to and reports
//! whether that provider has usable credentials. Missing credentials are a
//! distinct, operator-facing condition; the relay checks
//! [`ProviderSelector::has_credentials`] before opening any stream.

use crate::core::config::RelayConfig;

pub const PROVIDER_DEEPSEEK: &str = "deepseek";
pub const PROVIDER_OPENAI: &str = "openai";

const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// Everything the streaming client needs to talk to one provider.
#[derive(Clone, Debug)]
pub struct ProviderProfile {
    pub id: &'static str,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

pub struct ProviderSelector {
    config: RelayConfig,
}

impl ProviderSelector {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    fn is_deepseek(&self) -> bool {
        self.config.provider.eq_ignore_ascii_case(PROVIDER_DEEPSEEK)
    }

    /// True when the selected provider has a non-blank API key.
    pub fn has_credentials(&self) -> bool {
        let key = if self.is_deepseek() {
            &self.config.deepseek_api_key
        } else {
            &self.config.openai_api_key
        };
        key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn select(&self) -> ProviderProfile {
        if self.is_deepseek() {
            ProviderProfile {
                id: PROVIDER_DEEPSEEK,
                base_url: self.config.deepseek_base_url.clone(),
                model: DEEPSEEK_DEFAULT_MODEL.to_string(),
                api_key: self.config.deepseek_api_key.clone().unwrap_or_default(),
            }
        } else {
            ProviderProfile {
                id: PROVIDER_OPENAI,
                base_url: self.config.openai_base_url.clone(),
                model: OPENAI_DEFAULT_MODEL.to_string(),
                api_key: self.config.openai_api_key.clone().unwrap_or_default(),
            }
        }
    }

    pub fn default_system_prompt(&self) -> &str {
        &self.config.system_prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(provider: &str, deepseek_key: Option<&str>, openai_key: Option<&str>) -> RelayConfig {
        RelayConfig {
            provider: provider.to_string(),
            deepseek_api_key: deepseek_key.map(str::to_string),
            openai_api_key: openai_key.map(str::to_string),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn deepseek_flag_selects_deepseek() {
        let selector = ProviderSelector::new(config_with("deepseek", Some("sk-a"), None));
        let profile = selector.select();
        assert_eq!(profile.id, PROVIDER_DEEPSEEK);
        assert_eq!(profile.model, "deepseek-chat");
        assert_eq!(profile.api_key, "sk-a");
    }

    #[test]
    fn any_other_flag_falls_through_to_openai() {
        for flag in ["", "openai", "DEEPSEEK-ish", "claude"] {
            let selector = ProviderSelector::new(config_with(flag, None, Some("sk-b")));
            assert_eq!(selector.select().id, PROVIDER_OPENAI);
        }
    }

    #[test]
    fn flag_comparison_ignores_case() {
        let selector = ProviderSelector::new(config_with("DeepSeek", Some("sk-a"), None));
        assert_eq!(selector.select().id, PROVIDER_DEEPSEEK);
    }

    #[test]
    fn credentials_require_a_non_blank_key_for_the_selected_provider() {
        // Key present for the unselected provider does not count.
        let selector = ProviderSelector::new(config_with("deepseek", None, Some("sk-b")));
        assert!(!selector.has_credentials());

        let selector = ProviderSelector::new(config_with("deepseek", Some("   "), None));
        assert!(!selector.has_credentials());

        let selector = ProviderSelector::new(config_with("deepseek", Some("sk-a"), None));
        assert!(selector.has_credentials());
    }
}
