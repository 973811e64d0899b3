//! Runtime configuration
//!
//! Everything comes from the environment, with the system keychain as a
//! fallback for the two secrets. Nothing is written back.

use crate::error::ConfigError;
use crate::github::DEFAULT_API_URL;
use std::fmt;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub model: String,
    pub github_api_url: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(secret: &Option<String>) -> &'static str {
            if secret.is_some() {
                "<redacted>"
            } else {
                "<unset>"
            }
        }

        f.debug_struct("Config")
            .field("github_token", &redact(&self.github_token))
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("model", &self.model)
            .field("github_api_url", &self.github_api_url)
            .finish()
    }
}

impl Config {
    /// Read the process environment, falling back to the keychain for
    /// credentials that are unset.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok());

        if config.github_token.is_none() {
            match crate::keyring::get_github_token() {
                Ok(token) => config.github_token = token,
                Err(e) => crate::keyring::warn_keychain_error_once("GitHub token", &e),
            }
        }
        if config.openrouter_api_key.is_none() {
            match crate::keyring::get_api_key() {
                Ok(key) => config.openrouter_api_key = key,
                Err(e) => crate::keyring::warn_keychain_error_once("OpenRouter API key", &e),
            }
        }

        config
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            github_token: get("GITHUB_TOKEN"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            model: get("SHIPLOG_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            github_api_url: get("GITHUB_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        }
    }

    pub fn require_github_token(&self) -> Result<&str, ConfigError> {
        self.github_token
            .as_deref()
            .ok_or(ConfigError::MissingGitHubToken)
    }

    pub fn require_llm_key(&self) -> Result<&str, ConfigError> {
        self.openrouter_api_key
            .as_deref()
            .ok_or(ConfigError::MissingLlmKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert!(matches!(
            config.require_github_token(),
            Err(ConfigError::MissingGitHubToken)
        ));
        assert!(matches!(
            config.require_llm_key(),
            Err(ConfigError::MissingLlmKey)
        ));
    }

    #[test]
    fn test_reads_all_variables() {
        let config = config_from(&[
            ("GITHUB_TOKEN", "ghp_abc"),
            ("OPENROUTER_API_KEY", "sk-or-xyz"),
            ("SHIPLOG_MODEL", "anthropic/claude-3.5-haiku"),
            ("GITHUB_API_URL", "https://ghe.example.com/api/v3/"),
        ]);
        assert_eq!(config.require_github_token().unwrap(), "ghp_abc");
        assert_eq!(config.require_llm_key().unwrap(), "sk-or-xyz");
        assert_eq!(config.model, "anthropic/claude-3.5-haiku");
        assert_eq!(config.github_api_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config_from(&[("GITHUB_TOKEN", "   "), ("SHIPLOG_MODEL", "")]);
        assert!(config.github_token.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[("GITHUB_TOKEN", "ghp_supersecret")]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("<unset>"));
    }
}
