//! Error types shared across the crate
//!
//! Each layer has its own enum. Discovery code branches on
//! [`GitHubError::tier`] to decide whether to skip a sub-resource, fall back,
//! or abort the run.

use thiserror::Error;

/// How a failure should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    /// Throttling or a server hiccup. Retried with backoff before escalating.
    Transient,
    /// Missing scope or permission on an org or repo. Skip it and carry on.
    AccessDenied,
    /// Missing resource or unparseable payload. Use a degraded default.
    NotFound,
    /// Authentication failure or exhausted retries. Abort the run.
    Fatal,
}

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub rate limit still exhausted after {attempts} retries ({endpoint})")]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("GitHub authentication failed ({endpoint}): {message}")]
    Unauthorized { endpoint: String, message: String },

    #[error("GitHub API error {status} on {endpoint}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("GitHub request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected GitHub response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl GitHubError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            GitHubError::Unauthorized { .. } => Some(401),
            GitHubError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            GitHubError::RateLimited { .. } | GitHubError::Decode { .. } => None,
        }
    }

    pub fn tier(&self) -> ErrorTier {
        match self {
            GitHubError::RateLimited { .. } | GitHubError::Unauthorized { .. } => ErrorTier::Fatal,
            GitHubError::Api { status, .. } => match *status {
                403 => ErrorTier::AccessDenied,
                429 | 500..=599 => ErrorTier::Transient,
                _ => ErrorTier::NotFound,
            },
            GitHubError::Transport { .. } => ErrorTier::Transient,
            GitHubError::Decode { .. } => ErrorTier::NotFound,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.tier() == ErrorTier::Fatal
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No OpenRouter API key configured. Set OPENROUTER_API_KEY.")]
    MissingApiKey,

    #[error("The model returned an empty completion")]
    Empty,

    #[error("Transient LLM failure{}: {message}", fmt_status(.status))]
    Transient { status: Option<u16>, message: String },

    #[error("LLM request rejected{}: {message}", fmt_status(.status))]
    Permanent { status: Option<u16>, message: String },

    #[error("Could not parse LLM response: {0}")]
    Parse(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl LlmError {
    /// Credential failures repeat for every prompt, so the run should stop.
    /// Anything else degrades the one summary it affected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LlmError::MissingApiKey
                | LlmError::Permanent {
                    status: Some(401 | 402 | 403),
                    ..
                }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No GitHub token found. Set GITHUB_TOKEN (needs `repo` and `read:org` scopes).")]
    MissingGitHubToken,

    #[error("No OpenRouter API key found. Set OPENROUTER_API_KEY or use --dry-run.")]
    MissingLlmKey,

    #[error("Invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Invalid repository '{0}' (expected owner/name)")]
    InvalidRepo(String),

    #[error("--since ({since}) is after --until ({until})")]
    InvertedRange { since: String, until: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> GitHubError {
        GitHubError::Api {
            status,
            endpoint: "/repos/a/b/pulls".to_string(),
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_github_error_tiers() {
        assert_eq!(api(403).tier(), ErrorTier::AccessDenied);
        assert_eq!(api(404).tier(), ErrorTier::NotFound);
        assert_eq!(api(422).tier(), ErrorTier::NotFound);
        assert_eq!(api(502).tier(), ErrorTier::Transient);
        assert_eq!(
            GitHubError::RateLimited {
                endpoint: "/search/issues".to_string(),
                attempts: 3
            }
            .tier(),
            ErrorTier::Fatal
        );
        assert!(GitHubError::Unauthorized {
            endpoint: "/user".to_string(),
            message: "Bad credentials".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_github_error_message_carries_status_and_endpoint() {
        let msg = api(404).to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("/repos/a/b/pulls"));
    }

    #[test]
    fn test_llm_error_fatality() {
        assert!(LlmError::MissingApiKey.is_fatal());
        assert!(LlmError::Permanent {
            status: Some(401),
            message: "bad key".to_string()
        }
        .is_fatal());
        assert!(!LlmError::Permanent {
            status: Some(400),
            message: "context too long".to_string()
        }
        .is_fatal());
        assert!(!LlmError::Empty.is_fatal());
        assert!(!LlmError::Parse("eof".to_string()).is_fatal());
        assert!(!LlmError::Transient {
            status: Some(429),
            message: "slow down".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_llm_error_display_includes_status() {
        let err = LlmError::Transient {
            status: Some(503),
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "Transient LLM failure (503): overloaded");
    }
}
