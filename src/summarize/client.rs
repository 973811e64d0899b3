use crate::error::LlmError;
use crate::util::truncate_str;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// OpenRouter chat completions endpoint
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Transient-failure retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions)
        -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Extract a retry-after hint from an error body, e.g. "retry after 12 seconds".
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    text_lower[pos..]
        .split_whitespace()
        .skip(1)
        .take(5)
        .filter_map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .find(|secs| *secs > 0 && *secs < 300)
}

fn backoff_secs(attempt: u32) -> u64 {
    (INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(attempt.saturating_sub(1))) / 1000
}

/// Map a non-success response to an error kind.
fn classify_failure(status: u16, body: &str) -> LlmError {
    let message = match status {
        401 => "Invalid OpenRouter API key".to_string(),
        429 => "Rate limited by OpenRouter".to_string(),
        500..=599 => "OpenRouter server error. The service may be temporarily unavailable."
            .to_string(),
        _ => truncate_str(body.trim(), 200).to_string(),
    };
    if status == 429 || (500..=599).contains(&status) {
        LlmError::Transient {
            status: Some(status),
            message,
        }
    } else {
        LlmError::Permanent {
            status: Some(status),
            message,
        }
    }
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Permanent {
                status: None,
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_key,
            model: model.into(),
            url: OPENROUTER_URL.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/shiplog")
            .header("X-Title", "shiplog")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transient {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| LlmError::Transient {
            status: Some(status),
            message: e.to_string(),
        })?;

        if !(200..300).contains(&status) {
            let err = classify_failure(status, &text);
            return Err(match err {
                LlmError::Transient { status, message } => LlmError::Transient {
                    status,
                    // Keep the body so retry-after can be read from it.
                    message: format!("{} {}", message, truncate_str(&text, 200)),
                },
                other => other,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::Parse(format!("OpenRouter response: {}", e)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    /// Transient failures are retried up to [`MAX_RETRIES`] times with
    /// exponential backoff (2s, 4s, 8s) or the server's retry hint.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if !options.system_prompt.is_empty() {
            messages.push(Message {
                role: "system",
                content: &options.system_prompt,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: false,
        };

        let mut retry_count = 0;
        loop {
            match self.send_once(&body).await {
                Err(LlmError::Transient { status, message }) if retry_count < MAX_RETRIES => {
                    retry_count += 1;
                    let wait =
                        parse_retry_after(&message).unwrap_or_else(|| backoff_secs(retry_count));
                    warn!(
                        status = ?status,
                        attempt = retry_count,
                        max_attempts = MAX_RETRIES,
                        wait_secs = wait,
                        "OpenRouter request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                result => {
                    if let Err(e) = &result {
                        debug!(error = %e, "OpenRouter request gave up");
                    }
                    return result;
                }
            }
        }
    }
}
