//! Keychain fallback for credentials
//!
//! Both tokens live in a single keychain entry stored as JSON, so the OS
//! prompts at most once per run. Environment variables always win; this is
//! only consulted when they are unset.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing::warn;

const KEYRING_SERVICE: &str = "shiplog-credentials";
const KEYRING_USERNAME: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    openrouter_api_key: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS: OnceLock<KeyringResult<StoredCredentials>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

/// Never touch the real keychain from tests or when the user opts out.
pub fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    matches!(
        std::env::var("SHIPLOG_DISABLE_KEYRING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

/// Warn about keychain errors only once per session
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    warn!(
        "Couldn't access system keychain for {}: {}. Set GITHUB_TOKEN and OPENROUTER_API_KEY to bypass it.",
        context, err
    );
}

fn parse_credentials(json: &str) -> KeyringResult<StoredCredentials> {
    serde_json::from_str(json).map_err(|e| format!("Failed to parse credentials: {}", e))
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USERNAME).map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => parse_credentials(&json),
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn read_credentials() -> KeyringResult<StoredCredentials> {
    CREDENTIALS.get_or_init(read_credentials_uncached).clone()
}

/// GitHub token from the keychain, if one was stored.
pub fn get_github_token() -> KeyringResult<Option<String>> {
    Ok(read_credentials()?.github_token)
}

/// OpenRouter API key from the keychain, if one was stored.
pub fn get_api_key() -> KeyringResult<Option<String>> {
    Ok(read_credentials()?.openrouter_api_key)
}
