//! API keys: where they come from, how they are stored, how they are checked.
//!
//! The pipeline only ever asks a [`CredentialSource`] for a key string.
//! Absence is a distinct fatal condition ([`ComicError::AuthError`]), never
//! a network error.
//!
//! The CLI layers two sources:
//!
//! 1. the key store at `<config dir>/paper2comic/keys.json`, used only for
//!    keys that passed validation when they were saved;
//! 2. the `OPENROUTER_API_KEY` / `CRSAI_API_KEY` environment variables.

use crate::config::ComicConfig;
use crate::error::ComicError;
use crate::provider::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Message used when no key can be found for a provider.
pub const MISSING_KEY_MESSAGE: &str = "API Key not found. Please configure your API key";

// ── Sources ──────────────────────────────────────────────────────────────────

/// Resolves a bearer token for a provider.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self, provider: Provider) -> Option<String>;
}

/// Keys from `OPENROUTER_API_KEY` / `CRSAI_API_KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn api_key(&self, provider: Provider) -> Option<String> {
        std::env::var(provider.key_env_var())
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Fixed keys, for library callers that manage secrets themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<Provider, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self, provider: Provider) -> Option<String> {
        self.keys.get(&provider).filter(|k| !k.trim().is_empty()).cloned()
    }
}

/// The first source that has a key wins.
#[derive(Clone, Default)]
pub struct LayeredCredentials {
    sources: Vec<Arc<dyn CredentialSource>>,
}

impl LayeredCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.sources.push(source);
        self
    }
}

impl CredentialSource for LayeredCredentials {
    fn api_key(&self, provider: Provider) -> Option<String> {
        self.sources.iter().find_map(|s| s.api_key(provider))
    }
}

/// The key for `provider`, or an [`ComicError::AuthError`] if there is none.
pub fn resolve_key(source: &dyn CredentialSource, provider: Provider) -> Result<String, ComicError> {
    source.api_key(provider).ok_or_else(|| ComicError::AuthError {
        provider: provider.name().to_string(),
        detail: format!("{MISSING_KEY_MESSAGE} ({})", provider.key_env_var()),
    })
}

// ── Key store ────────────────────────────────────────────────────────────────

/// Validation outcome per provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValidity {
    #[serde(default)]
    pub open_router: bool,
    #[serde(default)]
    pub crsai: bool,
}

impl KeyValidity {
    pub fn get(&self, provider: Provider) -> bool {
        match provider {
            Provider::OpenRouter => self.open_router,
            Provider::Crsai => self.crsai,
        }
    }
}

/// The persisted key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStorage {
    #[serde(default)]
    pub open_router_api_key: String,
    #[serde(default)]
    pub crsai_api_key: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub is_valid: KeyValidity,
}

impl Default for ApiKeyStorage {
    fn default() -> Self {
        Self {
            open_router_api_key: String::new(),
            crsai_api_key: String::new(),
            last_updated: Utc::now(),
            is_valid: KeyValidity::default(),
        }
    }
}

impl ApiKeyStorage {
    /// `<config dir>/paper2comic/keys.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("paper2comic").join("keys.json"))
    }

    /// Build a record from keys and their validation results.
    pub fn new(open_router_api_key: String, crsai_api_key: String, is_valid: KeyValidity) -> Self {
        Self {
            open_router_api_key,
            crsai_api_key,
            last_updated: Utc::now(),
            is_valid,
        }
    }

    /// Load the store. A missing or unreadable file yields the empty default.
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable key store {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                debug!("No key store at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the store, creating parent directories as needed.
    pub async fn save(&self, path: &Path) -> Result<(), ComicError> {
        let write_err = |source: std::io::Error| ComicError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ComicError::Internal(format!("serialising key store: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
        Ok(())
    }

    /// Delete the store. A missing file is not an error.
    pub async fn clear(path: &Path) -> Result<(), ComicError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ComicError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn stored_key(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenRouter => &self.open_router_api_key,
            Provider::Crsai => &self.crsai_api_key,
        }
    }

    /// True if at least one stored key passed validation.
    pub fn has_valid_key(&self) -> bool {
        self.is_valid.open_router || self.is_valid.crsai
    }

    /// The provider to prefer: OpenRouter first, then CRSAI.
    pub fn active_provider(&self) -> Option<Provider> {
        Provider::ALL.into_iter().find(|p| self.is_valid.get(*p))
    }
}

impl CredentialSource for ApiKeyStorage {
    /// Only validated, non-empty keys are offered.
    fn api_key(&self, provider: Provider) -> Option<String> {
        let key = self.stored_key(provider);
        (self.is_valid.get(provider) && !key.trim().is_empty()).then(|| key.to_string())
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Checks keys against cheap read-only provider endpoints.
#[derive(Debug, Clone)]
pub struct KeyValidator {
    client: reqwest::Client,
    openrouter_base_url: String,
    crsai_base_url: String,
}

impl KeyValidator {
    pub fn new(config: &ComicConfig) -> Result<Self, ComicError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ComicError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            openrouter_base_url: config.openrouter_base_url.clone(),
            crsai_base_url: config.crsai_base_url.clone(),
        })
    }

    /// `GET {openrouter}/models` with the key as bearer token succeeds.
    pub async fn validate_openrouter(&self, key: &str) -> bool {
        if key.trim().is_empty() {
            return false;
        }
        let url = format!("{}/models", self.openrouter_base_url);
        match self.client.get(&url).bearer_auth(key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("OpenRouter key validation failed: {}", e);
                false
            }
        }
    }

    /// `GET {crsai}/client/common/getCredits?apikey=KEY` answers `code: 0`.
    pub async fn validate_crsai(&self, key: &str) -> bool {
        if key.trim().is_empty() {
            return false;
        }
        let url = format!("{}/client/common/getCredits", self.crsai_base_url);
        let response = match self.client.get(&url).query(&[("apikey", key)]).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!("CRSAI key validation failed with status {}", resp.status());
                return false;
            }
            Err(e) => {
                warn!("CRSAI key validation failed: {}", e);
                return false;
            }
        };
        match response.json::<serde_json::Value>().await {
            Ok(body) => body.get("code").and_then(serde_json::Value::as_i64) == Some(0),
            Err(_) => false,
        }
    }

    /// Validate both keys concurrently.
    pub async fn validate(&self, open_router_key: &str, crsai_key: &str) -> KeyValidity {
        let (open_router, crsai) = tokio::join!(
            self.validate_openrouter(open_router_key),
            self.validate_crsai(crsai_key)
        );
        KeyValidity { open_router, crsai }
    }
}
