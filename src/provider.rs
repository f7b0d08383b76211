//! The two concrete providers and a thin client that knows their endpoints
//! and headers.
//!
//! | Provider | Chat endpoint | Extra headers |
//! |----------|---------------|---------------|
//! | OpenRouter | `{base}/chat/completions` | `HTTP-Referer`, `X-Title` |
//! | CRSAI | `{base}/v1/chat/completions` | none |
//!
//! CRSAI additionally exposes the draw API used by
//! [`crate::pipeline::poll::DrawJobClient`].

use crate::config::ComicConfig;
use crate::error::ComicError;
use crate::pipeline::extract;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// A supported AI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenRouter,
    Crsai,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenRouter, Provider::Crsai];

    /// Stable lowercase identifier.
    pub fn name(self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::Crsai => "crsai",
        }
    }

    /// Text model used when the config does not name one.
    pub fn default_text_model(self) -> &'static str {
        match self {
            Provider::OpenRouter => "google/gemini-3-pro-preview",
            Provider::Crsai => "gemini-2.5-pro",
        }
    }

    /// Environment variable consulted by [`crate::credentials::EnvCredentials`].
    pub fn key_env_var(self) -> &'static str {
        match self {
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Crsai => "CRSAI_API_KEY",
        }
    }

    fn chat_path(self) -> &'static str {
        match self {
            Provider::OpenRouter => "/chat/completions",
            Provider::Crsai => "/v1/chat/completions",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = ComicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(Provider::OpenRouter),
            "crsai" | "grsai" => Ok(Provider::Crsai),
            other => Err(ComicError::InvalidConfig(format!(
                "Unknown provider '{other}' (expected openrouter or crsai)"
            ))),
        }
    }
}

/// Authenticated access to one provider through the injected transport.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Provider,
    base_url: String,
    headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("transport", &"<dyn Transport>")
            .finish()
    }
}

impl ProviderClient {
    pub fn new(
        provider: Provider,
        config: &ComicConfig,
        api_key: &str,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut headers = vec![("Authorization".to_string(), format!("Bearer {api_key}"))];
        if provider == Provider::OpenRouter {
            headers.push(("HTTP-Referer".to_string(), config.app_referer.clone()));
            headers.push(("X-Title".to_string(), config.app_title.clone()));
        }
        Self {
            provider,
            base_url: config.base_url(provider).to_string(),
            headers,
            transport,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Absolute URL for `path` under this provider's API root.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST `payload` to `path`, attributing auth failures to this provider.
    pub async fn post(&self, path: &str, payload: &Value) -> Result<Value, ComicError> {
        let endpoint = self.endpoint(path);
        self.transport
            .post(&endpoint, payload, &self.headers)
            .await
            .map_err(|e| match e {
                ComicError::AuthError { detail, .. } => ComicError::AuthError {
                    provider: self.provider.name().to_string(),
                    detail,
                },
                other => other,
            })
    }

    /// Send a chat-completions request.
    ///
    /// A 2xx answer whose only content is `INVALID_ARGUMENT` is a refusal,
    /// not a result: CRSAI reports unsupported multimodal input that way.
    pub async fn chat(&self, payload: &Value) -> Result<Value, ComicError> {
        let model = payload
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or("?");
        let message_count = payload
            .get("messages")
            .and_then(|m| m.as_array())
            .map_or(0, Vec::len);
        debug!(
            "{} chat: model={}, messages={}",
            self.provider, model, message_count
        );
        let response = self.post(self.provider.chat_path(), payload).await?;
        if extract::text_from(&response).trim() == "INVALID_ARGUMENT" {
            return Err(ComicError::ProviderRejected {
                provider: self.provider.name().to_string(),
                message: "INVALID_ARGUMENT: the model may not accept a PDF attachment in this \
                          format. Try OpenRouter for document analysis."
                    .to_string(),
            });
        }
        Ok(response)
    }
}
