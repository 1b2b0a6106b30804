//! Completion providers behind the proxy
//!
//! One client type covers every provider; the variants differ only in the
//! request shape and endpoint configuration.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::responder::{ResponderClient, ResponderError};

/// Delay before the credential-less placeholder reply
pub const DEFAULT_PLACEHOLDER_DELAY: Duration = Duration::from_millis(1500);

/// Name substituted when the persona carries no bracketed tag
const PLACEHOLDER_FALLBACK_TAG: &str = "friend";

static PERSONA_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\w+)\]").expect("persona tag regex"));

/// Errors from provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} not set")]
    MissingCredential(&'static str),

    #[error("{provider} request failed: {reason}")]
    RequestFailed { provider: ProviderKind, reason: String },

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} response parse error: {reason}")]
    ParseError { provider: ProviderKind, reason: String },
}

impl From<ProviderError> for ResponderError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingCredential(var) => Self::MissingCredential(var.to_string()),
            ProviderError::RequestFailed { reason, .. } => Self::Transport(reason),
            ProviderError::Api { status, body, .. } => Self::Status { status, body },
            ProviderError::ParseError { reason, .. } => Self::Malformed(reason),
        }
    }
}

/// Third-party completion provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(alias = "openai")]
    OpenAi,
    Gemini,
    Grok,
}

impl ProviderKind {
    pub fn all() -> &'static [ProviderKind] {
        &[Self::OpenAi, Self::Gemini, Self::Grok]
    }

    /// Environment variable holding the credential
    pub fn credential_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_KEY",
            Self::Gemini => "GEMINI_KEY",
            Self::Grok => "GROK_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-2.5-flash",
            Self::Grok => "grok-beta",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/models",
            Self::Grok => "https://api.x.ai/v1/chat/completions",
        }
    }

    /// Route served by the proxy for this provider
    pub fn proxy_path(&self) -> &'static str {
        match self {
            Self::OpenAi => "/api/openai",
            Self::Gemini => "/api/gemini",
            Self::Grok => "/api/grok",
        }
    }

    /// Whether a missing credential yields a placeholder instead of an error
    pub fn has_placeholder(&self) -> bool {
        matches!(self, Self::Grok)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
            Self::Grok => write!(f, "grok"),
        }
    }
}

/// Deterministic reply used when the placeholder provider has no credential
pub fn placeholder_reply(message: &str, system_prompt: &str) -> String {
    let tag = PERSONA_TAG
        .captures(system_prompt)
        .and_then(|c| c.get(1))
        .map_or(PLACEHOLDER_FALLBACK_TAG, |m| m.as_str());
    let opening = message.split(' ').take(3).collect::<Vec<_>>().join(" ");

    format!(
        "Yo, {tag}! Grok here. So, {opening}? Chill, don't take it so seriously. \
         Better grab a coffee."
    )
}

/// Client for one completion provider
#[derive(Debug, Clone)]
pub struct ProviderClient {
    kind: ProviderKind,
    credential: Option<String>,
    http: reqwest::Client,
    model: String,
    base_url: String,
    placeholder_delay: Duration,
}

impl ProviderClient {
    /// Create a client; an empty credential counts as absent
    pub fn new(kind: ProviderKind, credential: Option<String>) -> Self {
        Self {
            kind,
            credential: credential.filter(|c| !c.trim().is_empty()),
            http: reqwest::Client::new(),
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            placeholder_delay: DEFAULT_PLACEHOLDER_DELAY,
        }
    }

    /// Create a client reading the credential from the provider's env var
    pub fn from_env(kind: ProviderKind) -> Self {
        Self::new(kind, std::env::var(kind.credential_env()).ok())
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_placeholder_delay(mut self, delay: Duration) -> Self {
        self.placeholder_delay = delay;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Produce a completion for `message` under `system_prompt`
    pub async fn complete(&self, message: &str, system_prompt: &str) -> Result<String, ProviderError> {
        let Some(credential) = self.credential.as_deref() else {
            if self.kind.has_placeholder() {
                debug!(provider = %self.kind, delay = ?self.placeholder_delay, "No credential, simulating reply");
                tokio::time::sleep(self.placeholder_delay).await;
                return Ok(placeholder_reply(message, system_prompt));
            }
            return Err(ProviderError::MissingCredential(self.kind.credential_env()));
        };

        let start = std::time::Instant::now();
        let reply = match self.kind {
            ProviderKind::OpenAi | ProviderKind::Grok => {
                self.chat_completion(credential, message, system_prompt).await?
            }
            ProviderKind::Gemini => self.generate_content(credential, message, system_prompt).await?,
        };

        info!(
            provider = %self.kind,
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Provider reply received"
        );
        Ok(reply)
    }

    async fn chat_completion(
        &self,
        credential: &str,
        message: &str,
        system_prompt: &str,
    ) -> Result<String, ProviderError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": message}
            ]
        });

        let response = self
            .http
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {credential}"))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        let resp_json = self.read_json(response).await?;
        self.extract(&resp_json["choices"][0]["message"]["content"])
    }

    async fn generate_content(
        &self,
        credential: &str,
        message: &str,
        system_prompt: &str,
    ) -> Result<String, ProviderError> {
        let request_body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": format!("{system_prompt}\n\n{message}")}]
            }]
        });

        let url = format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", credential)])
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        let resp_json = self.read_json(response).await?;
        self.extract(&resp_json["candidates"][0]["content"]["parts"][0]["text"])
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<serde_json::Value, ProviderError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.kind,
                status,
                body,
            });
        }

        response.json().await.map_err(|e| ProviderError::ParseError {
            provider: self.kind,
            reason: e.to_string(),
        })
    }

    fn extract(&self, value: &serde_json::Value) -> Result<String, ProviderError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ParseError {
                provider: self.kind,
                reason: "reply text missing from response".to_string(),
            })
    }

    fn request_failed(&self, err: reqwest::Error) -> ProviderError {
        ProviderError::RequestFailed {
            provider: self.kind,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ResponderClient for ProviderClient {
    async fn call(&self, query: &str, persona: &str) -> Result<String, ResponderError> {
        Ok(self.complete(query, persona).await?)
    }
}
