//! Responder capability
//!
//! A responder turns `(query, persona)` into reply text or a distinguishable
//! failure. The dispatch coordinator only sees this trait; whether the reply
//! comes from a local proxy over HTTP or straight from a provider API is an
//! endpoint configuration detail.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors from a single responder call
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Responder returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed reply: {0}")]
    Malformed(String),

    #[error("Credential not configured: {0}")]
    MissingCredential(String),

    #[error("Responder timed out after {0:?}")]
    TimedOut(Duration),
}

/// Capability to obtain one reply for a query under a persona
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponderClient: Send + Sync {
    /// Ask for a reply. Must fail rather than return placeholder text on error.
    async fn call(&self, query: &str, persona: &str) -> Result<String, ResponderError>;
}

/// Request body accepted by the proxy endpoints
#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    message: &'a str,
    system_prompt: &'a str,
}

/// Responder backed by a proxy endpoint that answers with a JSON string
pub struct HttpResponder {
    url: String,
    client: reqwest::Client,
}

impl HttpResponder {
    /// Create a responder for `base_url` + `path` sharing `client`
    pub fn new(client: reqwest::Client, base_url: &str, path: &str) -> Self {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'));
        Self { url, client }
    }

    /// Endpoint this responder posts to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ResponderClient for HttpResponder {
    async fn call(&self, query: &str, persona: &str) -> Result<String, ResponderError> {
        let body = ProxyRequest {
            message: query,
            system_prompt: persona,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResponderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResponderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: String = response
            .json()
            .await
            .map_err(|e| ResponderError::Malformed(e.to_string()))?;

        debug!(url = %self.url, chars = reply.len(), "Proxy reply received");
        Ok(reply)
    }
}
