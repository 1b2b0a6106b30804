//! HTTP proxy exposing one completion route per provider
//!
//! Routes:
//! - `POST /api/openai`, `/api/gemini`, `/api/grok`: body `{message, system_prompt}`,
//!   answers the reply as a JSON string or 500 with `{"error": ...}`
//! - `GET /health`

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::providers::{ProviderClient, ProviderKind};

/// Request body shared by all completion routes
#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub message: String,
    #[serde(default)]
    pub system_prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    /// Provider name -> whether a credential is configured
    pub credentials: HashMap<String, bool>,
}

/// Providers served by the proxy
#[derive(Clone)]
pub struct ProxyState {
    providers: Arc<HashMap<ProviderKind, ProviderClient>>,
}

impl ProxyState {
    pub fn new(providers: impl IntoIterator<Item = ProviderClient>) -> Self {
        let providers = providers.into_iter().map(|p| (p.kind(), p)).collect();
        Self {
            providers: Arc::new(providers),
        }
    }

    /// All providers, credentials read from the environment
    pub fn from_env() -> Self {
        Self::new(ProviderKind::all().iter().map(|k| ProviderClient::from_env(*k)))
    }

    fn provider(&self, kind: ProviderKind) -> Option<&ProviderClient> {
        self.providers.get(&kind)
    }
}

/// Build the proxy router
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(ProviderKind::OpenAi.proxy_path(), post(complete_openai))
        .route(ProviderKind::Gemini.proxy_path(), post(complete_gemini))
        .route(ProviderKind::Grok.proxy_path(), post(complete_grok))
        .with_state(state)
}

/// Bind `addr` and serve until the listener fails
pub async fn serve(addr: SocketAddr, state: ProxyState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Proxy listening");
    axum::serve(listener, router(state)).await
}

async fn health(State(state): State<ProxyState>) -> Json<HealthBody> {
    let credentials = state
        .providers
        .values()
        .map(|p| (p.kind().to_string(), p.has_credential()))
        .collect();
    Json(HealthBody {
        status: "ok",
        credentials,
    })
}

async fn complete_openai(
    state: State<ProxyState>,
    body: Json<CompletionRequest>,
) -> Result<Json<String>, (StatusCode, Json<ErrorBody>)> {
    complete(ProviderKind::OpenAi, state, body).await
}

async fn complete_gemini(
    state: State<ProxyState>,
    body: Json<CompletionRequest>,
) -> Result<Json<String>, (StatusCode, Json<ErrorBody>)> {
    complete(ProviderKind::Gemini, state, body).await
}

async fn complete_grok(
    state: State<ProxyState>,
    body: Json<CompletionRequest>,
) -> Result<Json<String>, (StatusCode, Json<ErrorBody>)> {
    complete(ProviderKind::Grok, state, body).await
}

async fn complete(
    kind: ProviderKind,
    State(state): State<ProxyState>,
    Json(request): Json<CompletionRequest>,
) -> Result<Json<String>, (StatusCode, Json<ErrorBody>)> {
    let provider = state.provider(kind).ok_or_else(|| {
        internal_error(format!("{kind} provider not configured"))
    })?;

    provider
        .complete(&request.message, &request.system_prompt)
        .await
        .map(Json)
        .map_err(|e| {
            error!(provider = %kind, error = %e, "Provider call failed");
            internal_error(e.to_string())
        })
}

fn internal_error(message: String) -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: message }))
}
