//! Arena configuration
//!
//! Loaded from an optional TOML file, with every field defaulted, then
//! overridden from the environment:
//!
//! | Variable           | Field                  |
//! |--------------------|------------------------|
//! | `ARENA_DATA_DIR`   | `data_dir`             |
//! | `ARENA_TRANSPORT`  | `transport`            |
//! | `ARENA_PROXY_URL`  | `proxy_url`            |
//! | `ARENA_PROXY_ADDR` | `proxy_addr`           |
//! | `OPENAI_KEY`       | `credentials.openai`   |
//! | `GEMINI_KEY`       | `credentials.gemini`   |
//! | `GROK_KEY`         | `credentials.grok`     |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::dispatch::DispatchConfig;
use crate::proxy::{ProviderClient, ProviderKind, ProxyState, DEFAULT_PLACEHOLDER_DELAY};
use crate::registry::{RegistryError, ResponderRegistry, ResponderSpec};
use crate::responder::{HttpResponder, ResponderClient};

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid responder roster: {0}")]
    Registry(#[from] RegistryError),
}

/// How responders reach their provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Call provider APIs in-process
    #[default]
    Direct,
    /// POST to a running arena proxy
    Proxy,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "proxy" => Ok(Self::Proxy),
            other => Err(ConfigError::InvalidValue {
                key: "ARENA_TRANSPORT",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Proxy => write!(f, "proxy"),
        }
    }
}

/// Dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Per-responder timeout; 0 disables it
    pub responder_timeout_secs: u64,
    /// Simulated latency of the credential-less placeholder reply
    pub placeholder_delay_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            responder_timeout_secs: 60,
            placeholder_delay_ms: DEFAULT_PLACEHOLDER_DELAY.as_millis() as u64,
        }
    }
}

/// Provider credentials; normally supplied through the environment
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub grok: Option<String>,
}

impl Credentials {
    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_deref(),
            ProviderKind::Gemini => self.gemini.as_deref(),
            ProviderKind::Grok => self.grok.as_deref(),
        }
    }

    fn slot(&mut self, kind: ProviderKind) -> &mut Option<String> {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Grok => &mut self.grok,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai", &self.openai.is_some())
            .field("gemini", &self.gemini.is_some())
            .field("grok", &self.grok.is_some())
            .finish()
    }
}

/// Top-level arena configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Directory holding the persisted user, history and theme
    pub data_dir: PathBuf,
    pub transport: Transport,
    /// Proxy base URL used by the proxy transport
    pub proxy_url: String,
    /// Listen address for `arena serve`
    pub proxy_addr: String,
    pub dispatch: DispatchSection,
    pub credentials: Credentials,
    /// Responder roster in registration order
    pub responders: Vec<ResponderSpec>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".arena"),
            transport: Transport::Direct,
            proxy_url: "http://127.0.0.1:3000".to_string(),
            proxy_addr: "127.0.0.1:3000".to_string(),
            dispatch: DispatchSection::default(),
            credentials: Credentials::default(),
            responders: ResponderSpec::reference_roster(),
        }
    }
}

impl ArenaConfig {
    /// Load from `path` (or defaults when `None`), then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("ARENA_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(transport) = lookup("ARENA_TRANSPORT") {
            self.transport = transport.parse()?;
        }
        if let Some(url) = lookup("ARENA_PROXY_URL") {
            self.proxy_url = url;
        }
        if let Some(addr) = lookup("ARENA_PROXY_ADDR") {
            self.proxy_addr = addr;
        }
        for &kind in ProviderKind::all() {
            if let Some(key) = lookup(kind.credential_env()) {
                *self.credentials.slot(kind) = Some(key);
            }
        }
        Ok(())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::from_timeout_secs(self.dispatch.responder_timeout_secs)
    }

    /// Provider client for `kind` with the configured credential
    pub fn provider_client(&self, kind: ProviderKind) -> ProviderClient {
        ProviderClient::new(kind, self.credentials.get(kind).map(str::to_string))
            .with_placeholder_delay(Duration::from_millis(self.dispatch.placeholder_delay_ms))
    }

    /// Every provider, as served by the proxy
    pub fn proxy_state(&self) -> ProxyState {
        ProxyState::new(ProviderKind::all().iter().map(|&kind| self.provider_client(kind)))
    }

    /// Build the responder registry for the configured transport
    pub fn build_registry(&self) -> Result<ResponderRegistry, ConfigError> {
        let http = reqwest::Client::new();
        let responders = self
            .responders
            .iter()
            .cloned()
            .map(|spec| {
                let endpoint: Arc<dyn ResponderClient> = match self.transport {
                    Transport::Direct => {
                        Arc::new(self.provider_client(spec.provider).with_http(http.clone()))
                    }
                    Transport::Proxy => Arc::new(HttpResponder::new(
                        http.clone(),
                        &self.proxy_url,
                        &spec.proxy_path(),
                    )),
                };
                spec.into_responder(endpoint)
            })
            .collect();

        Ok(ResponderRegistry::new(responders)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ArenaConfig::default();
        assert_eq!(config.transport, Transport::Direct);
        assert_eq!(config.responders.len(), 3);
        assert_eq!(
            config.dispatch_config().responder_timeout,
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.dispatch.placeholder_delay_ms, 1500);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ArenaConfig::from_toml_str(
            r#"
            transport = "proxy"

            [dispatch]
            responder_timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.transport, Transport::Proxy);
        assert!(config.dispatch_config().responder_timeout.is_none());
        assert_eq!(config.dispatch.placeholder_delay_ms, 1500);
        assert_eq!(config.responders.len(), 3);
    }

    #[test]
    fn test_custom_roster() {
        let config = ArenaConfig::from_toml_str(
            r#"
            [[responders]]
            id = "solo"
            display_name = "Solo"
            persona = "[Solo]"
            fallback_reply = "offline"
            initial = "S"
            provider = "grok"
            "#,
        )
        .unwrap();
        let registry = config.build_registry().unwrap();
        assert_eq!(registry.ids(), vec!["solo"]);
    }

    #[test]
    fn test_empty_roster_is_rejected() {
        let config = ArenaConfig::from_toml_str("responders = []").unwrap();
        assert!(matches!(
            config.build_registry(),
            Err(ConfigError::Registry(RegistryError::Empty))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ArenaConfig::default();
        config
            .apply_env(env(&[
                ("ARENA_DATA_DIR", "/tmp/arena"),
                ("ARENA_TRANSPORT", "Proxy"),
                ("ARENA_PROXY_URL", "http://proxy:9000"),
                ("GROK_KEY", "xai-123"),
            ]))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/arena"));
        assert_eq!(config.transport, Transport::Proxy);
        assert_eq!(config.proxy_url, "http://proxy:9000");
        assert_eq!(config.credentials.get(ProviderKind::Grok), Some("xai-123"));
        assert!(config.credentials.get(ProviderKind::OpenAi).is_none());
        assert!(config.provider_client(ProviderKind::Grok).has_credential());
    }

    #[test]
    fn test_bad_transport_is_rejected() {
        let mut config = ArenaConfig::default();
        let err = config
            .apply_env(env(&[("ARENA_TRANSPORT", "carrier-pigeon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "ARENA_TRANSPORT", .. }));
    }

    #[test]
    fn test_credentials_debug_hides_keys() {
        let credentials = Credentials {
            openai: Some("sk-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("openai: true"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ArenaConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
