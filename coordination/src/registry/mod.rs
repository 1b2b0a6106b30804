//! Responder registry: the fixed roster of personas a query fans out to
//!
//! Responders are defined once at startup and never mutated. Registration
//! order is significant: dispatch output and message timestamps follow it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proxy::ProviderKind;
use crate::responder::ResponderClient;

/// Errors from building a registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry needs at least one responder")]
    Empty,

    #[error("Duplicate responder id: {0}")]
    DuplicateId(String),

    #[error("Responder id must not be empty")]
    BlankId,
}

/// A configured persona + endpoint pair
#[derive(Clone)]
pub struct Responder {
    /// Stable identifier, used in message ids
    pub id: String,
    /// Name shown as the message sender
    pub display_name: String,
    /// Instruction text sent to the provider as the system prompt
    pub persona: String,
    /// Reply substituted when the endpoint fails
    pub fallback_reply: String,
    /// Avatar initial for rendering
    pub initial: String,
    /// Capability producing the reply
    pub endpoint: Arc<dyn ResponderClient>,
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable set of responders
#[derive(Debug, Clone)]
pub struct ResponderRegistry {
    responders: Vec<Responder>,
}

impl ResponderRegistry {
    /// Build a registry, rejecting an empty roster and repeated ids
    pub fn new(responders: Vec<Responder>) -> Result<Self, RegistryError> {
        if responders.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for responder in &responders {
            if responder.id.trim().is_empty() {
                return Err(RegistryError::BlankId);
            }
            if !seen.insert(responder.id.as_str()) {
                return Err(RegistryError::DuplicateId(responder.id.clone()));
            }
        }

        Ok(Self { responders })
    }

    /// Responders in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Responder> {
        self.responders.iter()
    }

    pub fn as_slice(&self) -> &[Responder] {
        &self.responders
    }

    pub fn get(&self, id: &str) -> Option<&Responder> {
        self.responders.iter().find(|r| r.id == id)
    }

    /// Resolve a message sender back to its responder
    pub fn find_by_display_name(&self, name: &str) -> Option<&Responder> {
        self.responders.iter().find(|r| r.display_name == name)
    }

    pub fn ids(&self) -> Vec<String> {
        self.responders.iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.responders.len()
    }

    /// Always false for a constructed registry
    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }
}

/// Config-facing description of a responder, without its endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderSpec {
    pub id: String,
    pub display_name: String,
    pub persona: String,
    pub fallback_reply: String,
    pub initial: String,
    /// Provider used by the direct transport
    pub provider: ProviderKind,
    /// Proxy path used by the proxy transport
    #[serde(default)]
    pub path: Option<String>,
}

impl ResponderSpec {
    /// Proxy path, defaulting to the provider's route
    pub fn proxy_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| self.provider.proxy_path().to_string())
    }

    /// Attach an endpoint to this description
    pub fn into_responder(self, endpoint: Arc<dyn ResponderClient>) -> Responder {
        Responder {
            id: self.id,
            display_name: self.display_name,
            persona: self.persona,
            fallback_reply: self.fallback_reply,
            initial: self.initial,
            endpoint,
        }
    }

    /// The three-persona arena roster: formal, textbook, and casual
    pub fn reference_roster() -> Vec<Self> {
        vec![
            Self {
                id: "chatgpt".to_string(),
                display_name: "ChatGPT".to_string(),
                persona: "You are ChatGPT. Reply as a professional AI that is very polite, \
                          detailed and formal. Always use standard, well-structured language. \
                          [ChatGPT]"
                    .to_string(),
                fallback_reply: "Sorry, a technical error occurred on our side. \
                                 Please try again in a moment."
                    .to_string(),
                initial: "C".to_string(),
                provider: ProviderKind::OpenAi,
                path: None,
            },
            Self {
                id: "gemini".to_string(),
                display_name: "Gemini".to_string(),
                persona: "You are Gemini. Reply as an informative AI, like a lecturer explaining \
                          a concept from a textbook. Keep the style clear and direct, focused on \
                          scientific facts or course material. [Gemini]"
                    .to_string(),
                fallback_reply: "Apologies, the connection dropped while looking up reference \
                                 data. Please ask your question again."
                    .to_string(),
                initial: "G".to_string(),
                provider: ProviderKind::Gemini,
                path: None,
            },
            Self {
                id: "grok".to_string(),
                display_name: "Grok".to_string(),
                persona: "You are Grok. Reply as a very relaxed, casual and blunt AI. Use \
                          everyday language, slang and emoji. If there is a chance to joke, \
                          joke. [Grok]"
                    .to_string(),
                fallback_reply: "Whoa, Grok is glitching right now. Looks like it went \
                                 'not found'. Try again, friend!"
                    .to_string(),
                initial: "K".to_string(),
                provider: ProviderKind::Grok,
                path: None,
            },
        ]
    }
}
