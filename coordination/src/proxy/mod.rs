//! Provider proxy boundary
//!
//! Forwards `{message, system_prompt}` to a third-party completion provider
//! using a server-held credential. Without its credential the Grok route
//! answers a deterministic placeholder after a simulated delay instead of
//! failing.

pub mod providers;
pub mod server;

pub use providers::{
    placeholder_reply, ProviderClient, ProviderError, ProviderKind, DEFAULT_PLACEHOLDER_DELAY,
};
pub use server::{router, serve, ProxyState};
