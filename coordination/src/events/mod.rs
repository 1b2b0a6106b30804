//! Event-driven notification module for the arena
//!
//! Separates pure data transitions (dispatch, annotation, history writes)
//! from observer-triggered effects (rendering, sound, cross-tab reloads).
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │   Producer   │────▶│  Event Bus   │────▶│   Subscribers    │
//! │ (dispatch,   │     │  (broadcast) │     │ (render, sync,   │
//! │  storage)    │     └──────────────┘     │  other tabs)     │
//! └──────────────┘                          └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use coordination::events::{ArenaEvent, EventBus, EventBusExt, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut statuses = bus.subscribe_filtered(EventFilter::new().types(vec!["responder_status"]));
//! let event = statuses.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{ArenaEvent, ResponderStatus, TabId};
