//! Dispatch: concurrent fan-out of one query to every responder
//!
//! - [`DispatchCoordinator`]: starts every responder call at once, awaits the
//!   whole batch, and orders the replies by registration
//! - [`DispatchGate`]: rejects a new dispatch while one is in flight

pub mod coordinator;
pub mod gate;

pub use coordinator::{
    DispatchConfig, DispatchCoordinator, DispatchReport, SharedDispatchCoordinator,
    DEFAULT_RESPONDER_TIMEOUT,
};
pub use gate::{DispatchGate, GatePass};
