//! Shared types for camera tethering.
//!
//! This crate defines the session state machine, the notifications delivered
//! to application code, and the engine configuration.

mod events;
mod state;
mod types;

pub use events::TetherEvent;
pub use state::SessionState;
pub use types::{EngineConfig, StorageCapacity, DEFAULT_PUMP_INTERVAL_MS};
