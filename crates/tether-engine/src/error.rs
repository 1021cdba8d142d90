//! Error types for the engine.

use std::any::Any;

use thiserror::Error;

use tether_sdk::SdkError;
use tether_types::SessionState;

/// Errors that can occur while driving cameras.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A native call failed.
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// The session is not in a state that allows the operation.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A live view poll ran after live view was stopped.
    #[error("Live view is not active")]
    LiveViewNotActive,

    /// No camera with this identity in the current enumeration.
    #[error("No camera with id {0}")]
    UnknownCamera(usize),

    /// Enumeration found nothing.
    #[error("There is no camera connected.")]
    NoCameras,

    /// The device executor was never started or has shut down.
    #[error("Device executor is not running")]
    ExecutorStopped,

    /// An engine thread could not be created.
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A work item panicked on the device thread.
    #[error("Action panicked: {0}")]
    ActionPanicked(String),

    /// A blocking wait was attempted from an engine thread.
    #[error("Blocking wait from an engine thread would deadlock")]
    WouldDeadlock,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
