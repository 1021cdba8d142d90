//! Notifications delivered to application code.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::SessionState;

/// Events the engine delivers to a registered listener.
///
/// Listeners always run on the callback thread, never on the device thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TetherEvent {
    /// A camera session changed state.
    StateChanged {
        /// Identity of the camera within the current enumeration.
        camera: usize,

        /// Previous state.
        previous: SessionState,

        /// Current state.
        current: SessionState,
    },

    /// A transferred image was written to disk.
    ImageSaved {
        /// Path of the written file.
        path: PathBuf,
    },
}
