//! Camera session state machine types.

use serde::{Deserialize, Serialize};

/// The lifecycle state of one camera session.
///
/// `Disconnected -> Connecting -> Connected <-> LiveViewActive`, and any
/// non-closed state may move to `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Enumerated but no session opened yet.
    #[default]
    Disconnected,

    /// `connect()` is running on the device thread.
    Connecting,

    /// Session open, ready for commands.
    Connected,

    /// Session open and streaming live view to the host.
    LiveViewActive,

    /// Session closed and device handle released.
    Closed,
}

impl SessionState {
    /// Returns true if a session is open with the device.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::LiveViewActive)
    }

    /// Returns true if live view is streaming.
    pub fn is_live_view(self) -> bool {
        matches!(self, Self::LiveViewActive)
    }

    /// Returns true if the session has been closed.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if a capture can be triggered in this state.
    pub fn can_shoot(self) -> bool {
        self.is_connected()
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::LiveViewActive => "LiveViewActive",
            Self::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }

    #[test]
    fn test_state_predicates() {
        assert!(!SessionState::Disconnected.can_shoot());
        assert!(!SessionState::Connecting.can_shoot());
        assert!(SessionState::Connected.can_shoot());
        assert!(SessionState::LiveViewActive.can_shoot());
        assert!(SessionState::LiveViewActive.is_live_view());
        assert!(!SessionState::Connected.is_live_view());
        assert!(SessionState::Closed.is_closed());
        assert!(!SessionState::Closed.is_connected());
    }
}
