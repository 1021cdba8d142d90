//! Vendor runtime lifetime.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use tether_sdk::{DeviceSdk, SdkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimePhase {
    Uninitialized,
    Running,
    Released,
}

/// Loads the vendor runtime once and releases it at most once.
///
/// Both calls must happen on the device thread.
pub(crate) struct RuntimeGuard {
    sdk: Arc<dyn DeviceSdk>,
    phase: Mutex<RuntimePhase>,
}

impl RuntimeGuard {
    pub(crate) fn new(sdk: Arc<dyn DeviceSdk>) -> Self {
        Self {
            sdk,
            phase: Mutex::new(RuntimePhase::Uninitialized),
        }
    }

    /// Load the runtime.
    pub(crate) fn initialize(&self) -> SdkResult<()> {
        let mut phase = self.phase.lock();
        if *phase != RuntimePhase::Uninitialized {
            debug!(phase = ?*phase, "Runtime already initialized, ignoring");
            return Ok(());
        }
        self.sdk.initialize()?;
        *phase = RuntimePhase::Running;
        info!("Camera SDK initialized");
        Ok(())
    }

    /// Release the runtime. Later calls are no-ops.
    pub(crate) fn release(&self) -> SdkResult<()> {
        let mut phase = self.phase.lock();
        if *phase != RuntimePhase::Running {
            return Ok(());
        }
        *phase = RuntimePhase::Released;
        self.sdk.terminate()?;
        info!("Camera SDK released");
        Ok(())
    }

    /// Returns true between a successful initialize and release.
    pub(crate) fn is_running(&self) -> bool {
        *self.phase.lock() == RuntimePhase::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_sdk::SimulatedSdk;

    #[test]
    fn test_release_happens_once() {
        let sdk = Arc::new(SimulatedSdk::with_cameras(0));
        let guard = RuntimeGuard::new(sdk.clone());

        guard.initialize().unwrap();
        guard.initialize().unwrap();
        assert!(guard.is_running());

        guard.release().unwrap();
        guard.release().unwrap();
        assert!(!guard.is_running());
        assert_eq!(sdk.init_count(), 1);
        assert_eq!(sdk.terminate_count(), 1);
    }

    #[test]
    fn test_release_without_initialize_is_noop() {
        let sdk = Arc::new(SimulatedSdk::with_cameras(0));
        let guard = RuntimeGuard::new(sdk.clone());

        guard.release().unwrap();
        assert_eq!(sdk.call_count("terminate"), 0);
    }
}
