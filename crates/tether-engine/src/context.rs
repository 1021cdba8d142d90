//! Engine context.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use tether_sdk::DeviceSdk;
use tether_types::{EngineConfig, TetherEvent};

use crate::dispatcher::{EventListener, EventSink};
use crate::error::EngineResult;
use crate::executor::DeviceExecutor;
use crate::registry::CameraRegistry;
use crate::reporter::ErrorReporter;

/// Owns the device executor and the settings shared by every camera.
///
/// One context drives one vendor library. Create it once per process.
pub struct TetherContext {
    config: EngineConfig,
    reporter: ErrorReporter,
    executor: Arc<DeviceExecutor>,
    listener: Arc<RwLock<Option<EventListener>>>,
}

impl TetherContext {
    /// Create a new context. Call [`start`](Self::start) before use.
    pub fn new(sdk: Arc<dyn DeviceSdk>, config: EngineConfig, reporter: ErrorReporter) -> Self {
        let executor = Arc::new(DeviceExecutor::new(
            sdk,
            reporter.clone(),
            config.pump_interval(),
        ));
        Self {
            config,
            reporter,
            executor,
            listener: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the device and callback threads.
    pub fn start(&self) -> EngineResult<()> {
        info!(download_dir = %self.config.download_dir.display(), "Starting tether context");
        self.executor.start()
    }

    /// Run queued work to completion and stop both threads.
    pub fn stop(&self) {
        self.executor.stop();
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    /// Enumerate attached cameras.
    pub fn enumerate(&self) -> CameraRegistry {
        CameraRegistry::enumerate(self)
    }

    /// Register the listener for engine events, replacing any previous one.
    pub fn set_event_listener(&self, listener: impl Fn(&TetherEvent) + Send + Sync + 'static) {
        *self.listener.write() = Some(Arc::new(listener));
    }

    pub fn clear_event_listener(&self) {
        self.listener.write().take();
    }

    pub fn executor(&self) -> &Arc<DeviceExecutor> {
        &self.executor
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> EventSink {
        EventSink::new(Arc::clone(&self.listener), self.executor.callback_queue())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::TestRig;

    #[test]
    fn test_stop_returns_with_pending_work() {
        let rig = TestRig::new(2);
        let registry = rig.context.enumerate();
        for camera in registry.iter() {
            camera.connect().unwrap();
            camera.shoot().unwrap();
        }

        rig.context.stop();

        assert!(!rig.context.is_running());
        assert_eq!(rig.sdk.call_count("open_session"), 2);
        assert_eq!(rig.sdk.terminate_count(), 1);
    }

    #[test]
    fn test_clearing_listener_stops_delivery() {
        let rig = TestRig::new(1);
        let events = rig.listen();
        rig.context.clear_event_listener();

        let registry = rig.context.enumerate();
        registry.get(0).unwrap().connect().unwrap();
        rig.context.stop();

        assert!(events.try_recv().is_err());
    }
}
