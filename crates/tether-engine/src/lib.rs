//! Camera tethering engine.
//!
//! All native camera work runs on one device thread owned by
//! [`DeviceExecutor`]. Application code queues operations through
//! [`CameraSession`] and [`CameraRegistry`], and receives results, frames and
//! [`TetherEvent`](tether_types::TetherEvent)s on a separate callback thread.
//! Failures are delivered to an [`ErrorReporter`] rather than returned.

mod context;
mod dispatcher;
mod error;
mod executor;
mod naming;
mod platform;
mod registry;
mod reporter;
mod router;
mod runtime;
mod session;

pub use context::TetherContext;
pub use dispatcher::EventListener;
pub use error::{EngineError, EngineResult};
pub use executor::DeviceExecutor;
pub use naming::{image_file_name, image_file_name_now};
pub use registry::CameraRegistry;
pub use reporter::{ErrorHook, ErrorReporter};
pub use session::{CameraSession, FrameConsumer};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crossbeam_channel::Receiver;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use tether_sdk::SimulatedSdk;
    use tether_types::{EngineConfig, TetherEvent};

    use crate::{ErrorReporter, TetherContext};

    /// A reporter that records every message.
    pub(crate) fn collecting_reporter() -> (ErrorReporter, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let reporter = ErrorReporter::new(move |message| sink.lock().push(message.to_string()));
        (reporter, messages)
    }

    /// Wait until the device thread has pumped events at least once more.
    pub(crate) fn pump_once(context: &TetherContext) {
        context.executor().flush().unwrap();
        context.executor().flush().unwrap();
    }

    /// A context over a simulated library with a fast pump.
    pub(crate) struct TestRig {
        pub context: TetherContext,
        pub sdk: Arc<SimulatedSdk>,
        pub messages: Arc<Mutex<Vec<String>>>,
        pub dir: TempDir,
    }

    impl TestRig {
        pub(crate) fn new(cameras: usize) -> Self {
            let rig = Self::unstarted(cameras);
            rig.context.start().unwrap();
            rig
        }

        pub(crate) fn unstarted(cameras: usize) -> Self {
            let sdk = Arc::new(SimulatedSdk::with_cameras(cameras));
            let (reporter, messages) = collecting_reporter();
            let dir = tempfile::tempdir().unwrap();
            let config = EngineConfig {
                pump_interval_ms: 1,
                download_dir: dir.path().to_path_buf(),
                ..EngineConfig::default()
            };
            let context = TetherContext::new(sdk.clone(), config, reporter);
            Self {
                context,
                sdk,
                messages,
                dir,
            }
        }

        /// Forward every engine event into a channel.
        pub(crate) fn listen(&self) -> Receiver<TetherEvent> {
            let (tx, rx) = crossbeam_channel::unbounded();
            self.context.set_event_listener(move |event| {
                let _ = tx.send(event.clone());
            });
            rx
        }
    }
}
