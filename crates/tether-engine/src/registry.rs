//! Camera enumeration and selection.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use tether_sdk::{DeviceHandle, DeviceSdk};

use crate::context::TetherContext;
use crate::error::{EngineError, EngineResult};
use crate::executor::DeviceExecutor;
use crate::session::CameraSession;

/// The cameras found by one enumeration.
///
/// Camera identities are their positions in the enumeration, so a new
/// enumeration may assign them differently.
pub struct CameraRegistry {
    sessions: Vec<Arc<CameraSession>>,
    selected: Arc<RwLock<Option<usize>>>,
    executor: Arc<DeviceExecutor>,
}

impl CameraRegistry {
    /// Enumerate attached cameras, waiting for the device thread.
    ///
    /// Never fails: problems are reported and leave the registry empty.
    #[instrument(name = "registry_enumerate", skip(context))]
    pub fn enumerate(context: &TetherContext) -> Self {
        let executor = Arc::clone(context.executor());

        let devices = match executor.call("enumerate cameras", list_devices) {
            Ok(devices) => devices,
            Err(e @ EngineError::NoCameras) => {
                context.reporter().report(e.to_string());
                Vec::new()
            }
            Err(e) => {
                context
                    .reporter()
                    .report(format!("Failed to enumerate cameras: {e}"));
                Vec::new()
            }
        };

        let sessions: Vec<_> = devices
            .into_iter()
            .enumerate()
            .map(|(id, device)| {
                Arc::new(CameraSession::new(
                    id,
                    device,
                    Arc::clone(&executor),
                    context.config(),
                    context.reporter().clone(),
                    context.events(),
                ))
            })
            .collect();
        info!(count = sessions.len(), "Cameras enumerated");

        Self {
            sessions,
            selected: Arc::new(RwLock::new(None)),
            executor,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Camera with identity `id`.
    pub fn get(&self, id: usize) -> Option<&Arc<CameraSession>> {
        self.sessions.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CameraSession>> {
        self.sessions.iter()
    }

    /// Select camera `id` and connect it, on the device thread.
    ///
    /// An unknown id clears the selection and is reported.
    pub fn select_by_id(&self, id: usize) -> EngineResult<()> {
        let core = self.sessions.get(id).map(|session| session.core());
        let selected = Arc::clone(&self.selected);

        self.executor
            .submit("select camera", move |sdk: &dyn DeviceSdk| match core {
                Some(core) => {
                    *selected.write() = Some(id);
                    debug!(camera = id, "Camera selected");
                    core.connect(sdk)
                }
                None => {
                    selected.write().take();
                    Err(EngineError::UnknownCamera(id))
                }
            })
    }

    /// Identity of the selected camera. May lag behind a queued selection.
    pub fn selected_id(&self) -> Option<usize> {
        *self.selected.read()
    }

    /// The selected camera, if any.
    pub fn selected(&self) -> Option<Arc<CameraSession>> {
        self.selected_id()
            .and_then(|id| self.sessions.get(id))
            .map(Arc::clone)
    }

    /// Close every camera, then release the vendor runtime.
    ///
    /// Each close failure is reported on its own and does not stop the
    /// remaining closes.
    #[instrument(name = "registry_teardown", skip(self), fields(count = self.sessions.len()))]
    pub fn teardown(&self) -> EngineResult<()> {
        for session in &self.sessions {
            if let Err(e) = session.close() {
                warn!(camera = session.id(), error = %e, "Failed to queue close");
            }
        }

        let selected = Arc::clone(&self.selected);
        self.executor.submit("clear selection", move |_: &dyn DeviceSdk| {
            selected.write().take();
            Ok(())
        })?;
        self.executor.release_runtime()?;

        info!("Teardown queued");
        Ok(())
    }
}

fn list_devices(sdk: &dyn DeviceSdk) -> EngineResult<Vec<DeviceHandle>> {
    let list = sdk.camera_list()?;

    let mut devices = Vec::new();
    let collected = sdk.child_count(list).and_then(|count| {
        for index in 0..count {
            devices.push(sdk.child_at(list, index)?);
        }
        Ok(())
    });

    // Device references outlive the list.
    if let Err(e) = sdk.release(list.into()) {
        warn!(error = %e, "Failed to release camera list");
    }

    if let Err(e) = collected {
        for device in devices {
            if let Err(e) = sdk.release(device.into()) {
                warn!(error = %e, ?device, "Failed to release camera");
            }
        }
        return Err(e.into());
    }
    if devices.is_empty() {
        return Err(EngineError::NoCameras);
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRig;
    use tether_types::SessionState;

    #[test]
    fn test_no_cameras_reports_once() {
        let rig = TestRig::new(0);

        let registry = rig.context.enumerate();

        assert!(registry.is_empty());
        assert!(registry.selected().is_none());
        assert_eq!(*rig.messages.lock(), vec!["There is no camera connected."]);
        assert_eq!(rig.sdk.live_object_count(), 0);
    }

    #[test]
    fn test_enumerate_assigns_positional_ids() {
        let rig = TestRig::new(3);

        let registry = rig.context.enumerate();

        assert_eq!(registry.len(), 3);
        let ids: Vec<_> = registry.iter().map(|camera| camera.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(registry
            .iter()
            .all(|camera| camera.state() == SessionState::Disconnected));
        assert_eq!(rig.sdk.live_object_count(), 3);
        assert!(rig.messages.lock().is_empty());
    }

    #[test]
    fn test_enumeration_failure_leaves_registry_empty() {
        let rig = TestRig::new(2);
        rig.sdk.fail_on("child_at", 0x0000_0060);

        let registry = rig.context.enumerate();

        assert!(registry.is_empty());
        assert_eq!(rig.messages.lock().len(), 1);
        assert!(rig.messages.lock()[0].starts_with("Failed to enumerate cameras"));
        assert_eq!(rig.sdk.released_access_count(), 0);
    }

    #[test]
    fn test_select_unknown_id_is_reported() {
        let rig = TestRig::new(1);
        let registry = rig.context.enumerate();

        registry.select_by_id(4).unwrap();
        rig.context.executor().flush().unwrap();

        assert!(registry.selected().is_none());
        assert_eq!(rig.messages.lock().len(), 1);
        assert!(rig.messages.lock()[0].contains("No camera with id 4"));
        assert_eq!(rig.sdk.call_count("open_session"), 0);
    }

    #[test]
    fn test_select_connects_camera() {
        let rig = TestRig::new(2);
        let registry = rig.context.enumerate();

        registry.select_by_id(1).unwrap();
        rig.context.executor().flush().unwrap();

        let selected = registry.selected().unwrap();
        assert_eq!(selected.id(), 1);
        assert_eq!(selected.state(), SessionState::Connected);
        assert_eq!(registry.get(0).unwrap().state(), SessionState::Disconnected);

        registry.select_by_id(9).unwrap();
        rig.context.executor().flush().unwrap();
        assert_eq!(registry.selected_id(), None);
    }

    #[test]
    fn test_teardown_closes_all_and_releases_runtime_once() {
        let rig = TestRig::new(2);
        let registry = rig.context.enumerate();
        registry.get(0).unwrap().connect().unwrap();
        registry.get(1).unwrap().connect().unwrap();
        registry.get(1).unwrap().start_live_view().unwrap();

        registry.teardown().unwrap();
        rig.context.executor().flush().unwrap();

        assert!(registry
            .iter()
            .all(|camera| camera.state() == SessionState::Closed));
        assert_eq!(rig.sdk.live_object_count(), 0);
        assert!(!rig.sdk.is_initialized());

        rig.context.stop();
        assert_eq!(rig.sdk.terminate_count(), 1);
        assert_eq!(rig.sdk.released_access_count(), 0);
        assert!(rig.messages.lock().is_empty());
    }

    #[test]
    fn test_teardown_reports_each_failure() {
        let rig = TestRig::new(3);
        let registry = rig.context.enumerate();
        for camera in registry.iter() {
            camera.connect().unwrap();
        }
        rig.context.executor().flush().unwrap();
        rig.sdk.fail_on("close_session", 0x0000_0002);

        registry.teardown().unwrap();
        rig.context.executor().flush().unwrap();

        assert_eq!(rig.messages.lock().len(), 3);
        assert!(registry.iter().all(|camera| camera.state().is_closed()));
        assert_eq!(rig.sdk.terminate_count(), 1);
    }

    #[test]
    fn test_enumerate_before_start_is_reported() {
        let rig = TestRig::unstarted(1);

        let registry = rig.context.enumerate();

        assert!(registry.is_empty());
        assert_eq!(rig.messages.lock().len(), 1);
    }
}
