//! Hardware event routing.
//!
//! Handlers are registered per camera during connect and invoked by the
//! vendor library on the device thread, from inside the event pump.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use tether_sdk::{
    CameraCommand, DeviceHandle, DeviceSdk, ItemHandle, ObjectEvent, PropertyEvent, SdkResult,
    StateEvent, EVENT_ACK,
};
use tether_types::TetherEvent;

use crate::dispatcher::EventSink;
use crate::naming::image_file_name_now;
use crate::reporter::ErrorReporter;

/// Reacts to object, state and property events of one camera.
pub(crate) struct EventRouter {
    camera: usize,
    device: DeviceHandle,
    download_dir: PathBuf,
    reporter: ErrorReporter,
    events: EventSink,
}

impl EventRouter {
    pub(crate) fn new(
        camera: usize,
        device: DeviceHandle,
        download_dir: PathBuf,
        reporter: ErrorReporter,
        events: EventSink,
    ) -> Self {
        Self {
            camera,
            device,
            download_dir,
            reporter,
            events,
        }
    }

    /// Register all three handlers for the camera.
    pub(crate) fn install(self: Arc<Self>, sdk: &dyn DeviceSdk) -> SdkResult<()> {
        let router = Arc::clone(&self);
        sdk.set_object_event_handler(
            self.device,
            Arc::new(move |sdk: &dyn DeviceSdk, event: ObjectEvent| router.on_object_event(sdk, event)),
        )?;

        let router = Arc::clone(&self);
        sdk.set_property_event_handler(
            self.device,
            Arc::new(move |sdk: &dyn DeviceSdk, event: PropertyEvent| router.on_property_event(sdk, event)),
        )?;

        let router = Arc::clone(&self);
        sdk.set_state_event_handler(
            self.device,
            Arc::new(move |sdk: &dyn DeviceSdk, event: StateEvent| router.on_state_event(sdk, event)),
        )?;

        debug!(camera = self.camera, "Event handlers installed");
        Ok(())
    }

    pub(crate) fn on_object_event(&self, sdk: &dyn DeviceSdk, event: ObjectEvent) -> u32 {
        match event {
            ObjectEvent::DirItemRequestTransfer(item) => match self.download_image(sdk, item) {
                Ok(path) => {
                    info!(camera = self.camera, path = %path.display(), "Image saved");
                    self.events.emit(TetherEvent::ImageSaved { path });
                }
                Err(e) => self
                    .reporter
                    .report(format!("Camera {}: image transfer failed: {e}", self.camera)),
            },
            other => trace!(camera = self.camera, event = ?other, "Object event ignored"),
        }
        EVENT_ACK
    }

    pub(crate) fn on_state_event(&self, sdk: &dyn DeviceSdk, event: StateEvent) -> u32 {
        match event {
            StateEvent::WillSoonShutDown { seconds } => {
                debug!(camera = self.camera, seconds, "Postponing auto power-off");
                // Already inside the pump on the device thread. Queueing the
                // command instead would put it behind the current iteration.
                if let Err(e) = sdk.send_command(self.device, CameraCommand::ExtendShutDownTimer) {
                    self.reporter.report(format!(
                        "Camera {}: failed to extend shutdown timer: {e}",
                        self.camera
                    ));
                }
            }
            StateEvent::Shutdown => warn!(camera = self.camera, "Camera reported shutdown"),
            other => trace!(camera = self.camera, event = ?other, "State event ignored"),
        }
        EVENT_ACK
    }

    pub(crate) fn on_property_event(&self, _sdk: &dyn DeviceSdk, event: PropertyEvent) -> u32 {
        trace!(camera = self.camera, ?event, "Property event");
        EVENT_ACK
    }

    /// Transfer `item` into a new file under the download directory.
    fn download_image(&self, sdk: &dyn DeviceSdk, item: ItemHandle) -> SdkResult<PathBuf> {
        let info = sdk.directory_item_info(item)?;
        let path = self.download_dir.join(image_file_name_now());
        debug!(
            camera = self.camera,
            source = %info.file_name,
            size = info.size,
            "Transferring image"
        );

        if let Err(e) = transfer_to_file(sdk, item, info.size, &path) {
            if let Err(cancel) = sdk.download_cancel(item) {
                warn!(camera = self.camera, error = %cancel, "Failed to cancel transfer");
            }
            if std::fs::remove_file(&path).is_ok() {
                debug!(path = %path.display(), "Removed partial image");
            }
            return Err(e);
        }
        Ok(path)
    }
}

fn transfer_to_file(sdk: &dyn DeviceSdk, item: ItemHandle, size: u64, path: &Path) -> SdkResult<()> {
    let stream = sdk.create_file_stream(path)?;
    let transferred = sdk.download(item, size, stream);
    let released = sdk.release(stream.into());
    transferred?;
    released?;
    sdk.download_complete(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{CallbackDispatcher, EventListener};
    use crate::testing::collecting_reporter;
    use bytes::Bytes;
    use parking_lot::{Mutex, RwLock};
    use std::time::Duration;
    use tether_sdk::{PropertyId, SimulatedSdk};

    struct Fixture {
        sdk: SimulatedSdk,
        device: DeviceHandle,
        router: EventRouter,
        dispatcher: CallbackDispatcher,
        messages: Arc<Mutex<Vec<String>>>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let sdk = SimulatedSdk::with_cameras(1);
        sdk.initialize().unwrap();
        let list = sdk.camera_list().unwrap();
        let device = sdk.child_at(list, 0).unwrap();
        sdk.release(list.into()).unwrap();
        sdk.open_session(device).unwrap();

        let (reporter, messages) = collecting_reporter();
        let dispatcher = CallbackDispatcher::new(reporter.clone());
        let dir = tempfile::tempdir().unwrap();
        let events = EventSink::new(Arc::new(RwLock::new(None)), dispatcher.queue());
        let router = EventRouter::new(0, device, dir.path().to_path_buf(), reporter, events);

        Fixture {
            sdk,
            device,
            router,
            dispatcher,
            messages,
            dir,
        }
    }

    #[test]
    fn test_transfer_request_saves_image() {
        let f = fixture();
        let item = f.sdk.add_item(Bytes::from_static(b"\xFF\xD8jpeg\xFF\xD9"), "IMG_0001.JPG");

        let ack = f
            .router
            .on_object_event(&f.sdk, ObjectEvent::DirItemRequestTransfer(item));

        assert_eq!(ack, EVENT_ACK);
        assert!(f.sdk.item_completed(item));
        assert!(f.messages.lock().is_empty());

        let saved: Vec<_> = std::fs::read_dir(f.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(saved.len(), 1);
        let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("IMG_") && name.ends_with(".jpg"));
        assert_eq!(std::fs::read(&saved[0]).unwrap(), b"\xFF\xD8jpeg\xFF\xD9");
        assert_eq!(f.sdk.live_object_count(), 2);
    }

    #[test]
    fn test_failed_transfer_is_cancelled_and_reported() {
        let f = fixture();
        let item = f.sdk.add_item(Bytes::from_static(b"data"), "IMG_0002.JPG");
        f.sdk.fail_on("download", 0x0000_0002);

        let ack = f
            .router
            .on_object_event(&f.sdk, ObjectEvent::DirItemRequestTransfer(item));

        assert_eq!(ack, EVENT_ACK);
        assert!(f.sdk.item_cancelled(item));
        assert!(!f.sdk.item_completed(item));
        assert_eq!(f.messages.lock().len(), 1);
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_other_object_events_are_acknowledged() {
        let f = fixture();
        let before = f.sdk.calls().len();

        let ack = f
            .router
            .on_object_event(&f.sdk, ObjectEvent::Other { code: 0x0204_0000 });

        assert_eq!(ack, EVENT_ACK);
        assert_eq!(f.sdk.calls().len(), before);
    }

    #[test]
    fn test_imminent_shutdown_is_postponed() {
        let f = fixture();

        let ack = f
            .router
            .on_state_event(&f.sdk, StateEvent::WillSoonShutDown { seconds: 30 });

        assert_eq!(ack, EVENT_ACK);
        assert_eq!(f.sdk.shutdown_extensions(f.device), 1);
    }

    #[test]
    fn test_shutdown_and_property_events_only_acknowledge() {
        let f = fixture();

        assert_eq!(f.router.on_state_event(&f.sdk, StateEvent::Shutdown), EVENT_ACK);
        assert_eq!(
            f.router.on_property_event(
                &f.sdk,
                PropertyEvent::PropertyChanged {
                    property: PropertyId::SaveTo,
                    param: 0,
                },
            ),
            EVENT_ACK
        );
        assert_eq!(f.sdk.shutdown_extensions(f.device), 0);
        assert!(f.messages.lock().is_empty());
    }

    #[test]
    fn test_installed_handlers_fire_on_pump() {
        let f = fixture();
        let (tx, rx) = crossbeam_channel::unbounded();
        let listener: EventListener = Arc::new(move |event: &TetherEvent| {
            let _ = tx.send(event.clone());
        });
        let router = Arc::new(EventRouter::new(
            0,
            f.device,
            f.dir.path().to_path_buf(),
            ErrorReporter::log_only(),
            EventSink::new(Arc::new(RwLock::new(Some(listener))), f.dispatcher.queue()),
        ));
        router.install(&f.sdk).unwrap();
        f.dispatcher.start().unwrap();

        f.sdk
            .queue_state_event(f.device, StateEvent::WillSoonShutDown { seconds: 5 });
        f.sdk
            .send_command(f.device, CameraCommand::TakePicture)
            .unwrap();
        f.sdk.pump_events();

        assert_eq!(f.sdk.shutdown_extensions(f.device), 1);
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            TetherEvent::ImageSaved { path } => assert!(path.exists()),
            other => panic!("unexpected event {other:?}"),
        }

        f.dispatcher.queue().shutdown();
        f.dispatcher.join();
    }

    #[test]
    fn test_pumped_property_and_created_events_have_no_side_effects() {
        let f = fixture();
        let (reporter, messages) = collecting_reporter();
        let router = Arc::new(EventRouter::new(
            0,
            f.device,
            f.dir.path().to_path_buf(),
            reporter,
            EventSink::new(Arc::new(RwLock::new(None)), f.dispatcher.queue()),
        ));
        router.install(&f.sdk).unwrap();
        let item = f.sdk.add_item(Bytes::from_static(b"data"), "IMG_0003.JPG");
        let native_calls = |sdk: &SimulatedSdk| {
            sdk.calls()
                .iter()
                .filter(|call| call.operation != "pump_events")
                .count()
        };
        let before = native_calls(&f.sdk);

        f.sdk.queue_property_event(
            f.device,
            PropertyEvent::PropertyChanged {
                property: PropertyId::EvfOutputDevice,
                param: 0,
            },
        );
        f.sdk
            .queue_object_event(f.device, ObjectEvent::DirItemCreated(item));
        f.sdk.pump_events();

        assert!(messages.lock().is_empty());
        assert!(f.messages.lock().is_empty());
        assert_eq!(native_calls(&f.sdk), before);
        assert!(!f.sdk.item_completed(item));
        assert!(!f.sdk.item_cancelled(item));
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
    }
}
