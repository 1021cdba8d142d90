//! Camera session state machine.
//!
//! [`CameraSession`] is the application-facing handle. Every operation is
//! queued onto the device executor and performed by [`SessionCore`], which
//! only ever runs on the device thread.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};

use tether_sdk::{
    CameraCommand, DeviceHandle, DeviceSdk, EvfImageHandle, LiveViewFrame, PropertyId, SdkError,
    StreamHandle, EVF_DEPTH_OF_FIELD_PREVIEW_OFF, EVF_OUTPUT_DEVICE_PC, SAVE_TO_HOST,
};
use tether_types::{EngineConfig, SessionState, StorageCapacity, TetherEvent};

use crate::dispatcher::EventSink;
use crate::error::{EngineError, EngineResult};
use crate::executor::DeviceExecutor;
use crate::reporter::ErrorReporter;
use crate::router::EventRouter;

/// Application sink for live view frames. Runs on the callback thread.
pub type FrameConsumer = Arc<dyn Fn(LiveViewFrame) + Send + Sync>;

struct LiveViewStream {
    stream: StreamHandle,
    image: EvfImageHandle,
    frames: u64,
}

struct SessionInner {
    device: Option<DeviceHandle>,
    state: SessionState,
    live_view: Option<LiveViewStream>,
}

/// Session state and the device-thread side of every operation.
pub(crate) struct SessionCore {
    id: usize,
    inner: Mutex<SessionInner>,
    consumer: RwLock<Option<FrameConsumer>>,
    events: EventSink,
    reporter: ErrorReporter,
    download_dir: PathBuf,
    capacity: StorageCapacity,
}

impl SessionCore {
    fn new(
        id: usize,
        device: DeviceHandle,
        config: &EngineConfig,
        reporter: ErrorReporter,
        events: EventSink,
    ) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                device: Some(device),
                state: SessionState::Disconnected,
                live_view: None,
            }),
            consumer: RwLock::new(None),
            events,
            reporter,
            download_dir: config.download_dir.clone(),
            capacity: config.storage_capacity,
        }
    }

    fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn transition_to(&self, inner: &mut SessionInner, new_state: SessionState) {
        let previous = inner.state;
        if previous == new_state {
            return;
        }
        inner.state = new_state;
        debug!(
            camera = self.id,
            previous = %previous,
            current = %new_state,
            "State transition"
        );
        self.events.emit(TetherEvent::StateChanged {
            camera: self.id,
            previous,
            current: new_state,
        });
    }

    fn device(&self, inner: &SessionInner, operation: &'static str) -> EngineResult<DeviceHandle> {
        inner.device.ok_or(EngineError::InvalidState {
            operation,
            state: inner.state,
        })
    }

    /// Open the session and put the camera in save-to-host mode.
    #[instrument(name = "session_connect", skip(self, sdk), fields(camera = self.id))]
    pub(crate) fn connect(&self, sdk: &dyn DeviceSdk) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Disconnected {
            debug!(state = %inner.state, "Connect ignored");
            return Ok(());
        }
        let device = self.device(&inner, "connect")?;

        self.transition_to(&mut inner, SessionState::Connecting);
        match self.open(sdk, device) {
            Ok(()) => {
                self.transition_to(&mut inner, SessionState::Connected);
                info!("Camera connected");
                Ok(())
            }
            Err(e) => {
                self.transition_to(&mut inner, SessionState::Disconnected);
                Err(e)
            }
        }
    }

    fn open(&self, sdk: &dyn DeviceSdk, device: DeviceHandle) -> EngineResult<()> {
        let router = Arc::new(EventRouter::new(
            self.id,
            device,
            self.download_dir.clone(),
            self.reporter.clone(),
            self.events.clone(),
        ));
        router.install(sdk)?;
        sdk.open_session(device)?;

        let configured = sdk
            .set_property(device, PropertyId::SaveTo, SAVE_TO_HOST)
            .and_then(|()| sdk.set_capacity(device, self.capacity));
        if let Err(e) = configured {
            if let Err(close) = sdk.close_session(device) {
                warn!(error = %close, "Failed to close session after connect failure");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Trigger a capture. The image arrives later as a transfer request.
    pub(crate) fn shoot(&self, sdk: &dyn DeviceSdk) -> EngineResult<()> {
        let inner = self.inner.lock();
        if !inner.state.can_shoot() {
            return Err(EngineError::InvalidState {
                operation: "shoot",
                state: inner.state,
            });
        }
        let device = self.device(&inner, "shoot")?;
        sdk.send_command(device, CameraCommand::TakePicture)?;
        info!(camera = self.id, "Capture triggered");
        Ok(())
    }

    /// Route the viewfinder to the host and allocate the frame buffers.
    #[instrument(name = "live_view_start", skip(self, sdk), fields(camera = self.id))]
    pub(crate) fn start_live_view(&self, sdk: &dyn DeviceSdk) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Connected => {}
            SessionState::LiveViewActive if inner.live_view.is_some() => {
                debug!("Live view already active, ignoring");
                return Ok(());
            }
            // A failed stop left the viewfinder on without buffers.
            SessionState::LiveViewActive => {}
            state => {
                return Err(EngineError::InvalidState {
                    operation: "start live view",
                    state,
                })
            }
        }
        let device = self.device(&inner, "start live view")?;

        let output = sdk.get_property(device, PropertyId::EvfOutputDevice)?;
        sdk.set_property(device, PropertyId::EvfOutputDevice, output | EVF_OUTPUT_DEVICE_PC)?;

        let buffers = sdk.create_memory_stream(0).and_then(|stream| {
            sdk.create_evf_image(stream)
                .map(|image| (stream, image))
                .inspect_err(|_| {
                    if let Err(e) = sdk.release(stream.into()) {
                        warn!(error = %e, "Failed to release live view stream");
                    }
                })
        });
        let (stream, image) = match buffers {
            Ok(buffers) => buffers,
            Err(e) => {
                if let Err(restore) = sdk.set_property(device, PropertyId::EvfOutputDevice, output) {
                    warn!(error = %restore, "Failed to restore live view output");
                }
                return Err(e.into());
            }
        };

        inner.live_view = Some(LiveViewStream {
            stream,
            image,
            frames: 0,
        });
        self.transition_to(&mut inner, SessionState::LiveViewActive);
        info!("Live view started");
        Ok(())
    }

    /// Pull one live view frame. `Ok(None)` means the camera had none ready.
    pub(crate) fn poll_live_view(&self, sdk: &dyn DeviceSdk) -> EngineResult<Option<LiveViewFrame>> {
        let mut inner = self.inner.lock();
        let device = self.device(&inner, "poll live view")?;
        let Some(live_view) = inner.live_view.as_mut() else {
            return Err(EngineError::LiveViewNotActive);
        };

        match sdk.download_evf_image(device, live_view.image) {
            Ok(()) => {}
            Err(SdkError::NotReady) => {
                trace!(camera = self.id, "Live view frame not ready");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let len = sdk.stream_length(live_view.stream)?;
        let pixels = sdk.read_stream(live_view.stream, len)?;
        let info = sdk.evf_image_info(live_view.image)?;
        live_view.frames += 1;

        Ok(Some(LiveViewFrame::new(
            pixels,
            info.width,
            info.height,
            live_view.frames,
        )))
    }

    fn deliver_frame(&self, frame: LiveViewFrame) {
        let consumer = self.consumer.read().clone();
        match consumer {
            Some(consumer) => consumer(frame),
            None => trace!(camera = self.id, sequence = frame.sequence, "No frame consumer"),
        }
    }

    /// Release the frame buffers and hand the viewfinder back to the camera.
    #[instrument(name = "live_view_stop", skip(self, sdk), fields(camera = self.id))]
    pub(crate) fn stop_live_view(&self, sdk: &dyn DeviceSdk) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::LiveViewActive {
            return Err(EngineError::InvalidState {
                operation: "stop live view",
                state: inner.state,
            });
        }
        let device = self.device(&inner, "stop live view")?;
        self.end_live_view(sdk, &mut inner, device)
    }

    fn end_live_view(
        &self,
        sdk: &dyn DeviceSdk,
        inner: &mut SessionInner,
        device: DeviceHandle,
    ) -> EngineResult<()> {
        let mut failure = None;

        // Taken before release so a queued poll finds nothing to touch.
        if let Some(live_view) = inner.live_view.take() {
            keep_first(&mut failure, sdk.release(live_view.image.into()));
            keep_first(&mut failure, sdk.release(live_view.stream.into()));
            debug!(frames = live_view.frames, "Live view buffers released");
        }

        keep_first(
            &mut failure,
            sdk.set_property(
                device,
                PropertyId::EvfDepthOfFieldPreview,
                EVF_DEPTH_OF_FIELD_PREVIEW_OFF,
            ),
        );
        keep_first(
            &mut failure,
            sdk.get_property(device, PropertyId::EvfOutputDevice)
                .and_then(|output| {
                    sdk.set_property(
                        device,
                        PropertyId::EvfOutputDevice,
                        output & !EVF_OUTPUT_DEVICE_PC,
                    )
                }),
        );

        match failure {
            None => {
                self.transition_to(inner, SessionState::Connected);
                info!(camera = self.id, "Live view stopped");
                Ok(())
            }
            // Stays active so a retried stop resets the viewfinder again.
            Some(e) => Err(e),
        }
    }

    /// Stop live view, close the session and release the device handle.
    #[instrument(name = "session_close", skip(self, sdk), fields(camera = self.id))]
    pub(crate) fn close(&self, sdk: &dyn DeviceSdk) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.is_closed() {
            debug!("Session already closed, ignoring");
            return Ok(());
        }

        let mut failure = None;
        if let Some(device) = inner.device {
            if inner.state.is_live_view() {
                if let Err(e) = self.end_live_view(sdk, &mut inner, device) {
                    failure.get_or_insert(e);
                }
            }
            if inner.state.is_connected() {
                keep_first(&mut failure, sdk.close_session(device));
            }
        }
        if let Some(device) = inner.device.take() {
            keep_first(&mut failure, sdk.release(device.into()));
        }

        self.transition_to(&mut inner, SessionState::Closed);
        info!("Camera closed");
        failure.map_or(Ok(()), Err)
    }
}

/// Remember the first failure of a multi-step teardown and log the rest.
fn keep_first(slot: &mut Option<EngineError>, result: Result<(), SdkError>) {
    if let Err(e) = result {
        match slot {
            None => *slot = Some(e.into()),
            Some(_) => warn!(error = %e, "Additional teardown failure"),
        }
    }
}

/// One enumerated camera.
///
/// Methods queue work on the device thread and return immediately. Failures
/// go to the error hook. [`state`](Self::state) may lag behind queued work.
pub struct CameraSession {
    core: Arc<SessionCore>,
    executor: Arc<DeviceExecutor>,
}

impl CameraSession {
    pub(crate) fn new(
        id: usize,
        device: DeviceHandle,
        executor: Arc<DeviceExecutor>,
        config: &EngineConfig,
        reporter: ErrorReporter,
        events: EventSink,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore::new(id, device, config, reporter, events)),
            executor,
        }
    }

    /// Identity of this camera within its enumeration.
    pub fn id(&self) -> usize {
        self.core.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Install the live view frame consumer, replacing any previous one.
    pub fn set_frame_consumer(&self, consumer: impl Fn(LiveViewFrame) + Send + Sync + 'static) {
        *self.core.consumer.write() = Some(Arc::new(consumer));
    }

    pub fn clear_frame_consumer(&self) {
        self.core.consumer.write().take();
    }

    /// Open the session. A no-op unless disconnected.
    pub fn connect(&self) -> EngineResult<()> {
        let core = Arc::clone(&self.core);
        self.executor
            .submit("connect", move |sdk: &dyn DeviceSdk| core.connect(sdk))
    }

    /// Trigger a capture.
    pub fn shoot(&self) -> EngineResult<()> {
        let core = Arc::clone(&self.core);
        self.executor
            .submit("shoot", move |sdk: &dyn DeviceSdk| core.shoot(sdk))
    }

    pub fn start_live_view(&self) -> EngineResult<()> {
        let core = Arc::clone(&self.core);
        self.executor
            .submit("start live view", move |sdk: &dyn DeviceSdk| core.start_live_view(sdk))
    }

    /// Fetch one frame and pass it to the consumer on the callback thread.
    ///
    /// Intended to be called from a fixed-rate timer. A frame the camera
    /// has not produced yet is skipped silently.
    pub fn poll_live_view(&self) -> EngineResult<()> {
        let core = Arc::clone(&self.core);
        let consumer = Arc::clone(&self.core);
        self.executor.submit_then(
            "live view poll",
            move |sdk: &dyn DeviceSdk| core.poll_live_view(sdk),
            move |frame: Option<LiveViewFrame>| {
                if let Some(frame) = frame {
                    consumer.deliver_frame(frame);
                }
            },
        )
    }

    pub fn stop_live_view(&self) -> EngineResult<()> {
        let core = Arc::clone(&self.core);
        self.executor
            .submit("stop live view", move |sdk: &dyn DeviceSdk| core.stop_live_view(sdk))
    }

    /// Close the session and release the camera. Closing twice is a no-op.
    pub fn close(&self) -> EngineResult<()> {
        let core = Arc::clone(&self.core);
        self.executor
            .submit("close", move |sdk: &dyn DeviceSdk| core.close(sdk))
    }

    pub(crate) fn core(&self) -> Arc<SessionCore> {
        Arc::clone(&self.core)
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if self.state().is_closed() || !self.executor.is_running() {
            return;
        }
        if self.close().is_err() {
            warn!(camera = self.core.id, "Executor gone, camera left open");
        }
    }
}
