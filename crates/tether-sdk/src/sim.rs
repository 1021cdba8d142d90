//! In-process simulated camera.
//!
//! [`SimulatedSdk`] keeps every native object in a table, records each call
//! together with the thread that made it, counts any use of a released
//! handle, and can be told to fail individual operations. Captures queue a
//! transfer request that is delivered on the next [`DeviceSdk::pump_events`],
//! the same way a real camera reports a finished exposure.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use tether_types::StorageCapacity;

use crate::error::SdkError;
use crate::event::{
    CameraCommand, ObjectEvent, PropertyEvent, PropertyId, StateEvent, EVENT_ACK,
    EVF_OUTPUT_DEVICE_PC,
};
use crate::handle::{DeviceHandle, EvfImageHandle, ItemHandle, ListHandle, ObjectRef, StreamHandle};
use crate::{
    DeviceSdk, DirectoryItemInfo, EvfImageInfo, ObjectEventHandler, PropertyEventHandler,
    SdkResult, StateEventHandler,
};

const ERR_INVALID_PARAMETER: u32 = 0x0000_0060;
const ERR_SESSION_NOT_OPEN: u32 = 0x0000_2003;

/// Description of one simulated camera.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    /// Model name.
    pub name: String,

    /// Live view width in pixels.
    pub frame_width: u32,

    /// Live view height in pixels.
    pub frame_height: u32,
}

impl SimulatedCamera {
    /// A camera with a 960x640 live view.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frame_width: 960,
            frame_height: 640,
        }
    }
}

/// A recorded native call.
#[derive(Debug, Clone)]
pub struct SimCall {
    /// Name of the trait method.
    pub operation: &'static str,

    /// Thread the call was made on.
    pub thread: ThreadId,
}

#[derive(Default, Clone)]
struct DeviceHandlers {
    object: Option<ObjectEventHandler>,
    state: Option<StateEventHandler>,
    property: Option<PropertyEventHandler>,
}

struct SimDevice {
    camera: SimulatedCamera,
    session_open: bool,
    /// Property values keyed by native property identifier.
    properties: HashMap<u32, u32>,
    capacity: Option<StorageCapacity>,
    handlers: DeviceHandlers,
    shutdown_extensions: u32,
    shots: u32,
    evf_not_ready: u32,
    frames: u64,
}

impl SimDevice {
    fn new(camera: SimulatedCamera) -> Self {
        Self {
            camera,
            session_open: false,
            properties: HashMap::new(),
            capacity: None,
            handlers: DeviceHandlers::default(),
            shutdown_extensions: 0,
            shots: 0,
            evf_not_ready: 0,
            frames: 0,
        }
    }

    fn require_session(&self, operation: &'static str) -> SdkResult<()> {
        if self.session_open {
            Ok(())
        } else {
            Err(SdkError::from_code(operation, ERR_SESSION_NOT_OPEN))
        }
    }
}

struct SimItem {
    data: Bytes,
    file_name: String,
    completed: bool,
    cancelled: bool,
}

enum SimStream {
    File { path: PathBuf, file: Option<File> },
    Memory(Vec<u8>),
}

struct SimEvfImage {
    stream: StreamHandle,
    info: Option<EvfImageInfo>,
}

enum SimObject {
    List(Vec<DeviceHandle>),
    Device(SimDevice),
    Item(SimItem),
    Stream(SimStream),
    EvfImage(SimEvfImage),
}

/// An event in the raw form the native layer raises it.
enum PendingEvent {
    Object { code: u32, object: ItemHandle },
    State { code: u32, parameter: u32 },
    Property { code: u32, property: u32, param: u32 },
}

impl From<ObjectEvent> for PendingEvent {
    fn from(event: ObjectEvent) -> Self {
        let (code, object) = event.into_raw();
        Self::Object { code, object }
    }
}

impl From<StateEvent> for PendingEvent {
    fn from(event: StateEvent) -> Self {
        let (code, parameter) = event.into_raw();
        Self::State { code, parameter }
    }
}

impl From<PropertyEvent> for PendingEvent {
    fn from(event: PropertyEvent) -> Self {
        let (code, property, param) = event.into_raw();
        Self::Property {
            code,
            property,
            param,
        }
    }
}

#[derive(Default)]
struct SimState {
    cameras: Vec<SimulatedCamera>,
    initialized: bool,
    init_count: u32,
    terminate_count: u32,
    next_handle: u64,
    objects: HashMap<u64, SimObject>,
    released: HashSet<u64>,
    released_access: usize,
    pending: VecDeque<(DeviceHandle, PendingEvent)>,
    calls: Vec<SimCall>,
    failures: HashMap<&'static str, u32>,
}

impl SimState {
    fn allocate(&mut self, object: SimObject) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.objects.insert(raw, object);
        raw
    }

    fn object_mut(&mut self, raw: u64) -> SdkResult<&mut SimObject> {
        if self.released.contains(&raw) {
            self.released_access += 1;
            return Err(SdkError::InvalidHandle(raw));
        }
        self.objects
            .get_mut(&raw)
            .ok_or(SdkError::InvalidHandle(raw))
    }

    fn list_mut(&mut self, list: ListHandle) -> SdkResult<&mut Vec<DeviceHandle>> {
        match self.object_mut(list.0)? {
            SimObject::List(devices) => Ok(devices),
            _ => Err(SdkError::InvalidHandle(list.0)),
        }
    }

    fn device_mut(&mut self, device: DeviceHandle) -> SdkResult<&mut SimDevice> {
        match self.object_mut(device.0)? {
            SimObject::Device(dev) => Ok(dev),
            _ => Err(SdkError::InvalidHandle(device.0)),
        }
    }

    fn item_mut(&mut self, item: ItemHandle) -> SdkResult<&mut SimItem> {
        match self.object_mut(item.0)? {
            SimObject::Item(it) => Ok(it),
            _ => Err(SdkError::InvalidHandle(item.0)),
        }
    }

    fn stream_mut(&mut self, stream: StreamHandle) -> SdkResult<&mut SimStream> {
        match self.object_mut(stream.0)? {
            SimObject::Stream(s) => Ok(s),
            _ => Err(SdkError::InvalidHandle(stream.0)),
        }
    }

    fn evf_mut(&mut self, image: EvfImageHandle) -> SdkResult<&mut SimEvfImage> {
        match self.object_mut(image.0)? {
            SimObject::EvfImage(evf) => Ok(evf),
            _ => Err(SdkError::InvalidHandle(image.0)),
        }
    }

    fn device(&self, device: DeviceHandle) -> Option<&SimDevice> {
        match self.objects.get(&device.0) {
            Some(SimObject::Device(dev)) => Some(dev),
            _ => None,
        }
    }

    fn item(&self, item: ItemHandle) -> Option<&SimItem> {
        match self.objects.get(&item.0) {
            Some(SimObject::Item(it)) => Some(it),
            _ => None,
        }
    }
}

/// Build a small JPEG-framed payload whose body encodes `seed`.
fn synthetic_jpeg(seed: u64, body_len: usize) -> Bytes {
    let mut data = Vec::with_capacity(body_len + 4);
    data.extend_from_slice(&[0xFF, 0xD8]);
    data.extend_from_slice(&seed.to_le_bytes());
    data.resize(body_len.max(data.len()), 0x5A);
    data.extend_from_slice(&[0xFF, 0xD9]);
    Bytes::from(data)
}

/// An in-process camera library.
pub struct SimulatedSdk {
    state: Mutex<SimState>,
}

impl SimulatedSdk {
    /// Create a simulated library with the given attached cameras.
    pub fn new(cameras: Vec<SimulatedCamera>) -> Self {
        Self {
            state: Mutex::new(SimState {
                cameras,
                ..SimState::default()
            }),
        }
    }

    /// Create a simulated library with `count` identical cameras attached.
    pub fn with_cameras(count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|i| SimulatedCamera::new(format!("Simulated EOS {i}")))
                .collect(),
        )
    }

    fn enter(&self, operation: &'static str) -> SdkResult<MutexGuard<'_, SimState>> {
        let mut state = self.state.lock();
        state.calls.push(SimCall {
            operation,
            thread: thread::current().id(),
        });
        if let Some(&code) = state.failures.get(operation) {
            return Err(SdkError::from_code(operation, code));
        }
        if !state.initialized && operation != "initialize" {
            return Err(SdkError::NotInitialized);
        }
        Ok(state)
    }

    /// Make every later call to `operation` fail with `code`.
    pub fn fail_on(&self, operation: &'static str, code: u32) {
        self.state.lock().failures.insert(operation, code);
    }

    /// Stop failing `operation`.
    pub fn clear_failure(&self, operation: &'static str) {
        self.state.lock().failures.remove(operation);
    }

    /// Every native call made so far.
    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made to `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Distinct threads that have called into the library.
    pub fn calling_threads(&self) -> HashSet<ThreadId> {
        self.state.lock().calls.iter().map(|call| call.thread).collect()
    }

    /// Number of calls that passed an already released handle.
    pub fn released_access_count(&self) -> usize {
        self.state.lock().released_access
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn init_count(&self) -> u32 {
        self.state.lock().init_count
    }

    pub fn terminate_count(&self) -> u32 {
        self.state.lock().terminate_count
    }

    pub fn is_released(&self, object: impl Into<ObjectRef>) -> bool {
        self.state.lock().released.contains(&object.into().raw())
    }

    /// Number of allocated objects that have not been released.
    pub fn live_object_count(&self) -> usize {
        let state = self.state.lock();
        state
            .objects
            .keys()
            .filter(|raw| !state.released.contains(raw))
            .count()
    }

    pub fn session_open(&self, device: DeviceHandle) -> bool {
        self.state
            .lock()
            .device(device)
            .is_some_and(|dev| dev.session_open)
    }

    pub fn property(&self, device: DeviceHandle, property: PropertyId) -> Option<u32> {
        self.state
            .lock()
            .device(device)
            .and_then(|dev| dev.properties.get(&property.code()).copied())
    }

    pub fn capacity(&self, device: DeviceHandle) -> Option<StorageCapacity> {
        self.state.lock().device(device).and_then(|dev| dev.capacity)
    }

    /// How many times the power-off timer was postponed.
    pub fn shutdown_extensions(&self, device: DeviceHandle) -> u32 {
        self.state
            .lock()
            .device(device)
            .map_or(0, |dev| dev.shutdown_extensions)
    }

    /// Answer the next `polls` live view downloads with "not ready".
    pub fn set_evf_not_ready(&self, device: DeviceHandle, polls: u32) {
        if let Some(SimObject::Device(dev)) = self.state.lock().objects.get_mut(&device.0) {
            dev.evf_not_ready = polls;
        }
    }

    /// Put an item on the simulated card, as if a capture had just finished.
    pub fn add_item(&self, data: Bytes, file_name: impl Into<String>) -> ItemHandle {
        let item = SimItem {
            data,
            file_name: file_name.into(),
            completed: false,
            cancelled: false,
        };
        ItemHandle(self.state.lock().allocate(SimObject::Item(item)))
    }

    pub fn item_completed(&self, item: ItemHandle) -> bool {
        self.state.lock().item(item).is_some_and(|it| it.completed)
    }

    pub fn item_cancelled(&self, item: ItemHandle) -> bool {
        self.state.lock().item(item).is_some_and(|it| it.cancelled)
    }

    pub fn queue_object_event(&self, device: DeviceHandle, event: ObjectEvent) {
        self.state
            .lock()
            .pending
            .push_back((device, event.into()));
    }

    pub fn queue_state_event(&self, device: DeviceHandle, event: StateEvent) {
        self.state
            .lock()
            .pending
            .push_back((device, event.into()));
    }

    pub fn queue_property_event(&self, device: DeviceHandle, event: PropertyEvent) {
        self.state
            .lock()
            .pending
            .push_back((device, event.into()));
    }
}

impl DeviceSdk for SimulatedSdk {
    fn initialize(&self) -> SdkResult<()> {
        let mut state = self.enter("initialize")?;
        state.initialized = true;
        state.init_count += 1;
        debug!(cameras = state.cameras.len(), "Simulated SDK initialized");
        Ok(())
    }

    fn terminate(&self) -> SdkResult<()> {
        let mut state = self.enter("terminate")?;
        state.initialized = false;
        state.terminate_count += 1;
        debug!("Simulated SDK terminated");
        Ok(())
    }

    fn camera_list(&self) -> SdkResult<ListHandle> {
        let mut state = self.enter("camera_list")?;
        let cameras = state.cameras.clone();
        let devices = cameras
            .into_iter()
            .map(|camera| DeviceHandle(state.allocate(SimObject::Device(SimDevice::new(camera)))))
            .collect();
        Ok(ListHandle(state.allocate(SimObject::List(devices))))
    }

    fn child_count(&self, list: ListHandle) -> SdkResult<u32> {
        let mut state = self.enter("child_count")?;
        Ok(state.list_mut(list)?.len() as u32)
    }

    fn child_at(&self, list: ListHandle, index: u32) -> SdkResult<DeviceHandle> {
        let mut state = self.enter("child_at")?;
        state
            .list_mut(list)?
            .get(index as usize)
            .copied()
            .ok_or(SdkError::from_code("child_at", ERR_INVALID_PARAMETER))
    }

    fn release(&self, object: ObjectRef) -> SdkResult<()> {
        let mut state = self.enter("release")?;
        let raw = object.raw();
        if let SimObject::Stream(SimStream::File { file, .. }) = state.object_mut(raw)? {
            file.take();
        }
        state.released.insert(raw);
        trace!(?object, "Released");
        Ok(())
    }

    fn set_object_event_handler(
        &self,
        device: DeviceHandle,
        handler: ObjectEventHandler,
    ) -> SdkResult<()> {
        let mut state = self.enter("set_object_event_handler")?;
        state.device_mut(device)?.handlers.object = Some(handler);
        Ok(())
    }

    fn set_property_event_handler(
        &self,
        device: DeviceHandle,
        handler: PropertyEventHandler,
    ) -> SdkResult<()> {
        let mut state = self.enter("set_property_event_handler")?;
        state.device_mut(device)?.handlers.property = Some(handler);
        Ok(())
    }

    fn set_state_event_handler(
        &self,
        device: DeviceHandle,
        handler: StateEventHandler,
    ) -> SdkResult<()> {
        let mut state = self.enter("set_state_event_handler")?;
        state.device_mut(device)?.handlers.state = Some(handler);
        Ok(())
    }

    fn open_session(&self, device: DeviceHandle) -> SdkResult<()> {
        let mut state = self.enter("open_session")?;
        state.device_mut(device)?.session_open = true;
        Ok(())
    }

    fn close_session(&self, device: DeviceHandle) -> SdkResult<()> {
        let mut state = self.enter("close_session")?;
        let dev = state.device_mut(device)?;
        dev.require_session("close_session")?;
        dev.session_open = false;
        Ok(())
    }

    fn get_property(&self, device: DeviceHandle, property: PropertyId) -> SdkResult<u32> {
        let mut state = self.enter("get_property")?;
        let dev = state.device_mut(device)?;
        dev.require_session("get_property")?;
        Ok(dev.properties.get(&property.code()).copied().unwrap_or(0))
    }

    fn set_property(
        &self,
        device: DeviceHandle,
        property: PropertyId,
        value: u32,
    ) -> SdkResult<()> {
        let mut state = self.enter("set_property")?;
        let dev = state.device_mut(device)?;
        dev.require_session("set_property")?;
        dev.properties.insert(property.code(), value);
        Ok(())
    }

    fn set_capacity(&self, device: DeviceHandle, capacity: StorageCapacity) -> SdkResult<()> {
        let mut state = self.enter("set_capacity")?;
        let dev = state.device_mut(device)?;
        dev.require_session("set_capacity")?;
        dev.capacity = Some(capacity);
        Ok(())
    }

    fn send_command(&self, device: DeviceHandle, command: CameraCommand) -> SdkResult<()> {
        let mut state = self.enter("send_command")?;
        let shot = {
            let dev = state.device_mut(device)?;
            dev.require_session("send_command")?;
            trace!(?device, code = command.code(), "Command received");
            match command {
                CameraCommand::ExtendShutDownTimer => {
                    dev.shutdown_extensions += 1;
                    return Ok(());
                }
                CameraCommand::TakePicture => {
                    dev.shots += 1;
                    dev.shots
                }
            }
        };

        let item = SimItem {
            data: synthetic_jpeg(u64::from(shot), 4096),
            file_name: format!("IMG_{shot:04}.JPG"),
            completed: false,
            cancelled: false,
        };
        let item = ItemHandle(state.allocate(SimObject::Item(item)));
        state.pending.push_back((
            device,
            ObjectEvent::DirItemRequestTransfer(item).into(),
        ));
        Ok(())
    }

    fn directory_item_info(&self, item: ItemHandle) -> SdkResult<DirectoryItemInfo> {
        let mut state = self.enter("directory_item_info")?;
        let it = state.item_mut(item)?;
        Ok(DirectoryItemInfo {
            size: it.data.len() as u64,
            file_name: it.file_name.clone(),
        })
    }

    fn create_file_stream(&self, path: &Path) -> SdkResult<StreamHandle> {
        let mut state = self.enter("create_file_stream")?;
        let file = File::create(path)?;
        let stream = SimStream::File {
            path: path.to_path_buf(),
            file: Some(file),
        };
        Ok(StreamHandle(state.allocate(SimObject::Stream(stream))))
    }

    fn create_memory_stream(&self, capacity: u64) -> SdkResult<StreamHandle> {
        let mut state = self.enter("create_memory_stream")?;
        let stream = SimStream::Memory(Vec::with_capacity(capacity as usize));
        Ok(StreamHandle(state.allocate(SimObject::Stream(stream))))
    }

    fn download(&self, item: ItemHandle, size: u64, stream: StreamHandle) -> SdkResult<()> {
        let mut state = self.enter("download")?;
        let data = state.item_mut(item)?.data.clone();
        let len = (size as usize).min(data.len());
        match state.stream_mut(stream)? {
            SimStream::File {
                file: Some(file),
                path,
            } => {
                file.write_all(&data[..len])?;
                trace!(path = %path.display(), len, "Downloaded to file");
            }
            SimStream::File { file: None, .. } => return Err(SdkError::InvalidHandle(stream.0)),
            SimStream::Memory(buf) => {
                buf.clear();
                buf.extend_from_slice(&data[..len]);
            }
        }
        Ok(())
    }

    fn download_complete(&self, item: ItemHandle) -> SdkResult<()> {
        let mut state = self.enter("download_complete")?;
        state.item_mut(item)?.completed = true;
        Ok(())
    }

    fn download_cancel(&self, item: ItemHandle) -> SdkResult<()> {
        let mut state = self.enter("download_cancel")?;
        state.item_mut(item)?.cancelled = true;
        Ok(())
    }

    fn create_evf_image(&self, stream: StreamHandle) -> SdkResult<EvfImageHandle> {
        let mut state = self.enter("create_evf_image")?;
        if !matches!(state.stream_mut(stream)?, SimStream::Memory(_)) {
            return Err(SdkError::from_code("create_evf_image", ERR_INVALID_PARAMETER));
        }
        let evf = SimEvfImage { stream, info: None };
        Ok(EvfImageHandle(state.allocate(SimObject::EvfImage(evf))))
    }

    fn download_evf_image(&self, device: DeviceHandle, image: EvfImageHandle) -> SdkResult<()> {
        let mut state = self.enter("download_evf_image")?;
        let (frame, info) = {
            let dev = state.device_mut(device)?;
            dev.require_session("download_evf_image")?;
            let output = dev
                .properties
                .get(&PropertyId::EvfOutputDevice.code())
                .copied()
                .unwrap_or(0);
            if output & EVF_OUTPUT_DEVICE_PC == 0 || dev.evf_not_ready > 0 {
                dev.evf_not_ready = dev.evf_not_ready.saturating_sub(1);
                return Err(SdkError::NotReady);
            }
            dev.frames += 1;
            let info = EvfImageInfo {
                width: dev.camera.frame_width,
                height: dev.camera.frame_height,
            };
            (synthetic_jpeg(dev.frames, 1024), info)
        };

        let stream = {
            let evf = state.evf_mut(image)?;
            evf.info = Some(info);
            evf.stream
        };
        match state.stream_mut(stream)? {
            SimStream::Memory(buf) => {
                buf.clear();
                buf.extend_from_slice(&frame);
                Ok(())
            }
            SimStream::File { .. } => Err(SdkError::InvalidHandle(stream.0)),
        }
    }

    fn evf_image_info(&self, image: EvfImageHandle) -> SdkResult<EvfImageInfo> {
        let mut state = self.enter("evf_image_info")?;
        state.evf_mut(image)?.info.ok_or(SdkError::NotReady)
    }

    fn stream_length(&self, stream: StreamHandle) -> SdkResult<u64> {
        let mut state = self.enter("stream_length")?;
        match state.stream_mut(stream)? {
            SimStream::Memory(buf) => Ok(buf.len() as u64),
            SimStream::File {
                file: Some(file), ..
            } => Ok(file.metadata()?.len()),
            SimStream::File { file: None, .. } => Err(SdkError::InvalidHandle(stream.0)),
        }
    }

    fn read_stream(&self, stream: StreamHandle, len: u64) -> SdkResult<Bytes> {
        let mut state = self.enter("read_stream")?;
        match state.stream_mut(stream)? {
            SimStream::Memory(buf) => {
                let len = (len as usize).min(buf.len());
                Ok(Bytes::copy_from_slice(&buf[..len]))
            }
            SimStream::File { .. } => Err(SdkError::from_code("read_stream", ERR_INVALID_PARAMETER)),
        }
    }

    fn pump_events(&self) {
        let initialized = self.enter("pump_events").is_ok();
        if !initialized {
            return;
        }

        let sdk: &dyn DeviceSdk = self;
        loop {
            let (device, event, handlers) = {
                let mut state = self.state.lock();
                let Some((device, event)) = state.pending.pop_front() else {
                    break;
                };
                let handlers = match state.device(device) {
                    Some(dev) if !state.released.contains(&device.0) => dev.handlers.clone(),
                    _ => {
                        trace!(?device, "Dropping event for released device");
                        continue;
                    }
                };
                (device, event, handlers)
            };

            // Handlers run without the state lock so they can call back in.
            let ack = match event {
                PendingEvent::Object { code, object } => handlers
                    .object
                    .map(|h| h(sdk, ObjectEvent::from_raw(code, object))),
                PendingEvent::State { code, parameter } => handlers
                    .state
                    .map(|h| h(sdk, StateEvent::from_raw(code, parameter))),
                PendingEvent::Property {
                    code,
                    property,
                    param,
                } => handlers
                    .property
                    .map(|h| h(sdk, PropertyEvent::from_raw(code, property, param))),
            };
            if let Some(ack) = ack.filter(|&ack| ack != EVENT_ACK) {
                debug!(?device, ack, "Handler returned non-zero acknowledgement");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn connected(sdk: &SimulatedSdk) -> DeviceHandle {
        sdk.initialize().unwrap();
        let list = sdk.camera_list().unwrap();
        let device = sdk.child_at(list, 0).unwrap();
        sdk.release(list.into()).unwrap();
        sdk.open_session(device).unwrap();
        device
    }

    #[test]
    fn test_calls_require_initialize() {
        let sdk = SimulatedSdk::with_cameras(1);
        assert!(matches!(sdk.camera_list(), Err(SdkError::NotInitialized)));
        sdk.initialize().unwrap();
        assert!(sdk.camera_list().is_ok());
    }

    #[test]
    fn test_enumeration_survives_list_release() {
        let sdk = SimulatedSdk::with_cameras(2);
        sdk.initialize().unwrap();
        let list = sdk.camera_list().unwrap();
        assert_eq!(sdk.child_count(list).unwrap(), 2);
        let second = sdk.child_at(list, 1).unwrap();
        assert!(sdk.child_at(list, 2).is_err());
        sdk.release(list.into()).unwrap();

        sdk.open_session(second).unwrap();
        assert!(sdk.session_open(second));
        assert_eq!(sdk.released_access_count(), 0);
    }

    #[test]
    fn test_released_handle_is_rejected_and_counted() {
        let sdk = SimulatedSdk::with_cameras(1);
        sdk.initialize().unwrap();
        let stream = sdk.create_memory_stream(0).unwrap();
        sdk.release(stream.into()).unwrap();

        assert!(matches!(
            sdk.stream_length(stream),
            Err(SdkError::InvalidHandle(_))
        ));
        assert!(sdk.release(stream.into()).is_err());
        assert_eq!(sdk.released_access_count(), 2);
        assert!(sdk.is_released(stream));
    }

    #[test]
    fn test_injected_failure() {
        let sdk = SimulatedSdk::with_cameras(1);
        let device = connected(&sdk);
        sdk.fail_on("send_command", 0x8D01);
        assert!(matches!(
            sdk.send_command(device, CameraCommand::TakePicture),
            Err(SdkError::Native { code: 0x8D01, .. })
        ));
        sdk.clear_failure("send_command");
        assert!(sdk.send_command(device, CameraCommand::TakePicture).is_ok());
    }

    #[test]
    fn test_capture_is_delivered_on_pump() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = SimulatedSdk::with_cameras(1);
        let device = connected(&sdk);
        let target = dir.path().join("shot.jpg");
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&delivered);
        let path = target.clone();
        sdk.set_object_event_handler(
            device,
            Arc::new(move |sdk: &dyn DeviceSdk, event: ObjectEvent| {
                if let ObjectEvent::DirItemRequestTransfer(item) = event {
                    let info = sdk.directory_item_info(item).unwrap();
                    let stream = sdk.create_file_stream(&path).unwrap();
                    sdk.download(item, info.size, stream).unwrap();
                    sdk.download_complete(item).unwrap();
                    sdk.release(stream.into()).unwrap();
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                EVENT_ACK
            }),
        )
        .unwrap();

        sdk.send_command(device, CameraCommand::TakePicture).unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        sdk.pump_events();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        let written = std::fs::read(&target).unwrap();
        assert_eq!(written.len(), 4096 + 2);
        assert_eq!(&written[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_live_view_requires_host_output() {
        let sdk = SimulatedSdk::with_cameras(1);
        let device = connected(&sdk);
        let stream = sdk.create_memory_stream(0).unwrap();
        let image = sdk.create_evf_image(stream).unwrap();

        assert!(matches!(
            sdk.download_evf_image(device, image),
            Err(SdkError::NotReady)
        ));

        sdk.set_property(device, PropertyId::EvfOutputDevice, EVF_OUTPUT_DEVICE_PC)
            .unwrap();
        sdk.download_evf_image(device, image).unwrap();
        let len = sdk.stream_length(stream).unwrap();
        let bytes = sdk.read_stream(stream, len).unwrap();
        assert_eq!(bytes.len() as u64, len);
        assert_eq!(
            sdk.evf_image_info(image).unwrap(),
            EvfImageInfo {
                width: 960,
                height: 640
            }
        );
    }
}
