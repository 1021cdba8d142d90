//! Native camera SDK contract.
//!
//! This crate describes the synchronous operations the tethering engine
//! needs from a vendor camera library, plus [`SimulatedSdk`], an in-process
//! camera that honours the same contract.
//!
//! Implementations are not required to be callable from more than one
//! thread. The engine only ever calls them from its device thread, and
//! registered event handlers are invoked on that same thread from inside
//! [`DeviceSdk::pump_events`].

mod error;
mod event;
mod frame;
mod handle;
mod sim;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tether_types::StorageCapacity;

pub use error::{SdkError, ERR_OBJECT_NOTREADY};
pub use event::{
    CameraCommand, ObjectEvent, PropertyEvent, PropertyId, StateEvent, EVENT_ACK,
    EVF_DEPTH_OF_FIELD_PREVIEW_OFF, EVF_OUTPUT_DEVICE_PC, SAVE_TO_HOST,
};
pub use frame::LiveViewFrame;
pub use handle::{DeviceHandle, EvfImageHandle, ItemHandle, ListHandle, ObjectRef, StreamHandle};
pub use sim::{SimCall, SimulatedCamera, SimulatedSdk};

/// Result type for native SDK calls.
pub type SdkResult<T> = Result<T, SdkError>;

/// Handler for object events. Returns [`EVENT_ACK`].
pub type ObjectEventHandler = Arc<dyn Fn(&dyn DeviceSdk, ObjectEvent) -> u32 + Send + Sync>;

/// Handler for camera state events. Returns [`EVENT_ACK`].
pub type StateEventHandler = Arc<dyn Fn(&dyn DeviceSdk, StateEvent) -> u32 + Send + Sync>;

/// Handler for property events. Returns [`EVENT_ACK`].
pub type PropertyEventHandler = Arc<dyn Fn(&dyn DeviceSdk, PropertyEvent) -> u32 + Send + Sync>;

/// Metadata of an item stored on the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryItemInfo {
    /// Size in bytes.
    pub size: u64,

    /// File name on the camera card.
    pub file_name: String,
}

/// Geometry of a downloaded live view image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvfImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Synchronous vendor camera library operations.
///
/// Every call may block. Released handles must never be passed back in.
pub trait DeviceSdk: Send + Sync {
    /// Load the vendor runtime.
    fn initialize(&self) -> SdkResult<()>;

    /// Unload the vendor runtime.
    fn terminate(&self) -> SdkResult<()>;

    /// Snapshot the attached cameras.
    fn camera_list(&self) -> SdkResult<ListHandle>;

    /// Number of cameras in a list.
    fn child_count(&self, list: ListHandle) -> SdkResult<u32>;

    /// Camera at `index` in a list. The returned handle outlives the list.
    fn child_at(&self, list: ListHandle, index: u32) -> SdkResult<DeviceHandle>;

    /// Release any native object.
    fn release(&self, object: ObjectRef) -> SdkResult<()>;

    fn set_object_event_handler(
        &self,
        device: DeviceHandle,
        handler: ObjectEventHandler,
    ) -> SdkResult<()>;

    fn set_property_event_handler(
        &self,
        device: DeviceHandle,
        handler: PropertyEventHandler,
    ) -> SdkResult<()>;

    fn set_state_event_handler(
        &self,
        device: DeviceHandle,
        handler: StateEventHandler,
    ) -> SdkResult<()>;

    fn open_session(&self, device: DeviceHandle) -> SdkResult<()>;

    fn close_session(&self, device: DeviceHandle) -> SdkResult<()>;

    fn get_property(&self, device: DeviceHandle, property: PropertyId) -> SdkResult<u32>;

    fn set_property(&self, device: DeviceHandle, property: PropertyId, value: u32)
        -> SdkResult<()>;

    /// Announce host storage capacity for images saved to the host.
    fn set_capacity(&self, device: DeviceHandle, capacity: StorageCapacity) -> SdkResult<()>;

    fn send_command(&self, device: DeviceHandle, command: CameraCommand) -> SdkResult<()>;

    fn directory_item_info(&self, item: ItemHandle) -> SdkResult<DirectoryItemInfo>;

    /// Create (or truncate) a file on the host to receive a transfer.
    fn create_file_stream(&self, path: &Path) -> SdkResult<StreamHandle>;

    /// Create a growable in-memory stream.
    fn create_memory_stream(&self, capacity: u64) -> SdkResult<StreamHandle>;

    /// Transfer `size` bytes of `item` into `stream`.
    fn download(&self, item: ItemHandle, size: u64, stream: StreamHandle) -> SdkResult<()>;

    /// Tell the camera a transfer finished.
    fn download_complete(&self, item: ItemHandle) -> SdkResult<()>;

    /// Tell the camera a transfer was abandoned.
    fn download_cancel(&self, item: ItemHandle) -> SdkResult<()>;

    /// Create a live view image bound to a memory stream.
    fn create_evf_image(&self, stream: StreamHandle) -> SdkResult<EvfImageHandle>;

    /// Pull the current live view image into its stream.
    fn download_evf_image(&self, device: DeviceHandle, image: EvfImageHandle) -> SdkResult<()>;

    fn evf_image_info(&self, image: EvfImageHandle) -> SdkResult<EvfImageInfo>;

    /// Current length of a stream in bytes.
    fn stream_length(&self, stream: StreamHandle) -> SdkResult<u64>;

    /// Copy the first `len` bytes of a memory stream.
    fn read_stream(&self, stream: StreamHandle, len: u64) -> SdkResult<Bytes>;

    /// Deliver pending hardware events to registered handlers.
    fn pump_events(&self);
}
