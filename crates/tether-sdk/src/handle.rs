//! Opaque native object handles.

/// Reference to a native camera object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Reference to a native camera list produced by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListHandle(pub u64);

/// Reference to a file or image stored on the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemHandle(pub u64);

/// Reference to a native file or memory stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

/// Reference to a native live view image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvfImageHandle(pub u64);

/// Any native object that can be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    List(ListHandle),
    Device(DeviceHandle),
    Item(ItemHandle),
    Stream(StreamHandle),
    EvfImage(EvfImageHandle),
}

impl ObjectRef {
    /// The raw native reference value.
    pub fn raw(self) -> u64 {
        match self {
            Self::List(h) => h.0,
            Self::Device(h) => h.0,
            Self::Item(h) => h.0,
            Self::Stream(h) => h.0,
            Self::EvfImage(h) => h.0,
        }
    }
}

impl From<ListHandle> for ObjectRef {
    fn from(h: ListHandle) -> Self {
        Self::List(h)
    }
}

impl From<DeviceHandle> for ObjectRef {
    fn from(h: DeviceHandle) -> Self {
        Self::Device(h)
    }
}

impl From<ItemHandle> for ObjectRef {
    fn from(h: ItemHandle) -> Self {
        Self::Item(h)
    }
}

impl From<StreamHandle> for ObjectRef {
    fn from(h: StreamHandle) -> Self {
        Self::Stream(h)
    }
}

impl From<EvfImageHandle> for ObjectRef {
    fn from(h: EvfImageHandle) -> Self {
        Self::EvfImage(h)
    }
}
