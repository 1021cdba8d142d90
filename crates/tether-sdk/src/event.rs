//! Hardware events raised by the native layer.

use crate::handle::ItemHandle;

/// Acknowledgement every event handler returns to the native layer.
pub const EVENT_ACK: u32 = 0;

const OBJECT_EVENT_DIR_ITEM_CREATED: u32 = 0x0000_0204;
const OBJECT_EVENT_DIR_ITEM_REQUEST_TRANSFER: u32 = 0x0000_0208;
const STATE_EVENT_SHUTDOWN: u32 = 0x0000_0301;
const STATE_EVENT_WILL_SOON_SHUTDOWN: u32 = 0x0000_0303;
const PROPERTY_EVENT_PROPERTY_CHANGED: u32 = 0x0000_0101;
const PROPERTY_EVENT_PROPERTY_DESC_CHANGED: u32 = 0x0000_0102;

/// Camera properties the engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    /// Where captured images are stored.
    SaveTo,

    /// Live view output routing bit set.
    EvfOutputDevice,

    /// Live view depth-of-field preview switch.
    EvfDepthOfFieldPreview,

    /// Any property the engine does not interpret.
    Other(u32),
}

impl PropertyId {
    /// Native property identifier.
    pub fn code(self) -> u32 {
        match self {
            Self::SaveTo => 0x0000_000B,
            Self::EvfOutputDevice => 0x0000_0500,
            Self::EvfDepthOfFieldPreview => 0x0000_0504,
            Self::Other(code) => code,
        }
    }

    /// Classify a native property identifier.
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000_000B => Self::SaveTo,
            0x0000_0500 => Self::EvfOutputDevice,
            0x0000_0504 => Self::EvfDepthOfFieldPreview,
            other => Self::Other(other),
        }
    }
}

/// `SaveTo` value routing captured images to the host.
pub const SAVE_TO_HOST: u32 = 2;

/// `EvfOutputDevice` bit routing live view to the host.
pub const EVF_OUTPUT_DEVICE_PC: u32 = 2;

/// `EvfDepthOfFieldPreview` value switching the preview off.
pub const EVF_DEPTH_OF_FIELD_PREVIEW_OFF: u32 = 0;

/// Commands the engine sends to a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    /// Trigger a still capture.
    TakePicture,

    /// Postpone the camera's automatic power-off.
    ExtendShutDownTimer,
}

impl CameraCommand {
    /// Native command identifier.
    pub fn code(self) -> u32 {
        match self {
            Self::TakePicture => 0,
            Self::ExtendShutDownTimer => 1,
        }
    }
}

/// Events about files and images on the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEvent {
    /// The camera asks the host to transfer a newly captured image.
    DirItemRequestTransfer(ItemHandle),

    /// A file was created on the camera's card.
    DirItemCreated(ItemHandle),

    /// Any other object event.
    Other { code: u32 },
}

impl ObjectEvent {
    /// Classify a raw native object event.
    pub fn from_raw(code: u32, object: ItemHandle) -> Self {
        match code {
            OBJECT_EVENT_DIR_ITEM_REQUEST_TRANSFER => Self::DirItemRequestTransfer(object),
            OBJECT_EVENT_DIR_ITEM_CREATED => Self::DirItemCreated(object),
            code => Self::Other { code },
        }
    }

    /// Native code and object reference, as the camera raises them.
    pub fn into_raw(self) -> (u32, ItemHandle) {
        match self {
            Self::DirItemRequestTransfer(item) => (OBJECT_EVENT_DIR_ITEM_REQUEST_TRANSFER, item),
            Self::DirItemCreated(item) => (OBJECT_EVENT_DIR_ITEM_CREATED, item),
            Self::Other { code } => (code, ItemHandle(0)),
        }
    }
}

/// Events about the camera's own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// The automatic power-off timer is about to expire.
    WillSoonShutDown { seconds: u32 },

    /// The camera has shut down or was disconnected.
    Shutdown,

    /// Any other state event.
    Other { code: u32, parameter: u32 },
}

impl StateEvent {
    /// Classify a raw native state event.
    pub fn from_raw(code: u32, parameter: u32) -> Self {
        match code {
            STATE_EVENT_WILL_SOON_SHUTDOWN => Self::WillSoonShutDown { seconds: parameter },
            STATE_EVENT_SHUTDOWN => Self::Shutdown,
            code => Self::Other { code, parameter },
        }
    }

    /// Native code and parameter.
    pub fn into_raw(self) -> (u32, u32) {
        match self {
            Self::WillSoonShutDown { seconds } => (STATE_EVENT_WILL_SOON_SHUTDOWN, seconds),
            Self::Shutdown => (STATE_EVENT_SHUTDOWN, 0),
            Self::Other { code, parameter } => (code, parameter),
        }
    }
}

/// Events about camera settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEvent {
    /// A property value changed.
    PropertyChanged { property: PropertyId, param: u32 },

    /// The allowed values of a property changed.
    PropertyDescChanged { property: PropertyId, param: u32 },

    /// Any other property event.
    Other { code: u32 },
}

impl PropertyEvent {
    /// Classify a raw native property event.
    pub fn from_raw(code: u32, property: u32, param: u32) -> Self {
        let property = PropertyId::from_code(property);
        match code {
            PROPERTY_EVENT_PROPERTY_CHANGED => Self::PropertyChanged { property, param },
            PROPERTY_EVENT_PROPERTY_DESC_CHANGED => Self::PropertyDescChanged { property, param },
            code => Self::Other { code },
        }
    }

    /// Native code, property identifier and parameter.
    pub fn into_raw(self) -> (u32, u32, u32) {
        match self {
            Self::PropertyChanged { property, param } => {
                (PROPERTY_EVENT_PROPERTY_CHANGED, property.code(), param)
            }
            Self::PropertyDescChanged { property, param } => {
                (PROPERTY_EVENT_PROPERTY_DESC_CHANGED, property.code(), param)
            }
            Self::Other { code } => (code, 0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_event_classification() {
        let item = ItemHandle(7);
        assert_eq!(
            ObjectEvent::from_raw(0x208, item),
            ObjectEvent::DirItemRequestTransfer(item)
        );
        assert_eq!(ObjectEvent::from_raw(0x204, item), ObjectEvent::DirItemCreated(item));
        assert_eq!(ObjectEvent::from_raw(0x999, item), ObjectEvent::Other { code: 0x999 });
    }

    #[test]
    fn test_state_event_classification() {
        assert_eq!(
            StateEvent::from_raw(0x303, 5),
            StateEvent::WillSoonShutDown { seconds: 5 }
        );
        assert_eq!(StateEvent::from_raw(0x301, 0), StateEvent::Shutdown);
        assert_eq!(
            StateEvent::from_raw(0x302, 1),
            StateEvent::Other { code: 0x302, parameter: 1 }
        );
    }

    #[test]
    fn test_property_event_classification() {
        assert_eq!(
            PropertyEvent::from_raw(0x101, 0x500, 0),
            PropertyEvent::PropertyChanged {
                property: PropertyId::EvfOutputDevice,
                param: 0
            }
        );
        assert_eq!(PropertyId::from_code(0x1234), PropertyId::Other(0x1234));
        assert_eq!(PropertyId::SaveTo.code(), 0x0B);
    }

    #[test]
    fn test_raw_form_matches_native_codes() {
        assert_eq!(
            ObjectEvent::DirItemRequestTransfer(ItemHandle(3)).into_raw(),
            (0x208, ItemHandle(3))
        );
        assert_eq!(StateEvent::WillSoonShutDown { seconds: 9 }.into_raw(), (0x303, 9));
        assert_eq!(
            PropertyEvent::PropertyDescChanged {
                property: PropertyId::SaveTo,
                param: 1
            }
            .into_raw(),
            (0x102, 0x0B, 1)
        );
    }
}
