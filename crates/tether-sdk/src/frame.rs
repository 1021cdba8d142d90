//! Live view frame types.

use bytes::Bytes;
use std::time::Instant;

/// One live view image pulled from a camera.
///
/// Ownership moves to the registered consumer; the engine keeps no copy.
#[derive(Debug, Clone)]
pub struct LiveViewFrame {
    /// Encoded image bytes exactly as the camera produced them.
    pub pixels: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Monotonically increasing sequence number within one live view run.
    pub sequence: u64,

    /// When the frame was copied out of the device stream.
    pub captured_at: Instant,
}

impl LiveViewFrame {
    /// Create a new live view frame.
    pub fn new(pixels: Bytes, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Size of the encoded image in bytes.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Returns true if the frame carries no data.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Check for the JPEG start/end markers cameras use for EVF images.
    pub fn is_jpeg(&self) -> bool {
        let data = self.pixels.as_ref();
        data.len() >= 4 && data[..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_markers() {
        let frame = LiveViewFrame::new(Bytes::from_static(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]), 4, 3, 0);
        assert!(frame.is_jpeg());
        assert_eq!(frame.len(), 5);

        let truncated = LiveViewFrame::new(Bytes::from_static(&[0xFF, 0xD8, 0x01]), 4, 3, 1);
        assert!(!truncated.is_jpeg());
        assert!(!truncated.is_empty());
    }
}
