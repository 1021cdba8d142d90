//! Error types for native SDK calls.

use thiserror::Error;

/// Native error code reported when a live view image is not yet available.
pub const ERR_OBJECT_NOTREADY: u32 = 0x0000_A102;

/// Errors that can occur during native SDK calls.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The native library returned a failure code.
    #[error("{operation} failed with native error 0x{code:08X}")]
    Native {
        operation: &'static str,
        code: u32,
    },

    /// A handle was unknown or already released.
    #[error("Invalid or released handle: {0}")]
    InvalidHandle(u64),

    /// The requested object is not ready yet (live view warming up).
    #[error("Object not ready")]
    NotReady,

    /// The SDK runtime has not been initialized.
    #[error("SDK not initialized")]
    NotInitialized,

    /// Host-side I/O failure while servicing a stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Build an error from a native return code.
    pub fn from_code(operation: &'static str, code: u32) -> Self {
        if code == ERR_OBJECT_NOTREADY {
            Self::NotReady
        } else {
            Self::Native { operation, code }
        }
    }
}
