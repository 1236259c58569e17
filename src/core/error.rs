//! Error types for the WIM interop layer
//!
//! Every failed native call is turned into a [`NativeError`] carrying the
//! entry point name, the system error code and (when the system can
//! resolve one) a human-readable message. Two native errors are the same
//! kind when their codes match; operation name and message text are
//! diagnostic only.

use crate::native::traits::WimApi;
use std::fmt;
use thiserror::Error;

/// `ERROR_FILE_NOT_FOUND`
pub const CODE_FILE_NOT_FOUND: u32 = 2;
/// `ERROR_PATH_NOT_FOUND`
pub const CODE_PATH_NOT_FOUND: u32 = 3;
/// `ERROR_ACCESS_DENIED`
pub const CODE_ACCESS_DENIED: u32 = 5;
/// `ERROR_FILE_EXISTS`
pub const CODE_FILE_EXISTS: u32 = 80;
/// `ERROR_INVALID_PARAMETER`
pub const CODE_INVALID_PARAMETER: u32 = 87;
/// `ERROR_INVALID_HANDLE`
pub const CODE_INVALID_HANDLE: u32 = 6;
/// `ERROR_REQUEST_ABORTED`, reported when a progress handler aborted the operation
pub const CODE_REQUEST_ABORTED: u32 = 1235;
/// `ERROR_PRIVILEGE_NOT_HELD`, capture/apply usually needs an elevated process
pub const CODE_PRIVILEGE_NOT_HELD: u32 = 1314;

/// A failed native call
#[derive(Debug, Clone, Eq)]
pub struct NativeError {
    /// Native entry point that failed (e.g. `WIMCreateFile`)
    pub operation: &'static str,
    /// System error code reported by the native layer
    pub code: u32,
    /// System message for `code`, empty when none could be resolved
    pub message: String,
}

impl NativeError {
    /// Access denied
    pub const ACCESS_DENIED: NativeError = NativeError::sentinel(CODE_ACCESS_DENIED);
    /// Invalid parameter
    pub const INVALID_PARAMETER: NativeError = NativeError::sentinel(CODE_INVALID_PARAMETER);
    /// Path not found
    pub const PATH_NOT_FOUND: NativeError = NativeError::sentinel(CODE_PATH_NOT_FOUND);
    /// File not found
    pub const FILE_NOT_FOUND: NativeError = NativeError::sentinel(CODE_FILE_NOT_FOUND);
    /// Required privilege is not held by the client
    pub const PRIVILEGE_NOT_HELD: NativeError = NativeError::sentinel(CODE_PRIVILEGE_NOT_HELD);

    const fn sentinel(code: u32) -> Self {
        Self {
            operation: "",
            code,
            message: String::new(),
        }
    }

    /// Create an error without a resolved message
    pub fn new(operation: &'static str, code: u32) -> Self {
        Self {
            operation,
            code,
            message: String::new(),
        }
    }

    /// True when both errors carry the same code
    pub fn is(&self, other: &NativeError) -> bool {
        self.code == other.code
    }
}

impl PartialEq for NativeError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} failed with code={}", self.operation, self.code)
        } else {
            write!(
                f,
                "{} failed with code={}: {}",
                self.operation, self.code, self.message
            )
        }
    }
}

impl std::error::Error for NativeError {}

/// Attach the system message for `code` to a failed `operation`.
///
/// Message lookup failures are not errors; the message is left empty.
pub fn map_error(api: &dyn WimApi, operation: &'static str, code: u32) -> NativeError {
    let message = if code == 0 {
        String::new()
    } else {
        api.format_message(code)
            .map(|m| m.trim().to_string())
            .unwrap_or_default()
    };

    NativeError {
        operation,
        code,
        message,
    }
}

/// Map the code currently in the native last-error slot
pub fn last_error(api: &dyn WimApi, operation: &'static str) -> NativeError {
    map_error(api, operation, api.last_error())
}

/// Main error type for the WIM interop layer
#[derive(Error, Debug)]
pub enum WimError {
    /// Opening or creating the container failed
    #[error("Failed to open image container: {0}")]
    OpenFailed(NativeError),

    /// Closing a container or image handle failed
    #[error("Failed to close handle: {0}")]
    CloseFailed(NativeError),

    /// Loading an image from the container failed
    #[error("Failed to load image: {0}")]
    LoadFailed(NativeError),

    /// Image indices are 1-based; no native call is made for this
    #[error("Image index must be >= 1 (got {0})")]
    InvalidIndex(i64),

    /// Capturing a directory into a new image failed
    #[error("Capture failed: {0}")]
    CaptureFailed(NativeError),

    /// Applying an image to a directory failed
    #[error("Apply failed: {0}")]
    ApplyFailed(NativeError),

    /// The progress callback could not be registered with the native layer
    #[error("Callback registration failed: {0}")]
    RegisterFailed(NativeError),

    /// The native layer could not provide image metadata
    #[error("Failed to read image information: {0}")]
    InfoFailed(NativeError),

    /// Image metadata was present but malformed
    #[error("Failed to decode image information: {0}")]
    InfoDecodeFailed(String),

    /// Counting images in the container failed
    #[error("Failed to count images: {0}")]
    CountFailed(NativeError),

    /// Setting the scratch directory failed
    #[error("Failed to set temporary path: {0}")]
    TemporaryPathFailed(NativeError),

    /// The handle was already closed; nothing was sent to the native layer
    #[error("{operation} called on a closed handle")]
    Closed { operation: &'static str },

    /// The native library could not be loaded or lacks a required entry point
    #[error("Native library error: {0}")]
    Library(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WimError {
    /// The wrapped native failure, if this error came from a native call
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            WimError::OpenFailed(e)
            | WimError::CloseFailed(e)
            | WimError::LoadFailed(e)
            | WimError::CaptureFailed(e)
            | WimError::ApplyFailed(e)
            | WimError::RegisterFailed(e)
            | WimError::InfoFailed(e)
            | WimError::CountFailed(e)
            | WimError::TemporaryPathFailed(e) => Some(e),
            _ => None,
        }
    }

    /// The native error code, if any
    pub fn code(&self) -> Option<u32> {
        self.native().map(|e| e.code)
    }

    /// Compare against a sentinel by code only
    pub fn is(&self, sentinel: &NativeError) -> bool {
        self.native().is_some_and(|e| e.is(sentinel))
    }

    /// The caller needs to retry from an elevated process
    pub fn is_privilege_error(&self) -> bool {
        self.is(&NativeError::PRIVILEGE_NOT_HELD)
    }

    /// A progress handler asked the native layer to stop
    pub fn is_aborted(&self) -> bool {
        self.code() == Some(CODE_REQUEST_ABORTED)
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WimError>;
