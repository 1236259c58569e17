//! Native imaging library abstraction
//!
//! The imaging library is a flat C API: opaque handles, BOOL results, a
//! per-thread last-error slot and one process-wide message callback. The
//! [`WimApi`] trait mirrors those entry points one-to-one and keeps their
//! raw return conventions, so every sentinel check lives in the handle
//! code rather than in each backend.
//!
//! Both the real `wimgapi.dll` backend and the in-memory mock implement
//! this trait, which lets the whole handle/callback/progress pipeline run
//! without the native library installed.

use std::ffi::c_void;
use std::path::Path;

/// Native handle value (`HANDLE`)
pub type RawHandle = isize;

/// Signature of the single message callback the native layer accepts.
///
/// Arguments are the message id, the two message words and the user-data
/// pointer given at registration time. The return value is one of
/// [`CALLBACK_SUCCESS`] or [`CALLBACK_ABORT`].
pub type MessageCallback =
    extern "system" fn(message_id: u32, wparam: usize, lparam: usize, user_data: *mut c_void) -> u32;

/// `GENERIC_READ` access right
pub const GENERIC_READ: u32 = 0x8000_0000;
/// `GENERIC_WRITE` access right
pub const GENERIC_WRITE: u32 = 0x4000_0000;

/// `INVALID_HANDLE_VALUE`
pub const INVALID_HANDLE_VALUE: RawHandle = -1;

/// Returned by callback registration when it failed
pub const INVALID_CALLBACK_VALUE: u32 = 0xFFFF_FFFF;
/// Callback return value: keep going
pub const CALLBACK_SUCCESS: u32 = 0;
/// Callback return value: abort the running operation
pub const CALLBACK_ABORT: u32 = 0xFFFF_FFFF;

/// Both `NULL` and `INVALID_HANDLE_VALUE` mean the call failed
pub fn is_invalid_handle(handle: RawHandle) -> bool {
    handle == 0 || handle == INVALID_HANDLE_VALUE
}

/// A native-owned metadata blob
///
/// The memory belongs to the native layer and stays readable until it is
/// handed back through [`WimApi::free_memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBuffer {
    /// Start address of the blob
    pub address: usize,
    /// Size in bytes
    pub size: u32,
}

/// Raw entry points of the imaging library.
///
/// # Safety
///
/// Implementers guarantee that:
/// - a [`NativeBuffer`] returned from [`WimApi::image_information`] points to
///   `size` readable bytes until it is passed to [`WimApi::free_memory`]
///   (or forever, when `free_memory` returns `false`);
/// - a registered [`MessageCallback`] is only invoked with the user-data
///   value supplied when it was registered.
pub unsafe trait WimApi: Send + Sync {
    /// `WIMCreateFile`; returns an invalid handle on failure
    fn create_file(
        &self,
        path: &Path,
        desired_access: u32,
        creation_disposition: u32,
        flags_and_attributes: u32,
        compression_type: u32,
    ) -> RawHandle;

    /// `WIMCloseHandle`
    fn close_handle(&self, handle: RawHandle) -> bool;

    /// `WIMGetImageCount`; zero is ambiguous without [`WimApi::last_error`]
    fn image_count(&self, handle: RawHandle) -> u32;

    /// `WIMLoadImage` with a 1-based index
    fn load_image(&self, handle: RawHandle, index: u32) -> RawHandle;

    /// `WIMCaptureImage`
    fn capture_image(&self, handle: RawHandle, path: &Path, flags: u32) -> RawHandle;

    /// `WIMSetTemporaryPath`
    fn set_temporary_path(&self, handle: RawHandle, path: &Path) -> bool;

    /// `WIMGetImageInformation`; `None` on failure
    fn image_information(&self, handle: RawHandle) -> Option<NativeBuffer>;

    /// `WIMFreeMemory`; `false` when this library version has no such entry point
    fn free_memory(&self, address: usize) -> bool;

    /// `WIMApplyImage`
    fn apply_image(&self, handle: RawHandle, path: &Path, flags: u32) -> bool;

    /// `WIMRegisterMessageCallback`; [`INVALID_CALLBACK_VALUE`] on failure
    fn register_message_callback(
        &self,
        handle: RawHandle,
        callback: MessageCallback,
        user_data: usize,
    ) -> u32;

    /// `WIMUnregisterMessageCallback`
    fn unregister_message_callback(&self, handle: RawHandle, callback: MessageCallback) -> bool;

    /// Error code left by the last failed call on this thread, 0 if none
    fn last_error(&self) -> u32;

    /// System message text for an error code
    fn format_message(&self, code: u32) -> Option<String>;
}
