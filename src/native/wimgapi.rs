//! `wimgapi.dll` backend
//!
//! Resolves the imaging library's entry points at load time and forwards
//! each [`WimApi`] call to them unchanged. `WIMFreeMemory` is optional:
//! older library builds do not export it.

use super::traits::{MessageCallback, NativeBuffer, RawHandle, WimApi};
use crate::core::config::LibraryConfig;
use crate::core::error::{Result, WimError};
use libloading::Library;
use log::{debug, info};
use std::ffi::c_void;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use windows::core::PWSTR;
use windows::Win32::Foundation::{GetLastError, SetLastError, WIN32_ERROR};
use windows::Win32::System::Diagnostics::Debug::{
    FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
};

/// Library file name, resolved through the system search path
const LIBRARY_NAME: &str = "wimgapi.dll";

/// Size of the buffer used for system message lookups (in UTF-16 units)
const MESSAGE_BUFFER_LEN: usize = 512;

type CreateFileFn =
    unsafe extern "system" fn(*const u16, u32, u32, u32, u32, *mut u32) -> RawHandle;
type CloseHandleFn = unsafe extern "system" fn(RawHandle) -> i32;
type GetImageCountFn = unsafe extern "system" fn(RawHandle) -> u32;
type LoadImageFn = unsafe extern "system" fn(RawHandle, u32) -> RawHandle;
type CaptureImageFn = unsafe extern "system" fn(RawHandle, *const u16, u32) -> RawHandle;
type SetTemporaryPathFn = unsafe extern "system" fn(RawHandle, *const u16) -> i32;
type GetImageInformationFn =
    unsafe extern "system" fn(RawHandle, *mut *mut c_void, *mut u32) -> i32;
type FreeMemoryFn = unsafe extern "system" fn(*mut c_void) -> i32;
type ApplyImageFn = unsafe extern "system" fn(RawHandle, *const u16, u32) -> i32;
type RegisterMessageCallbackFn =
    unsafe extern "system" fn(RawHandle, MessageCallback, *mut c_void) -> u32;
type UnregisterMessageCallbackFn = unsafe extern "system" fn(RawHandle, MessageCallback) -> i32;

/// Loaded `wimgapi.dll` with its entry points
pub struct Wimgapi {
    create_file: CreateFileFn,
    close_handle: CloseHandleFn,
    get_image_count: GetImageCountFn,
    load_image: LoadImageFn,
    capture_image: CaptureImageFn,
    set_temporary_path: SetTemporaryPathFn,
    get_image_information: GetImageInformationFn,
    free_memory: Option<FreeMemoryFn>,
    apply_image: ApplyImageFn,
    register_message_callback: RegisterMessageCallbackFn,
    unregister_message_callback: UnregisterMessageCallbackFn,
    // Keeps every pointer above valid; dropped last.
    _library: Library,
}

/// Resolve one required export, copying the function pointer out of the symbol
macro_rules! resolve {
    ($lib:expr, $ty:ty, $name:literal) => {
        *$lib
            .get::<$ty>(concat!($name, "\0").as_bytes())
            .map_err(|e| WimError::Library(format!("{} not exported: {}", $name, e)))?
    };
}

impl Wimgapi {
    /// Load the library from the system search path
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(LIBRARY_NAME))
    }

    /// Load from `[library] path` when set, else from the system search path
    pub fn load_configured(config: &LibraryConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Load the library from an explicit location
    pub fn load_from(path: &Path) -> Result<Self> {
        // SAFETY: wimgapi.dll has no initialisation routines with preconditions.
        let library = unsafe { Library::new(path) }
            .map_err(|e| WimError::Library(format!("{}: {}", path.display(), e)))?;

        // SAFETY: the signatures above match the documented wimgapi.h prototypes.
        let api = unsafe {
            let free_memory = library
                .get::<FreeMemoryFn>(b"WIMFreeMemory\0")
                .ok()
                .map(|symbol| *symbol);
            if free_memory.is_none() {
                info!("WIMFreeMemory not exported; metadata buffers will not be released");
            }

            Self {
                create_file: resolve!(library, CreateFileFn, "WIMCreateFile"),
                close_handle: resolve!(library, CloseHandleFn, "WIMCloseHandle"),
                get_image_count: resolve!(library, GetImageCountFn, "WIMGetImageCount"),
                load_image: resolve!(library, LoadImageFn, "WIMLoadImage"),
                capture_image: resolve!(library, CaptureImageFn, "WIMCaptureImage"),
                set_temporary_path: resolve!(library, SetTemporaryPathFn, "WIMSetTemporaryPath"),
                get_image_information: resolve!(library, GetImageInformationFn, "WIMGetImageInformation"),
                free_memory,
                apply_image: resolve!(library, ApplyImageFn, "WIMApplyImage"),
                register_message_callback: resolve!(library, RegisterMessageCallbackFn, "WIMRegisterMessageCallback"),
                unregister_message_callback: resolve!(library, UnregisterMessageCallbackFn, "WIMUnregisterMessageCallback"),
                _library: library,
            }
        };

        debug!("Loaded imaging library from {}", path.display());
        Ok(api)
    }
}

fn wide(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(once(0)).collect()
}

/// Clear the last-error slot so a zero result can be told apart from a failure
fn reset_last_error() {
    // SAFETY: SetLastError only writes the calling thread's error slot.
    unsafe { SetLastError(WIN32_ERROR(0)) };
}

// SAFETY: image information buffers stay valid until WIMFreeMemory, and the
// library only invokes callbacks with the user data they were registered with.
unsafe impl WimApi for Wimgapi {
    fn create_file(
        &self,
        path: &Path,
        desired_access: u32,
        creation_disposition: u32,
        flags_and_attributes: u32,
        compression_type: u32,
    ) -> RawHandle {
        let path = wide(path);
        let mut creation_result: u32 = 0;
        reset_last_error();
        unsafe {
            (self.create_file)(
                path.as_ptr(),
                desired_access,
                creation_disposition,
                flags_and_attributes,
                compression_type,
                &mut creation_result,
            )
        }
    }

    fn close_handle(&self, handle: RawHandle) -> bool {
        reset_last_error();
        unsafe { (self.close_handle)(handle) != 0 }
    }

    fn image_count(&self, handle: RawHandle) -> u32 {
        reset_last_error();
        unsafe { (self.get_image_count)(handle) }
    }

    fn load_image(&self, handle: RawHandle, index: u32) -> RawHandle {
        reset_last_error();
        unsafe { (self.load_image)(handle, index) }
    }

    fn capture_image(&self, handle: RawHandle, path: &Path, flags: u32) -> RawHandle {
        let path = wide(path);
        reset_last_error();
        unsafe { (self.capture_image)(handle, path.as_ptr(), flags) }
    }

    fn set_temporary_path(&self, handle: RawHandle, path: &Path) -> bool {
        let path = wide(path);
        reset_last_error();
        unsafe { (self.set_temporary_path)(handle, path.as_ptr()) != 0 }
    }

    fn image_information(&self, handle: RawHandle) -> Option<NativeBuffer> {
        let mut address: *mut c_void = std::ptr::null_mut();
        let mut size: u32 = 0;
        reset_last_error();
        let ok = unsafe { (self.get_image_information)(handle, &mut address, &mut size) != 0 };
        ok.then_some(NativeBuffer {
            address: address as usize,
            size,
        })
    }

    fn free_memory(&self, address: usize) -> bool {
        match self.free_memory {
            Some(free) => {
                unsafe { free(address as *mut c_void) };
                true
            }
            None => false,
        }
    }

    fn apply_image(&self, handle: RawHandle, path: &Path, flags: u32) -> bool {
        let path = wide(path);
        reset_last_error();
        unsafe { (self.apply_image)(handle, path.as_ptr(), flags) != 0 }
    }

    fn register_message_callback(
        &self,
        handle: RawHandle,
        callback: MessageCallback,
        user_data: usize,
    ) -> u32 {
        reset_last_error();
        unsafe { (self.register_message_callback)(handle, callback, user_data as *mut c_void) }
    }

    fn unregister_message_callback(&self, handle: RawHandle, callback: MessageCallback) -> bool {
        reset_last_error();
        unsafe { (self.unregister_message_callback)(handle, callback) != 0 }
    }

    fn last_error(&self) -> u32 {
        unsafe { GetLastError().0 }
    }

    fn format_message(&self, code: u32) -> Option<String> {
        let mut buffer = [0u16; MESSAGE_BUFFER_LEN];
        let len = unsafe {
            FormatMessageW(
                FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                None,
                code,
                0,
                PWSTR(buffer.as_mut_ptr()),
                buffer.len() as u32,
                None,
            )
        };
        if len == 0 {
            return None;
        }
        Some(
            String::from_utf16_lossy(&buffer[..len as usize])
                .trim()
                .to_string(),
        )
    }
}
