//! Mock imaging library for testing without wimgapi.dll
//!
//! [`MockWim`] implements [`WimApi`] entirely in memory. Containers are
//! keyed by path and hold captured directory trees; applying an image
//! writes the tree back to disk. Registered callbacks receive the same
//! message shapes the real library sends, and every entry point is
//! counted so tests can assert how many native calls an operation made.

use crate::core::error::{
    CODE_ACCESS_DENIED, CODE_FILE_EXISTS, CODE_FILE_NOT_FOUND, CODE_INVALID_HANDLE,
    CODE_INVALID_PARAMETER, CODE_PATH_NOT_FOUND, CODE_PRIVILEGE_NOT_HELD, CODE_REQUEST_ABORTED,
};
use crate::core::info::{encode_image_info, encode_utf16_bytes, ImageInfo};
use crate::core::options::CreationDisposition;
use crate::core::progress::{
    MSG_DONE, MSG_FILE_INFO, MSG_PROCESS, MSG_SET_POS, MSG_SET_RANGE, MSG_STEP_IT,
};
use crate::native::traits::{
    MessageCallback, NativeBuffer, RawHandle, WimApi, CALLBACK_ABORT, GENERIC_WRITE,
    INVALID_CALLBACK_VALUE,
};
use dashmap::DashMap;
use log::{debug, trace};
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fs;
use std::iter::once;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use walkdir::WalkDir;

/// First handle value handed out; handles are spaced like real kernel handles
const FIRST_HANDLE: RawHandle = 0x1000;

/// Metadata returned when `malformed_info` is set
const MALFORMED_INFO: &str = "<IMAGE INDEX=\"1\"><NAME>broken</DESCRIPTION>";

thread_local! {
    static LAST_ERROR: Cell<u32> = const { Cell::new(0) };
}

/// Configuration for mock library behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Refuse callback registration on image handles (containers still accept)
    pub reject_image_registration: bool,
    /// Refuse callback registration on every handle
    pub reject_registration: bool,
    /// Refuse to detach callbacks; the registration stays attached
    pub reject_unregistration: bool,
    /// Fail every open with this code
    pub open_failure: Option<u32>,
    /// Fail every close with this code
    pub close_failure: Option<u32>,
    /// Report zero images with this code set
    pub count_failure: Option<u32>,
    /// Fail every apply with this code
    pub apply_failure: Option<u32>,
    /// Fail every capture with this code
    pub capture_failure: Option<u32>,
    /// Return metadata that is not well-formed XML
    pub malformed_info: bool,
    /// Behave like a library without `WIMFreeMemory`
    pub free_memory_missing: bool,
}

impl MockConfig {
    /// A library that refuses elevated operations, like an unelevated process
    pub fn unprivileged() -> Self {
        Self {
            apply_failure: Some(CODE_PRIVILEGE_NOT_HELD),
            capture_failure: Some(CODE_PRIVILEGE_NOT_HELD),
            ..Self::default()
        }
    }
}

/// One path inside a stored image, relative to the image root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    Directory(PathBuf),
    File(PathBuf, Vec<u8>),
}

/// An image stored in a mock container
#[derive(Debug, Clone, Default)]
pub struct MockImage {
    pub info: ImageInfo,
    pub entries: Vec<MockEntry>,
}

impl MockImage {
    pub fn new(name: &str, entries: Vec<MockEntry>) -> Self {
        Self {
            info: ImageInfo {
                name: name.to_string(),
                ..ImageInfo::default()
            },
            entries,
        }
    }

    fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, MockEntry::File(..)))
            .count()
    }
}

#[derive(Debug, Clone)]
enum Target {
    Container {
        path: PathBuf,
        writable: bool,
    },
    Image {
        container: RawHandle,
        archive: PathBuf,
        position: usize,
    },
}

#[derive(Clone, Copy)]
struct Registration {
    callback: MessageCallback,
    user_data: usize,
}

#[derive(Default)]
struct MockState {
    archives: HashMap<PathBuf, Vec<MockImage>>,
    handles: HashMap<RawHandle, Target>,
    handles_issued: isize,
    registrations: HashMap<RawHandle, Registration>,
    last_registration: Option<Registration>,
    blobs: HashMap<usize, Box<[u8]>>,
    temporary_paths: HashMap<RawHandle, PathBuf>,
}

impl MockState {
    fn allocate(&mut self, target: Target) -> RawHandle {
        let handle = FIRST_HANDLE + self.handles_issued * 4;
        self.handles_issued += 1;
        self.handles.insert(handle, target);
        handle
    }

    fn container(&self, handle: RawHandle) -> Option<(&Path, bool)> {
        match self.handles.get(&handle) {
            Some(Target::Container { path, writable }) => Some((path.as_path(), *writable)),
            _ => None,
        }
    }

    /// Registration for `handle`, or for the container an image came from
    fn registration_for(&self, handle: RawHandle) -> Option<Registration> {
        if let Some(registration) = self.registrations.get(&handle) {
            return Some(*registration);
        }
        match self.handles.get(&handle) {
            Some(Target::Image { container, .. }) => self.registrations.get(container).copied(),
            _ => None,
        }
    }
}

/// Delivers the message sequence of one apply or capture
struct Emitter {
    registration: Option<Registration>,
    aborted: bool,
}

impl Emitter {
    fn send(&mut self, message_id: u32, wparam: usize, lparam: usize) -> bool {
        if self.aborted {
            return false;
        }
        if let Some(registration) = self.registration {
            let user_data = registration.user_data as *mut c_void;
            if (registration.callback)(message_id, wparam, lparam, user_data) == CALLBACK_ABORT {
                self.aborted = true;
            }
        }
        !self.aborted
    }

    fn file(&mut self, relative: &Path) -> bool {
        let wide: Vec<u16> = relative
            .to_string_lossy()
            .encode_utf16()
            .chain(once(0))
            .collect();
        let name = wide.as_ptr() as usize;
        self.send(MSG_PROCESS, name, 0)
            && self.send(MSG_FILE_INFO, name, 0)
            && self.send(MSG_STEP_IT, 0, 0)
    }

    fn finish(&mut self, total: usize) -> bool {
        self.send(MSG_SET_POS, 0, total) && self.send(MSG_DONE, 0, 0)
    }
}

/// In-memory stand-in for the imaging library
pub struct MockWim {
    config: MockConfig,
    state: Mutex<MockState>,
    calls: DashMap<&'static str, usize>,
}

impl MockWim {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MockState::default()),
            calls: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// How many times the named entry point (e.g. `"WIMCloseHandle"`) ran
    pub fn calls(&self, entry_point: &str) -> usize {
        self.calls.get(entry_point).map(|count| *count).unwrap_or(0)
    }

    /// Calls across every entry point
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    /// Callback registrations still attached to a handle
    pub fn attached_callbacks(&self) -> usize {
        self.state().registrations.len()
    }

    /// Metadata blobs handed out and not yet released
    pub fn outstanding_blobs(&self) -> usize {
        self.state().blobs.len()
    }

    /// Scratch directory last set on `handle`
    pub fn temporary_path(&self, handle: RawHandle) -> Option<PathBuf> {
        self.state().temporary_paths.get(&handle).cloned()
    }

    /// Seed a container with an image without going through capture
    pub fn add_image(&self, container: impl Into<PathBuf>, mut image: MockImage) {
        let mut state = self.state();
        let images = state.archives.entry(container.into()).or_default();
        image.info.index = images.len() as i32 + 1;
        images.push(image);
    }

    /// Metadata of every image stored at `container`
    pub fn stored_images(&self, container: &Path) -> Vec<ImageInfo> {
        self.state()
            .archives
            .get(container)
            .map(|images| images.iter().map(|i| i.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliver one more message through the most recently registered
    /// callback, even if it has since been unregistered. Returns the
    /// callback's answer, or `None` if nothing was ever registered.
    pub fn replay_last_callback(&self, message_id: u32, wparam: usize, lparam: usize) -> Option<u32> {
        let registration = self.state().last_registration?;
        let user_data = registration.user_data as *mut c_void;
        Some((registration.callback)(message_id, wparam, lparam, user_data))
    }

    /// User data passed with the most recent callback registration
    pub fn last_callback_token(&self) -> Option<usize> {
        self.state().last_registration.map(|r| r.user_data)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, entry_point: &'static str) {
        *self.calls.entry(entry_point).or_insert(0) += 1;
        LAST_ERROR.with(|slot| slot.set(0));
        trace!("mock {}", entry_point);
    }

    fn fail<T>(&self, code: u32, value: T) -> T {
        LAST_ERROR.with(|slot| slot.set(code));
        value
    }

    fn read_tree(&self, source: &Path) -> std::result::Result<Vec<MockEntry>, u32> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|_| CODE_ACCESS_DENIED)?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| CODE_INVALID_PARAMETER)?
                .to_path_buf();
            if entry.file_type().is_dir() {
                entries.push(MockEntry::Directory(relative));
            } else {
                let content = fs::read(entry.path()).map_err(|_| CODE_ACCESS_DENIED)?;
                entries.push(MockEntry::File(relative, content));
            }
        }
        Ok(entries)
    }
}

impl Default for MockWim {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: metadata blobs live in `MockState::blobs` until `free_memory`
// removes them (or until the mock is dropped), and callbacks are invoked
// only with the user data they were registered with.
unsafe impl WimApi for MockWim {
    fn create_file(
        &self,
        path: &Path,
        desired_access: u32,
        creation_disposition: u32,
        _flags_and_attributes: u32,
        _compression_type: u32,
    ) -> RawHandle {
        self.enter("WIMCreateFile");
        if let Some(code) = self.config.open_failure {
            return self.fail(code, 0);
        }

        let writable = desired_access & GENERIC_WRITE != 0;
        let mut state = self.state();
        let exists = state.archives.contains_key(path);

        let create = match CreationDisposition::from_raw(creation_disposition) {
            Some(CreationDisposition::CreateNew) if exists => {
                return self.fail(CODE_FILE_EXISTS, 0);
            }
            Some(CreationDisposition::CreateNew) | Some(CreationDisposition::CreateAlways) => true,
            Some(CreationDisposition::OpenExisting) if !exists => {
                return self.fail(CODE_FILE_NOT_FOUND, 0);
            }
            Some(CreationDisposition::OpenExisting) => false,
            Some(CreationDisposition::OpenAlways) => !exists,
            None => return self.fail(CODE_INVALID_PARAMETER, 0),
        };

        if create {
            if !writable {
                return self.fail(CODE_ACCESS_DENIED, 0);
            }
            state.archives.insert(path.to_path_buf(), Vec::new());
        }

        let handle = state.allocate(Target::Container {
            path: path.to_path_buf(),
            writable,
        });
        debug!("mock opened {} as {:#x}", path.display(), handle);
        handle
    }

    fn close_handle(&self, handle: RawHandle) -> bool {
        self.enter("WIMCloseHandle");
        if let Some(code) = self.config.close_failure {
            return self.fail(code, false);
        }

        let mut state = self.state();
        if state.handles.remove(&handle).is_none() {
            return self.fail(CODE_INVALID_HANDLE, false);
        }
        state.registrations.remove(&handle);
        state.temporary_paths.remove(&handle);
        true
    }

    fn image_count(&self, handle: RawHandle) -> u32 {
        self.enter("WIMGetImageCount");
        if let Some(code) = self.config.count_failure {
            return self.fail(code, 0);
        }
        let state = self.state();
        match state.container(handle) {
            Some((path, _)) => state.archives.get(path).map_or(0, |images| images.len() as u32),
            None => self.fail(CODE_INVALID_HANDLE, 0),
        }
    }

    fn load_image(&self, handle: RawHandle, index: u32) -> RawHandle {
        self.enter("WIMLoadImage");
        let mut state = self.state();
        let archive = match state.container(handle) {
            Some((path, _)) => path.to_path_buf(),
            None => return self.fail(CODE_INVALID_HANDLE, 0),
        };

        let count = state.archives.get(&archive).map_or(0, Vec::len);
        if index == 0 || index as usize > count {
            return self.fail(CODE_INVALID_PARAMETER, 0);
        }

        state.allocate(Target::Image {
            container: handle,
            archive,
            position: index as usize - 1,
        })
    }

    fn capture_image(&self, handle: RawHandle, path: &Path, _flags: u32) -> RawHandle {
        self.enter("WIMCaptureImage");
        let (archive, registration) = {
            let state = self.state();
            match state.container(handle) {
                Some((_, false)) => return self.fail(CODE_ACCESS_DENIED, 0),
                Some((archive, true)) => (archive.to_path_buf(), state.registration_for(handle)),
                None => return self.fail(CODE_INVALID_HANDLE, 0),
            }
        };
        if let Some(code) = self.config.capture_failure {
            return self.fail(code, 0);
        }
        if !path.is_dir() {
            return self.fail(CODE_PATH_NOT_FOUND, 0);
        }

        let entries = match self.read_tree(path) {
            Ok(entries) => entries,
            Err(code) => return self.fail(code, 0),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut image = MockImage::new(&name, entries);

        // Messages are sent without holding the state lock.
        let mut emitter = Emitter {
            registration,
            aborted: false,
        };
        let total = image.file_count();
        let mut completed = emitter.send(MSG_SET_RANGE, 0, total);
        for entry in &image.entries {
            if let MockEntry::File(relative, _) = entry {
                completed = completed && emitter.file(relative);
            }
        }
        completed = completed && emitter.finish(total);
        if !completed {
            return self.fail(CODE_REQUEST_ABORTED, 0);
        }

        let mut state = self.state();
        let images = state.archives.entry(archive.clone()).or_default();
        image.info.index = images.len() as i32 + 1;
        let position = images.len();
        images.push(image);

        state.allocate(Target::Image {
            container: handle,
            archive,
            position,
        })
    }

    fn set_temporary_path(&self, handle: RawHandle, path: &Path) -> bool {
        self.enter("WIMSetTemporaryPath");
        let mut state = self.state();
        if state.container(handle).is_none() {
            return self.fail(CODE_INVALID_HANDLE, false);
        }
        if !path.is_dir() {
            return self.fail(CODE_PATH_NOT_FOUND, false);
        }
        state.temporary_paths.insert(handle, path.to_path_buf());
        true
    }

    fn image_information(&self, handle: RawHandle) -> Option<NativeBuffer> {
        self.enter("WIMGetImageInformation");
        let mut state = self.state();
        let info = match state.handles.get(&handle) {
            Some(Target::Image {
                archive, position, ..
            }) => state
                .archives
                .get(archive)
                .and_then(|images| images.get(*position))
                .map(|image| image.info.clone()),
            _ => None,
        };
        let info = match info {
            Some(info) => info,
            None => return self.fail(CODE_INVALID_HANDLE, None),
        };

        let text = if self.config.malformed_info {
            MALFORMED_INFO.to_string()
        } else {
            encode_image_info(&info)
        };
        let blob = encode_utf16_bytes(&text).into_boxed_slice();
        let buffer = NativeBuffer {
            address: blob.as_ptr() as usize,
            size: blob.len() as u32,
        };
        state.blobs.insert(buffer.address, blob);
        Some(buffer)
    }

    fn free_memory(&self, address: usize) -> bool {
        self.enter("WIMFreeMemory");
        if self.config.free_memory_missing {
            return false;
        }
        self.state().blobs.remove(&address);
        true
    }

    fn apply_image(&self, handle: RawHandle, path: &Path, _flags: u32) -> bool {
        self.enter("WIMApplyImage");
        let (image, registration) = {
            let state = self.state();
            let image = match state.handles.get(&handle) {
                Some(Target::Image {
                    archive, position, ..
                }) => state
                    .archives
                    .get(archive)
                    .and_then(|images| images.get(*position))
                    .cloned(),
                _ => None,
            };
            match image {
                Some(image) => (image, state.registration_for(handle)),
                None => return self.fail(CODE_INVALID_HANDLE, false),
            }
        };
        if let Some(code) = self.config.apply_failure {
            return self.fail(code, false);
        }
        if fs::create_dir_all(path).is_err() {
            return self.fail(CODE_PATH_NOT_FOUND, false);
        }

        let mut emitter = Emitter {
            registration,
            aborted: false,
        };
        let total = image.file_count();
        if !emitter.send(MSG_SET_RANGE, 0, total) {
            return self.fail(CODE_REQUEST_ABORTED, false);
        }

        for entry in &image.entries {
            let written = match entry {
                MockEntry::Directory(relative) => fs::create_dir_all(path.join(relative)),
                MockEntry::File(relative, content) => fs::write(path.join(relative), content),
            };
            if written.is_err() {
                return self.fail(CODE_ACCESS_DENIED, false);
            }
            if let MockEntry::File(relative, _) = entry {
                if !emitter.file(relative) {
                    return self.fail(CODE_REQUEST_ABORTED, false);
                }
            }
        }

        if !emitter.finish(total) {
            return self.fail(CODE_REQUEST_ABORTED, false);
        }
        true
    }

    fn register_message_callback(
        &self,
        handle: RawHandle,
        callback: MessageCallback,
        user_data: usize,
    ) -> u32 {
        self.enter("WIMRegisterMessageCallback");
        let mut state = self.state();
        let is_image = match state.handles.get(&handle) {
            Some(Target::Image { .. }) => true,
            Some(Target::Container { .. }) => false,
            None => return self.fail(CODE_INVALID_HANDLE, INVALID_CALLBACK_VALUE),
        };
        if self.config.reject_registration || (is_image && self.config.reject_image_registration) {
            return self.fail(CODE_INVALID_PARAMETER, INVALID_CALLBACK_VALUE);
        }

        let registration = Registration {
            callback,
            user_data,
        };
        state.registrations.insert(handle, registration);
        state.last_registration = Some(registration);
        state.registrations.len() as u32 - 1
    }

    fn unregister_message_callback(&self, handle: RawHandle, callback: MessageCallback) -> bool {
        self.enter("WIMUnregisterMessageCallback");
        if self.config.reject_unregistration {
            return self.fail(CODE_INVALID_HANDLE, false);
        }
        let mut state = self.state();
        let matches = state
            .registrations
            .get(&handle)
            .map_or(false, |r| r.callback as usize == callback as usize);
        if !matches {
            return self.fail(CODE_INVALID_PARAMETER, false);
        }
        state.registrations.remove(&handle);
        true
    }

    fn last_error(&self) -> u32 {
        LAST_ERROR.with(Cell::get)
    }

    fn format_message(&self, code: u32) -> Option<String> {
        let message = match code {
            CODE_FILE_NOT_FOUND => "The system cannot find the file specified.",
            CODE_PATH_NOT_FOUND => "The system cannot find the path specified.",
            CODE_ACCESS_DENIED => "Access is denied.",
            CODE_INVALID_HANDLE => "The handle is invalid.",
            CODE_FILE_EXISTS => "The file exists.",
            CODE_INVALID_PARAMETER => "The parameter is incorrect.",
            CODE_REQUEST_ABORTED => "The request was aborted.",
            CODE_PRIVILEGE_NOT_HELD => "A required privilege is not held by the client.",
            _ => return None,
        };
        Some(format!("{}\r\n", message))
    }
}
