//! Callback registry behind the single native message callback
//!
//! The imaging library accepts one callback function pointer plus an
//! opaque user-data word. Every apply/capture call that wants progress
//! registers its handler here and receives a token; the token is what the
//! native layer hands back as user data, and [`message_callback`] uses it
//! to find the handler for that one operation.
//!
//! Tokens are strictly increasing and never reused, so a message that
//! arrives after its operation released the token simply finds nothing
//! and is answered with "continue".

use crate::core::error::{last_error, NativeError, Result, WimError};
use crate::core::progress::{ProgressEvent, ProgressHandler};
use crate::native::traits::{
    is_invalid_handle, RawHandle, WimApi, CALLBACK_ABORT, CALLBACK_SUCCESS,
    INVALID_CALLBACK_VALUE,
};
use dashmap::DashMap;
use log::{debug, error, info, trace, warn};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Identifies one registered handler
pub type CallbackToken = usize;

/// What the native layer should do after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Abort,
}

impl Disposition {
    /// Native return value for this disposition
    pub fn as_native(self) -> u32 {
        match self {
            Disposition::Continue => CALLBACK_SUCCESS,
            Disposition::Abort => CALLBACK_ABORT,
        }
    }
}

/// Handler registered for one operation
struct CallbackState {
    handler: Mutex<ProgressHandler>,
}

/// Token -> handler table
pub struct CallbackRegistry {
    next_token: AtomicUsize,
    handlers: DashMap<CallbackToken, Arc<CallbackState>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            next_token: AtomicUsize::new(0),
            handlers: DashMap::new(),
        }
    }

    /// Store a handler and return its token (never zero, never reused)
    pub fn register(&self, handler: ProgressHandler) -> CallbackToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        self.handlers.insert(
            token,
            Arc::new(CallbackState {
                handler: Mutex::new(handler),
            }),
        );
        trace!("Registered progress handler token={}", token);
        token
    }

    /// Drop a handler; unknown tokens are ignored
    pub fn unregister(&self, token: CallbackToken) {
        if self.handlers.remove(&token).is_some() {
            trace!("Released progress handler token={}", token);
        }
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Is this token still registered
    pub fn contains(&self, token: CallbackToken) -> bool {
        self.handlers.contains_key(&token)
    }

    /// Route one native message to the handler registered under `token`.
    ///
    /// Unknown tokens (late messages after release) continue. A handler
    /// that panics aborts the operation instead of unwinding into native code.
    pub fn dispatch(&self, token: CallbackToken, event: ProgressEvent) -> Disposition {
        // Clone out of the map so the shard lock is not held while the
        // handler runs; handlers may register nested operations.
        let state = match self.handlers.get(&token) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                trace!(
                    "Message 0x{:X} for released token={} ignored",
                    event.message_id,
                    token
                );
                return Disposition::Continue;
            }
        };

        let mut handler = state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match catch_unwind(AssertUnwindSafe(|| (*handler)(&event))) {
            Ok(true) => {
                debug!("Progress handler token={} requested abort", token);
                Disposition::Abort
            }
            Ok(false) => Disposition::Continue,
            Err(_) => {
                error!("Progress handler token={} panicked; aborting operation", token);
                Disposition::Abort
            }
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide registry used by [`message_callback`]
pub fn registry() -> &'static CallbackRegistry {
    static REGISTRY: OnceLock<CallbackRegistry> = OnceLock::new();
    REGISTRY.get_or_init(CallbackRegistry::new)
}

/// The one function pointer ever handed to the native layer
pub extern "system" fn message_callback(
    message_id: u32,
    wparam: usize,
    lparam: usize,
    user_data: *mut c_void,
) -> u32 {
    let event = ProgressEvent::new(message_id, wparam, lparam);
    registry().dispatch(user_data as CallbackToken, event).as_native()
}

/// A handler registration for the duration of one native call.
///
/// Dropping it first detaches [`message_callback`] from the native handle
/// it was attached to, then releases the token. Detach failures are logged
/// and never override the operation's own result.
pub(crate) struct CallbackScope<'a> {
    api: &'a dyn WimApi,
    token: CallbackToken,
    attached: Option<RawHandle>,
}

impl<'a> CallbackScope<'a> {
    /// Take a token for `handler` without touching the native layer yet
    pub(crate) fn new(api: &'a dyn WimApi, handler: ProgressHandler) -> Self {
        Self {
            api,
            token: registry().register(handler),
            attached: None,
        }
    }

    pub(crate) fn token(&self) -> CallbackToken {
        self.token
    }

    fn try_attach(&self, handle: RawHandle) -> bool {
        self.api
            .register_message_callback(handle, message_callback, self.token)
            != INVALID_CALLBACK_VALUE
    }

    /// Attach the shared callback to `handle`
    pub(crate) fn attach(&mut self, handle: RawHandle) -> Result<()> {
        if self.try_attach(handle) {
            debug!("Attached progress callback token={} to {:#x}", self.token, handle);
            self.attached = Some(handle);
            return Ok(());
        }
        Err(WimError::RegisterFailed(self.registration_error()))
    }

    /// Attach to the image handle; if the library refuses, attach to the
    /// owning container instead.
    ///
    /// Some library versions only accept callbacks on the container handle.
    /// This is a single compatibility step, not a retry loop.
    pub(crate) fn attach_with_container_fallback(
        &mut self,
        image: RawHandle,
        container: RawHandle,
    ) -> Result<()> {
        if self.try_attach(image) {
            debug!("Attached progress callback token={} to image {:#x}", self.token, image);
            self.attached = Some(image);
            return Ok(());
        }

        let first_failure = self.registration_error();
        if is_invalid_handle(container) || container == image {
            return Err(WimError::RegisterFailed(first_failure));
        }

        info!(
            "Image handle rejected callback registration ({}); using container handle",
            first_failure
        );
        self.attach(container)
    }

    fn registration_error(&self) -> NativeError {
        last_error(self.api, "WIMRegisterMessageCallback")
    }
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.attached.take() {
            if !self.api.unregister_message_callback(handle, message_callback) {
                let err = last_error(self.api, "WIMUnregisterMessageCallback");
                warn!(
                    "Failed to detach progress callback token={} from {:#x}: {}",
                    self.token, handle, err
                );
            } else {
                debug!("Detached progress callback token={} from {:#x}", self.token, handle);
            }
        }
        registry().unregister(self.token);
    }
}
