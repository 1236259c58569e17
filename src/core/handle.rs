//! Ownership of one native handle
//!
//! A [`NativeHandle`] is the only owner of its raw value. Closing is
//! idempotent: the closed flag is checked and set under the handle's own
//! lock, so concurrent closes issue exactly one native close call. A close
//! that fails leaves the handle open so it can be retried.
//!
//! The closed flag is checked when an operation starts and is not held
//! while the native call runs. Closing a handle from one thread while
//! another thread is still inside an operation on it is the caller's
//! responsibility to avoid; the flag only guarantees that calls started
//! after `close` returned never reach the native layer.

use crate::core::error::{last_error, Result, WimError};
use crate::native::traits::{RawHandle, WimApi};
use log::{debug, warn};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) struct NativeHandle {
    api: Arc<dyn WimApi>,
    raw: RawHandle,
    kind: &'static str,
    closed: Mutex<bool>,
}

impl NativeHandle {
    pub(crate) fn new(api: Arc<dyn WimApi>, raw: RawHandle, kind: &'static str) -> Self {
        debug!("Opened {} handle {:#x}", kind, raw);
        Self {
            api,
            raw,
            kind,
            closed: Mutex::new(false),
        }
    }

    pub(crate) fn api(&self) -> &dyn WimApi {
        self.api.as_ref()
    }

    pub(crate) fn shared_api(&self) -> Arc<dyn WimApi> {
        Arc::clone(&self.api)
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The raw value for a native call, or `Closed` once the handle is gone
    pub(crate) fn live(&self, operation: &'static str) -> Result<RawHandle> {
        if self.is_closed() {
            return Err(WimError::Closed { operation });
        }
        Ok(self.raw)
    }

    pub(crate) fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Ok(());
        }

        if !self.api.close_handle(self.raw) {
            return Err(WimError::CloseFailed(last_error(
                self.api.as_ref(),
                "WIMCloseHandle",
            )));
        }

        *closed = true;
        debug!("Closed {} handle {:#x}", self.kind, self.raw);
        Ok(())
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &self.kind)
            .field("raw", &format_args!("{:#x}", self.raw))
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Leaking {} handle {:#x}: {}", self.kind, self.raw, e);
        }
    }
}
