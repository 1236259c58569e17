//! Image handle
//!
//! An [`ImageHandle`] is one image loaded from (or captured into) a
//! container. It remembers the container's raw handle because some library
//! versions only accept progress callbacks on the container.

use crate::core::callback::CallbackScope;
use crate::core::error::{last_error, Result, WimError};
use crate::core::handle::NativeHandle;
use crate::core::info::{decode_image_info_bytes, ImageInfo};
use crate::core::options::ApplyOptions;
use crate::native::traits::{NativeBuffer, RawHandle, WimApi};
use log::{debug, info, trace};
use std::path::Path;
use std::sync::Arc;

/// An open image inside a container
///
/// Operations and `close` may be called from any thread, but closing while
/// another thread is still inside `info` or `apply` on this handle is not
/// synchronized; finish or join those calls first.
#[derive(Debug)]
pub struct ImageHandle {
    handle: NativeHandle,
    container: RawHandle,
}

impl ImageHandle {
    pub(crate) fn new(api: Arc<dyn WimApi>, raw: RawHandle, container: RawHandle) -> Self {
        Self {
            handle: NativeHandle::new(api, raw, "image"),
            container,
        }
    }

    /// Raw native handle
    pub fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    /// Raw handle of the container this image came from
    pub fn container_raw(&self) -> RawHandle {
        self.container
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Close the image. Calling this again is a no-op success.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }

    /// Read and decode this image's metadata
    pub fn info(&self) -> Result<ImageInfo> {
        let raw = self.handle.live("WIMGetImageInformation")?;
        let api = self.handle.api();

        let buffer = api
            .image_information(raw)
            .ok_or_else(|| WimError::InfoFailed(last_error(api, "WIMGetImageInformation")))?;
        let blob = NativeBlob { api, buffer };

        decode_image_info_bytes(blob.bytes())
    }

    /// Apply this image to the directory at `target`.
    ///
    /// A progress handler in `options` is attached to the image handle, or
    /// to the container handle when the library refuses the image handle,
    /// and detached again before this returns. Returning `true` from the
    /// handler aborts the apply, which is then reported as a failure.
    pub fn apply(&self, target: impl AsRef<Path>, options: ApplyOptions) -> Result<()> {
        let target = target.as_ref();
        let raw = self.handle.live("WIMApplyImage")?;
        let api = self.handle.api();

        let mut scope = None;
        if let Some(handler) = options.progress {
            let mut registration = CallbackScope::new(api, handler);
            registration.attach_with_container_fallback(raw, self.container)?;
            trace!("Apply progress routed through token={}", registration.token());
            scope = Some(registration);
        }

        info!("Applying image {:#x} to {}", raw, target.display());
        if !api.apply_image(raw, target, options.flags) {
            return Err(WimError::ApplyFailed(last_error(api, "WIMApplyImage")));
        }
        drop(scope);

        debug!("Applied image {:#x}", raw);
        Ok(())
    }
}

/// Metadata blob owned by the native layer, released on drop
struct NativeBlob<'a> {
    api: &'a dyn WimApi,
    buffer: NativeBuffer,
}

impl NativeBlob<'_> {
    fn bytes(&self) -> &[u8] {
        if self.buffer.address == 0 || self.buffer.size == 0 {
            return &[];
        }
        // SAFETY: `WimApi` implementers keep the blob readable until
        // `free_memory`, which only runs when `self` is dropped.
        unsafe {
            std::slice::from_raw_parts(self.buffer.address as *const u8, self.buffer.size as usize)
        }
    }
}

impl Drop for NativeBlob<'_> {
    fn drop(&mut self) {
        if self.buffer.address != 0 && !self.api.free_memory(self.buffer.address) {
            trace!("No release entry point; metadata buffer left to the native layer");
        }
    }
}
