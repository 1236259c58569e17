//! Container handle
//!
//! A [`ContainerHandle`] owns one open image archive. Images are loaded
//! from it by 1-based index or captured into it from a directory; each
//! resulting [`ImageHandle`] keeps a copy of the container's raw handle
//! but does not borrow the container, so closing order is left to the
//! caller.

use crate::core::callback::CallbackScope;
use crate::core::config::Config;
use crate::core::error::{last_error, map_error, Result, WimError};
use crate::core::handle::NativeHandle;
use crate::core::image::ImageHandle;
use crate::core::info::ImageInfo;
use crate::core::options::{CaptureOptions, OpenOptions};
use crate::native::traits::{is_invalid_handle, RawHandle, WimApi};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// An open image container
///
/// As with [`ImageHandle`], do not close a container while another thread
/// is still inside one of its operations.
#[derive(Debug)]
pub struct ContainerHandle {
    handle: NativeHandle,
}

impl ContainerHandle {
    /// Open or create a container at `path`.
    ///
    /// Unset access and disposition default to read-only / open-existing;
    /// everything else goes to the native layer untouched.
    pub fn open(api: Arc<dyn WimApi>, path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let options = options.normalized();

        let raw = api.create_file(
            path,
            options.desired_access,
            options.creation_disposition,
            options.flags_and_attributes,
            options.compression_type,
        );
        if is_invalid_handle(raw) {
            return Err(WimError::OpenFailed(last_error(api.as_ref(), "WIMCreateFile")));
        }

        info!("Opened container {}", path.display());
        Ok(Self {
            handle: NativeHandle::new(api, raw, "container"),
        })
    }

    /// Open with the `[open]` defaults of `config`, then point scratch files
    /// at `[temp] directory` when one is configured.
    pub fn open_with_config(
        api: Arc<dyn WimApi>,
        path: impl AsRef<Path>,
        config: &Config,
    ) -> Result<Self> {
        let container = Self::open(api, path, config.open.to_options())?;
        if let Some(dir) = &config.temp.directory {
            container.set_temporary_path(dir)?;
        }
        Ok(container)
    }

    /// Raw native handle
    pub fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Close the container. Calling this again is a no-op success.
    ///
    /// Images loaded from this container are not closed automatically.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }

    /// Number of images in the container.
    ///
    /// Zero is only an error when the native layer also reports an error code.
    pub fn image_count(&self) -> Result<u32> {
        let raw = self.handle.live("WIMGetImageCount")?;
        let api = self.handle.api();

        let count = api.image_count(raw);
        if count == 0 {
            let code = api.last_error();
            if code != 0 {
                return Err(WimError::CountFailed(map_error(api, "WIMGetImageCount", code)));
            }
        }
        Ok(count)
    }

    /// Load the image at 1-based `index`
    pub fn load_image(&self, index: i64) -> Result<ImageHandle> {
        let native_index = match u32::try_from(index) {
            Ok(i) if i >= 1 => i,
            _ => return Err(WimError::InvalidIndex(index)),
        };

        let raw = self.handle.live("WIMLoadImage")?;
        let image = self.handle.api().load_image(raw, native_index);
        if is_invalid_handle(image) {
            return Err(WimError::LoadFailed(last_error(
                self.handle.api(),
                "WIMLoadImage",
            )));
        }

        debug!("Loaded image {} from container {:#x}", index, raw);
        Ok(ImageHandle::new(self.handle.shared_api(), image, raw))
    }

    /// Capture the directory tree at `source` into a new image.
    ///
    /// A progress handler in `options` is attached to the container handle
    /// for the duration of the call.
    pub fn capture(&self, source: impl AsRef<Path>, options: CaptureOptions) -> Result<ImageHandle> {
        let source = source.as_ref();
        let raw = self.handle.live("WIMCaptureImage")?;
        let api = self.handle.api();

        let mut scope = None;
        if let Some(handler) = options.progress {
            let mut registration = CallbackScope::new(api, handler);
            registration.attach(raw)?;
            scope = Some(registration);
        }

        info!("Capturing {}", source.display());
        let image = api.capture_image(raw, source, options.flags);
        if is_invalid_handle(image) {
            return Err(WimError::CaptureFailed(last_error(api, "WIMCaptureImage")));
        }
        drop(scope);

        Ok(ImageHandle::new(self.handle.shared_api(), image, raw))
    }

    /// Direct the native layer's scratch files to `path`.
    ///
    /// Call before apply/capture for predictable temp-file placement.
    pub fn set_temporary_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = self.handle.live("WIMSetTemporaryPath")?;
        let api = self.handle.api();

        if !api.set_temporary_path(raw, path) {
            return Err(WimError::TemporaryPathFailed(last_error(
                api,
                "WIMSetTemporaryPath",
            )));
        }
        debug!("Temporary path for {:#x} set to {}", raw, path.display());
        Ok(())
    }

    /// Metadata of every image, in index order.
    ///
    /// Each image is loaded, described and closed in turn. The first failure
    /// aborts the whole listing; no partial list is returned and the image
    /// being inspected is still closed.
    pub fn images(&self) -> Result<Vec<ImageInfo>> {
        let count = self.image_count()?;
        let mut images = Vec::with_capacity(count as usize);

        for index in 1..=i64::from(count) {
            let image = self.load_image(index)?;
            let info = image.info();
            let closed = image.close();
            images.push(info?);
            closed?;
        }

        Ok(images)
    }
}
