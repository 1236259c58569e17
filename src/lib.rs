//! WIM Interop Library
//!
//! Safe handles, callback dispatch and progress decoding on top of the
//! Windows Imaging API (`wimgapi.dll`): open or create image containers,
//! enumerate and describe their images, capture a directory into a new
//! image and apply an image back onto disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`core`] - Container and image handles, the callback registry, the
//!   progress state machine, metadata decoding, configuration and errors
//! - [`native`] - The [`WimApi`](native::WimApi) trait every backend
//!   implements, plus the `wimgapi.dll` backend on Windows
//! - [`testdb`] - An in-memory mock library and tree snapshots for testing
//!   without the native library
//!
//! # Example Usage
//!
//! ```rust,no_run
//! # #[cfg(windows)]
//! # fn main() -> wimgapi::core::error::Result<()> {
//! use std::sync::Arc;
//! use wimgapi::core::config::Config;
//! use wimgapi::core::container::ContainerHandle;
//! use wimgapi::core::options::ApplyOptions;
//! use wimgapi::core::progress::log_progress;
//! use wimgapi::native::Wimgapi;
//!
//! let config = Config::load_default().unwrap_or_default();
//! let api = Arc::new(Wimgapi::load_configured(&config.library)?);
//!
//! let container = ContainerHandle::open_with_config(api, "C:/images/install.wim", &config)?;
//! for info in container.images()? {
//!     println!("{}: {} ({})", info.index, info.name, info.architecture);
//! }
//!
//! let image = container.load_image(1)?;
//! let options = ApplyOptions::new()
//!     .with_decoded_progress(log_progress("apply", config.progress.show_noisy));
//! image.apply("D:/mount", options)?;
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! # Progress
//!
//! The native layer accepts a single callback function. Each apply or
//! capture that asks for progress gets its own handler, routed by a token
//! passed as the callback's user data, so concurrent operations never see
//! each other's messages. Handlers return `true` to abort.
//!
//! # Platform Support
//!
//! The handle, callback and progress code builds everywhere and is tested
//! against [`testdb::MockWim`]. The real backend is Windows only.

pub mod core;
pub mod native;
pub mod testdb;

pub use crate::core::container::ContainerHandle;
pub use crate::core::error::{NativeError, Result, WimError};
pub use crate::core::image::ImageHandle;
pub use crate::core::info::ImageInfo;
pub use crate::core::options::{ApplyOptions, CaptureOptions, CreationDisposition, OpenOptions};
pub use crate::core::progress::{DecodedProgressEvent, ProgressDecoder, ProgressEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
