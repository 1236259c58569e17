//! Native imaging library boundary
//!
//! - `traits` - The [`WimApi`] trait and raw constants
//! - `wimgapi` - The `wimgapi.dll` backend (Windows only)

pub mod traits;

#[cfg(windows)]
pub mod wimgapi;

pub use traits::{MessageCallback, NativeBuffer, RawHandle, WimApi};

#[cfg(windows)]
pub use wimgapi::Wimgapi;
