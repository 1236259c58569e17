//! Options passed through to the native layer
//!
//! Open flags are forwarded verbatim. Only two defaults are applied: a
//! zero access mask means read-only and a zero disposition means
//! open-existing.

use crate::core::progress::{decoded_handler, DecodedProgressEvent, ProgressEvent, ProgressHandler};
use crate::native::traits::{GENERIC_READ, GENERIC_WRITE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the container file is opened or created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationDisposition {
    /// Fail if the file exists
    CreateNew,
    /// Create, truncating any existing file
    CreateAlways,
    /// Fail if the file does not exist
    #[default]
    OpenExisting,
    /// Open, creating the file if needed
    OpenAlways,
}

impl CreationDisposition {
    /// `WIM_CREATE_NEW`
    pub const CREATE_NEW: u32 = 1;
    /// `WIM_CREATE_ALWAYS`
    pub const CREATE_ALWAYS: u32 = 2;
    /// `WIM_OPEN_EXISTING`
    pub const OPEN_EXISTING: u32 = 3;
    /// `WIM_OPEN_ALWAYS`
    pub const OPEN_ALWAYS: u32 = 4;

    pub fn as_raw(self) -> u32 {
        match self {
            CreationDisposition::CreateNew => Self::CREATE_NEW,
            CreationDisposition::CreateAlways => Self::CREATE_ALWAYS,
            CreationDisposition::OpenExisting => Self::OPEN_EXISTING,
            CreationDisposition::OpenAlways => Self::OPEN_ALWAYS,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            Self::CREATE_NEW => Some(CreationDisposition::CreateNew),
            Self::CREATE_ALWAYS => Some(CreationDisposition::CreateAlways),
            Self::OPEN_EXISTING => Some(CreationDisposition::OpenExisting),
            Self::OPEN_ALWAYS => Some(CreationDisposition::OpenAlways),
            _ => None,
        }
    }
}

/// Compression hint for newly created containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Xpress,
    Lzx,
    Lzms,
}

impl Compression {
    pub fn as_raw(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Xpress => 1,
            Compression::Lzx => 2,
            Compression::Lzms => 3,
        }
    }
}

/// Arguments for opening a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOptions {
    /// Access mask; 0 means `GENERIC_READ`
    pub desired_access: u32,
    /// Raw disposition; 0 means open-existing
    pub creation_disposition: u32,
    pub flags_and_attributes: u32,
    pub compression_type: u32,
}

impl OpenOptions {
    /// Read-only, open an existing container
    pub fn read() -> Self {
        Self::default().normalized()
    }

    /// Read-write, creating or truncating the container
    pub fn create() -> Self {
        Self {
            desired_access: GENERIC_READ | GENERIC_WRITE,
            creation_disposition: CreationDisposition::CREATE_ALWAYS,
            ..Self::default()
        }
    }

    pub fn access(mut self, desired_access: u32) -> Self {
        self.desired_access = desired_access;
        self
    }

    pub fn disposition(mut self, disposition: CreationDisposition) -> Self {
        self.creation_disposition = disposition.as_raw();
        self
    }

    pub fn flags(mut self, flags_and_attributes: u32) -> Self {
        self.flags_and_attributes = flags_and_attributes;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression_type = compression.as_raw();
        self
    }

    /// Fill in the defaults for unset fields; explicit values are kept
    pub fn normalized(mut self) -> Self {
        if self.desired_access == 0 {
            self.desired_access = GENERIC_READ;
        }
        if self.creation_disposition == 0 {
            self.creation_disposition = CreationDisposition::OPEN_EXISTING;
        }
        self
    }
}

/// Optional per-call progress handler shared by apply and capture
#[derive(Default)]
pub struct OperationOptions {
    /// Native operation flags, passed through
    pub flags: u32,
    /// Receives every raw message; return `true` to abort
    pub progress: Option<ProgressHandler>,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Receive raw messages
    pub fn with_progress<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&ProgressEvent) -> bool + Send + 'static,
    {
        self.progress = Some(Box::new(handler));
        self
    }

    /// Receive messages already run through a decoder owned by this call
    pub fn with_decoded_progress<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&DecodedProgressEvent) -> bool + Send + 'static,
    {
        self.progress = Some(decoded_handler(handler));
        self
    }
}

impl fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationOptions")
            .field("flags", &self.flags)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Options for [`ImageHandle::apply`](crate::core::image::ImageHandle::apply)
pub type ApplyOptions = OperationOptions;

/// Options for [`ContainerHandle::capture`](crate::core::container::ContainerHandle::capture)
pub type CaptureOptions = OperationOptions;
