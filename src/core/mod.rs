//! Core functionality module
//!
//! Safe handles and progress plumbing on top of the raw [`WimApi`]
//! entry points.
//!
//! # Submodules
//!
//! - `callback` - Token registry behind the single native message callback
//! - `config` - Configuration loading, saving, and management
//! - `container` - Container handle: open, enumerate, load, capture
//! - `error` - Error types and result aliases
//! - `image` - Image handle: metadata and apply
//! - `info` - Image metadata decoding
//! - `options` - Open and per-operation options
//! - `progress` - Message kinds and the progress state machine
//!
//! [`WimApi`]: crate::native::traits::WimApi

pub mod callback;
pub mod config;
pub mod container;
pub mod error;
pub(crate) mod handle;
pub mod image;
pub mod info;
pub mod options;
pub mod progress;
