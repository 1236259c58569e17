//! Test Database Module
//!
//! Test support for the WIM interop layer that runs without `wimgapi.dll`
//! installed and without elevated privileges.
//!
//! # Features
//!
//! - **Mock library**: [`MockWim`], an in-memory [`WimApi`](crate::native::WimApi)
//!   that stores captured trees, applies them back to disk, sends progress
//!   messages through registered callbacks and counts every native call
//! - **Failure simulation**: [`MockConfig`] switches for rejected
//!   registration, failing close/apply/capture, malformed metadata and a
//!   missing release entry point
//! - **Tree snapshots**: [`TreeSnapshot`] and [`compare_trees`] for
//!   checking that an applied image matches its source
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wimgapi::core::container::ContainerHandle;
//! use wimgapi::core::options::{CaptureOptions, OpenOptions};
//! use wimgapi::testdb::{write_sample_tree, MockWim};
//!
//! let mock = Arc::new(MockWim::new());
//! let source = tempfile::tempdir()?;
//! write_sample_tree(source.path())?;
//!
//! let container = ContainerHandle::open(mock.clone(), "test.wim", OpenOptions::create())?;
//! let image = container.capture(source.path(), CaptureOptions::new())?;
//! println!("{:?}", image.info()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod mock_native;
pub mod tree;

pub use mock_native::{MockConfig, MockEntry, MockImage, MockWim};
pub use tree::{
    compare_trees, compute_file_hash, hash_to_hex, write_sample_tree, Sha256Hash, TreeDifference,
    TreeEntry, TreeSnapshot,
};

#[cfg(test)]
mod integration;
