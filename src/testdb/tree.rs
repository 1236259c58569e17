//! Directory tree snapshots for round-trip checks
//!
//! A [`TreeSnapshot`] records every path under a root together with a
//! SHA-256 of each file, so a captured tree and its applied copy can be
//! compared structurally and by content.

use crate::core::error::Result;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Buffer size for streaming file hashes (64 KB)
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 digest
pub type Sha256Hash = [u8; 32];

/// One path in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Directory,
    File { size: u64, hash: Sha256Hash },
}

/// How two snapshots disagree about one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDifference {
    /// Present in the expected tree only
    Missing(PathBuf),
    /// Present in the actual tree only
    Unexpected(PathBuf),
    /// Present in both with different kind or content
    Changed(PathBuf),
}

/// Relative path -> entry, for every path below a root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    entries: BTreeMap<PathBuf, TreeEntry>,
}

impl TreeSnapshot {
    /// Walk `root` and hash every file below it. The root itself is not recorded.
    pub fn capture(root: &Path) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                .to_path_buf();

            let node = if entry.file_type().is_dir() {
                TreeEntry::Directory
            } else {
                TreeEntry::File {
                    size: entry.metadata().map_err(io::Error::from)?.len(),
                    hash: compute_file_hash(entry.path())?,
                }
            };
            entries.insert(relative, node);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative: impl AsRef<Path>) -> Option<&TreeEntry> {
        self.entries.get(relative.as_ref())
    }

    /// Number of regular files
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, TreeEntry::File { .. }))
            .count()
    }

    /// Every disagreement between `self` (expected) and `actual`, in path order
    pub fn diff(&self, actual: &TreeSnapshot) -> Vec<TreeDifference> {
        let mut differences = Vec::new();

        for (path, expected) in &self.entries {
            match actual.entries.get(path) {
                None => differences.push(TreeDifference::Missing(path.clone())),
                Some(found) if found != expected => {
                    differences.push(TreeDifference::Changed(path.clone()))
                }
                Some(_) => {}
            }
        }
        for path in actual.entries.keys() {
            if !self.entries.contains_key(path) {
                differences.push(TreeDifference::Unexpected(path.clone()));
            }
        }

        differences.sort_by(|a, b| difference_path(a).cmp(difference_path(b)));
        differences
    }
}

fn difference_path(difference: &TreeDifference) -> &Path {
    match difference {
        TreeDifference::Missing(p) | TreeDifference::Unexpected(p) | TreeDifference::Changed(p) => p,
    }
}

/// Snapshot both roots and list their differences
pub fn compare_trees(expected: &Path, actual: &Path) -> Result<Vec<TreeDifference>> {
    Ok(TreeSnapshot::capture(expected)?.diff(&TreeSnapshot::capture(actual)?))
}

/// Compute SHA256 hash of a file using streaming
pub fn compute_file_hash(path: &Path) -> Result<Sha256Hash> {
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    Ok(hash)
}

/// Convert a hash to a hexadecimal string
pub fn hash_to_hex(hash: &Sha256Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write a small mixed tree under `root`: nested folders, an empty file,
/// an empty directory and a non-ASCII name.
pub fn write_sample_tree(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("docs").join("nested"))?;
    fs::create_dir_all(root.join("empty"))?;

    fs::write(root.join("readme.txt"), b"sample tree for image round trips\n")?;
    fs::write(root.join("docs").join("notes.md"), b"# Notes\n\n- one\n- two\n")?;
    fs::write(
        root.join("docs").join("nested").join("data.bin"),
        (0u8..=255).cycle().take(4096).collect::<Vec<u8>>(),
    )?;
    fs::write(root.join("docs").join("zero.dat"), b"")?;
    fs::write(root.join("caf\u{e9}.txt"), "unicode name\n".as_bytes())?;

    Ok(())
}
