//! Disk abstraction for listing table directories.
//!
//! - [`LocalDisk`] reads the local filesystem (`file://` URIs or plain paths)
//! - [`MemoryDisk`] is an in-memory tree for tests and local tooling
//!
//! Remote filesystems (HDFS, S3) implement [`Disk`] outside this crate.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{HiveError, Result};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the entry
    pub path: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    pub is_dir: bool,
}

impl DirEntry {
    /// Last path component.
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

/// Last component of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory listing backend.
///
/// Implementations are shared by listing workers and must be `Send + Sync`.
pub trait Disk: Debug + Send + Sync {
    /// List the direct children of `dir`. Missing directories are an error.
    fn list(&self, dir: &str) -> Result<Vec<DirEntry>>;

    /// Read a whole file. Used for small metadata files only.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Local filesystem disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDisk;

impl LocalDisk {
    fn local_path(uri: &str) -> &str {
        uri.strip_prefix("file://").unwrap_or(uri)
    }
}

impl Disk for LocalDisk {
    fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let path = Self::local_path(dir);
        let read_dir = std::fs::read_dir(path)
            .map_err(|e| HiveError::storage(format!("Failed to list {}: {}", dir, e)))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(DirEntry {
                path: format!("{}/{}", dir.trim_end_matches('/'), entry.file_name().to_string_lossy()),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_dir: metadata.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(Self::local_path(path))
            .map_err(|e| HiveError::storage(format!("Failed to read {}: {}", path, e)))
    }
}

/// In-memory disk.
///
/// Directories exist implicitly for every file added below them; empty
/// directories can be registered with [`MemoryDisk::add_dir`].
#[derive(Debug, Default)]
pub struct MemoryDisk {
    files: BTreeMap<String, u64>,
    contents: HashMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    failing: HashSet<String>,
    list_calls: AtomicUsize,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>, size: u64) {
        self.files.insert(path.into(), size);
    }

    /// Add a file with contents; its size is the content length.
    pub fn add_file_with_contents(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let contents = contents.into();
        self.files.insert(path.clone(), contents.len() as u64);
        self.contents.insert(path, contents);
    }

    pub fn add_dir(&mut self, path: impl Into<String>) {
        self.dirs.insert(path.into().trim_end_matches('/').to_string());
    }

    /// Make listing `dir` fail.
    pub fn fail_on(&mut self, dir: impl Into<String>) {
        self.failing.insert(dir.into().trim_end_matches('/').to_string());
    }

    /// Number of `list` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Disk for MemoryDisk {
    fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let dir = dir.trim_end_matches('/');
        if self.failing.contains(dir) {
            return Err(HiveError::storage(format!("I/O error listing {}", dir)));
        }

        let prefix = format!("{}/", dir);
        let mut entries: BTreeMap<String, DirEntry> = BTreeMap::new();
        let all_dirs = self.dirs.iter().map(|d| (d, None));
        let all_files = self.files.iter().map(|(p, size)| (p, Some(*size)));

        for (path, size) in all_files.chain(all_dirs) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    let child_path = format!("{}{}", prefix, child);
                    entries.entry(child_path.clone()).or_insert(DirEntry {
                        path: child_path,
                        size: 0,
                        is_dir: true,
                    });
                }
                None if !rest.is_empty() => {
                    entries.insert(
                        path.clone(),
                        DirEntry {
                            path: path.clone(),
                            size: size.unwrap_or(0),
                            is_dir: size.is_none(),
                        },
                    );
                }
                None => {}
            }
        }

        if entries.is_empty() && !self.dirs.contains(dir) {
            return Err(HiveError::storage(format!("Directory not found: {}", dir)));
        }
        Ok(entries.into_values().collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        if !self.files.contains_key(path) {
            return Err(HiveError::storage(format!("File not found: {}", path)));
        }
        Ok(self.contents.get(path).cloned().unwrap_or_default())
    }
}
