//! Virtual file trees produced by archive extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::Result;
use crate::util::normalize_archive_path;

/// Read-only view of an extracted package, addressed by `/`-separated paths
/// relative to the archive root.
pub trait FileTree {
    /// Read a file's bytes, or `None` if it does not exist or is unreadable.
    fn read_file(&self, path: &str) -> Option<Vec<u8>>;

    /// All file paths (directories excluded), sorted.
    fn file_paths(&self) -> Vec<String>;

    fn contains_file(&self, path: &str) -> bool {
        self.read_file(path).is_some()
    }
}

/// In-memory file tree.
#[derive(Debug, Clone, Default)]
pub struct VirtualTree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl VirtualTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating its parent directories.
    pub fn insert_file(&mut self, path: impl Into<String>, data: Vec<u8>) {
        let path = path.into();
        let mut dir = path.as_str();
        while let Some(pos) = dir.rfind('/') {
            dir = &dir[..pos];
            if !self.dirs.insert(dir.to_string()) {
                break;
            }
        }
        self.files.insert(path, data);
    }

    /// Add a directory (trailing slash optional).
    pub fn insert_dir(&mut self, path: &str) {
        let path = path.trim_end_matches('/');
        if !path.is_empty() {
            self.dirs.insert(path.to_string());
        }
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.contains(path.trim_end_matches('/'))
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over `(path, bytes)` pairs in path order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FileTree for VirtualTree {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        self.get(path).map(<[u8]>::to_vec)
    }

    fn file_paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

/// File tree rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let normalized = normalize_archive_path(path);
        if normalized.is_empty() {
            return None;
        }
        Some(self.root.join(normalized))
    }
}

impl FileTree for DirTree {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let target = self.resolve(path)?;
        if !target.is_file() {
            return None;
        }
        fs::read(target).ok()
    }

    fn file_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(&self.root).ok()?;
                Some(rel.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        paths.sort();
        paths
    }
}

/// An archive extracted into a temporary directory.
///
/// The directory and everything in it is removed when the value is dropped,
/// and also when extraction fails part-way through.
#[derive(Debug)]
pub struct ScratchTree {
    tree: DirTree,
    dir: TempDir,
}

impl ScratchTree {
    /// Extract `data` into a fresh scratch directory.
    pub fn extract(data: &[u8]) -> Result<Self> {
        Self::from_dir(data, tempfile::Builder::new().prefix("vellum-").tempdir()?)
    }

    /// Extract `data` into a fresh scratch directory beneath `root`.
    pub fn extract_in(data: &[u8], root: &Path) -> Result<Self> {
        Self::from_dir(data, tempfile::Builder::new().prefix("vellum-").tempdir_in(root)?)
    }

    fn from_dir(data: &[u8], dir: TempDir) -> Result<Self> {
        let written = super::extract_to_dir(data, dir.path())?;
        debug!("zip: wrote {} files to {}", written, dir.path().display());

        Ok(Self {
            tree: DirTree::new(dir.path()),
            dir,
        })
    }

    /// Location of the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl FileTree for ScratchTree {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.read_file(path)
    }

    fn file_paths(&self) -> Vec<String> {
        self.tree.file_paths()
    }
}
