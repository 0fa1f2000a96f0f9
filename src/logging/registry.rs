//! Per-module log files
//!
//! Owned by the writer thread only, so no locking. A module's directories
//! are created the first time the module is seen, then its file stays open.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::constants::LOG_FILE_EXTENSION;
use crate::error::{LogError, Result};

pub struct ModuleFileRegistry {
    root: PathBuf,
    files: HashMap<String, File>,
}

impl ModuleFileRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<seg>/<seg>/<last>.log` for a `/`-separated module path
    pub fn path_for(&self, module: &str) -> PathBuf {
        module_path(&self.root, module)
    }

    /// Open handle for `module`, creating directories and file on first use.
    ///
    /// A failed open is not cached; the next message retries.
    pub fn file_for(&mut self, module: &str) -> Result<&mut File> {
        match self.files.entry(module.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = open_module_file(&self.root, module)?;
                Ok(entry.insert(file))
            }
        }
    }

    /// Number of modules with an open file
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Reject module names that would resolve outside the log directory
pub fn validate_module_name(module: &str) -> Result<()> {
    if module.is_empty() {
        return Err(LogError::EmptyModule);
    }
    let escapes = module
        .split('/')
        .any(|segment| segment == "." || segment == ".." || segment.contains('\\'));
    if escapes {
        return Err(LogError::InvalidModule {
            module: module.to_string(),
        });
    }
    Ok(())
}

pub(super) fn module_path(root: &Path, module: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    let mut segments = module.split('/').filter(|s| !s.is_empty()).peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_some() {
            path.push(segment);
        } else {
            path.push(format!("{}.{}", segment, LOG_FILE_EXTENSION));
        }
    }
    path
}

pub(super) fn open_module_file(root: &Path, module: &str) -> Result<File> {
    let path = module_path(root, module);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LogError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    open_append(&path)
}

/// Open (or create) a file for appending
pub fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}
