//! Blob storage adapters implementing [`StoragePort`].
//!
//! - [`FileStore`]: one file per key under `<root>/<namespace>/`.  Writes
//!   go to a temporary sibling first and are renamed into place, so a
//!   crash mid-write leaves the previous value intact.
//! - [`MemoryStore`]: `HashMap` backend for tests and no-hardware runs.
//!
//! Namespace isolation: each record family uses its own namespace and
//! names are restricted to `[A-Za-z0-9_-]`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::{StorageError, StoragePort};

fn check_name(name: &str) -> Result<(), StorageError> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::Io(format!("invalid storage name \"{name}\"")))
    }
}

fn io_err(e: &io::Error) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound
    } else {
        StorageError::Io(e.to_string())
    }
}

// ───────────────────────────────────────────────────────────────
// File-backed store
// ───────────────────────────────────────────────────────────────

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err(&e))?;
        info!("state store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, namespace: &str, key: &str) -> Result<PathBuf, StorageError> {
        check_name(namespace)?;
        check_name(key)?;
        Ok(self.root.join(namespace).join(format!("{key}.bin")))
    }
}

impl StoragePort for FileStore {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path(namespace, key)?;
        fs::read(path).map_err(|e| io_err(&e))
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path(namespace, key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(&e))?;
        }
        let tmp = path.with_extension("bin.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| io_err(&e))?;
        file.write_all(data).map_err(|e| io_err(&e))?;
        file.sync_all().map_err(|e| io_err(&e))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| io_err(&e))
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let path = self.path(namespace, key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&e)),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.path(namespace, key).is_ok_and(|p| p.is_file())
    }
}

// ───────────────────────────────────────────────────────────────
// In-memory store
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
    /// Fail every write; exercises save-retry paths in tests.
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }
}

impl StoragePort for MemoryStore {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.entries
            .get(&Self::composite_key(namespace, key))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_name(namespace)?;
        check_name(key)?;
        if self.fail_writes {
            return Err(StorageError::Io("write refused".into()));
        }
        self.entries
            .insert(Self::composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.entries.remove(&Self::composite_key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.entries.contains_key(&Self::composite_key(namespace, key))
    }
}
