//! String key-value persistence with typed JSON helpers.
//!
//! Values are stored as JSON strings under fixed keys, so the on-disk file is a
//! flat JSON object of string values.

use serde::{Serialize, de::DeserializeOwned};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::TVError;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), TVError>;

    /// Read `key` and decode it as JSON. `Ok(None)` when the key is absent.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TVError>
    where
        Self: Sized,
    {
        match self.get(key) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), TVError>
    where
        Self: Sized,
    {
        let json = serde_json::to_string(value)?;
        self.set(key, &json)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TVError> {
        (**self).set(key, value)
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    memory: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.memory.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TVError> {
        self.memory
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by one JSON file, rewritten atomically on every `set`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file content. A missing or unreadable file counts as empty.
    fn read_all(&self) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Cannot read {}: {e}", self.path.display());
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring corrupt state file {}: {e}", self.path.display());
            BTreeMap::new()
        })
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), TVError> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(entries)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| TVError::StorageFailed(e.to_string()))?;
        debug!("Wrote {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }
}

/// A [`FileStore`] at `path`, or a [`MemoryStore`] when the file cannot live there.
pub fn open_or_memory(path: impl Into<PathBuf>) -> Box<dyn KeyValueStore> {
    let store = FileStore::new(path);
    if store.path().is_dir() {
        warn!("{} is a directory, column layout stays in memory", store.path().display());
        return Box::new(MemoryStore::new());
    }
    match fs::create_dir_all(store.dir()) {
        Ok(()) => {
            debug!("Column layout is kept in {}", store.path().display());
            Box::new(store)
        }
        Err(e) => {
            warn!(
                "Cannot create {}: {e}, column layout stays in memory",
                store.dir().display()
            );
            Box::new(MemoryStore::new())
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TVError> {
        let mut entries = self.read_all();
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_json_helpers() {
        let store = MemoryStore::new();
        assert_eq!(store.get_json::<Vec<u16>>("widths").unwrap(), None);
        store.set_json("widths", &vec![1u16, 2, 3]).unwrap();
        assert_eq!(store.get("widths").as_deref(), Some("[1,2,3]"));
        assert_eq!(store.get_json::<Vec<u16>>("widths").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn get_json_reports_corrupt_value() {
        let store = MemoryStore::new();
        store.set("widths", "{not json").unwrap();
        assert!(store.get_json::<Vec<u16>>("widths").is_err());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        FileStore::new(&path).set("columnState", "[]").unwrap();
        FileStore::new(&path).set("columnWidths", "{}").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("columnState").as_deref(), Some("[]"));
        assert_eq!(reopened.get("columnWidths").as_deref(), Some("{}"));
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "garbage{").unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get("columnState"), None);
        store.set("columnState", "[]").unwrap();
        assert_eq!(store.get("columnState").as_deref(), Some("[]"));
    }

    #[test]
    fn unusable_path_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store = open_or_memory(blocker.join("state.json"));
        store.set("columnState", "[]").unwrap();
        assert_eq!(store.get("columnState").as_deref(), Some("[]"));
        assert!(!blocker.join("state.json").exists());

        let store = open_or_memory(dir.path());
        store.set("columnWidths", "{}").unwrap();
        assert_eq!(store.get("columnWidths").as_deref(), Some("{}"));
    }

    #[test]
    fn usable_path_gets_a_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        open_or_memory(&path).set("columnState", "[]").unwrap();
        assert_eq!(FileStore::new(&path).get("columnState").as_deref(), Some("[]"));
    }

    #[test]
    fn boxed_store_forwards() {
        let store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        store.set("k", "v").unwrap();
        assert_eq!(store.get_json::<String>("k").ok().flatten(), None);
        store.set_json("k", &"v".to_string()).unwrap();
        assert_eq!(store.get_json::<String>("k").unwrap().as_deref(), Some("v"));
    }
}
