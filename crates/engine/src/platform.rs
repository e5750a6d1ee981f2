//! Platform implementations of the capability traits.
//!
//! - [`FileStorage`]: JSON file on disk, survives restarts
//! - [`MemoryStorage`]: process-local map for tests and one-shot runs
//! - [`SystemClock`] / [`ManualClock`]: wall clock and a settable clock

use crate::traits::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

// ===========================================================================
// File storage – one JSON object per file
// ===========================================================================

pub struct FileStorage {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(StorageError::PermissionDenied(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", self.path.display(), e)))
    }

    fn store(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(map)?;
        std::fs::write(&self.path, data).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(format!("cannot write {}: {}", self.path.display(), e))
            }
            _ => StorageError::Io(e),
        })
    }

    fn guard(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _g = self.guard()?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _g = self.guard()?;
        let mut map = self.load().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        self.store(&map)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let _g = self.guard()?;
        let mut map = self.load().unwrap_or_default();
        if map.remove(key).is_some() {
            self.store(&map)?;
        }
        Ok(())
    }
}

// ===========================================================================
// Memory storage
// ===========================================================================

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// ===========================================================================
// Clocks
// ===========================================================================

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock whose time only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = t;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|t| *t).unwrap_or_else(|p| *p.into_inner())
    }
}
