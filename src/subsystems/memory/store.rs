//! Persistent namespace store. One UTF-8 JSON file per namespace.
//!
//! A namespace is loaded once at startup and held in memory for the life of
//! the process. Every mutation rewrites the whole file: the new content goes
//! to `<file>.tmp` first and is then renamed over the original, so the file
//! on disk is always a complete snapshot.
//!
//! Storage failures never reach the caller. A missing or malformed file
//! loads as the namespace's empty default; a failed write is logged and the
//! in-memory mutation is kept. Durability is best-effort.
//!
//! Two shapes exist, matching the files the bot keeps:
//! - [`DictNamespace`]: `{ "key": value, ... }`
//! - [`ListNamespace`]: `[ value, ... ]`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::AppError;

// ── NamespaceFile ─────────────────────────────────────────────────────────────

/// Backing file of a namespace. Knows how to load and overwrite itself.
#[derive(Debug, Clone)]
struct NamespaceFile {
    name: String,
    path: PathBuf,
}

impl NamespaceFile {
    fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }

    /// Read and parse the file, falling back to `T::default()` on any error.
    fn load<T: DeserializeOwned + Default>(&self) -> T {
        match self.try_load() {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(namespace = %self.name, path = %self.path.display(), "namespace file absent, starting empty");
                T::default()
            }
            Err(e) => {
                warn!(namespace = %self.name, error = %e, "failed to load namespace, starting empty");
                T::default()
            }
        }
    }

    fn try_load<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| AppError::Storage(format!("cannot read {}: {e}", self.path.display())))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AppError::Storage(format!("malformed {}: {e}", self.path.display())))
    }

    /// Overwrite the file with `data` via a temp file + rename.
    fn write<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| AppError::Storage(format!("cannot create {}: {e}", dir.display())))?;
        }

        let body = serde_json::to_string_pretty(data)
            .map_err(|e| AppError::Storage(format!("serialise {}: {e}", self.name)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body)
            .map_err(|e| AppError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::Storage(format!("cannot replace {}: {e}", self.path.display()))
        })
    }

    /// [`write`](Self::write), with failures logged instead of returned.
    fn persist<T: Serialize + ?Sized>(&self, data: &T) {
        if let Err(e) = self.write(data) {
            warn!(namespace = %self.name, error = %e, "namespace write failed; in-memory state kept");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave the map half-updated
    // (all mutations are single calls), so poisoned data is still usable.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── DictNamespace ─────────────────────────────────────────────────────────────

/// Map-shaped namespace: string key → arbitrary JSON value.
///
/// The map lock is held across the file write, so the order of writes on
/// disk matches the order of mutations, and a `get` after `set` returns
/// sees the new value.
#[derive(Debug)]
pub struct DictNamespace {
    file: NamespaceFile,
    data: Mutex<Map<String, Value>>,
}

impl DictNamespace {
    /// Load `path` (or start empty) under the logical name `name`.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let file = NamespaceFile::new(name, path);
        let data = file.load::<Map<String, Value>>();
        debug!(namespace = %file.name, keys = data.len(), "namespace loaded");
        Self { file, data: Mutex::new(data) }
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Raw value for `key`. An explicit JSON `null` reads as absent.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        lock(&self.data).get(key).filter(|v| !v.is_null()).cloned()
    }

    /// Typed value for `key`; `None` when absent, null, or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(namespace = %self.file.name, key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.data).get(key).is_some_and(|v| !v.is_null())
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.data).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }

    /// Insert or replace `key`, then rewrite the file.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(namespace = %self.file.name, key, error = %e, "value not serialisable; set ignored");
                return;
            }
        };
        let mut data = lock(&self.data);
        data.insert(key.to_string(), value);
        self.file.persist(&*data);
    }

    /// Insert several keys with a single file write.
    pub fn extend<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut data = lock(&self.data);
        data.extend(entries);
        self.file.persist(&*data);
    }

    /// Read-modify-write of `key` under one hold of the map lock, then
    /// rewrite the file. `f` sees `Value::Null` for an absent key; a value
    /// left as null afterwards removes the key.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut data = lock(&self.data);
        let mut value = data.remove(key).unwrap_or(Value::Null);
        let out = f(&mut value);
        if !value.is_null() {
            data.insert(key.to_string(), value);
        }
        self.file.persist(&*data);
        out
    }

    /// Remove `key` if present and rewrite the file. Returns whether it was
    /// present; an absent key is a silent no-op.
    pub fn delete(&self, key: &str) -> bool {
        let mut data = lock(&self.data);
        if data.remove(key).is_none() {
            return false;
        }
        self.file.persist(&*data);
        true
    }
}

// ── ListNamespace ─────────────────────────────────────────────────────────────

/// List-shaped namespace of unique JSON values.
#[derive(Debug)]
pub struct ListNamespace {
    file: NamespaceFile,
    data: Mutex<Vec<Value>>,
}

impl ListNamespace {
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let file = NamespaceFile::new(name, path);
        let data = file.load::<Vec<Value>>();
        debug!(namespace = %file.name, items = data.len(), "namespace loaded");
        Self { file, data: Mutex::new(data) }
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn contains<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(v) => lock(&self.data).contains(&v),
            Err(_) => false,
        }
    }

    /// Append `value` unless already present. Returns whether it was added.
    pub fn append<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        let Ok(value) = serde_json::to_value(value) else {
            warn!(namespace = %self.file.name, "value not serialisable; append ignored");
            return false;
        };
        let mut data = lock(&self.data);
        if data.contains(&value) {
            return false;
        }
        data.push(value);
        self.file.persist(&*data);
        true
    }

    /// Remove `value` if present. Returns whether it was removed.
    pub fn remove<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        let Ok(value) = serde_json::to_value(value) else {
            return false;
        };
        let mut data = lock(&self.data);
        let before = data.len();
        data.retain(|v| v != &value);
        if data.len() == before {
            return false;
        }
        self.file.persist(&*data);
        true
    }

    pub fn clear(&self) {
        let mut data = lock(&self.data);
        data.clear();
        self.file.persist(&*data);
    }

    /// All items that deserialise as `T`; others are skipped.
    pub fn items<T: DeserializeOwned>(&self) -> Vec<T> {
        lock(&self.data)
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }
}
