//! Flat key-value settings storage, the local equivalent of the extension
//! storage area.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("settings file {path} does not hold a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("settings store lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub type StoredValues = BTreeMap<String, Value>;

pub trait SettingsStore: Send + Sync {
    /// Returns the stored values for the requested keys; absent keys are omitted.
    fn get(&self, keys: &[&str]) -> StorageResult<StoredValues>;
    /// Merges `values` into the store.
    fn set(&self, values: StoredValues) -> StorageResult<()>;
}

/// Settings kept in a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<Map<String, Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::NotAnObject {
                path: self.path.clone(),
            }),
        }
    }

    fn write_all(&self, map: Map<String, Value>) -> StorageResult<()> {
        let io_error = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(&Value::Object(map))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(io_error)?;
        fs::rename(&staging, &self.path).map_err(io_error)
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> StorageResult<StoredValues> {
        let mut all = self.read_all()?;
        Ok(keys
            .iter()
            .filter_map(|key| all.remove(*key).map(|value| (key.to_string(), value)))
            .collect())
    }

    fn set(&self, values: StoredValues) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut all = self.read_all()?;
        all.extend(values);
        self.write_all(all)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<StoredValues>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: Mutex::new(
                values
                    .into_iter()
                    .map(|(key, value)| (key.into(), value))
                    .collect(),
            ),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> StorageResult<StoredValues> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                values
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect())
    }

    fn set(&self, values: StoredValues) -> StorageResult<()> {
        let mut stored = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        stored.extend(values);
        Ok(())
    }
}
