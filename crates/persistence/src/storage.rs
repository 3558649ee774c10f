use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("durable storage unavailable")]
    Unavailable,
    #[error("storage error: {0}")]
    Io(String),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// String key/value storage holding snapshot blobs.
pub trait SnapshotStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Returns whether something was removed.
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    items: BTreeMap<String, String>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut items = BTreeMap::new();
        items.insert(key.into(), value.into());
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl SnapshotStorage for InMemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.items.remove(key).is_some())
    }
}

/// One `<key>.json` file per key under a directory. Native targets only.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl SnapshotStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{SnapshotStorage, StorageError};
    use wasm_bindgen::JsValue;

    /// `window.localStorage`.
    #[derive(Debug)]
    pub struct LocalStorageBackend {
        storage: web_sys::Storage,
    }

    impl LocalStorageBackend {
        pub fn new() -> Result<Self, StorageError> {
            Ok(Self {
                storage: window_local_storage()?,
            })
        }
    }

    impl SnapshotStorage for LocalStorageBackend {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.storage
                .get_item(key)
                .map_err(|e| js_error("get_item", e))
        }

        fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.storage
                .set_item(key, value)
                .map_err(|e| js_error("set_item", e))
        }

        fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
            let existed = self.read(key)?.is_some();
            self.storage
                .remove_item(key)
                .map_err(|e| js_error("remove_item", e))?;
            Ok(existed)
        }
    }

    fn js_error(op: &str, err: JsValue) -> StorageError {
        StorageError::Io(format!("{op} failed: {err:?}"))
    }

    fn window_local_storage() -> Result<web_sys::Storage, StorageError> {
        let win = web_sys::window().ok_or(StorageError::Unavailable)?;
        win.local_storage()
            .map_err(|e| js_error("localStorage", e))?
            .ok_or(StorageError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageBackend;

/// Placeholder so native builds can name the browser backend; it is never available.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageBackend {
    _private: (),
}

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageBackend {
    pub fn new() -> Result<Self, StorageError> {
        Err(StorageError::Unavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SnapshotStorage for LocalStorageBackend {
    fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn write(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove(&mut self, _key: &str) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable)
    }
}
