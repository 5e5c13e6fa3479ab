//! Secure key-value storage for the credential triple.
//!
//! The session persists exactly three keys: access token, refresh token and
//! the serialized user. They are written together and deleted together.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "authUser";

/// All keys owned by the session
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Errors from a secure store backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("failed to read secure store: {0}")]
    Read(String),

    #[error("failed to write secure store: {0}")]
    Write(String),

    #[error("secure store is corrupt: {0}")]
    Corrupt(String),
}

/// Trait abstracting the platform secure store
pub trait SecureStore: Send + Sync {
    /// Read one key
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write all entries in one step
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Delete all keys in one step; missing keys are not an error
    fn delete_many(&self, keys: &[&str]) -> Result<(), StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.delete_many(&[key])
    }
}

/// JSON-file backed store. Writes go to a temp file that is renamed over the
/// original, so a crash never leaves a half-written triple.
pub struct FileSecureStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents =
            fs::read_to_string(&self.path).map_err(|e| StoreError::Read(e.to_string()))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Write(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(entries).map_err(|e| StoreError::Write(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(|e| StoreError::Write(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Write(e.to_string()))
    }

    fn update(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>),
    ) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Write("store lock poisoned".to_string()))?;
        // A corrupt file is replaced rather than blocking every future write
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(StoreError::Corrupt(_)) => HashMap::new(),
            Err(e) => return Err(e),
        };
        f(&mut entries);
        self.persist(&entries)
    }
}

impl SecureStore for FileSecureStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Read("store lock poisoned".to_string()))?;
        Ok(self.load()?.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), (*value).to_string());
            }
        })
    }

    fn delete_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}

/// In-memory store with failure injection for tests
#[derive(Clone, Default)]
pub struct MemorySecureStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key without going through failure injection
    pub fn seed(&self, key: &str, value: &str) -> &Self {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl SecureStore for MemorySecureStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("injected read failure".to_string()));
        }
        Ok(self.peek(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected write failure".to_string()));
        }
        let mut map = self.entries.lock().unwrap();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected delete failure".to_string()));
        }
        let mut map = self.entries.lock().unwrap();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}
