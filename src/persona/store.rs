//! Durable backing stores for the persona list.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::Persona;

/// Where the registry persists its snapshot.
///
/// `save` must either store the whole list or fail without side effects
/// visible to a later `load`.
pub trait PersonaStore: Send + Sync {
    /// Load the persisted list, `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Vec<Persona>>>;

    /// Persist the full list.
    fn save(&self, personas: &[Persona]) -> Result<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

// ─────────────────────────────────────────────────────────────────
// JSON File Store
// ─────────────────────────────────────────────────────────────────

/// Stores personas as a pretty-printed JSON array.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersonaStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Persona>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| Error::IoRead {
            path: self.path.clone(),
            source: e,
        })?;
        let personas: Vec<Persona> = serde_json::from_str(&content)?;
        debug!(path = %self.path.display(), count = personas.len(), "Loaded personas");
        Ok(Some(personas))
    }

    fn save(&self, personas: &[Persona]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let content = serde_json::to_string_pretty(personas)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, content).map_err(|e| Error::IoWrite {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::IoWrite {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(path = %self.path.display(), count = personas.len(), "Saved personas");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────
// In-Memory Store
// ─────────────────────────────────────────────────────────────────

/// Non-durable store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Vec<Persona>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-persisted list.
    pub fn with_personas(personas: Vec<Persona>) -> Self {
        Self {
            saved: Mutex::new(Some(personas)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent saves fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// What was last persisted.
    pub fn saved(&self) -> Option<Vec<Persona>> {
        self.saved.lock().clone()
    }
}

impl PersonaStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<Persona>>> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, personas: &[Persona]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store configured to fail writes",
            )));
        }
        *self.saved.lock() = Some(personas.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_store_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("personas.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_json_store_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("nested").join("personas.json"));
        store.save(&Persona::defaults()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, Persona::defaults());
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("personas.json");
        fs::write(&path, "not json").unwrap();
        assert!(JsonFileStore::new(path).load().is_err());
    }

    #[test]
    fn test_memory_store_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.save(&Persona::defaults()).is_err());
        assert!(store.saved().is_none());
    }
}
