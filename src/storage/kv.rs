use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::error::{Result, SoportechError};

/// Synchronous string key-value storage backing the local ticket store
pub trait KeyValueStore: Send + Sync {
    /// Returns the value for `key`, or `None` if it was never written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process storage; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-based storage, one `<key>.json` file per key
pub struct FileKeyValueStore {
    root_path: PathBuf,
}

impl FileKeyValueStore {
    const EXTENSION: &'static str = "json";

    /// Creates a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            root_path: dir.as_ref().to_path_buf(),
        }
    }

    fn key_file(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(SoportechError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.root_path.join(format!("{}.{}", key, Self::EXTENSION)))
    }

    fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_path.exists() {
            fs::create_dir_all(&self.root_path)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_file(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_directory_exists()?;
        let path = self.key_file(key)?;

        // Readers only ever see a complete blob
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_get_and_set() {
        let kv = MemoryKeyValueStore::new();
        assert_eq!(kv.get("tickets").unwrap(), None);

        kv.set("tickets", "[]").unwrap();
        assert_eq!(kv.get("tickets").unwrap().as_deref(), Some("[]"));

        kv.set("tickets", "[1]").unwrap();
        assert_eq!(kv.get("tickets").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_file_store_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("store");
        let kv = FileKeyValueStore::new(&root);

        assert_eq!(kv.get("tickets").unwrap(), None);
        assert!(!root.exists());

        kv.set("tickets", "[]").unwrap();
        assert!(root.join("tickets.json").exists());
        assert!(!root.join("tickets.json.tmp").exists());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        FileKeyValueStore::new(temp_dir.path())
            .set("tickets", r#"[{"id":"local_1"}]"#)
            .unwrap();

        let reopened = FileKeyValueStore::new(temp_dir.path());
        assert_eq!(
            reopened.get("tickets").unwrap().as_deref(),
            Some(r#"[{"id":"local_1"}]"#)
        );
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let temp_dir = TempDir::new().unwrap();
        let kv = FileKeyValueStore::new(temp_dir.path());

        assert!(kv.set("../escape", "x").is_err());
        assert!(kv.get("a/b").is_err());
        assert!(kv.get("").is_err());
    }
}
