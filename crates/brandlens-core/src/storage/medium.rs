//! Key-value storage media backing the credential and lifecycle stores.
//!
//! Two lifetimes: `FileMedium` survives restarts (one JSON object on disk,
//! shared by every user of the same data dir), `MemoryMedium` lives only as
//! long as the process. Reads of a missing key return `None`; write failures
//! are swallowed so callers can treat persistence as best-effort.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

pub type SharedMedium = Arc<dyn StorageMedium>;

pub trait StorageMedium: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Process-lifetime storage, the session-scope medium.
#[derive(Default)]
pub struct MemoryMedium {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageMedium for MemoryMedium {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// Disk-backed storage: one flat JSON map in a file under the data dir.
///
/// Loads tolerantly (missing or corrupt file yields an empty map) and writes
/// through a temp-file-then-rename so an unexpected shutdown mid-write cannot
/// corrupt the whole map.
pub struct FileMedium {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileMedium {
    pub fn new(data_dir: &Path) -> Self {
        let path = data_dir.join(crate::constants::LOCAL_STORE_FILE);
        let entries = Self::load(&path);
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn load(path: &Path) -> HashMap<String, String> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(error) => {
                tracing::info!(
                    path = %path.display(),
                    %error,
                    "local store file is unreadable, starting from an empty map",
                );
                HashMap::new()
            }
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let Ok(content) = serde_json::to_string(entries) else {
            return;
        };
        let temp = self.path.with_extension("json.tmp");
        let result = self
            .path
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| std::fs::write(&temp, &content))
            .and_then(|_| std::fs::rename(&temp, &self.path));
        if let Err(error) = result {
            tracing::warn!(path = %self.path.display(), %error, "local store write failed");
        }
    }
}

impl StorageMedium for FileMedium {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_medium_roundtrip() {
        let medium = MemoryMedium::new();
        assert_eq!(medium.get("k"), None);
        medium.set("k", "v");
        assert_eq!(medium.get("k"), Some("v".to_string()));
        medium.remove("k");
        assert_eq!(medium.get("k"), None);
    }

    #[test]
    fn test_file_medium_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let medium = FileMedium::new(dir.path());
            medium.set("token", "abc");
        }
        let reopened = FileMedium::new(dir.path());
        assert_eq!(reopened.get("token"), Some("abc".to_string()));
    }

    #[test]
    fn test_file_medium_tolerates_corrupt_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(crate::constants::LOCAL_STORE_FILE), "not json").unwrap();
        let medium = FileMedium::new(dir.path());
        assert_eq!(medium.get("anything"), None);
        // And it is writable again afterwards.
        medium.set("k", "v");
        assert_eq!(medium.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_remove_missing_key_is_a_noop() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::new(dir.path());
        medium.remove("never_set");
        assert_eq!(medium.get("never_set"), None);
    }
}
