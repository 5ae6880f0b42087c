use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{KeyValueStore, StoreCipher, StoreError};

/// Durable store kept as a single JSON object on disk.
///
/// Every operation reads the whole file, so reads see writes made by other
/// processes sharing it. A session already loaded into memory catches up on
/// its next revalidation. With a cipher, the JSON is sealed before it is
/// written.
pub struct FileStore {
    path: PathBuf,
    cipher: Option<StoreCipher>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cipher: None }
    }

    pub fn encrypted(path: PathBuf, cipher: StoreCipher) -> Self {
        Self {
            path,
            cipher: Some(cipher),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = std::fs::read(&self.path)?;
        let plain = match self.cipher {
            Some(ref cipher) => cipher.open(&raw)?,
            None => raw,
        };

        serde_json::from_slice(&plain).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Like `read_all`, but a corrupt file reads as empty so that writes
    /// replace it instead of failing forever.
    fn read_for_update(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match self.read_all() {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_corruption() => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable store file");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
                debug!(path = %self.path.display(), "Store emptied, file removed");
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let contents = match self.cipher {
            Some(ref cipher) => cipher.seal(&json)?,
            None => json,
        };
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.read_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.read_for_update()?;
        entries.remove(key);
        self.write_all(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("session.json"));
        (dir, store)
    }

    #[test]
    fn test_values_survive_reopen() {
        let (dir, mut store) = temp_store();
        store.set("token", "abc").unwrap();
        store.set("user", r#"{"name":"Ada"}"#).unwrap();

        let reopened = FileStore::new(dir.path().join("nested").join("session.json"));
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("user").unwrap().as_deref(), Some(r#"{"name":"Ada"}"#));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get("token").unwrap(), None);
    }

    #[test]
    fn test_removing_last_key_deletes_file() {
        let (_dir, mut store) = temp_store();
        store.set("token", "abc").unwrap();
        assert!(store.path().exists());

        store.remove("token").unwrap();
        assert!(!store.path().exists());

        // Removing again is fine.
        store.remove("token").unwrap();
    }

    #[test]
    fn test_corrupt_file_errors_on_read_and_is_replaced_on_write() {
        let (_dir, mut store) = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"{not json").unwrap();

        let err = store.get("token").unwrap_err();
        assert!(err.is_corruption());

        store.remove("user").unwrap();
        assert!(!store.path().exists());

        store.set("token", "fresh").unwrap();
        assert_eq!(store.get("token").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_encrypted_file_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let cipher = StoreCipher::from_secret(b"unit-test-secret").unwrap();
        let mut store = FileStore::encrypted(path.clone(), cipher.clone());

        store.set("token", "very-secret-token").unwrap();

        let raw = std::fs::read(&path).unwrap();
        let needle = b"very-secret-token";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));

        let reopened = FileStore::encrypted(path.clone(), cipher);
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("very-secret-token"));

        // Wrong key reads as corruption, never as plaintext.
        let other = StoreCipher::from_secret(b"some-other-secret").unwrap();
        let wrong = FileStore::encrypted(path, other);
        assert!(wrong.get("token").unwrap_err().is_corruption());
    }
}
