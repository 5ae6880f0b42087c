use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store contents are corrupt: {0}")]
    Corrupt(String),

    #[error("Store encryption failed: {0}")]
    Crypto(String),
}

impl StoreError {
    /// True when the data exists but cannot be trusted, as opposed to
    /// the store itself being unreachable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupt(_) | StoreError::Crypto(_))
    }
}

/// A string-to-string store in the shape of browser web storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a key that is not there is not an error
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Process-lifetime store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basics() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("token").unwrap(), None);

        store.set("token", "abc").unwrap();
        assert_eq!(store.get("token").unwrap().as_deref(), Some("abc"));
        assert_eq!(store.len(), 1);

        store.remove("token").unwrap();
        store.remove("token").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corruption_classification() {
        assert!(StoreError::Corrupt("bad json".into()).is_corruption());
        assert!(StoreError::Crypto("bad tag".into()).is_corruption());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!StoreError::from(io).is_corruption());
    }
}
