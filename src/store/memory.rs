use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{check_size, Store, StoreError};
use crate::id::Id;

/// A store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Id, Bytes>>,
    limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding at most `limit` entries.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit: Some(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &Id) -> Result<Vec<u8>, StoreError> {
        self.entries
            .read()
            .get(key)
            .map(|value| value.to_vec())
            .ok_or(StoreError::NotFound)
    }

    fn set(&self, key: &Id, value: &[u8]) -> Result<(), StoreError> {
        check_size(value)?;
        let mut entries = self.entries.write();
        if let Some(limit) = self.limit {
            if entries.len() >= limit && !entries.contains_key(key) {
                return Err(StoreError::Full);
            }
        }
        entries.insert(*key, Bytes::copy_from_slice(value));
        Ok(())
    }

    fn delete(&self, key: &Id) -> Result<(), StoreError> {
        self.entries
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
