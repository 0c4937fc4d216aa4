use std::io;
use std::path::Path;

use nix::errno::Errno;
use tracing::info;

use super::{check_size, Store, StoreError};
use crate::id::Id;

/// A persistent store backed by a sled database.
///
/// Every write is flushed before it returns.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Opens the database in `path`, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::Config::default()
            .path(path.as_ref())
            .open()
            .map_err(map_err)?;
        info!("Opened store at {:?}", path.as_ref());
        Ok(Self { db })
    }

    /// Flushes and closes the database.
    pub fn close(self) -> Result<(), StoreError> {
        self.db.flush().map_err(map_err)?;
        Ok(())
    }
}

impl Store for SledStore {
    fn get(&self, key: &Id) -> Result<Vec<u8>, StoreError> {
        match self.db.get(key.as_bytes()).map_err(map_err)? {
            Some(value) => Ok(value.to_vec()),
            None => Err(StoreError::NotFound),
        }
    }

    fn set(&self, key: &Id, value: &[u8]) -> Result<(), StoreError> {
        check_size(value)?;
        self.db.insert(key.as_bytes(), value).map_err(map_err)?;
        self.db.flush().map_err(map_err)?;
        Ok(())
    }

    fn delete(&self, key: &Id) -> Result<(), StoreError> {
        if self.db.remove(key.as_bytes()).map_err(map_err)?.is_none() {
            return Err(StoreError::NotFound);
        }
        self.db.flush().map_err(map_err)?;
        Ok(())
    }
}

fn map_err(err: sled::Error) -> StoreError {
    match err {
        sled::Error::Io(e) if is_disk_full(&e) => StoreError::Full,
        other => StoreError::Backend(other.to_string()),
    }
}

fn is_disk_full(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::ENOSPC as i32)
}
