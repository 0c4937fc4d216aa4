//! Key/value storage
//!
//! Values are opaque byte strings keyed by [`Id`]. Each call is atomic on
//! its own; there are no multi-key transactions.
//!
//! # Backends
//!
//! - [`SledStore`] - Persistent store in a directory on disk
//! - [`MemoryStore`] - Volatile store, optionally bounded in entry count

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use thiserror::Error;

use crate::constants::BUFFER_SIZE;
use crate::id::Id;
use crate::net::HEADER_SIZE;

/// Largest value a store accepts: one frame payload.
pub const MAX_VALUE_SIZE: usize = BUFFER_SIZE - HEADER_SIZE;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("value of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("store is full")]
    Full,

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub trait Store: Send + Sync {
    fn get(&self, key: &Id) -> Result<Vec<u8>, StoreError>;

    fn set(&self, key: &Id, value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &Id) -> Result<(), StoreError>;
}

fn check_size(value: &[u8]) -> Result<(), StoreError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(StoreError::TooLarge {
            size: value.len(),
            limit: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}
