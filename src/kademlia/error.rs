use thiserror::Error;

use crate::id::IdError;
use crate::net::{NetError, Tag};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid stored node id: {0}")]
    InvalidId(#[from] IdError),

    #[error("no event available")]
    NotFound,

    #[error("try again")]
    TryAgain,

    #[error("malformed {tag} payload: {reason}")]
    Malformed { tag: Tag, reason: &'static str },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
