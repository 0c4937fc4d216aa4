//! Fixed-width Kademlia identifiers.
//!
//! The same type is used for node IDs, XOR distances, storage keys and
//! message nonces. Identifiers are big-endian: byte 0 holds the most
//! significant bits.

use std::cmp::Ordering;
use std::fmt;
use std::ops::BitXor;

use rand::rngs::OsRng;
use rand::TryRngCore as _;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use thiserror::Error;
use tracing::error;

use crate::constants::{ID_BITS, ID_BYTES};

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("invalid id length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex id: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A Kademlia identifier of [`ID_BITS`] bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Id(pub [u8; ID_BYTES]);

impl Id {
    pub const ZERO: Id = Id([0u8; ID_BYTES]);

    /// Derives an identifier from arbitrary bytes.
    ///
    /// Uses SHA-1 when the identifier is at most 160 bits wide and SHA-256
    /// otherwise, keeping the leading bytes of the digest.
    pub fn hash(bytes: impl AsRef<[u8]>) -> Self {
        let mut id = [0u8; ID_BYTES];
        if ID_BYTES <= 20 {
            let digest = Sha1::digest(bytes.as_ref());
            id.copy_from_slice(&digest[..ID_BYTES]);
        } else {
            let digest = Sha256::digest(bytes.as_ref());
            id.copy_from_slice(&digest[..ID_BYTES]);
        }
        Self(id)
    }

    /// Generates an identifier from the operating system's secure random
    /// source.
    ///
    /// Terminates the process if no such source is available; a node must
    /// never join the network with a predictable identity.
    pub fn random() -> Self {
        let mut id = [0u8; ID_BYTES];
        if let Err(e) = OsRng.try_fill_bytes(&mut id) {
            error!("No secure random source available: {}", e);
            std::process::exit(1);
        }
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        if bytes.len() != ID_BYTES {
            return Err(IdError::InvalidLength {
                expected: ID_BYTES,
                actual: bytes.len(),
            });
        }
        let mut id = [0u8; ID_BYTES];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }

    pub fn from_hex(text: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(text.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// Counts zero bits from the most significant bit. Returns [`ID_BITS`]
    /// for the all-zero identifier.
    pub fn leading_zeros(&self) -> usize {
        for (i, &byte) in self.0.iter().enumerate() {
            if byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }
        ID_BITS
    }

    pub fn distance(&self, other: &Id) -> Id {
        let mut dist = [0u8; ID_BYTES];
        for (i, d) in dist.iter_mut().enumerate() {
            *d = self.0[i] ^ other.0[i];
        }
        Id(dist)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Fixed-length uppercase hex, most significant byte first.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl BitXor for Id {
    type Output = Id;

    fn bitxor(self, rhs: Self) -> Self::Output {
        self.distance(&rhs)
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:02X}{:02X}..)", self.0[0], self.0[1])
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
