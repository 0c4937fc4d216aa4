use std::fmt;

use bytes::{Buf, BufMut};

use crate::constants::ID_BYTES;
use crate::id::Id;
use crate::net::{Host, HostParseError, HOST_WIRE_SIZE};

/// Size of a contact in its binary wire encoding.
pub const CONTACT_WIRE_SIZE: usize = ID_BYTES + HOST_WIRE_SIZE;

/// A remote peer: its identifier and where to reach it.
///
/// A contact whose host has no internet protocol is empty. Buckets use the
/// empty contact to mark unused slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Contact {
    pub id: Id,
    pub host: Host,
}

impl Contact {
    pub const EMPTY: Contact = Contact {
        id: Id::ZERO,
        host: Host::UNSPECIFIED,
    };

    pub fn new(id: Id, host: Host) -> Self {
        Self { id, host }
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_unspecified()
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.id.as_bytes());
        self.host.encode(buf);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, HostParseError> {
        if buf.remaining() < CONTACT_WIRE_SIZE {
            return Err(HostParseError::Truncated);
        }
        let mut id = [0u8; ID_BYTES];
        buf.copy_to_slice(&mut id);
        let host = Host::decode(buf)?;
        Ok(Self { id: Id(id), host })
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contact{{id:{},host:{}}}", self.id, self.host)
    }
}
