use std::fmt;

use bytes::{Buf, BufMut};

use crate::constants::ID_BYTES;
use crate::id::Id;

/// Size of a frame header: nonce, tag and payload length.
pub const HEADER_SIZE: usize = ID_BYTES + 2 + 2;

/// Largest payload a header can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Identifies the kind of data carried by a frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tag(pub u16);

impl Tag {
    pub const NONE: Tag = Tag(0);
    pub const ERROR: Tag = Tag(1);
    pub const FIND_NODE: Tag = Tag(2);
    pub const FIND_VALUE: Tag = Tag(3);
    pub const NODES: Tag = Tag(4);
    pub const PING: Tag = Tag(5);
    pub const PONG: Tag = Tag(6);
    pub const STORE: Tag = Tag(7);
    pub const VALUE: Tag = Tag(8);

    pub fn name(self) -> &'static str {
        match self {
            Tag::NONE => "NONE",
            Tag::ERROR => "ERROR",
            Tag::FIND_NODE => "FIND_NODE",
            Tag::FIND_VALUE => "FIND_VALUE",
            Tag::NODES => "NODES",
            Tag::PING => "PING",
            Tag::PONG => "PONG",
            Tag::STORE => "STORE",
            Tag::VALUE => "VALUE",
            _ => "Unknown",
        }
    }
}

impl From<u16> for Tag {
    fn from(value: u16) -> Self {
        Tag(value)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({}={})", self.0, self.name())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-size frame header. All integers are big-endian.
///
/// ```text
/// [ nonce: ID_BYTES ][ tag: u16 ][ payload length: u16 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub nonce: Id,
    pub tag: Tag,
    pub length: u16,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_slice(self.nonce.as_bytes());
        buf.put_u16(self.tag.0);
        buf.put_u16(self.length);
        out
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        let mut nonce = [0u8; ID_BYTES];
        buf.copy_to_slice(&mut nonce);
        let tag = Tag(buf.get_u16());
        let length = buf.get_u16();
        Self {
            nonce: Id(nonce),
            tag,
            length,
        }
    }
}
