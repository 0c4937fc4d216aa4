use bytes::{Buf, BufMut};

use super::error::ProtocolError;
use crate::constants::ID_BYTES;
use crate::id::Id;
use crate::net::Tag;
use crate::routing::{Contact, CONTACT_WIRE_SIZE};

/// Payload of a protocol message the node understands.
///
/// Every payload starts with the sender's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Ping { sender: Id },
    Pong { sender: Id },
    FindNode { sender: Id, target: Id },
    Nodes { sender: Id, contacts: Vec<Contact> },
}

impl Body {
    pub fn tag(&self) -> Tag {
        match self {
            Body::Ping { .. } => Tag::PING,
            Body::Pong { .. } => Tag::PONG,
            Body::FindNode { .. } => Tag::FIND_NODE,
            Body::Nodes { .. } => Tag::NODES,
        }
    }

    pub fn sender(&self) -> Id {
        match self {
            Body::Ping { sender }
            | Body::Pong { sender }
            | Body::FindNode { sender, .. }
            | Body::Nodes { sender, .. } => *sender,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Body::Ping { .. } | Body::Pong { .. } => ID_BYTES,
            Body::FindNode { .. } => 2 * ID_BYTES,
            Body::Nodes { contacts, .. } => ID_BYTES + contacts.len() * CONTACT_WIRE_SIZE,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.sender().as_bytes());
        match self {
            Body::Ping { .. } | Body::Pong { .. } => {}
            Body::FindNode { target, .. } => buf.put_slice(target.as_bytes()),
            Body::Nodes { contacts, .. } => {
                for contact in contacts {
                    contact.encode(buf);
                }
            }
        }
    }

    /// Decodes the payload of a `tag` message. Returns `Ok(None)` for tags
    /// without a body handled here.
    pub fn decode(tag: Tag, mut payload: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let malformed = |reason| ProtocolError::Malformed { tag, reason };

        let body = match tag {
            Tag::PING => Body::Ping {
                sender: read_id(&mut payload).ok_or(malformed("missing sender id"))?,
            },
            Tag::PONG => Body::Pong {
                sender: read_id(&mut payload).ok_or(malformed("missing sender id"))?,
            },
            Tag::FIND_NODE => Body::FindNode {
                sender: read_id(&mut payload).ok_or(malformed("missing sender id"))?,
                target: read_id(&mut payload).ok_or(malformed("missing target id"))?,
            },
            Tag::NODES => {
                let sender = read_id(&mut payload).ok_or(malformed("missing sender id"))?;
                if payload.len() % CONTACT_WIRE_SIZE != 0 {
                    return Err(malformed("truncated contact"));
                }
                let mut contacts = Vec::with_capacity(payload.len() / CONTACT_WIRE_SIZE);
                while payload.has_remaining() {
                    let contact =
                        Contact::decode(&mut payload).map_err(|_| malformed("invalid contact"))?;
                    contacts.push(contact);
                }
                Body::Nodes { sender, contacts }
            }
            _ => return Ok(None),
        };

        if payload.has_remaining() {
            return Err(malformed("trailing bytes"));
        }
        Ok(Some(body))
    }
}

fn read_id(buf: &mut &[u8]) -> Option<Id> {
    if buf.remaining() < ID_BYTES {
        return None;
    }
    let mut id = [0u8; ID_BYTES];
    buf.copy_to_slice(&mut id);
    Some(Id(id))
}
