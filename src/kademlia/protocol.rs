use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::error::ProtocolError;
use super::message::Body;
use crate::constants::K;
use crate::id::Id;
use crate::net::{EventHandle, EventKind, Failure, Host, NetError, Network, Tag};
use crate::routing::{Contact, RoutingTable};
use crate::store::{Store, StoreError};

/// Key under which the node's own identifier is persisted.
const NODE_ID_KEY: Id = Id::ZERO;

/// What a worker learned from one event, copied out of the pooled record.
#[derive(Debug)]
enum Inbound {
    Failed {
        failure: Failure,
        nonce: Id,
        tag: Tag,
        host: Host,
    },
    Request {
        body: Body,
        host: Host,
    },
    Other {
        tag: Tag,
        host: Host,
    },
}

/// The Kademlia protocol handler.
///
/// Owns the node identity and routing table, and turns network events into
/// routing updates and replies. Safe to poll from many threads at once.
pub struct Protocol<S> {
    id: Id,
    table: Mutex<RoutingTable>,
    store: Arc<S>,
    network: Arc<Network>,
}

impl<S: Store> Protocol<S> {
    /// Loads the node identifier from `store`, or generates and persists a
    /// new one on first start.
    pub fn new(store: Arc<S>, network: Arc<Network>) -> Result<Self, ProtocolError> {
        let id = match store.get(&NODE_ID_KEY) {
            Ok(bytes) => Id::from_bytes(&bytes)?,
            Err(StoreError::NotFound) => {
                let id = Id::random();
                store.set(&NODE_ID_KEY, id.as_bytes())?;
                info!("Generated new node ID");
                id
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            id,
            table: Mutex::new(RoutingTable::new(id)),
            store,
            network,
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn table(&self) -> MutexGuard<'_, RoutingTable> {
        self.table.lock()
    }

    /// Asks `peer` for the contacts closest to this node. Returns the
    /// request nonce.
    pub fn join(&self, peer: &Host) -> Result<Id, ProtocolError> {
        info!("Joining network via {}", peer);
        self.request(
            peer,
            &Body::FindNode {
                sender: self.id,
                target: self.id,
            },
        )
    }

    /// Checks whether `peer` is alive. Returns the request nonce.
    pub fn ping(&self, peer: &Host) -> Result<Id, ProtocolError> {
        self.request(peer, &Body::Ping { sender: self.id })
    }

    fn request(&self, peer: &Host, body: &Body) -> Result<Id, ProtocolError> {
        let nonce = Id::random();
        let handle = self.network.new_message()?;

        let written = match self.network.message(handle) {
            Some(mut message) => {
                message.nonce = nonce;
                message.tag = body.tag();
                message.receiver = *peer;
                message.write(&encode(body))
            }
            None => Err(NetError::InvalidHandle),
        };
        if let Err(e) = written.and_then(|()| self.network.send(handle)) {
            self.network.discard_message(handle);
            return Err(e.into());
        }
        Ok(nonce)
    }

    /// Handles at most one network event.
    ///
    /// Returns `NotFound` when there was nothing to handle and `TryAgain`
    /// when another thread is busy driving the network.
    pub fn poll(&self) -> Result<(), ProtocolError> {
        let handle = match self.network.poll() {
            Ok(Some(handle)) => handle,
            Ok(None) => return Err(ProtocolError::NotFound),
            Err(NetError::TryAgain) => return Err(ProtocolError::TryAgain),
            Err(e) => return Err(e.into()),
        };

        let result = match self.inspect(handle) {
            Some(inbound) => self.dispatch(handle, inbound),
            None => Ok(()),
        };
        self.network.free_event(handle);
        result
    }

    fn inspect(&self, handle: EventHandle) -> Option<Inbound> {
        let event = self.network.event(handle)?;
        let inbound = match event.kind() {
            EventKind::Error(failure) => Inbound::Failed {
                failure,
                nonce: event.nonce(),
                tag: event.tag(),
                host: event.host(),
            },
            EventKind::Message => match Body::decode(event.tag(), event.payload()) {
                Ok(Some(body)) => Inbound::Request {
                    body,
                    host: event.host(),
                },
                Ok(None) => Inbound::Other {
                    tag: event.tag(),
                    host: event.host(),
                },
                Err(e) => {
                    debug!("Dropping message from {}: {}", event.host(), e);
                    return None;
                }
            },
        };
        Some(inbound)
    }

    fn dispatch(&self, handle: EventHandle, inbound: Inbound) -> Result<(), ProtocolError> {
        match inbound {
            Inbound::Failed {
                failure,
                nonce,
                tag,
                host,
            } => {
                warn!(
                    "Network error: {} (tag: {}, nonce: {}, host: {})",
                    failure, tag, nonce, host
                );
                Ok(())
            }
            Inbound::Request { body, host } => self.handle(handle, body, host),
            Inbound::Other { tag, host } => {
                debug!("Ignoring {} message from {}", tag, host);
                Ok(())
            }
        }
    }

    fn handle(&self, request: EventHandle, body: Body, host: Host) -> Result<(), ProtocolError> {
        match body {
            Body::Ping { .. } => self.respond(request, &Body::Pong { sender: self.id }),
            Body::FindNode { target, .. } => {
                let contacts = self.table.lock().closest(&target, K);
                self.respond(
                    request,
                    &Body::Nodes {
                        sender: self.id,
                        contacts,
                    },
                )
            }
            Body::Pong { sender } => {
                self.learn(Contact::new(sender, host));
                Ok(())
            }
            Body::Nodes { sender, contacts } => {
                self.learn(Contact::new(sender, host));
                for contact in contacts {
                    self.learn(contact);
                }
                Ok(())
            }
        }
    }

    fn respond(&self, request: EventHandle, body: &Body) -> Result<(), ProtocolError> {
        let handle = self.network.new_response(request)?;
        let written = match self.network.message(handle) {
            Some(mut message) => {
                message.tag = body.tag();
                message.write(&encode(body))
            }
            None => Err(NetError::InvalidHandle),
        };
        if let Err(e) = written.and_then(|()| self.network.send(handle)) {
            self.network.discard_message(handle);
            return Err(e.into());
        }
        Ok(())
    }

    fn learn(&self, contact: Contact) {
        if contact.id == self.id || contact.is_empty() {
            return;
        }
        let evicted = self.table.lock().insert(contact);
        debug!("Learned {}", contact);
        if let Some(evicted) = evicted {
            debug!("Evicted {}", evicted);
        }
    }
}

fn encode(body: &Body) -> BytesMut {
    let mut buf = BytesMut::with_capacity(body.encoded_len());
    body.encode(&mut buf);
    buf
}
