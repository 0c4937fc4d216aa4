//! kdt - A Kademlia distributed hash table node
//!
//! Nodes exchange framed messages over plain TCP, one connection per
//! request, driven by a non-blocking reactor that any number of worker
//! threads can poll at once.
//!
//! # Modules
//!
//! - [`id`] - Fixed-width identifiers and the XOR metric
//! - [`pool`] - Fixed-capacity slot allocator, index queue and handle pool
//! - [`net`] - Host addresses, framing and the polled network endpoint
//! - [`routing`] - Buckets, contacts and the routing table
//! - [`store`] - Local key/value storage
//! - [`kademlia`] - Protocol handler, worker pool and console commands

pub mod constants;
pub mod id;
pub mod kademlia;
pub mod net;
pub mod pool;
pub mod routing;
pub mod store;

pub use id::{Id, IdError};
pub use kademlia::{Node, NodeConfig, Protocol, ProtocolError};
pub use net::{Event, EventKind, Host, Message, NetError, Network, NetworkConfig, Tag};
pub use routing::{Contact, RoutingTable};
pub use store::{MemoryStore, SledStore, Store, StoreError};
