//! Kademlia node
//!
//! The [`Protocol`] handler owns the node identity and routing table and
//! answers `PING` and `FIND_NODE` requests; a [`Node`] drives it from a pool
//! of worker threads. [`Console`] maps operator commands onto both.

mod console;
mod error;
mod message;
mod node;
mod protocol;

pub use console::{Command, CommandError, Console, HELP};
pub use error::ProtocolError;
pub use message::Body;
pub use node::{Node, NodeConfig};
pub use protocol::Protocol;
