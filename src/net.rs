//! Peer-to-peer networking over non-blocking TCP
//!
//! This module moves framed messages between peers without ever blocking on
//! a socket. Each message travels over its own connection; a response may
//! travel back over the connection of the request it answers.
//!
//! # Components
//!
//! - [`Host`] - Network address with a textual and a binary form
//! - [`Header`], [`Tag`] - Frame layout
//! - [`Event`], [`Message`] - Pooled inbound and outbound records
//! - [`Server`] - Listening socket, tracked connections, readiness polling
//! - [`Network`] - Thread-safe façade driving sends and receives

mod error;
mod event;
mod frame;
mod host;
mod network;
mod receiver;
mod sender;
mod server;

pub use error::{Failure, FailureReport, FailureSink, HostParseError, NetError};
pub use event::{Event, EventKind, Message, Progress};
pub use frame::{Header, Tag, HEADER_SIZE, MAX_PAYLOAD};
pub use host::{Host, Internet, Transport, ADDRESS_SIZE, HOST_WIRE_SIZE};
pub use network::{EventHandle, MessageHandle, Network, NetworkConfig};
pub use server::{ReadySet, Server, SocketId};

#[cfg(test)]
mod tests;
