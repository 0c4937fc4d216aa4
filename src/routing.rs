//! Kademlia routing table
//!
//! Known peers are kept in buckets by the length of the prefix they share
//! with the local node's identifier. Each bucket holds at most `K` contacts,
//! most recently seen first, and evicts its oldest contact when a new
//! one arrives while full.

mod bucket;
mod contact;
mod cursor;
mod table;

pub use bucket::Bucket;
pub use contact::{Contact, CONTACT_WIRE_SIZE};
pub use cursor::Cursor;
pub use table::RoutingTable;
