//! Protocol constants and tuning parameters.
//!
//! This module contains the constants used throughout the node: identifier
//! width, routing table shape, network buffer pool sizes, timeouts and worker
//! pacing. Most of them seed the `Default` implementations of the runtime
//! configuration structs, so they can be overridden without recompiling.

use std::time::Duration;

// ============================================================================
// Identifiers
// ============================================================================

/// Number of bits in a Kademlia identifier (B).
pub const ID_BITS: usize = 160;

/// Number of bytes in a Kademlia identifier.
pub const ID_BYTES: usize = ID_BITS / 8;

const _: () = assert!(ID_BITS % 8 == 0, "ID_BITS must be a multiple of 8");
const _: () = assert!(ID_BYTES <= 32, "no supported digest is wider than 256 bits");

// ============================================================================
// Routing table
// ============================================================================

/// Number of contacts held by a bucket (K).
pub const K: usize = 20;

/// Number of buckets in a routing table (B1). Must not exceed [`ID_BITS`].
pub const BUCKETS: usize = ID_BITS;

const _: () = assert!(BUCKETS >= 1 && BUCKETS <= ID_BITS, "BUCKETS must be in 1..=ID_BITS");

// ============================================================================
// Network
// ============================================================================

/// Highest number of pending, not yet accepted, inbound connections.
pub const LISTEN_BACKLOG: i32 = 24;

/// Maximum number of inbound events, received or in flight, at any time.
pub const INBOUND_BUFFERS: usize = 128;

/// Maximum number of outbound messages, queued or in flight, at any time.
pub const OUTBOUND_BUFFERS: usize = 256;

/// Maximum size of one frame, header included.
pub const BUFFER_SIZE: usize = 65536;

/// Time an outbound message may spend waiting for its connection to accept
/// more bytes before it fails with a timeout.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Time a connection waiting for inbound bytes may stay silent before it is
/// closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Workers
// ============================================================================

/// Number of worker threads driving the protocol handler.
pub const WORKER_THREADS: usize = 4;

/// Worker pause after a poll that found nothing to do.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(30);

/// Worker pause after a poll that lost the race for the I/O critical section.
pub const TRY_AGAIN_BACKOFF: Duration = Duration::from_millis(20);

/// Worker pause after a poll that failed.
pub const ERROR_BACKOFF: Duration = Duration::from_millis(10);

// ============================================================================
// Storage
// ============================================================================

/// Default directory of the persistent key/value store.
pub const DEFAULT_DATA_DIR: &str = "data";
