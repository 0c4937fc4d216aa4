//! Fixed-capacity pools shared between the network reactor's stages.
//!
//! The reactor never allocates per message. Inbound events and outbound
//! messages live in pre-allocated [`Pool`]s and are passed between stages as
//! small [`Handle`]s through bounded [`IndexQueue`]s.
//!
//! # Components
//!
//! - [`SlotAllocator`] - Bit-vector free list handing out the lowest free slot
//! - [`IndexQueue`] - Bounded circular FIFO of slot handles
//! - [`Pool`] - Arena of reusable records addressed by validated handles
//!
//! # Examples
//!
//! ```
//! use kdt::pool::{IndexQueue, Pool};
//!
//! let pool: Pool<Vec<u8>> = Pool::new(4, || Vec::with_capacity(16));
//! let queue = IndexQueue::new(5);
//!
//! let handle = pool.allocate().unwrap();
//! pool.get(handle).unwrap().extend_from_slice(b"hi");
//! assert!(queue.push(handle));
//!
//! let handle = queue.pop().unwrap();
//! assert_eq!(&pool.get(handle).unwrap()[..], b"hi");
//! assert!(pool.free(handle));
//! assert!(pool.get(handle).is_none());
//! ```

mod arena;
mod queue;
mod slots;

pub use arena::{Handle, Pool, PoolRef};
pub use queue::IndexQueue;
pub use slots::SlotAllocator;
