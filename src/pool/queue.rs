use parking_lot::Mutex;

#[derive(Debug)]
struct Ring<T> {
    slots: Box<[Option<T>]>,
    read: usize,
    write: usize,
}

/// A bounded, thread-safe circular FIFO.
///
/// A queue of capacity `C` holds at most `C - 1` entries; one slot is kept
/// empty so that a full queue can be told apart from an empty one. Neither
/// operation ever waits: `push` fails when full and `pop` fails when empty.
#[derive(Debug)]
pub struct IndexQueue<T = usize> {
    ring: Mutex<Ring<T>>,
}

impl<T: Copy> IndexQueue<T> {
    /// Creates a queue of the given capacity. `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1");
        Self {
            ring: Mutex::new(Ring {
                slots: vec![None; capacity].into_boxed_slice(),
                read: 0,
                write: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }

    /// Appends `value`, or returns `false` and leaves the queue untouched if
    /// it is full.
    pub fn push(&self, value: T) -> bool {
        let mut ring = self.ring.lock();
        let next = (ring.write + 1) % ring.slots.len();
        if next == ring.read {
            return false;
        }
        let write = ring.write;
        ring.slots[write] = Some(value);
        ring.write = next;
        true
    }

    pub fn pop(&self) -> Option<T> {
        let mut ring = self.ring.lock();
        if ring.read == ring.write {
            return None;
        }
        let read = ring.read;
        let value = ring.slots[read].take();
        ring.read = (read + 1) % ring.slots.len();
        value
    }

    pub fn len(&self) -> usize {
        let ring = self.ring.lock();
        (ring.write + ring.slots.len() - ring.read) % ring.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        let ring = self.ring.lock();
        ring.read == ring.write
    }
}
