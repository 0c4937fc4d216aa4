use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::slots::SlotAllocator;

/// Locked access to one live pool record.
pub type PoolRef<'a, T> = MappedMutexGuard<'a, T>;

/// Identifies one allocation of one pool slot.
///
/// A handle carries the slot's generation at allocation time. Once the slot
/// is freed the generation moves on, so the handle can no longer reach the
/// record even after the slot is handed out again.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _record: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}#{})", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    live: bool,
    record: T,
}

/// A fixed-capacity arena of reusable records.
///
/// Records are created once, up front, and recycled for the lifetime of the
/// pool. Every access goes through [`Pool::get`], which rejects handles whose
/// slot has been freed since.
pub struct Pool<T> {
    slots: SlotAllocator,
    entries: Box<[Mutex<Entry<T>>]>,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize, mut init: impl FnMut() -> T) -> Self {
        assert!(capacity <= u32::MAX as usize, "pool capacity too large");
        let entries = (0..capacity)
            .map(|_| {
                Mutex::new(Entry {
                    generation: 0,
                    live: false,
                    record: init(),
                })
            })
            .collect();

        Self {
            slots: SlotAllocator::new(capacity),
            entries,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn available(&self) -> usize {
        self.slots.available()
    }

    /// Reserves the lowest free slot. The record keeps whatever state its
    /// previous user left behind; owners reset it on allocation.
    pub fn allocate(&self) -> Option<Handle<T>> {
        let index = self.slots.allocate()?;
        let mut entry = self.entries[index].lock();
        entry.live = true;
        Some(Handle {
            index: index as u32,
            generation: entry.generation,
            _record: PhantomData,
        })
    }

    pub fn get(&self, handle: Handle<T>) -> Option<PoolRef<'_, T>> {
        let entry = self.entries.get(handle.index())?.lock();
        if !entry.live || entry.generation != handle.generation {
            return None;
        }
        Some(MutexGuard::map(entry, |e| &mut e.record))
    }

    /// Returns the slot to the pool. Returns `false`, and does nothing, for a
    /// stale handle.
    pub fn free(&self, handle: Handle<T>) -> bool {
        {
            let Some(slot) = self.entries.get(handle.index()) else {
                return false;
            };
            let mut entry = slot.lock();
            if !entry.live || entry.generation != handle.generation {
                return false;
            }
            entry.live = false;
            entry.generation = entry.generation.wrapping_add(1);
        }
        self.slots.free(handle.index());
        true
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}
