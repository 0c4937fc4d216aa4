use parking_lot::Mutex;

const WORD_BITS: usize = u64::BITS as usize;

/// Tracks which of a fixed number of slots are free.
///
/// Owns no slot data. Set bits mark free slots; allocation always takes the
/// lowest-numbered free slot, scanning a word at a time.
#[derive(Debug)]
pub struct SlotAllocator {
    free: Mutex<Vec<u64>>,
    capacity: usize,
}

impl SlotAllocator {
    pub fn new(capacity: usize) -> Self {
        let mut words = vec![u64::MAX; capacity.div_ceil(WORD_BITS)];
        let spare = words.len() * WORD_BITS - capacity;
        if spare > 0 {
            if let Some(last) = words.last_mut() {
                *last >>= spare;
            }
        }
        Self {
            free: Mutex::new(words),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks the lowest free slot as taken and returns its index, or `None`
    /// if every slot is taken.
    pub fn allocate(&self) -> Option<usize> {
        let mut words = self.free.lock();
        for (i, word) in words.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= !(1u64 << bit);
                return Some(i * WORD_BITS + bit);
            }
        }
        None
    }

    /// Marks `index` free again.
    ///
    /// Freeing a slot that is out of range or not currently allocated is a
    /// caller bug; it is only checked in debug builds.
    pub fn free(&self, index: usize) {
        debug_assert!(index < self.capacity, "slot {} out of range", index);
        let mut words = self.free.lock();
        let mask = 1u64 << (index % WORD_BITS);
        debug_assert!(words[index / WORD_BITS] & mask == 0, "slot {} already free", index);
        words[index / WORD_BITS] |= mask;
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let words = self.free.lock();
        words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) == 0
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.free.lock().iter().map(|w| w.count_ones() as usize).sum()
    }
}
