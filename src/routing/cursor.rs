use super::bucket::Bucket;

/// A movable position over a span of buckets.
///
/// Used to widen a search around a bucket one step at a time, toward either
/// end of the table.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buckets: &'a [Bucket],
    offset: usize,
}

impl<'a> Cursor<'a> {
    /// `offset` is clamped to the span.
    pub fn new(buckets: &'a [Bucket], offset: usize) -> Self {
        Self {
            buckets,
            offset: offset.min(buckets.len().saturating_sub(1)),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn bucket(&self) -> Option<&'a Bucket> {
        self.buckets.get(self.offset)
    }

    /// Steps toward the far end. Returns `false`, without moving, at the
    /// last bucket.
    pub fn forward(&mut self) -> bool {
        if self.offset + 1 < self.buckets.len() {
            self.offset += 1;
            true
        } else {
            false
        }
    }

    /// Steps toward the near end. Returns `false`, without moving, at the
    /// first bucket.
    pub fn rewind(&mut self) -> bool {
        if self.offset > 0 {
            self.offset -= 1;
            true
        } else {
            false
        }
    }
}
