use super::bucket::Bucket;
use super::contact::Contact;
use super::cursor::Cursor;
use crate::constants::{BUCKETS, ID_BITS};
use crate::id::Id;

/// Contacts organized by XOR distance to a local origin.
///
/// Bucket `i` holds contacts whose distance to the origin has exactly `i`
/// leading zero bits. Distances with more leading zeros than the table has
/// buckets all fold into the last bucket.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    origin: Id,
    buckets: Box<[Bucket]>,
}

impl RoutingTable {
    pub fn new(origin: Id) -> Self {
        Self::with_depth(origin, BUCKETS)
    }

    /// Creates a table with `depth` buckets, clamped to `1..=ID_BITS`.
    pub fn with_depth(origin: Id, depth: usize) -> Self {
        let depth = depth.clamp(1, ID_BITS);
        Self {
            origin,
            buckets: vec![Bucket::new(); depth].into_boxed_slice(),
        }
    }

    pub fn origin(&self) -> Id {
        self.origin
    }

    pub fn depth(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_index(&self, id: &Id) -> usize {
        self.origin
            .distance(id)
            .leading_zeros()
            .min(self.buckets.len() - 1)
    }

    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Records `contact` as seen, returning the contact it evicted, if any.
    /// The origin itself is never inserted.
    pub fn insert(&mut self, contact: Contact) -> Option<Contact> {
        if contact.id == self.origin {
            return None;
        }
        let index = self.bucket_index(&contact.id);
        self.buckets[index].push(contact)
    }

    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let index = self.bucket_index(id);
        self.buckets[index].remove(id)
    }

    pub fn get(&self, id: &Id) -> Option<&Contact> {
        self.buckets[self.bucket_index(id)].get(id)
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.buckets.iter().flat_map(Bucket::iter)
    }

    pub fn cursor(&self, index: usize) -> Cursor<'_> {
        Cursor::new(&self.buckets, index)
    }

    /// Up to `count` known contacts nearest to `target`, nearest first.
    ///
    /// Gathering starts at the bucket `target` falls in and widens one
    /// bucket at a time in both directions until enough contacts are found.
    pub fn closest(&self, target: &Id, count: usize) -> Vec<Contact> {
        let mut found = Vec::with_capacity(count);
        if count == 0 {
            return found;
        }

        let start = self.bucket_index(target);
        let mut far = self.cursor(start);
        let mut near = self.cursor(start);
        if let Some(bucket) = far.bucket() {
            found.extend(bucket.iter().copied());
        }

        while found.len() < count {
            let mut moved = false;
            if far.forward() {
                moved = true;
                if let Some(bucket) = far.bucket() {
                    found.extend(bucket.iter().copied());
                }
            }
            if near.rewind() {
                moved = true;
                if let Some(bucket) = near.bucket() {
                    found.extend(bucket.iter().copied());
                }
            }
            if !moved {
                break;
            }
        }

        found.sort_by_key(|contact| contact.id.distance(target));
        found.truncate(count);
        found
    }
}
