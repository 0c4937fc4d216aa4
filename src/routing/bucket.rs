use super::contact::Contact;
use crate::constants::K;
use crate::id::Id;

/// Up to [`K`] contacts, most recently seen first.
///
/// Occupied slots are always a prefix of the array; every slot after the
/// last contact holds [`Contact::EMPTY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    contacts: [Contact; K],
    len: usize,
}

impl Bucket {
    pub fn new() -> Self {
        Self {
            contacts: [Contact::EMPTY; K],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == K
    }

    /// Occupied slots, most recent first.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts[..self.len]
    }

    /// Every slot, empty ones included.
    pub fn slots(&self) -> &[Contact; K] {
        &self.contacts
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts().iter()
    }

    pub fn position(&self, id: &Id) -> Option<usize> {
        self.contacts().iter().position(|c| &c.id == id)
    }

    pub fn get(&self, id: &Id) -> Option<&Contact> {
        self.contacts().iter().find(|c| &c.id == id)
    }

    /// Records `contact` as the most recently seen.
    ///
    /// A known contact moves to the front, taking the new host. An unknown
    /// one is inserted at the front; if the bucket is full the least
    /// recently seen contact is evicted and returned. Empty contacts are
    /// ignored.
    pub fn push(&mut self, contact: Contact) -> Option<Contact> {
        if contact.is_empty() {
            return None;
        }

        if let Some(i) = self.position(&contact.id) {
            self.contacts[..=i].rotate_right(1);
            self.contacts[0] = contact;
            return None;
        }

        let evicted = if self.is_full() {
            Some(self.contacts[K - 1])
        } else {
            self.len += 1;
            None
        };
        self.contacts[..self.len].rotate_right(1);
        self.contacts[0] = contact;
        evicted
    }

    /// Removes the contact with `id`, closing the gap it leaves.
    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let i = self.position(id)?;
        let removed = self.contacts[i];
        self.contacts[i..self.len].rotate_left(1);
        self.len -= 1;
        self.contacts[self.len] = Contact::EMPTY;
        Some(removed)
    }

    /// The contact in the last slot, present only when the bucket is full.
    /// It is the one the next unknown contact would evict.
    pub fn kth(&self) -> Option<Contact> {
        let last = self.contacts[K - 1];
        (!last.is_empty()).then_some(last)
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}
