use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::time::Instant;

/// Identifies a single fetch cycle, so that deletions of an earlier cycle can be told apart from
/// the entry that currently occupies the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EntryId(pub(crate) u64);

/// "Delete `key` from the map no earlier than `expires_at`, if it still holds `entry`."
#[derive(Debug)]
pub(crate) struct DeletionItem<K> {
    pub key: K,
    pub entry: EntryId,
    pub expires_at: Instant,
}

// Items are ordered by their expiry alone.
// [`BinaryHeap`] is a max-heap, therefore the `Ord` implementation is reversed.
impl<K> PartialEq for DeletionItem<K> {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at
    }
}

impl<K> Eq for DeletionItem<K> {}

impl<K> PartialOrd for DeletionItem<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for DeletionItem<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.expires_at.cmp(&self.expires_at)
    }
}

/// A min-priority-queue of pending deletions, earliest expiry first.
///
/// Items are not deduplicated by key.
#[derive(Debug)]
pub(crate) struct DeletionQueue<K> {
    heap: BinaryHeap<DeletionItem<K>>,
}

impl<K> Default for DeletionQueue<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<K> DeletionQueue<K> {
    pub fn push(&mut self, item: DeletionItem<K>) {
        self.heap.push(item);
    }

    /// Removes the item that expires first.
    pub fn pop(&mut self) -> Option<DeletionItem<K>> {
        self.heap.pop()
    }

    /// The earliest expiry in the queue.
    pub fn peek_expiry(&self) -> Option<Instant> {
        self.heap.peek().map(|item| item.expires_at)
    }

    /// Removes all items that have expired at `now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<DeletionItem<K>> {
        let mut expired = Vec::new();
        while self.peek_expiry().is_some_and(|expires_at| expires_at <= now) {
            expired.extend(self.pop());
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
