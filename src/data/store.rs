//! In-memory notification store
//!
//! Volatile working set rebuilt on every session from a fetch plus whatever
//! arrives over the push channel. Holds the list (newest first), the unread
//! counter, and the optimistic read-state changes still waiting for the
//! backend.

use std::collections::{HashMap, HashSet};

use super::notification::Notification;

/// Result of applying one push message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// New id, inserted at the head
    Inserted,
    /// Id already known; nothing changed
    Duplicate,
}

/// Ticket for an optimistic change, handed back on failure to undo it
///
/// `epoch` is the counter epoch at the time of the change; a server refresh
/// in between makes the counter adjustment on revert stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    /// `mark_read(id)` flipped `id` from unread to read
    MarkRead {
        id: String,
        decremented: bool,
        epoch: u64,
        /// Last mark-all sequence started before this change
        bulk_seq: u64,
    },
    /// `mark_all_read()` flipped `ids`; `previous_count` was the counter value
    MarkAllRead {
        ids: Vec<String>,
        previous_count: u64,
        epoch: u64,
        seq: u64,
    },
}

/// Notification list plus unread counter
#[derive(Debug, Default)]
pub struct NotificationStore {
    /// Newest first
    items: Vec<Notification>,
    /// Ids present in `items`
    index: HashSet<String>,
    /// Unread counter (server value at fetch time, then optimistic)
    unread_count: u64,
    /// Bumped whenever the counter is replaced wholesale
    count_epoch: u64,
    /// Outstanding optimistic mark-read operations per id
    pending_reads: HashMap<String, u32>,
    /// Sequence of the last mark-all started
    bulk_seq: u64,
    /// Highest mark-all sequence the backend confirmed
    committed_bulk_seq: u64,
    /// In-flight mark-alls and the failed single reads they now cover
    pending_bulks: HashMap<u64, Vec<String>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the list, newest first
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    /// Unread items actually held locally
    pub fn local_unread(&self) -> u64 {
        self.items.iter().filter(|item| !item.read).count() as u64
    }

    /// Replace the counter with the server-authoritative value
    pub fn set_unread_count(&mut self, count: u64) {
        self.unread_count = count;
        self.count_epoch += 1;
    }

    /// Apply a push-delivered notification
    ///
    /// New ids go to the head and bump the counter when unread. Known ids
    /// are left untouched: a redelivery must neither move the item nor
    /// change its read state.
    pub fn apply_push(&mut self, notification: Notification) -> PushOutcome {
        if self.index.contains(&notification.id) {
            return PushOutcome::Duplicate;
        }

        if !notification.read {
            self.unread_count = self.unread_count.saturating_add(1);
        }
        self.index.insert(notification.id.clone());
        self.items.insert(0, notification);
        PushOutcome::Inserted
    }

    /// Merge a fetched batch (server order, newest first)
    ///
    /// Known ids keep their position and never go back to unread. Unknown
    /// ids ahead of the first known one are newer than anything held and are
    /// prepended as a block; the remaining unknown ids are appended. Returns
    /// the number of newly inserted items.
    pub fn merge_fetched(&mut self, batch: Vec<Notification>) -> usize {
        let mut head = Vec::new();
        let mut tail = Vec::new();
        let mut seen_known = false;
        let mut batch_ids = HashSet::new();

        for mut fetched in batch {
            if !batch_ids.insert(fetched.id.clone()) {
                continue;
            }

            if let Some(existing) = self.items.iter_mut().find(|item| item.id == fetched.id) {
                seen_known = true;
                let read = existing.read || fetched.read || self.pending_reads.contains_key(&fetched.id);
                fetched.read = read;
                *existing = fetched;
                continue;
            }

            if self.pending_reads.contains_key(&fetched.id) {
                fetched.read = true;
            }

            if seen_known {
                tail.push(fetched);
            } else {
                head.push(fetched);
            }
        }

        let inserted = head.len() + tail.len();
        for item in head.iter().chain(tail.iter()) {
            self.index.insert(item.id.clone());
        }

        if !head.is_empty() {
            head.append(&mut self.items);
            self.items = head;
        }
        self.items.append(&mut tail);

        inserted
    }

    /// Optimistically mark one notification read
    ///
    /// Returns `None` when the id is unknown or already read; the counter
    /// only moves on an actual unread -> read transition.
    pub fn begin_mark_read(&mut self, id: &str) -> Option<PendingChange> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        if item.read {
            return None;
        }

        item.read = true;
        let decremented = self.unread_count > 0;
        self.unread_count = self.unread_count.saturating_sub(1);
        *self.pending_reads.entry(id.to_string()).or_insert(0) += 1;

        Some(PendingChange::MarkRead {
            id: id.to_string(),
            decremented,
            epoch: self.count_epoch,
            bulk_seq: self.bulk_seq,
        })
    }

    /// Optimistically mark everything read and reset the counter
    pub fn begin_mark_all_read(&mut self) -> PendingChange {
        let mut ids = Vec::new();
        for item in self.items.iter_mut().filter(|item| !item.read) {
            item.read = true;
            ids.push(item.id.clone());
        }

        for id in &ids {
            *self.pending_reads.entry(id.clone()).or_insert(0) += 1;
        }

        let previous_count = self.unread_count;
        self.unread_count = 0;
        self.bulk_seq += 1;
        self.pending_bulks.insert(self.bulk_seq, Vec::new());

        PendingChange::MarkAllRead {
            ids,
            previous_count,
            epoch: self.count_epoch,
            seq: self.bulk_seq,
        }
    }

    /// Backend confirmed the change
    pub fn commit(&mut self, change: &PendingChange) {
        for id in change.ids() {
            self.release_pending(id);
        }

        if let PendingChange::MarkAllRead { seq, .. } = change {
            // Failed single reads it covered are read on the server now.
            self.pending_bulks.remove(seq);
            self.committed_bulk_seq = self.committed_bulk_seq.max(*seq);
        }
    }

    /// Backend refused the change: undo exactly what `change` did
    ///
    /// A failed single read that a later mark-all also covers stays read:
    /// it is rolled back together with that mark-all, or never if the
    /// mark-all succeeds. The counter is only adjusted while no server
    /// value replaced it since the change began.
    ///
    /// Returns the ids that went back to unread.
    pub fn revert(&mut self, change: &PendingChange) -> Vec<String> {
        let mut reverted = Vec::new();

        match change {
            PendingChange::MarkRead {
                id,
                decremented,
                epoch,
                bulk_seq,
            } => {
                self.release_pending(id);
                if self.pending_reads.contains_key(id) || self.committed_bulk_seq > *bulk_seq {
                    return reverted;
                }

                let covering = self
                    .pending_bulks
                    .keys()
                    .copied()
                    .filter(|seq| seq > bulk_seq)
                    .max();
                if let Some(seq) = covering {
                    if let Some(covered) = self.pending_bulks.get_mut(&seq) {
                        covered.push(id.clone());
                    }
                    return reverted;
                }

                if self.mark_unread(id) {
                    reverted.push(id.clone());
                    if *decremented && *epoch == self.count_epoch {
                        self.unread_count = self.unread_count.saturating_add(1);
                    }
                }
            }
            PendingChange::MarkAllRead {
                ids,
                previous_count,
                epoch,
                seq,
            } => {
                let covered = self.pending_bulks.remove(seq).unwrap_or_default();

                for id in ids {
                    self.release_pending(id);
                    if !self.pending_reads.contains_key(id) && self.mark_unread(id) {
                        reverted.push(id.clone());
                    }
                }

                let mut restored = *previous_count;
                for id in covered {
                    if !self.pending_reads.contains_key(&id) && self.mark_unread(&id) {
                        reverted.push(id);
                        restored += 1;
                    }
                }

                // Arrivals since the reset were counted on top of zero.
                if *epoch == self.count_epoch {
                    self.unread_count = self.unread_count.saturating_add(restored);
                }
            }
        }

        reverted
    }

    /// Whether `id` has an optimistic mark-read in flight
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending_reads.contains_key(id)
    }

    /// Drop everything (logout)
    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
        self.pending_reads.clear();
        self.pending_bulks.clear();
        self.unread_count = 0;
        self.count_epoch += 1;
    }

    /// Flip a held item back to unread; false if unknown or already unread
    fn mark_unread(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) if item.read => {
                item.read = false;
                true
            }
            _ => false,
        }
    }

    fn release_pending(&mut self, id: &str) {
        if let Some(count) = self.pending_reads.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.pending_reads.remove(id);
            }
        }
    }
}

impl PendingChange {
    /// Ids touched by this change
    pub fn ids(&self) -> Vec<&str> {
        match self {
            PendingChange::MarkRead { id, .. } => vec![id.as_str()],
            PendingChange::MarkAllRead { ids, .. } => ids.iter().map(String::as_str).collect(),
        }
    }
}
