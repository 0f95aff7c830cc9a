//! The log store interface and the in-memory implementation.
//!
//! The durable store (and the consensus runtime feeding it) lives outside
//! this crate; the compactor and the tests only need the read side plus a
//! way to iterate one session's history.

use std::collections::BTreeMap;

use super::entry::Entry;
use crate::irc::Message;

/// Store or cursor I/O failure. The in-memory store never produces one,
/// but durable stores do, and the compaction oracle propagates them
/// instead of guessing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("log store i/o")]
    Io(#[from] std::io::Error),
    #[error("corrupt entry at index {index}: {reason}")]
    Corrupt { index: u64, reason: String },
}

/// Read access to a contiguous, index-addressed log range.
pub trait LogStore {
    /// Index of the first entry, 1 when the store is empty.
    fn first_index(&self) -> u64;
    /// Index of the last entry, 0 when the store is empty.
    fn last_index(&self) -> u64;
    /// Fetch one entry. `Ok(None)` for an index inside the range that was
    /// never written (a hole).
    fn get(&self, index: u64) -> Result<Option<Entry>, StoreError>;
}

/// A forward iterator over one session's parsed IRC messages.
///
/// `Ok(None)` is the end of the cursor. A session with no earlier history
/// yields `Ok(None)` immediately; missing data is never an error here.
/// Backward cursors are the same trait walking most-recent-first.
pub trait Cursor {
    fn next(&mut self) -> Result<Option<&Message>, StoreError>;
}

/// In-memory [`LogStore`], used by tests and as the scratch input the
/// compactor snapshots into.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: BTreeMap<u64, Entry>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry at an explicit index (replay from a snapshot).
    pub fn insert(&mut self, index: u64, entry: Entry) {
        self.entries.insert(index, entry);
    }

    /// Append an entry at `last_index() + 1`.
    pub fn append(&mut self, entry: Entry) -> u64 {
        let index = self.last_index() + 1;
        self.entries.insert(index, entry);
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LogStore for MemoryLogStore {
    fn first_index(&self) -> u64 {
        self.entries.keys().next().copied().unwrap_or(1)
    }

    fn last_index(&self) -> u64 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    fn get(&self, index: u64) -> Result<Option<Entry>, StoreError> {
        Ok(self.entries.get(&index).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{EntryId, EntryKind, SessionId};
    use pretty_assertions::assert_eq;

    fn entry(id: i64, data: &str) -> Entry {
        Entry {
            id: EntryId { id },
            session: SessionId { id: 1 },
            kind: EntryKind::IrcMessage,
            data: data.into(),
        }
    }

    #[test]
    fn empty_store_range() {
        let store = MemoryLogStore::new();
        assert_eq!(store.first_index(), 1);
        assert_eq!(store.last_index(), 0);
        assert!(store.get(1).unwrap().is_none());
    }

    #[test]
    fn append_assigns_consecutive_indices() {
        let mut store = MemoryLogStore::new();
        assert_eq!(store.append(entry(1, "PING")), 1);
        assert_eq!(store.append(entry(2, "PING")), 2);
        assert_eq!(store.first_index(), 1);
        assert_eq!(store.last_index(), 2);
    }

    #[test]
    fn get_returns_stored_entry() {
        let mut store = MemoryLogStore::new();
        store.insert(5, entry(5, "NICK sECuRE"));
        assert_eq!(store.get(5).unwrap().unwrap().data, "NICK sECuRE");
        assert!(store.get(4).unwrap().is_none());
    }
}
