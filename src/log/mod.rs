//! The log model shared with the consensus runtime: the entry envelope,
//! the store interface, and session-scoped cursors over log history.

pub mod entry;
pub mod store;

pub use entry::{Entry, EntryId, EntryKind, SessionId};
pub use store::{Cursor, LogStore, MemoryLogStore, StoreError};
