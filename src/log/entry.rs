//! The log entry envelope.
//!
//! Field names are fixed by the consensus runtime's JSON encoding:
//!
//! ```json
//! { "Id": {"Id": 1}, "Session": {"Id": 1}, "Type": 2, "Data": "NICK sECuRE" }
//! ```
//!
//! Entry ids are allocated from a nanosecond wall clock, so an id doubles
//! as the entry's timestamp. That makes the id the engine's only clock:
//! replaying an entry on any replica, at any time, observes the same
//! instant the original execution did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique id of a log entry; also its creation timestamp in nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntryId {
    #[serde(rename = "Id")]
    pub id: i64,
}

impl EntryId {
    /// The wall-clock instant encoded in this id.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.id)
    }

    /// Build an id carrying the given instant. Used by tests and by the
    /// runtime's id allocator.
    pub fn from_timestamp(t: DateTime<Utc>) -> Self {
        Self { id: t.timestamp_nanos_opt().unwrap_or(i64::MAX) }
    }
}

/// Id of the session an entry belongs to. A session's id is the id of the
/// `CreateSession` entry that opened it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SessionId {
    #[serde(rename = "Id")]
    pub id: i64,
}

/// What a log entry carries. Encoded as a bare integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum EntryKind {
    /// A client authenticated; open a session whose id is the entry id.
    CreateSession,
    /// Tear the session down (bridge disconnect, timeout).
    DeleteSession,
    /// One raw IRC line from the client, to be parsed and dispatched.
    IrcMessage,
    /// A poison entry that crashed a replica; every replica discards it.
    MessageOfDeath,
    /// Anything this version does not understand. Ignored by the engine
    /// and dropped by compaction, but round-trips through the envelope.
    Other(i64),
}

impl From<i64> for EntryKind {
    fn from(raw: i64) -> Self {
        match raw {
            0 => Self::CreateSession,
            1 => Self::DeleteSession,
            2 => Self::IrcMessage,
            5 => Self::MessageOfDeath,
            other => Self::Other(other),
        }
    }
}

impl From<EntryKind> for i64 {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::CreateSession => 0,
            EntryKind::DeleteSession => 1,
            EntryKind::IrcMessage => 2,
            EntryKind::MessageOfDeath => 5,
            EntryKind::Other(other) => other,
        }
    }
}

/// One committed log entry, exactly as the consensus runtime hands it to
/// the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "Id")]
    pub id: EntryId,
    /// Owning session. `CreateSession` entries leave this at the default;
    /// the session they open is named by [`Entry::created_session`].
    #[serde(rename = "Session", default)]
    pub session: SessionId,
    #[serde(rename = "Type")]
    pub kind: EntryKind,
    #[serde(rename = "Data", default)]
    pub data: String,
}

impl Entry {
    /// The session a `CreateSession` entry opens: its own entry id.
    pub fn created_session(&self) -> SessionId {
        SessionId { id: self.id.id }
    }

    /// The session this entry acts on, regardless of kind.
    pub fn owner(&self) -> Option<SessionId> {
        match self.kind {
            EntryKind::CreateSession => Some(self.created_session()),
            EntryKind::DeleteSession | EntryKind::IrcMessage => {
                (self.session.id != 0).then_some(self.session)
            }
            EntryKind::MessageOfDeath | EntryKind::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Envelope encoding ────────────────────────────────────────

    #[test]
    fn decode_irc_entry() {
        let entry: Entry = serde_json::from_str(
            r#"{"Id": {"Id": 2}, "Session": {"Id": 1}, "Type": 2, "Data": "NICK sECuRE"}"#,
        )
        .unwrap();
        assert_eq!(entry.id, EntryId { id: 2 });
        assert_eq!(entry.session, SessionId { id: 1 });
        assert_eq!(entry.kind, EntryKind::IrcMessage);
        assert_eq!(entry.data, "NICK sECuRE");
    }

    #[test]
    fn decode_auth_entry_without_session() {
        let entry: Entry =
            serde_json::from_str(r#"{"Id": {"Id": 1}, "Type": 0, "Data": "auth"}"#).unwrap();
        assert_eq!(entry.kind, EntryKind::CreateSession);
        assert_eq!(entry.session, SessionId::default());
        assert_eq!(entry.created_session(), SessionId { id: 1 });
    }

    #[test]
    fn unknown_type_roundtrips() {
        let entry: Entry =
            serde_json::from_str(r#"{"Id": {"Id": 9}, "Type": 7, "Data": "x"}"#).unwrap();
        assert_eq!(entry.kind, EntryKind::Other(7));

        let encoded = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let entry = Entry {
            id: EntryId { id: 1422134861000000001 },
            session: SessionId { id: 4 },
            kind: EntryKind::IrcMessage,
            data: "JOIN #test".into(),
        };
        let encoded = serde_json::to_string(&entry).unwrap();
        assert_eq!(serde_json::from_str::<Entry>(&encoded).unwrap(), entry);
    }

    // ── Ids as timestamps ────────────────────────────────────────

    #[test]
    fn id_encodes_instant() {
        let now = Utc::now();
        let id = EntryId::from_timestamp(now);
        // Nanosecond precision survives the roundtrip.
        assert_eq!(id.timestamp(), now);
    }

    #[test]
    fn small_ids_are_ancient() {
        let id = EntryId { id: 5 };
        assert!(id.timestamp() < Utc::now() - chrono::Duration::days(365));
    }

    // ── Owners ───────────────────────────────────────────────────

    #[test]
    fn owner_by_kind() {
        let auth: Entry =
            serde_json::from_str(r#"{"Id": {"Id": 4}, "Type": 0, "Data": "auth"}"#).unwrap();
        assert_eq!(auth.owner(), Some(SessionId { id: 4 }));

        let msg: Entry = serde_json::from_str(
            r#"{"Id": {"Id": 5}, "Session": {"Id": 4}, "Type": 2, "Data": "PING"}"#,
        )
        .unwrap();
        assert_eq!(msg.owner(), Some(SessionId { id: 4 }));

        let death: Entry =
            serde_json::from_str(r#"{"Id": {"Id": 6}, "Type": 5, "Data": "boom"}"#).unwrap();
        assert_eq!(death.owner(), None);
    }
}
