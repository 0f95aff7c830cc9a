//! The server state store and command dispatcher.
//!
//! [`IrcServer`] owns every session, channel and the nickname index. The
//! consensus runtime feeds it committed log entries through [`IrcServer::apply`]
//! one at a time, in log order; replies come back in the order the handler
//! appended them. Observers (status views, fan-out workers) share the
//! server through [`SharedServer`] and take the read lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::commands;
use super::message::{Message, Prefix};
use super::names::{irc_to_lower, split_channels};
use super::numerics::ERR_NEEDMOREPARAMS;
use super::state::{Channel, MemberStatus, Session};
use crate::config::Config;
use crate::log::{Entry, EntryKind, SessionId};

/// The server as shared between the apply loop (writer) and read-only
/// observers. Handlers never block, so write-lock hold times are bounded
/// by in-memory map work.
pub type SharedServer = Arc<RwLock<IrcServer>>;

/// The deterministic IRC state machine for one network replica.
pub struct IrcServer {
    pub(crate) config: Config,
    /// When the network was created (RPL_CREATED).
    pub(crate) created: DateTime<Utc>,
    /// The instant of the entry currently being applied. This is the only
    /// clock handlers may read; it comes from the entry id, so replays
    /// observe the same time the original execution did.
    pub(crate) clock: DateTime<Utc>,
    pub(crate) sessions: HashMap<SessionId, Session>,
    /// Folded nick to owning session. Exactly one owner per nick.
    pub(crate) nicks: HashMap<String, SessionId>,
    /// Folded channel name to channel. A channel exists iff it has members.
    pub(crate) channels: HashMap<String, Channel>,
}

impl IrcServer {
    pub fn new(config: Config, created: DateTime<Utc>) -> Self {
        Self {
            config,
            created,
            clock: created,
            sessions: HashMap::new(),
            nicks: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Session lifecycle ────────────────────────────────────────

    /// Open a session (log entry type `CreateSession`).
    pub fn create_session(&mut self, id: SessionId) {
        if self.sessions.contains_key(&id) {
            warn!(session = id.id, "duplicate CreateSession ignored");
            return;
        }
        info!(session = id.id, "session created");
        self.sessions.insert(id, Session::new(id));
    }

    /// Destroy a session (log entry type `DeleteSession`, QUIT, KILL):
    /// drop its nick, remove it from every channel, and drop channels
    /// that end up empty.
    pub fn delete_session(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(&id) else {
            warn!(session = id.id, "DeleteSession for unknown session ignored");
            return;
        };
        if !session.nick.is_empty() {
            self.nicks.remove(&irc_to_lower(&session.nick));
        }
        for folded in &session.channels {
            let emptied = match self.channels.get_mut(folded) {
                Some(channel) => {
                    channel.members.remove(&session.nick);
                    channel.members.is_empty()
                }
                None => false,
            };
            if emptied {
                self.channels.remove(folded);
            }
        }
        info!(session = id.id, nick = %session.nick, "session destroyed");
    }

    // ── Entry application ────────────────────────────────────────

    /// Apply one committed log entry. The single entry point the
    /// consensus runtime calls, serialized per replica.
    pub fn apply(&mut self, entry: &Entry) -> Vec<Message> {
        self.clock = entry.id.timestamp();
        match entry.kind {
            EntryKind::CreateSession => {
                self.create_session(entry.created_session());
                Vec::new()
            }
            EntryKind::DeleteSession => {
                self.delete_session(entry.session);
                Vec::new()
            }
            EntryKind::IrcMessage => match Message::parse(&entry.data) {
                Ok(msg) => self.dispatch(entry.session, &msg),
                Err(err) => {
                    debug!(%err, data = %entry.data, "ignoring unparseable entry");
                    Vec::new()
                }
            },
            EntryKind::MessageOfDeath | EntryKind::Other(_) => Vec::new(),
        }
    }

    /// Parse and dispatch one raw IRC line for a session, with the clock
    /// pinned to `now`. Tests and the bridge's echo path use this;
    /// committed entries come through [`IrcServer::apply`].
    pub fn process(&mut self, sid: SessionId, line: &str, now: DateTime<Utc>) -> Vec<Message> {
        self.clock = now;
        match Message::parse(line) {
            Ok(msg) => self.dispatch(sid, &msg),
            Err(err) => {
                debug!(%err, line, "ignoring unparseable line");
                Vec::new()
            }
        }
    }

    /// Route a parsed message to its handler: unknown commands are
    /// silently ignored, parameter minimums are enforced here, and
    /// JOIN/PART channel lists are split so handlers see one channel per
    /// invocation. Replies without a prefix get the server prefix.
    pub(crate) fn dispatch(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let command = msg.command.to_uppercase();
        let Some(spec) = commands::lookup(&command) else {
            debug!(command = %msg.command, "ignoring unknown command");
            return Vec::new();
        };
        let Some(session) = self.sessions.get(&sid) else {
            warn!(session = sid.id, command = %command, "message from unknown session");
            return Vec::new();
        };

        let mut replies = if msg.params.len() < spec.min_params {
            vec![Message {
                command: ERR_NEEDMOREPARAMS.into(),
                params: vec![session.nick_or_star().into(), command.clone()],
                trailing: Some("Not enough parameters".into()),
                ..Message::default()
            }]
        } else if matches!(command.as_str(), "JOIN" | "PART") && msg.params[0].contains(',') {
            let channels: Vec<String> =
                split_channels(&msg.params[0]).map(str::to_owned).collect();
            let mut replies = Vec::new();
            for channel in channels {
                let mut single = msg.clone();
                single.params[0] = channel;
                replies.extend((spec.handler)(self, sid, &single));
            }
            replies
        } else {
            (spec.handler)(self, sid, msg)
        };

        let server_prefix = Prefix::server(&self.config.server_name);
        for reply in &mut replies {
            if reply.prefix.is_none() {
                reply.prefix = Some(server_prefix.clone());
            }
        }
        replies
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_by_nick(&self, nick: &str) -> Option<&Session> {
        self.nicks
            .get(&irc_to_lower(nick))
            .and_then(|id| self.sessions.get(id))
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    pub fn sessions(&self) -> &HashMap<SessionId, Session> {
        &self.sessions
    }

    pub fn channels(&self) -> &HashMap<String, Channel> {
        &self.channels
    }

    pub fn nicks(&self) -> &HashMap<String, SessionId> {
        &self.nicks
    }

    pub(crate) fn must_session(&self, sid: SessionId) -> &Session {
        self.sessions
            .get(&sid)
            .expect("dispatcher verified the session exists")
    }

    // ── Membership helpers ───────────────────────────────────────
    //
    // All membership mutation goes through these two so the session's
    // channel set and the channel's member map never disagree.

    /// Add `sid` to a channel, creating it if needed; the creator becomes
    /// channel operator.
    pub(crate) fn join_channel(&mut self, sid: SessionId, name: &str) {
        let folded = irc_to_lower(name);
        let is_new = !self.channels.contains_key(&folded);
        let session = self
            .sessions
            .get_mut(&sid)
            .expect("dispatcher verified the session exists");
        let nick = session.nick.clone();
        session.channels.insert(folded.clone());
        let channel = self
            .channels
            .entry(folded)
            .or_insert_with(|| Channel::new(name));
        let mut status = MemberStatus::default();
        if is_new {
            status.set_chanop(true);
        }
        channel.members.insert(nick, status);
    }

    /// Remove `sid` from a channel, dropping the channel when it empties.
    pub(crate) fn part_channel(&mut self, sid: SessionId, folded: &str) {
        let session = self
            .sessions
            .get_mut(&sid)
            .expect("dispatcher verified the session exists");
        session.channels.remove(folded);
        let nick = session.nick.clone();
        let emptied = match self.channels.get_mut(folded) {
            Some(channel) => {
                channel.members.remove(&nick);
                channel.members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.channels.remove(folded);
        }
    }

    // ── Consistency ──────────────────────────────────────────────

    /// Panic if any cross-structure invariant is broken. A violation
    /// means this replica has diverged, which is unrecoverable; tests
    /// call this after every scenario.
    pub fn assert_invariants(&self) {
        for (id, session) in &self.sessions {
            assert_eq!(*id, session.id, "session {} stored under wrong key", session.id.id);
            if !session.nick.is_empty() {
                assert_eq!(
                    self.nicks.get(&irc_to_lower(&session.nick)),
                    Some(id),
                    "nick index missing or wrong for {:?}",
                    session.nick
                );
            }
            for folded in &session.channels {
                let channel = self
                    .channels
                    .get(folded)
                    .unwrap_or_else(|| panic!("session {} lists dead channel {folded}", id.id));
                assert!(
                    channel.members.contains_key(&session.nick),
                    "channel {folded} does not list member {:?}",
                    session.nick
                );
            }
        }
        for (folded, channel) in &self.channels {
            assert!(!channel.members.is_empty(), "channel {folded} exists without members");
            for nick in channel.members.keys() {
                let session = self
                    .session_by_nick(nick)
                    .unwrap_or_else(|| panic!("channel {folded} lists unknown nick {nick:?}"));
                assert!(
                    session.channels.contains(folded),
                    "session {:?} does not list channel {folded}",
                    session.nick
                );
            }
        }
        for (folded, id) in &self.nicks {
            let session = self
                .sessions
                .get(id)
                .unwrap_or_else(|| panic!("nick index {folded:?} points at dead session"));
            assert_eq!(
                irc_to_lower(&session.nick),
                *folded,
                "nick index key does not fold session nick"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::EntryId;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn server() -> IrcServer {
        IrcServer::new(
            Config::default(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn wire(replies: Vec<Message>) -> Vec<String> {
        replies.iter().map(Message::to_wire).collect()
    }

    // ── Session lifecycle ────────────────────────────────────────

    #[test]
    fn create_and_delete_session() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        assert!(server.session(sid).is_some());

        server.delete_session(sid);
        assert!(server.session(sid).is_none());
        server.assert_invariants();
    }

    #[test]
    fn duplicate_create_is_ignored() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        server.process(sid, "NICK sECuRE", now());
        server.create_session(sid);
        // The registered nick survived the duplicate CreateSession.
        assert_eq!(server.session(sid).unwrap().nick, "sECuRE");
    }

    #[test]
    fn delete_session_drops_emptied_channels() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        server.process(sid, "NICK sECuRE", now());
        server.process(sid, "USER blah 0 * :M", now());
        server.process(sid, "JOIN #test", now());
        assert!(server.channel("#test").is_some());

        server.delete_session(sid);
        assert!(server.channel("#test").is_none());
        assert!(server.nicks().is_empty());
        server.assert_invariants();
    }

    // ── Dispatcher ───────────────────────────────────────────────

    #[test]
    fn unknown_command_is_ignored() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        assert!(server.process(sid, "BLAH foo", now()).is_empty());
    }

    #[test]
    fn unknown_session_is_ignored() {
        let mut server = server();
        assert!(server.process(SessionId { id: 9 }, "PING x", now()).is_empty());
    }

    #[test]
    fn missing_params_yield_461() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        assert_eq!(
            wire(server.process(sid, "USER onlyone", now())),
            vec![":atoll.net 461 * USER :Not enough parameters"]
        );
    }

    #[test]
    fn replies_carry_server_prefix() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        let replies = server.process(sid, "PING foobar", now());
        assert_eq!(wire(replies), vec![":atoll.net PONG foobar"]);
    }

    #[test]
    fn join_list_is_split_per_channel() {
        let mut server = server();
        let sid = SessionId { id: 1 };
        server.create_session(sid);
        server.process(sid, "NICK sECuRE", now());
        server.process(sid, "USER blah 0 * :M", now());

        server.process(sid, "JOIN #a,#b", now());
        assert!(server.channel("#a").is_some());
        assert!(server.channel("#b").is_some());

        server.process(sid, "PART #a,#b", now());
        assert!(server.channel("#a").is_none());
        assert!(server.channel("#b").is_none());
        server.assert_invariants();
    }

    // ── Envelope application ─────────────────────────────────────

    #[test]
    fn apply_drives_full_lifecycle() {
        let mut server = server();
        let entries: Vec<Entry> = [
            r#"{"Id": {"Id": 1}, "Type": 0, "Data": "auth"}"#,
            r#"{"Id": {"Id": 2}, "Session": {"Id": 1}, "Type": 2, "Data": "NICK sECuRE"}"#,
            r#"{"Id": {"Id": 3}, "Session": {"Id": 1}, "Type": 2, "Data": "USER blah 0 * :Michael Stapelberg"}"#,
            r#"{"Id": {"Id": 4}, "Session": {"Id": 1}, "Type": 2, "Data": "JOIN #chaos-hd"}"#,
        ]
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect();

        for entry in &entries {
            server.apply(entry);
        }

        let session = server.session(SessionId { id: 1 }).unwrap();
        assert_eq!(session.nick, "sECuRE");
        assert_eq!(session.username, "blah");
        assert_eq!(session.realname, "Michael Stapelberg");
        assert!(server.channel("#chaos-hd").is_some());
        server.assert_invariants();
    }

    #[test]
    fn apply_ignores_message_of_death() {
        let mut server = server();
        let entry = Entry {
            id: EntryId { id: 1 },
            session: SessionId::default(),
            kind: EntryKind::MessageOfDeath,
            data: "poison".into(),
        };
        assert!(server.apply(&entry).is_empty());
        assert!(server.sessions().is_empty());
    }
}
