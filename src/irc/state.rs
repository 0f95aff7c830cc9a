//! In-memory state: sessions, channels, and their mode vectors.
//!
//! Channel membership is a bidirectional relation: the channel knows its
//! members and the session knows its channels. Both sides are keyed by
//! stable identifiers (display nick, folded channel name) instead of
//! holding references into each other; [`super::server::IrcServer`] owns
//! everything and keeps the two sides in step.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::message::Prefix;
use crate::log::SessionId;

/// Inclusive span of mode letters a [`ModeSet`] can hold (`A` through `z`,
/// covering both cases plus the punctuation between them).
const MODE_SPAN: usize = (b'z' - b'A' + 1) as usize;

/// A set of mode flags indexed by mode letter. Used for channel modes
/// (`t`, `s`) and per-session user modes (`o`).
#[derive(Clone, PartialEq, Eq)]
pub struct ModeSet {
    set: [bool; MODE_SPAN],
}

impl Default for ModeSet {
    fn default() -> Self {
        Self { set: [false; MODE_SPAN] }
    }
}

impl ModeSet {
    fn slot(mode: char) -> Option<usize> {
        if mode.is_ascii() && ('A'..='z').contains(&mode) {
            Some(mode as usize - 'A' as usize)
        } else {
            None
        }
    }

    pub fn get(&self, mode: char) -> bool {
        Self::slot(mode).map_or(false, |i| self.set[i])
    }

    pub fn set(&mut self, mode: char, value: bool) {
        if let Some(i) = Self::slot(mode) {
            self.set[i] = value;
        }
    }

    /// Render as an IRC mode string: `+` followed by the set letters in
    /// ascending order, `+` alone when nothing is set.
    pub fn to_mode_string(&self) -> String {
        let mut out = String::from("+");
        for (i, set) in self.set.iter().enumerate() {
            if *set {
                out.push((b'A' + i as u8) as char);
            }
        }
        out
    }
}

impl std::fmt::Debug for ModeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModeSet({})", self.to_mode_string())
    }
}

/// Number of per-member status bits a channel tracks.
const MEMBER_STATUS_BITS: usize = 1;

/// Index of the channel-operator bit.
const CHANOP: usize = 0;

/// Per-member status inside one channel, a fixed-size bit vector so new
/// privileges slot in without changing the map layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberStatus {
    flags: [bool; MEMBER_STATUS_BITS],
}

impl MemberStatus {
    pub fn chanop(&self) -> bool {
        self.flags[CHANOP]
    }

    pub fn set_chanop(&mut self, value: bool) {
        self.flags[CHANOP] = value;
    }
}

/// One connected client's server-side state.
///
/// Created by a `CreateSession` log entry, mutated by the session's own IRC
/// commands, destroyed by `DeleteSession`, QUIT, or KILL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    /// Current nickname, empty until the first successful NICK.
    pub nick: String,
    pub username: String,
    pub realname: String,
    /// Global operator flag, granted by OPER.
    pub operator: bool,
    /// Away message, empty when the user is present.
    pub away: String,
    /// User modes (`o` is the only one the engine sets).
    pub modes: ModeSet,
    /// Folded names of the channels this session is in. Mirrors the
    /// channels' member maps.
    pub channels: HashSet<String>,
    /// Cached `nick!user@host` source marker, rebuilt on nick/user change.
    pub prefix: Prefix,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            nick: String::new(),
            username: String::new(),
            realname: String::new(),
            operator: false,
            away: String::new(),
            modes: ModeSet::default(),
            channels: HashSet::new(),
            prefix: Prefix::default(),
        }
    }

    /// The nick for reply parameters: `*` until registration names one.
    pub fn nick_or_star(&self) -> &str {
        if self.nick.is_empty() {
            "*"
        } else {
            &self.nick
        }
    }

    /// Rebuild the cached prefix after a nick or username change. The host
    /// part encodes the session id, which is stable for the lifetime of
    /// the connection.
    pub fn update_prefix(&mut self) {
        self.prefix = Prefix {
            name: self.nick.clone(),
            user: self.username.clone(),
            host: format!("atoll/0x{:x}", self.id.id),
        };
    }
}

/// An IRC channel. Exists exactly as long as it has members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Display name as spelled by the first joiner; map keys fold it.
    pub name: String,
    /// Members keyed by display nick.
    pub members: HashMap<String, MemberStatus>,
    pub modes: ModeSet,
    pub topic: String,
    /// Nick of whoever set the topic, as it was at that time.
    pub topic_nick: String,
    /// When the topic was set; `None` distinguishes "never set" from set.
    pub topic_time: Option<DateTime<Utc>>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
            modes: ModeSet::default(),
            topic: String::new(),
            topic_nick: String::new(),
            topic_time: None,
        }
    }

    /// Member nicks in sorted order, chanops marked with `@`. This is the
    /// RPL_NAMREPLY payload.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .iter()
            .map(|(nick, status)| {
                if status.chanop() {
                    format!("@{nick}")
                } else {
                    nick.clone()
                }
            })
            .collect();
        names.sort();
        names
    }

    /// Member nicks in sorted order without status markers (WHO order).
    pub fn sorted_members(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.keys().cloned().collect();
        names.sort();
        names
    }
}
