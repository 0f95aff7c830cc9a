//! Per-command behavior: handlers, fan-out interest, compaction relevance.
//!
//! One table row per supported command carries everything its three
//! consumers need: the dispatcher runs `handler` under the write lock, the
//! transport asks `interesting` which sessions should see a reply, and the
//! compactor asks `still_relevant` whether a logged command still
//! contributes to the end state. Handlers are pure functions of
//! `(server state, session, message)`: same input, same replies, same
//! mutation, on every replica.

use std::collections::HashSet;

use super::message::Message;
use super::names::{irc_eq, irc_to_lower, is_valid_channel, is_valid_nickname, split_channels};
use super::numerics::*;
use super::server::IrcServer;
use super::state::Session;
use crate::log::{Cursor, SessionId, StoreError};

pub(crate) type Handler = fn(&mut IrcServer, SessionId, &Message) -> Vec<Message>;
pub(crate) type InterestFn = fn(&Session, &Message) -> bool;
pub(crate) type RelevanceFn =
    fn(Option<&Session>, &Message, &mut dyn Cursor, &mut dyn Cursor) -> Result<bool, StoreError>;

/// Everything the engine knows about one command.
pub(crate) struct CommandSpec {
    pub handler: Handler,
    /// Minimum parameter count, enforced by the dispatcher before the
    /// handler runs (ERR_NEEDMOREPARAMS otherwise).
    pub min_params: usize,
    /// Which sessions, besides the sender, should receive a reply. `None`
    /// means the reply goes to the sender only.
    pub interesting: Option<InterestFn>,
    /// Whether a logged instance of this command is still needed to
    /// rebuild the end state. `None` means keep, conservatively.
    pub still_relevant: Option<RelevanceFn>,
}

// Keep this list ordered the same way the handlers below are ordered.
static COMMANDS: &[(&str, CommandSpec)] = &[
    ("PING", CommandSpec {
        handler: IrcServer::cmd_ping,
        min_params: 0,
        interesting: None,
        still_relevant: None,
    }),
    ("NICK", CommandSpec {
        handler: IrcServer::cmd_nick,
        min_params: 0,
        // Delivered network-wide; a channels-in-common check would miss
        // query-only correspondents.
        interesting: Some(interest_everyone),
        still_relevant: Some(relevant_nick),
    }),
    ("USER", CommandSpec {
        handler: IrcServer::cmd_user,
        min_params: 3,
        interesting: None,
        still_relevant: Some(relevant_user),
    }),
    ("JOIN", CommandSpec {
        handler: IrcServer::cmd_join,
        min_params: 1,
        interesting: Some(interest_join),
        still_relevant: Some(relevant_join),
    }),
    ("PART", CommandSpec {
        handler: IrcServer::cmd_part,
        min_params: 1,
        interesting: Some(interest_part),
        still_relevant: Some(relevant_part),
    }),
    ("QUIT", CommandSpec {
        handler: IrcServer::cmd_quit,
        min_params: 0,
        interesting: Some(interest_everyone),
        // Safe to drop from the log: session teardown replays through
        // DeleteSession entries, which the bridge always emits.
        still_relevant: Some(never_relevant),
    }),
    ("PRIVMSG", CommandSpec {
        handler: IrcServer::cmd_privmsg,
        min_params: 0,
        interesting: Some(interest_privmsg),
        still_relevant: Some(never_relevant),
    }),
    ("MODE", CommandSpec {
        handler: IrcServer::cmd_mode,
        min_params: 1,
        interesting: Some(common_channel_or_direct),
        still_relevant: None,
    }),
    ("WHO", CommandSpec {
        handler: IrcServer::cmd_who,
        min_params: 0,
        interesting: None,
        still_relevant: Some(never_relevant),
    }),
    ("OPER", CommandSpec {
        handler: IrcServer::cmd_oper,
        min_params: 2,
        interesting: None,
        still_relevant: None,
    }),
    ("KILL", CommandSpec {
        handler: IrcServer::cmd_kill,
        min_params: 1,
        interesting: None,
        still_relevant: None,
    }),
    ("AWAY", CommandSpec {
        handler: IrcServer::cmd_away,
        min_params: 0,
        interesting: None,
        still_relevant: None,
    }),
    ("TOPIC", CommandSpec {
        handler: IrcServer::cmd_topic,
        min_params: 1,
        interesting: Some(interest_topic),
        still_relevant: Some(relevant_topic),
    }),
    ("MOTD", CommandSpec {
        handler: IrcServer::cmd_motd,
        min_params: 0,
        interesting: None,
        still_relevant: None,
    }),
];

/// Look up the table row for an (upper-cased) command token.
pub(crate) fn lookup(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, spec)| spec)
}

/// Should `session` receive this reply? Consulted by the transport for
/// every session besides the sender, which always gets its replies.
pub fn interesting(session: &Session, msg: &Message) -> bool {
    lookup(&msg.command.to_uppercase())
        .and_then(|spec| spec.interesting)
        .map_or(false, |f| f(session, msg))
}

/// Shorthand for a reply numeric with a trailing text.
fn numeric(command: &str, params: Vec<String>, trailing: &str) -> Message {
    Message {
        command: command.into(),
        params,
        trailing: Some(trailing.into()),
        ..Message::default()
    }
}

// ── Handlers ─────────────────────────────────────────────────────

impl IrcServer {
    pub(crate) fn cmd_ping(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let nick = self.must_session(sid).nick_or_star().to_owned();
        if msg.params.is_empty() {
            return vec![numeric(ERR_NOORIGIN, vec![nick], "No origin specified")];
        }
        vec![Message {
            command: "PONG".into(),
            params: vec![msg.params[0].clone()],
            ..Message::default()
        }]
    }

    pub(crate) fn cmd_nick(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let (old_nick, old_prefix, star) = {
            let session = self.must_session(sid);
            (
                session.nick.clone(),
                session.prefix.clone(),
                session.nick_or_star().to_owned(),
            )
        };

        if msg.params.is_empty() {
            return vec![numeric(ERR_NONICKNAMEGIVEN, vec![star], "No nickname given")];
        }
        let candidate = msg.params[0].clone();
        if !is_valid_nickname(&candidate, self.config.max_nick_len) {
            return vec![numeric(
                ERR_ERRONEUSNICKNAME,
                vec![star, candidate],
                "Erroneus nickname",
            )];
        }
        let folded = irc_to_lower(&candidate);
        if self.nicks.contains_key(&folded) {
            return vec![numeric(
                ERR_NICKNAMEINUSE,
                vec![star, candidate],
                "Nickname is already in use",
            )];
        }

        {
            let session = self
                .sessions
                .get_mut(&sid)
                .expect("dispatcher verified the session exists");
            session.nick = candidate.clone();
            session.update_prefix();
        }
        self.nicks.insert(folded, sid);

        if !old_nick.is_empty() {
            // A rename: re-key the nick index and every channel's member
            // map, carrying per-member statuses across.
            self.nicks.remove(&irc_to_lower(&old_nick));
            for channel in self.channels.values_mut() {
                if let Some(status) = channel.members.remove(&old_nick) {
                    channel.members.insert(candidate.clone(), status);
                }
            }
            return vec![Message {
                prefix: Some(old_prefix),
                command: "NICK".into(),
                trailing: Some(candidate),
                ..Message::default()
            }];
        }

        // First successful NICK completes registration, whether USER came
        // before or after it.
        self.welcome(sid)
    }

    /// The 001-005 sequence plus MOTD, sent once per session.
    fn welcome(&mut self, sid: SessionId) -> Vec<Message> {
        let nick = self.must_session(sid).nick.clone();
        let server = self.config.server_name.clone();
        let mut replies = vec![
            numeric(
                RPL_WELCOME,
                vec![nick.clone()],
                &format!("Welcome to {}!", self.config.network_name),
            ),
            numeric(RPL_YOURHOST, vec![nick.clone()], &format!("Your host is {server}")),
            numeric(
                RPL_CREATED,
                vec![nick.clone()],
                &format!("This server was created {}", self.created),
            ),
            numeric(RPL_MYINFO, vec![nick.clone()], &format!("{server} v1 o ost")),
            Message {
                command: RPL_ISUPPORT.into(),
                params: vec![
                    nick,
                    "CHANTYPES=#".into(),
                    format!("CHANNELLEN={}", self.config.max_channel_len),
                    format!("NICKLEN={}", self.config.max_nick_len),
                    "MODES=1".into(),
                    "PREFIX=".into(),
                ],
                trailing: Some("are supported by this server".into()),
                ..Message::default()
            },
        ];
        replies.extend(self.cmd_motd(sid, &Message::default()));
        replies
    }

    pub(crate) fn cmd_user(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let session = self
            .sessions
            .get_mut(&sid)
            .expect("dispatcher verified the session exists");
        // Only the first USER counts; repeats after registration are
        // silently ignored.
        if !session.username.is_empty() {
            return Vec::new();
        }
        // Username is kept so bans have something to match; realname
        // because some people actually set it and others look at it.
        session.username = msg.params[0].clone();
        session.realname = msg.trailing_or_empty().to_owned();
        session.update_prefix();
        Vec::new()
    }

    pub(crate) fn cmd_join(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let channelname = msg.params[0].clone();
        let nick = self.must_session(sid).nick.clone();
        if !is_valid_channel(&channelname, self.config.max_channel_len) {
            return vec![numeric(
                ERR_NOSUCHCHANNEL,
                vec![nick, channelname],
                "No such channel",
            )];
        }
        self.join_channel(sid, &channelname);

        let folded = irc_to_lower(&channelname);
        let names = self
            .channels
            .get(&folded)
            .expect("just joined")
            .sorted_names()
            .join(" ");
        let prefix = self.must_session(sid).prefix.clone();

        let mut replies = vec![Message {
            prefix: Some(prefix),
            command: "JOIN".into(),
            trailing: Some(channelname.clone()),
            ..Message::default()
        }];
        // Fold the topic status in by running a synthetic TOPIC query.
        let query = Message {
            command: "TOPIC".into(),
            params: vec![channelname.clone()],
            ..Message::default()
        };
        replies.extend(self.cmd_topic(sid, &query));
        replies.push(Message {
            command: RPL_NAMREPLY.into(),
            params: vec![nick.clone(), "=".into(), channelname.clone()],
            trailing: Some(names),
            ..Message::default()
        });
        replies.push(numeric(
            RPL_ENDOFNAMES,
            vec![nick, channelname],
            "End of /NAMES list",
        ));
        replies
    }

    pub(crate) fn cmd_part(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let channelname = msg.params[0].clone();
        let folded = irc_to_lower(&channelname);
        let (nick, prefix, member) = {
            let session = self.must_session(sid);
            (
                session.nick.clone(),
                session.prefix.clone(),
                session.channels.contains(&folded),
            )
        };

        if !self.channels.contains_key(&folded) {
            return vec![numeric(
                ERR_NOSUCHCHANNEL,
                vec![nick, channelname],
                "No such channel",
            )];
        }
        if !member {
            return vec![numeric(
                ERR_NOTONCHANNEL,
                vec![nick, channelname],
                "You're not on that channel",
            )];
        }

        self.part_channel(sid, &folded);
        vec![Message {
            prefix: Some(prefix),
            command: "PART".into(),
            params: vec![channelname],
            ..Message::default()
        }]
    }

    pub(crate) fn cmd_quit(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let prefix = self.must_session(sid).prefix.clone();
        self.delete_session(sid);
        vec![Message {
            prefix: Some(prefix),
            command: "QUIT".into(),
            trailing: msg.trailing.clone(),
            ..Message::default()
        }]
    }

    pub(crate) fn cmd_privmsg(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let (nick, prefix) = {
            let session = self.must_session(sid);
            (session.nick.clone(), session.prefix.clone())
        };
        if msg.params.is_empty() {
            return vec![numeric(
                ERR_NORECIPIENT,
                vec![nick],
                "No recipient given (PRIVMSG)",
            )];
        }
        let target = msg.params[0].clone();
        let text = msg.trailing_or_empty().to_owned();
        if text.is_empty() {
            return vec![numeric(ERR_NOTEXTTOSEND, vec![nick], "No text to send")];
        }

        if target.starts_with('#') {
            // Fan-out to members is the transport's job via `interesting`.
            return vec![Message {
                prefix: Some(prefix),
                command: "PRIVMSG".into(),
                params: vec![target],
                trailing: Some(text),
                ..Message::default()
            }];
        }

        let Some(recipient) = self.session_by_nick(&target) else {
            return vec![numeric(
                ERR_NOSUCHNICK,
                vec![nick, target],
                "No such nick/channel",
            )];
        };
        let away = recipient.away.clone();

        let mut replies = vec![Message {
            prefix: Some(prefix),
            command: "PRIVMSG".into(),
            params: vec![target.clone()],
            trailing: Some(text),
            ..Message::default()
        }];
        if !away.is_empty() {
            replies.push(numeric(RPL_AWAY, vec![nick, target], &away));
        }
        replies
    }

    pub(crate) fn cmd_mode(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let target = msg.params[0].clone();
        let folded = irc_to_lower(&target);
        let (nick, prefix, operator, in_channel) = {
            let session = self.must_session(sid);
            (
                session.nick.clone(),
                session.prefix.clone(),
                session.operator,
                session.channels.contains(&folded),
            )
        };

        if in_channel {
            let channel = self
                .channels
                .get_mut(&folded)
                .expect("membership implies the channel exists");
            let modestr = msg.params.get(1).cloned().unwrap_or_default();

            if modestr.starts_with('+') || modestr.starts_with('-') {
                let chanop = channel.members.get(&nick).map_or(false, |s| s.chanop());
                if !chanop && !operator {
                    return vec![numeric(
                        ERR_CHANOPRIVSNEEDED,
                        vec![nick, target],
                        "You're not channel operator",
                    )];
                }

                let mut replies = Vec::new();
                let mut adding = modestr.starts_with('+');
                // Mode arguments are consumed left to right starting after
                // the mode string itself.
                let mut modearg = 2usize;
                for mode in modestr.chars().skip(1) {
                    match mode {
                        '+' | '-' => adding = mode == '+',
                        't' | 's' => channel.modes.set(mode, adding),
                        'o' => {
                            if let Some(opnick) = msg.params.get(modearg) {
                                match channel.members.get_mut(opnick) {
                                    Some(status) => status.set_chanop(adding),
                                    None => replies.push(numeric(
                                        ERR_USERNOTINCHANNEL,
                                        vec![nick.clone(), opnick.clone(), target.clone()],
                                        "They aren't on that channel",
                                    )),
                                }
                            }
                            modearg += 1;
                        }
                        unknown => replies.push(numeric(
                            ERR_UNKNOWNMODE,
                            vec![nick.clone(), unknown.to_string()],
                            "is unknown mode char to me",
                        )),
                    }
                }
                let consumed = modearg.min(msg.params.len());
                replies.push(Message {
                    prefix: Some(prefix),
                    command: "MODE".into(),
                    params: msg.params[..consumed].to_vec(),
                    ..Message::default()
                });
                return replies;
            }

            if msg.params.get(1).map(String::as_str) == Some("b") {
                // No ban support; answer the list query with its end marker.
                return vec![numeric(
                    RPL_ENDOFBANLIST,
                    vec![nick, target],
                    "End of channel ban list",
                )];
            }
            return vec![Message {
                command: RPL_CHANNELMODEIS.into(),
                params: vec![nick, target, channel.modes.to_mode_string()],
                ..Message::default()
            }];
        }

        if target == nick {
            let modes = self.must_session(sid).modes.to_mode_string();
            return vec![Message {
                prefix: Some(prefix),
                command: "MODE".into(),
                params: vec![nick],
                trailing: Some(modes),
                ..Message::default()
            }];
        }

        vec![numeric(
            ERR_NOTONCHANNEL,
            vec![nick, target],
            "You're not on that channel",
        )]
    }

    pub(crate) fn cmd_who(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let nick = self.must_session(sid).nick.clone();
        let Some(channelname) = msg.params.first().cloned() else {
            return vec![numeric(RPL_ENDOFWHO, vec![nick], "End of /WHO list")];
        };
        let last = numeric(
            RPL_ENDOFWHO,
            vec![nick.clone(), channelname.clone()],
            "End of /WHO list",
        );

        let Some(channel) = self.channels.get(&irc_to_lower(&channelname)) else {
            return vec![last];
        };
        // A secret channel is invisible to non-members.
        if channel.modes.get('s') && !channel.members.contains_key(&nick) {
            return vec![last];
        }

        let mut replies = Vec::new();
        for member in channel.sorted_members() {
            let Some(session) = self.session_by_nick(&member) else {
                continue;
            };
            let gone = if session.away.is_empty() { "H" } else { "G" };
            replies.push(Message {
                command: RPL_WHOREPLY.into(),
                params: vec![
                    nick.clone(),
                    channelname.clone(),
                    session.prefix.user.clone(),
                    session.prefix.host.clone(),
                    self.config.server_name.clone(),
                    session.prefix.name.clone(),
                    gone.into(),
                ],
                trailing: Some(format!("0 {}", session.realname)),
                ..Message::default()
            });
        }
        replies.push(last);
        replies
    }

    pub(crate) fn cmd_oper(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let nick = self.must_session(sid).nick.clone();
        let name = &msg.params[0];
        let password = &msg.params[1];

        let authenticated = self
            .config
            .operators
            .iter()
            .any(|op| op.name == *name && op.password == *password)
            || (!self.config.network_password.is_empty()
                && self.config.network_password == *password);
        if !authenticated {
            return vec![numeric(ERR_PASSWDMISMATCH, vec![nick], "Password incorrect")];
        }

        let session = self
            .sessions
            .get_mut(&sid)
            .expect("dispatcher verified the session exists");
        session.operator = true;
        session.modes.set('o', true);
        let modes = session.modes.to_mode_string();

        vec![
            numeric(RPL_YOUREOPER, vec![nick.clone()], "You are now an IRC operator"),
            Message {
                command: "MODE".into(),
                params: vec![nick, modes],
                ..Message::default()
            },
        ]
    }

    pub(crate) fn cmd_kill(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let (nick, operator) = {
            let session = self.must_session(sid);
            (session.nick.clone(), session.operator)
        };
        if msg.trailing_or_empty().trim().is_empty() {
            return vec![numeric(
                ERR_NEEDMOREPARAMS,
                vec![nick, msg.command.to_uppercase()],
                "Not enough parameters",
            )];
        }
        if !operator {
            return vec![numeric(
                ERR_NOPRIVILEGES,
                vec![nick],
                "Permission Denied - You're not an IRC operator",
            )];
        }

        let target = msg.params[0].clone();
        let Some(victim) = self.session_by_nick(&target) else {
            return vec![numeric(
                ERR_NOSUCHNICK,
                vec![nick, target],
                "No such nick/channel",
            )];
        };
        let victim_id = victim.id;
        let prefix = victim.prefix.clone();
        self.delete_session(victim_id);

        vec![Message {
            prefix: Some(prefix),
            command: "QUIT".into(),
            trailing: Some(format!("Killed by {nick}: {}", msg.trailing_or_empty())),
            ..Message::default()
        }]
    }

    pub(crate) fn cmd_away(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let session = self
            .sessions
            .get_mut(&sid)
            .expect("dispatcher verified the session exists");
        session.away = msg.trailing_or_empty().trim().to_owned();
        let nick = session.nick.clone();
        if session.away.is_empty() {
            vec![numeric(
                RPL_UNAWAY,
                vec![nick],
                "You are no longer marked as being away",
            )]
        } else {
            vec![numeric(
                RPL_NOWAWAY,
                vec![nick],
                "You have been marked as being away",
            )]
        }
    }

    pub(crate) fn cmd_topic(&mut self, sid: SessionId, msg: &Message) -> Vec<Message> {
        let channelname = msg.params[0].clone();
        let folded = irc_to_lower(&channelname);
        let (nick, prefix, member) = {
            let session = self.must_session(sid);
            (
                session.nick.clone(),
                session.prefix.clone(),
                session.channels.contains(&folded),
            )
        };
        let clock = self.clock;

        let Some(channel) = self.channels.get_mut(&folded) else {
            return vec![numeric(
                ERR_NOSUCHCHANNEL,
                vec![nick, channelname],
                "No such channel",
            )];
        };

        // "TOPIC #x :" with an explicitly empty trailing unsets the topic.
        if msg.trailing.as_deref() == Some("") {
            channel.topic.clear();
            channel.topic_nick.clear();
            channel.topic_time = None;
            return vec![Message {
                prefix: Some(prefix),
                command: "TOPIC".into(),
                params: vec![channelname],
                trailing: Some(String::new()),
                ..Message::default()
            }];
        }

        if !member {
            return vec![numeric(
                ERR_NOTONCHANNEL,
                vec![nick, channelname],
                "You're not on that channel",
            )];
        }

        match msg.trailing.as_deref() {
            // Bare "TOPIC #x" queries.
            None => match channel.topic_time {
                None => vec![numeric(RPL_NOTOPIC, vec![nick, channelname], "No topic is set")],
                Some(set_at) => vec![
                    numeric(
                        RPL_TOPIC,
                        vec![nick.clone(), channelname.clone()],
                        &channel.topic,
                    ),
                    Message {
                        command: RPL_TOPICWHOTIME.into(),
                        params: vec![
                            nick,
                            channelname,
                            channel.topic_nick.clone(),
                            set_at.timestamp().to_string(),
                        ],
                        ..Message::default()
                    },
                ],
            },
            Some(topic) => {
                if channel.modes.get('t')
                    && !channel.members.get(&nick).map_or(false, |s| s.chanop())
                {
                    return vec![numeric(
                        ERR_CHANOPRIVSNEEDED,
                        vec![nick, channelname],
                        "You're not channel operator",
                    )];
                }
                channel.topic = topic.to_owned();
                channel.topic_nick = nick;
                channel.topic_time = Some(clock);
                vec![Message {
                    prefix: Some(prefix),
                    command: "TOPIC".into(),
                    params: vec![channelname],
                    trailing: Some(topic.to_owned()),
                    ..Message::default()
                }]
            }
        }
    }

    pub(crate) fn cmd_motd(&mut self, sid: SessionId, _msg: &Message) -> Vec<Message> {
        let nick = self.must_session(sid).nick_or_star().to_owned();
        let mut replies = vec![numeric(
            RPL_MOTDSTART,
            vec![nick.clone()],
            &format!("- {} Message of the day -", self.config.server_name),
        )];
        for line in &self.config.motd {
            replies.push(numeric(RPL_MOTD, vec![nick.clone()], &format!("- {line}")));
        }
        replies.push(numeric(RPL_ENDOFMOTD, vec![nick], "End of /MOTD command"));
        replies
    }
}

// ── Fan-out interest ─────────────────────────────────────────────

fn interest_everyone(_session: &Session, _msg: &Message) -> bool {
    true
}

/// The JOIN echo carries the channel in its trailing.
fn interest_join(session: &Session, msg: &Message) -> bool {
    session
        .channels
        .contains(&irc_to_lower(msg.trailing_or_empty()))
}

/// PART also goes back to the sender, who is no longer in the channel by
/// the time the reply fans out.
fn interest_part(session: &Session, msg: &Message) -> bool {
    msg.prefix.as_ref() == Some(&session.prefix)
        || msg
            .params
            .first()
            .map_or(false, |c| session.channels.contains(&irc_to_lower(c)))
}

fn interest_topic(session: &Session, msg: &Message) -> bool {
    msg.params
        .first()
        .map_or(false, |c| session.channels.contains(&irc_to_lower(c)))
}

/// True when the first parameter is a channel the session is in, or the
/// session's own nick.
fn common_channel_or_direct(session: &Session, msg: &Message) -> bool {
    let Some(target) = msg.params.first() else {
        return false;
    };
    session.channels.contains(&irc_to_lower(target)) || irc_eq(target, &session.nick)
}

fn interest_privmsg(session: &Session, msg: &Message) -> bool {
    // Never echo a message back to its sender.
    if msg.prefix.as_ref() == Some(&session.prefix) {
        return false;
    }
    common_channel_or_direct(session, msg)
}

// ── Compaction relevance ─────────────────────────────────────────
//
// Each predicate answers: is this logged command still needed to rebuild
// the end state? `prev` walks the same session's earlier retained
// messages most-recent-first; `next` walks its later ones oldest-first.

fn never_relevant(
    _session: Option<&Session>,
    _msg: &Message,
    _prev: &mut dyn Cursor,
    _next: &mut dyn Cursor,
) -> Result<bool, StoreError> {
    Ok(false)
}

fn relevant_nick(
    _session: Option<&Session>,
    msg: &Message,
    _prev: &mut dyn Cursor,
    next: &mut dyn Cursor,
) -> Result<bool, StoreError> {
    if msg.params.is_empty() {
        return Ok(false);
    }
    while let Some(later) = next.next()? {
        match later.command.to_uppercase().as_str() {
            // A later USER means this NICK registered the session; a later
            // TOPIC recorded this nick as its setter.
            "USER" | "TOPIC" => return Ok(true),
            // A newer NICK supersedes this one.
            "NICK" => return Ok(false),
            _ => {}
        }
    }
    // Last NICK: this is the session's final nickname.
    Ok(true)
}

fn relevant_user(
    _session: Option<&Session>,
    msg: &Message,
    prev: &mut dyn Cursor,
    _next: &mut dyn Cursor,
) -> Result<bool, StoreError> {
    if msg.params.is_empty() {
        return Ok(false);
    }
    while let Some(earlier) = prev.next()? {
        // Only the first USER contributes.
        if earlier.command.to_uppercase() == "USER" {
            return Ok(false);
        }
    }
    Ok(true)
}

fn relevant_join(
    session: Option<&Session>,
    msg: &Message,
    _prev: &mut dyn Cursor,
    next: &mut dyn Cursor,
) -> Result<bool, StoreError> {
    if session.is_none() {
        return Ok(true);
    }
    let Some(list) = msg.params.first() else {
        return Ok(false);
    };
    let mut remaining: HashSet<String> = split_channels(list).map(irc_to_lower).collect();
    if remaining.is_empty() {
        return Ok(false);
    }
    while let Some(later) = next.next()? {
        match later.command.to_uppercase().as_str() {
            // TOPIC requires membership, so the JOIN granting it must stay.
            "TOPIC" => {
                if later
                    .params
                    .first()
                    .map_or(false, |c| remaining.contains(&irc_to_lower(c)))
                {
                    return Ok(true);
                }
            }
            "PART" => {
                if let Some(parted) = later.params.first() {
                    for channel in split_channels(parted) {
                        remaining.remove(&irc_to_lower(channel));
                    }
                    // Every joined channel was left again without a TOPIC
                    // in between.
                    if remaining.is_empty() {
                        return Ok(false);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(true)
}

fn relevant_part(
    _session: Option<&Session>,
    msg: &Message,
    prev: &mut dyn Cursor,
    _next: &mut dyn Cursor,
) -> Result<bool, StoreError> {
    let Some(list) = msg.params.first() else {
        return Ok(false);
    };
    let parted: HashSet<String> = split_channels(list).map(irc_to_lower).collect();
    while let Some(earlier) = prev.next()? {
        if earlier.command.to_uppercase() == "JOIN" {
            if let Some(joined) = earlier.params.first() {
                if split_channels(joined).any(|c| parted.contains(&irc_to_lower(c))) {
                    return Ok(true);
                }
            }
        }
    }
    // No retained JOIN: there is no membership left to leave.
    Ok(false)
}

fn relevant_topic(
    session: Option<&Session>,
    msg: &Message,
    _prev: &mut dyn Cursor,
    next: &mut dyn Cursor,
) -> Result<bool, StoreError> {
    if session.is_none() {
        return Ok(true);
    }
    let Some(channel) = msg.params.first() else {
        return Ok(false);
    };
    let folded = irc_to_lower(channel);
    while let Some(later) = next.next()? {
        if later.command.to_uppercase() == "TOPIC"
            && later
                .params
                .first()
                .map_or(false, |c| irc_to_lower(c) == folded)
        {
            // A newer TOPIC for the same channel supersedes this one.
            return Ok(false);
        }
    }
    Ok(true)
}
