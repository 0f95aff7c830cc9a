//! Log compaction: shrink a log window to the entries still needed to
//! rebuild its end state.
//!
//! The driver runs at snapshot time against a point-in-time store range.
//! It replays the window on a scratch [`IrcServer`] to learn what each
//! entry actually did, then asks the per-command relevance oracles
//! (`still_relevant` in the command table) which entries a future replay
//! can do without. Oracles see two cursors over the same session's other
//! retained messages: `prev` walks earlier ones most-recent-first, `next`
//! walks later ones oldest-first.
//!
//! Because one oracle's verdict can change another's input (a dropped
//! TOPIC un-pins the NICK before it), the oracle pass repeats until a full
//! pass deletes nothing. Three more rules complete the picture:
//!
//! - An entry whose application produced only error replies changed
//!   nothing and is dropped outright (a failed NICK, a malformed JOIN).
//! - A session destroyed inside the window is collapsed entirely, create
//!   and delete entries included, unless one of its retained entries left
//!   residue in the surviving state (a topic or mode on a channel that
//!   still exists, the creating JOIN of a surviving channel, a KILL whose
//!   victim still has retained entries). A session that escapes the
//!   collapse this way keeps a teardown entry too, so replay does not
//!   leave it alive.
//! - Entries younger than the configured freshness window are kept no
//!   matter what: clients may still be retrieving them by id.
//!
//! Invariant: applying the retained subsequence in order yields the same
//! sessions, channels and nick index as applying the full window.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::Config;
use crate::irc::commands;
use crate::irc::names::{irc_to_lower, split_channels};
use crate::irc::numerics;
use crate::irc::server::IrcServer;
use crate::irc::Message;
use crate::log::{Cursor, Entry, EntryKind, LogStore, SessionId, StoreError};

/// One window entry plus everything the passes learn about it.
struct Slot {
    entry: Entry,
    /// Parsed message, for entries that parse and name a known command.
    msg: Option<Message>,
    owner: Option<SessionId>,
    keep: bool,
    /// Inside the freshness window: never dropped.
    frozen: bool,
    /// Folded names of the channels this JOIN created when it applied.
    created: Vec<String>,
    /// Session a successful KILL destroyed.
    kill_victim: Option<SessionId>,
}

impl Slot {
    fn drop_unless_frozen(&mut self) {
        if !self.frozen {
            self.keep = false;
        }
    }
}

/// Cursor over an in-memory list of already-parsed messages.
struct SliceCursor<'a> {
    items: Vec<&'a Message>,
    pos: usize,
}

impl<'a> Cursor for SliceCursor<'a> {
    fn next(&mut self) -> Result<Option<&Message>, StoreError> {
        let item = self.items.get(self.pos).copied();
        self.pos += 1;
        Ok(item)
    }
}

/// Compact the store's whole range. Returns the retained entries in log
/// order; applying them to a fresh server rebuilds the same state as the
/// full range. Cursor or store I/O failures abort the snapshot.
pub fn compact(
    store: &dyn LogStore,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Vec<Entry>, StoreError> {
    let mut slots = load_window(store, config, now)?;
    let (replay, destroyed) = replay_window(config, now, &mut slots);

    oracle_passes(&mut slots, &replay)?;
    sweep_destroyed_sessions(&mut slots, &replay, &destroyed);
    fix_up_lifecycle_entries(&mut slots, &replay);

    let kept = slots.iter().filter(|s| s.keep).count();
    debug!(window = slots.len(), kept, "compaction finished");
    Ok(slots
        .into_iter()
        .filter(|slot| slot.keep)
        .map(|slot| slot.entry)
        .collect())
}

/// Load the window and mark which entries the freshness window protects.
fn load_window(
    store: &dyn LogStore,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, StoreError> {
    let mut slots = Vec::new();
    for index in store.first_index()..=store.last_index() {
        let Some(entry) = store.get(index)? else {
            continue;
        };
        let frozen = now - entry.id.timestamp() < config.compaction_window();
        let owner = entry.owner();
        slots.push(Slot {
            entry,
            msg: None,
            owner,
            keep: true,
            frozen,
            created: Vec::new(),
            kill_victim: None,
        });
    }
    Ok(slots)
}

/// Replay the window on a scratch server. Marks entries that changed
/// nothing, records channel creations and KILL victims, and returns the
/// end state plus the sessions destroyed inside the window.
fn replay_window(
    config: &Config,
    now: DateTime<Utc>,
    slots: &mut [Slot],
) -> (IrcServer, HashSet<SessionId>) {
    let mut replay = IrcServer::new(config.clone(), now);
    let mut destroyed = HashSet::new();

    for slot in slots.iter_mut() {
        match slot.entry.kind {
            EntryKind::CreateSession => {
                replay.apply(&slot.entry);
            }
            EntryKind::DeleteSession => {
                if let Some(owner) = slot.owner {
                    if replay.session(owner).is_some() {
                        destroyed.insert(owner);
                    }
                }
                replay.apply(&slot.entry);
            }
            EntryKind::MessageOfDeath | EntryKind::Other(_) => {
                slot.drop_unless_frozen();
            }
            EntryKind::IrcMessage => {
                let parsed = Message::parse(&slot.entry.data)
                    .ok()
                    .filter(|m| commands::lookup(&m.command.to_uppercase()).is_some());
                let Some(msg) = parsed else {
                    // Unknown or unparseable: the engine ignores it.
                    slot.drop_unless_frozen();
                    replay.apply(&slot.entry);
                    continue;
                };
                let command = msg.command.to_uppercase();

                if command == "JOIN" {
                    if let Some(list) = msg.params.first() {
                        for channel in split_channels(list) {
                            if replay.channel(channel).is_none() {
                                slot.created.push(irc_to_lower(channel));
                            }
                        }
                    }
                }
                let victim = if command == "KILL" {
                    msg.params
                        .first()
                        .and_then(|target| replay.session_by_nick(target))
                        .map(|victim| victim.id)
                } else {
                    None
                };
                let sender_existed =
                    slot.owner.map_or(false, |owner| replay.session(owner).is_some());

                let replies = replay.apply(&slot.entry);

                // Only channels that actually came into being count.
                slot.created
                    .retain(|folded| replay.channels().contains_key(folded));
                // Error-only output means the command changed nothing.
                if !replies.is_empty()
                    && replies.iter().all(|reply| numerics::is_error(&reply.command))
                {
                    slot.drop_unless_frozen();
                }
                if command == "QUIT" && sender_existed {
                    if let Some(owner) = slot.owner {
                        destroyed.insert(owner);
                    }
                }
                if let Some(victim) = victim {
                    if replay.session(victim).is_none() {
                        destroyed.insert(victim);
                        slot.kill_victim = Some(victim);
                    }
                }
                slot.msg = Some(msg);
            }
        }
    }

    (replay, destroyed)
}

/// Run the per-command oracles until a full pass deletes nothing.
fn oracle_passes(slots: &mut [Slot], replay: &IrcServer) -> Result<(), StoreError> {
    loop {
        let mut changed = false;
        for i in 0..slots.len() {
            let (owner, relevance) = {
                let slot = &slots[i];
                if !slot.keep || slot.frozen || slot.entry.kind != EntryKind::IrcMessage {
                    continue;
                }
                let Some(msg) = &slot.msg else { continue };
                let Some(spec) = commands::lookup(&msg.command.to_uppercase()) else {
                    continue;
                };
                // No relevance rule: keep, conservatively.
                let Some(relevance) = spec.still_relevant else { continue };
                let Some(owner) = slot.owner else { continue };
                (owner, relevance)
            };

            let verdict = {
                let (prev_items, next_items) = session_cursor_items(slots, owner, i);
                let mut prev = SliceCursor { items: prev_items, pos: 0 };
                let mut next = SliceCursor { items: next_items, pos: 0 };
                let msg = slots[i].msg.as_ref().expect("checked above");
                relevance(replay.session(owner), msg, &mut prev, &mut next)?
            };
            if !verdict {
                slots[i].keep = false;
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
    }
}

/// The retained messages of `owner` around position `at`: earlier ones
/// most-recent-first, later ones oldest-first.
fn session_cursor_items<'a>(
    slots: &'a [Slot],
    owner: SessionId,
    at: usize,
) -> (Vec<&'a Message>, Vec<&'a Message>) {
    let mut prev = Vec::new();
    let mut next = Vec::new();
    for (j, slot) in slots.iter().enumerate() {
        if j == at
            || !slot.keep
            || slot.owner != Some(owner)
            || slot.entry.kind != EntryKind::IrcMessage
        {
            continue;
        }
        let Some(msg) = &slot.msg else { continue };
        if j < at {
            prev.push(msg);
        } else {
            next.push(msg);
        }
    }
    prev.reverse();
    (prev, next)
}

/// Collapse sessions destroyed inside the window: unless a retained entry
/// left residue in the surviving state, every entry of the session goes,
/// create and delete included. Dropping one session's entries can
/// un-anchor another (a KILL victim and its killer), so iterate.
fn sweep_destroyed_sessions(
    slots: &mut [Slot],
    replay: &IrcServer,
    destroyed: &HashSet<SessionId>,
) {
    let by_session = indices_by_session(slots);
    let final_channels: HashSet<String> = replay.channels().keys().cloned().collect();
    let mut swept: HashSet<SessionId> = HashSet::new();

    loop {
        let mut changed = false;
        for &owner in destroyed {
            if swept.contains(&owner) {
                continue;
            }
            let Some(indices) = by_session.get(&owner) else {
                swept.insert(owner);
                continue;
            };

            let anchored = indices.iter().any(|&i| {
                let slot = &slots[i];
                if !slot.keep {
                    return false;
                }
                let Some(msg) = &slot.msg else { return false };
                match msg.command.to_uppercase().as_str() {
                    // The surviving channel still shows this topic and its
                    // setter.
                    "TOPIC" => msg
                        .params
                        .first()
                        .map_or(false, |c| final_channels.contains(&irc_to_lower(c))),
                    // Channel modes and chanop grants persist on the
                    // channel after the granter is gone.
                    "MODE" => msg.params.first().map_or(false, |c| {
                        c.starts_with('#') && final_channels.contains(&irc_to_lower(c))
                    }),
                    // The creating JOIN decides who became chanop; a
                    // survivor's later JOIN must not re-create the channel.
                    "JOIN" => slot.created.iter().any(|c| final_channels.contains(c)),
                    // Replay still needs the KILL to tear the victim down.
                    "KILL" => slot.kill_victim.map_or(false, |victim| {
                        victim != owner
                            && by_session
                                .get(&victim)
                                .map_or(false, |vs| vs.iter().any(|&k| slots[k].keep))
                    }),
                    _ => false,
                }
            });

            if !anchored {
                for &i in indices {
                    slots[i].drop_unless_frozen();
                }
                swept.insert(owner);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // A destroyed session that kept entries must also keep a teardown
    // entry, or replay would leave it alive. DeleteSession entries and
    // anchored KILLs survive on their own; a QUIT dropped as transient
    // gets put back here.
    for &owner in destroyed {
        if swept.contains(&owner) {
            continue;
        }
        let Some(indices) = by_session.get(&owner) else {
            continue;
        };
        let torn_down = indices.iter().any(|&i| {
            let slot = &slots[i];
            slot.keep
                && match slot.entry.kind {
                    EntryKind::DeleteSession => true,
                    EntryKind::IrcMessage => slot
                        .msg
                        .as_ref()
                        .map_or(false, |m| m.command.eq_ignore_ascii_case("QUIT")),
                    _ => false,
                }
        }) || slots
            .iter()
            .any(|slot| slot.keep && slot.kill_victim == Some(owner));
        if torn_down {
            continue;
        }
        if let Some(&i) = indices.iter().rev().find(|&&i| {
            slots[i].entry.kind == EntryKind::IrcMessage
                && slots[i]
                    .msg
                    .as_ref()
                    .map_or(false, |m| m.command.eq_ignore_ascii_case("QUIT"))
        }) {
            slots[i].keep = true;
        }
    }
}

/// Retention rules for the lifecycle entries themselves: a DeleteSession
/// matters only if something of its session remains; a CreateSession
/// stays whenever the session survives the window or any of its entries
/// was retained.
fn fix_up_lifecycle_entries(slots: &mut [Slot], replay: &IrcServer) {
    let by_session = indices_by_session(slots);

    for i in 0..slots.len() {
        if slots[i].entry.kind != EntryKind::DeleteSession || !slots[i].keep {
            continue;
        }
        let retained_other = slots[i]
            .owner
            .and_then(|owner| by_session.get(&owner))
            .map_or(false, |indices| {
                indices.iter().any(|&j| j != i && slots[j].keep)
            });
        if !retained_other {
            slots[i].drop_unless_frozen();
        }
    }

    for i in 0..slots.len() {
        if slots[i].entry.kind != EntryKind::CreateSession {
            continue;
        }
        let owner = slots[i].entry.created_session();
        let alive = replay.session(owner).is_some();
        let retained_other = by_session.get(&owner).map_or(false, |indices| {
            indices.iter().any(|&j| j != i && slots[j].keep)
        });
        if alive || retained_other {
            slots[i].keep = true;
        } else {
            slots[i].drop_unless_frozen();
        }
    }
}

fn indices_by_session(slots: &[Slot]) -> HashMap<SessionId, Vec<usize>> {
    let mut by_session: HashMap<SessionId, Vec<usize>> = HashMap::new();
    for (i, slot) in slots.iter().enumerate() {
        if let Some(owner) = slot.owner {
            by_session.entry(owner).or_default().push(i);
        }
    }
    by_session
}
