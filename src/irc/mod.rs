//! The deterministic IRC command engine.
//!
//! [`IrcServer`] holds all sessions, channels and the nickname index, and
//! maps `(session, parsed message)` to a list of replies plus a state
//! mutation. Given identical state and input it produces identical output
//! on every replica; nothing in this module reads a wall clock or any other
//! ambient source of nondeterminism.

pub mod commands;
pub mod message;
pub mod names;
pub mod numerics;
pub mod server;
pub mod state;

pub use message::{Message, ParseError, Prefix};
pub use server::{IrcServer, SharedServer};
pub use state::{Channel, MemberStatus, ModeSet, Session};
