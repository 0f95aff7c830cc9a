//! Atoll is the replicated-state core of a fault-tolerant IRC network.
//!
//! The authoritative state of the network is a consensus log: every client
//! action becomes a log entry, and each replica derives its IRC state by
//! applying the log deterministically. This crate provides the parts that
//! must agree bit-for-bit across replicas:
//!
//! - [`irc`]: the deterministic command engine. Parsed IRC messages go in,
//!   reply messages and a state mutation come out.
//! - [`log`]: the entry envelope shared with the consensus runtime, the
//!   store interface, and session-scoped cursors over log history.
//! - [`compact`]: the snapshot-time relevance oracle that shortens the log
//!   while preserving the state it rebuilds.
//!
//! The consensus algorithm, the durable store, and the client-facing
//! transport live in the outer runtime and talk to this crate through
//! [`log::LogStore`], [`irc::IrcServer::apply`], and [`irc::SharedServer`].

pub mod compact;
pub mod config;
pub mod irc;
pub mod log;

pub use config::Config;
