//! IRC message parsing and serialization.
//!
//! Implements the RFC 2812 message shape:
//!   [`:`prefix SPACE] command [SPACE params] [SPACE `:` trailing]
//!
//! The trailing segment is kept apart from the middle parameters because
//! the engine must distinguish "no trailing" from "empty trailing": a bare
//! `TOPIC #x` queries the topic, while `TOPIC #x :` unsets it.

use std::fmt;

/// The source marker preceding a message: `nick!user@host`, or just a
/// server name. Empty components are omitted when rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub user: String,
    pub host: String,
}

impl Prefix {
    /// A server-only prefix (no user or host part).
    pub fn server(name: &str) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.user.is_empty() && self.host.is_empty()
    }

    fn parse(raw: &str) -> Self {
        let (rest, host) = match raw.split_once('@') {
            Some((r, h)) => (r, h),
            None => (raw, ""),
        };
        let (name, user) = match rest.split_once('!') {
            Some((n, u)) => (n, u),
            None => (rest, ""),
        };
        Self { name: name.into(), user: user.into(), host: host.into() }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.user.is_empty() {
            write!(f, "!{}", self.user)?;
        }
        if !self.host.is_empty() {
            write!(f, "@{}", self.host)?;
        }
        Ok(())
    }
}

/// A parsed IRC message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Optional source prefix. Replies leave it `None` and the dispatcher
    /// stamps the server prefix; echoes carry the acting session's prefix.
    pub prefix: Option<Prefix>,
    /// The command: an alphabetic token (`PRIVMSG`) or a numeric (`001`).
    pub command: String,
    /// Middle parameters (no spaces).
    pub params: Vec<String>,
    /// The colon-prefixed final segment. `Some("")` records an explicitly
    /// empty trailing, which is distinct from no trailing at all.
    pub trailing: Option<String>,
}

/// Errors from [`Message::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("prefix present but missing command")]
    MissingCommand,
}

impl Message {
    /// Parse a single IRC message from a line (without the `\r\n`).
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim_end_matches(['\r', '\n']);

        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        let (prefix, rest) = if let Some(stripped) = input.strip_prefix(':') {
            // Prefix runs until the first space.
            match stripped.split_once(' ') {
                Some((p, rest)) => (Some(Prefix::parse(p)), rest),
                None => return Err(ParseError::MissingCommand),
            }
        } else {
            (None, input)
        };

        let (command, mut remaining) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };

        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        let mut trailing = None;

        while !remaining.is_empty() {
            if let Some(t) = remaining.strip_prefix(':') {
                // Trailing: everything after the colon, spaces included.
                trailing = Some(t.to_owned());
                break;
            }
            match remaining.split_once(' ') {
                Some((param, rest)) => {
                    if !param.is_empty() {
                        params.push(param.to_owned());
                    }
                    remaining = rest;
                }
                None => {
                    params.push(remaining.to_owned());
                    break;
                }
            }
        }

        Ok(Message { prefix, command: command.to_owned(), params, trailing })
    }

    /// Serialize to the IRC wire format (without the `\r\n`).
    pub fn to_wire(&self) -> String {
        let mut out = String::new();

        if let Some(ref prefix) = self.prefix {
            out.push(':');
            out.push_str(&prefix.to_string());
            out.push(' ');
        }

        out.push_str(&self.command);

        for param in &self.params {
            out.push(' ');
            out.push_str(param);
        }

        if let Some(ref trailing) = self.trailing {
            out.push_str(" :");
            out.push_str(trailing);
        }

        out
    }

    /// The trailing segment, empty string when absent.
    pub fn trailing_or_empty(&self) -> &str {
        self.trailing.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
