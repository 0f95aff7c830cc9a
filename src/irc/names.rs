//! Nickname and channel name rules: lexical validation and the RFC 1459
//! case-mapping used for uniqueness.

/// Fold a nickname or channel name for case-insensitive comparison.
///
/// RFC 1459 case-mapping: beyond ASCII letters, `[]\^` are the uppercase
/// forms of `{}|~` (a leftover from the Scandinavian origins of IRC).
/// Display forms keep their case; only map keys are folded.
pub fn irc_to_lower(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '^' => '~',
            _ => c,
        })
        .collect()
}

/// Compare two names under the IRC case-mapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    irc_to_lower(a) == irc_to_lower(b)
}

fn is_special(c: char) -> bool {
    matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}')
}

/// Validate a nickname: a letter or special, followed by letters, digits,
/// specials or `-`, within the configured length bound.
pub fn is_valid_nickname(nick: &str, max_len: usize) -> bool {
    if nick.is_empty() || nick.len() > max_len {
        return false;
    }
    let mut chars = nick.chars();
    let first = chars.next().expect("checked non-empty");
    if !first.is_ascii_alphabetic() && !is_special(first) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || is_special(c) || c == '-')
}

/// Validate a channel name: `#` plus at least one character, within the
/// length bound, free of separators (space, comma, BEL).
pub fn is_valid_channel(name: &str, max_len: usize) -> bool {
    if name.len() < 2 || name.len() > max_len {
        return false;
    }
    if !name.starts_with('#') {
        return false;
    }
    !name[1..].chars().any(|c| c == ' ' || c == ',' || c == '\x07')
}

/// Split a comma-separated channel list, dropping empty segments.
pub fn split_channels(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').filter(|c| !c.is_empty())
}
