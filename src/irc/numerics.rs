//! IRC reply numerics used by the command engine.
//!
//! Names follow RFC 1459 / 2812; 333 is the ircu extension carrying the
//! topic setter and timestamp.

pub const RPL_WELCOME: &str = "001";
pub const RPL_YOURHOST: &str = "002";
pub const RPL_CREATED: &str = "003";
pub const RPL_MYINFO: &str = "004";
pub const RPL_ISUPPORT: &str = "005";

pub const RPL_AWAY: &str = "301";
pub const RPL_UNAWAY: &str = "305";
pub const RPL_NOWAWAY: &str = "306";
pub const RPL_ENDOFWHO: &str = "315";
pub const RPL_CHANNELMODEIS: &str = "324";
pub const RPL_NOTOPIC: &str = "331";
pub const RPL_TOPIC: &str = "332";
pub const RPL_TOPICWHOTIME: &str = "333";
pub const RPL_WHOREPLY: &str = "352";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";
pub const RPL_ENDOFBANLIST: &str = "368";
pub const RPL_MOTD: &str = "372";
pub const RPL_MOTDSTART: &str = "375";
pub const RPL_ENDOFMOTD: &str = "376";
pub const RPL_YOUREOPER: &str = "381";

pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NOSUCHCHANNEL: &str = "403";
pub const ERR_NOORIGIN: &str = "409";
pub const ERR_NORECIPIENT: &str = "411";
pub const ERR_NOTEXTTOSEND: &str = "412";
pub const ERR_NONICKNAMEGIVEN: &str = "431";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_USERNOTINCHANNEL: &str = "441";
pub const ERR_NOTONCHANNEL: &str = "442";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_PASSWDMISMATCH: &str = "464";
pub const ERR_UNKNOWNMODE: &str = "472";
pub const ERR_NOPRIVILEGES: &str = "481";
pub const ERR_CHANOPRIVSNEEDED: &str = "482";

/// True when `command` is an error numeric (the 4xx/5xx range). Error
/// replies are normal engine output, but the compactor uses this to spot
/// entries whose application changed nothing.
pub fn is_error(command: &str) -> bool {
    matches!(command.parse::<u16>(), Ok(n) if (400..600).contains(&n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_range() {
        assert!(is_error(ERR_NICKNAMEINUSE));
        assert!(is_error(ERR_CHANOPRIVSNEEDED));
        assert!(!is_error(RPL_WELCOME));
        assert!(!is_error(RPL_ENDOFBANLIST));
        assert!(!is_error("PRIVMSG"));
        assert!(!is_error("PONG"));
    }
}
