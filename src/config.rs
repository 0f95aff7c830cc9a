//! Server configuration consumed by the command engine and the compactor.
use chrono::Duration;
use serde::Deserialize;

/// One IRC operator credential. OPER matches on name and password.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Operator {
    pub name: String,
    pub password: String,
}

/// Configuration for one network. Deserializable from the network config
/// document the consensus runtime distributes; every field has a default so
/// partial documents work.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server prefix, used on every reply and in WHO output.
    pub server_name: String,
    /// Network name shown in the welcome numeric.
    pub network_name: String,
    /// Shared password accepted by OPER under any name. Empty disables it.
    pub network_password: String,
    /// Per-operator credentials, checked before the network password.
    pub operators: Vec<Operator>,
    /// Message-of-the-day lines.
    pub motd: Vec<String>,
    /// Maximum nickname length (NICKLEN).
    pub max_nick_len: usize,
    /// Maximum channel name length (CHANNELLEN).
    pub max_channel_len: usize,
    /// Entries younger than this are never compacted away: clients may
    /// still be retrieving them by id.
    pub compaction_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "atoll.net".into(),
            network_name: "atoll".into(),
            network_password: String::new(),
            operators: Vec::new(),
            motd: vec!["No MOTD configured yet.".into()],
            max_nick_len: 30,
            max_channel_len: 32,
            compaction_window_secs: 600,
        }
    }
}

impl Config {
    /// The compaction freshness window as a [`chrono::Duration`].
    pub fn compaction_window(&self) -> Duration {
        Duration::seconds(self.compaction_window_secs as i64)
    }
}
