//! Interactive console: `nick: message` lines in, delivered blocks out.

use murmur_core::{Block, NodeId};
use murmur_crypto::PublicKey;

/// A console line addressed to a friend
#[derive(Debug, PartialEq, Eq)]
pub struct Outgoing<'a> {
    pub nick: &'a str,
    pub message: &'a str,
}

/// Split a `nick: message` line.
///
/// Returns `None` for anything without a non-empty nick before the first
/// `:`. The single space after the colon is optional.
pub fn parse_line(line: &str) -> Option<Outgoing<'_>> {
    let (nick, message) = line.split_once(':')?;
    let nick = nick.trim();
    if nick.is_empty() || nick.contains(char::is_whitespace) {
        return None;
    }

    let message = message.strip_prefix(' ').unwrap_or(message);
    Some(Outgoing { nick, message })
}

/// Nickname book built from the `[friends]` table
#[derive(Debug, Default)]
pub struct Directory {
    friends: Vec<(String, PublicKey)>,
}

impl Directory {
    pub fn new(friends: Vec<(String, PublicKey)>) -> Self {
        Self { friends }
    }

    pub fn key_of(&self, nick: &str) -> Option<&PublicKey> {
        self.friends
            .iter()
            .find(|(name, _)| name == nick)
            .map(|(_, key)| key)
    }

    /// Nickname of `key`, or its short node id for strangers
    pub fn name_of(&self, key: &PublicKey) -> String {
        self.friends
            .iter()
            .find(|(_, known)| known == key)
            .map_or_else(|| NodeId::of(key).to_string(), |(name, _)| name.clone())
    }

    /// Render a delivered block for the terminal
    pub fn render(&self, block: &Block) -> String {
        format!(
            "<{}> {}",
            self.name_of(block.sender()),
            String::from_utf8_lossy(block.payload())
        )
    }
}
