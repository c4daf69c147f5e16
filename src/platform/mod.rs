//! Chat platform boundary: domain types and the client trait.

mod discord;
mod types;

pub use discord::{DEFAULT_API_BASE, DiscordClient, snowflake_from_time, time_from_snowflake};
pub use types::{
    Attachment, Author, Channel, Colour, Embed, EmbedField, Emoji, Guild, Message, OutgoingEmbed,
    OutgoingFile, OutgoingMessage, Reaction, Role,
};

use time::OffsetDateTime;

use crate::error::PlatformError;

/// Which slice of channel history to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum number of messages, `None` for the whole history
    pub limit: Option<usize>,
    /// Only messages strictly before this instant
    pub before: Option<OffsetDateTime>,
    /// Only messages strictly after this instant
    pub after: Option<OffsetDateTime>,
}

impl HistoryQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// True when `timestamp` falls inside the before/after window.
    pub fn admits(&self, timestamp: OffsetDateTime) -> bool {
        if let Some(before) = self.before {
            if timestamp >= before {
                return false;
            }
        }
        if let Some(after) = self.after {
            if timestamp <= after {
                return false;
            }
        }
        true
    }
}

/// Operations the exporter needs from a chat platform.
///
/// History is returned newest first, matching how the platform pages it.
pub trait ChatPlatform {
    fn guild(&self, guild_id: u64) -> Result<Option<Guild>, PlatformError>;

    /// Look up a channel inside an already resolved guild.
    fn channel(&self, guild: &Guild, channel_id: u64) -> Result<Option<Channel>, PlatformError>;

    fn history(&self, channel: &Channel, query: &HistoryQuery)
    -> Result<Vec<Message>, PlatformError>;

    fn message(&self, channel: &Channel, message_id: u64) -> Result<Option<Message>, PlatformError>;

    fn delete_message(&self, channel: &Channel, message_id: u64) -> Result<(), PlatformError>;

    fn send_message(
        &self,
        channel: &Channel,
        message: OutgoingMessage,
    ) -> Result<Message, PlatformError>;
}
