//! Shared test utilities.
//!
//! All tests that manipulate environment variables must use the shared
//! `env_lock()` to prevent race conditions.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use time::OffsetDateTime;

use crate::error::{ExportError, PlatformError, Result};
use crate::platform::{
    Attachment, Author, Channel, ChatPlatform, Colour, Guild, HistoryQuery, Message,
    OutgoingMessage, Role,
};
use crate::transcript::{MessageSource, Transcript, TranscriptBuilder, TranscriptOptions};

/// Global lock for tests that modify environment variables.
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for temporarily setting an environment variable.
pub struct EnvGuard {
    key: String,
    old: Option<String>,
}

impl EnvGuard {
    pub fn set(key: &str, value: &str) -> Self {
        let old = std::env::var(key).ok();
        unsafe {
            std::env::set_var(key, value);
        }
        Self {
            key: key.to_string(),
            old,
        }
    }

    pub fn unset(key: &str) -> Self {
        let old = std::env::var(key).ok();
        unsafe {
            std::env::remove_var(key);
        }
        Self {
            key: key.to_string(),
            old,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(val) = &self.old {
            unsafe {
                std::env::set_var(&self.key, val);
            }
        } else {
            unsafe {
                std::env::remove_var(&self.key);
            }
        }
    }
}

pub const GUILD_ID: u64 = 1;
pub const SUPPORT_CHANNEL_ID: u64 = 10;

pub fn author(id: u64, name: &str) -> Author {
    Author {
        id,
        username: name.to_string(),
        display_name: None,
        avatar: None,
        bot: false,
    }
}

/// A plain text message from a regular member.
pub fn message(id: u64, content: &str, at: OffsetDateTime) -> Message {
    Message {
        id,
        channel_id: SUPPORT_CHANNEL_ID,
        author: author(500, "member"),
        timestamp: at,
        edited_timestamp: None,
        content: content.to_string(),
        attachments: Vec::new(),
        embeds: Vec::new(),
        reactions: Vec::new(),
        mentions: Vec::new(),
        mention_roles: Vec::new(),
        pinned: false,
    }
}

/// A message carrying one file attachment.
pub fn file_post(id: u64, filename: &str, at: OffsetDateTime) -> Message {
    let mut msg = message(id, "", at);
    msg.author = author(900, "exporter-bot");
    msg.attachments.push(Attachment {
        id,
        filename: filename.to_string(),
        url: format!("https://cdn.example.com/attachments/{id}/{filename}"),
        size: 1024,
        content_type: Some("text/html".to_string()),
    });
    msg
}

/// In-memory platform with one guild and a `#support` channel. Records every
/// call so tests can assert on ordering.
pub struct MemoryPlatform {
    pub guild: Guild,
    history: RefCell<Vec<Message>>,
    calls: RefCell<Vec<String>>,
    sent: RefCell<Vec<OutgoingMessage>>,
    deleted: RefCell<Vec<u64>>,
    failing_deletes: RefCell<HashSet<u64>>,
    history_error: Cell<bool>,
    next_id: Cell<u64>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        let support = Channel {
            id: SUPPORT_CHANNEL_ID,
            guild_id: GUILD_ID,
            name: "support".to_string(),
            topic: None,
        };
        Self {
            guild: Guild {
                id: GUILD_ID,
                name: "Support Server".to_string(),
                icon: None,
                roles: vec![Role {
                    id: 7,
                    name: "Staff".to_string(),
                    colour: Colour(0x2ECC71),
                }],
                channels: vec![support],
            },
            history: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            deleted: RefCell::new(Vec::new()),
            failing_deletes: RefCell::new(HashSet::new()),
            history_error: Cell::new(false),
            next_id: Cell::new(10_000),
        }
    }

    pub fn support_channel(&self) -> &Channel {
        &self.guild.channels[0]
    }

    pub fn push(&self, message: Message) {
        self.history.borrow_mut().push(message);
    }

    pub fn fail_delete(&self, message_id: u64) {
        self.failing_deletes.borrow_mut().insert(message_id);
    }

    /// Make every history read fail with 403.
    pub fn deny_history(&self) {
        self.history_error.set(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.borrow().clone()
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.deleted.borrow().clone()
    }

    pub fn remaining_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.history.borrow().iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ChatPlatform for MemoryPlatform {
    fn guild(&self, guild_id: u64) -> Result<Option<Guild>, PlatformError> {
        self.record(format!("guild:{guild_id}"));
        Ok((guild_id == self.guild.id).then(|| self.guild.clone()))
    }

    fn channel(&self, guild: &Guild, channel_id: u64) -> Result<Option<Channel>, PlatformError> {
        self.record(format!("channel:{channel_id}"));
        Ok(guild.channels.iter().find(|c| c.id == channel_id).cloned())
    }

    fn history(
        &self,
        channel: &Channel,
        query: &HistoryQuery,
    ) -> Result<Vec<Message>, PlatformError> {
        self.record(format!("history:{}", channel.id));
        if self.history_error.get() {
            return Err(PlatformError::Forbidden("Missing Access".to_string()));
        }
        let mut messages: Vec<Message> = self
            .history
            .borrow()
            .iter()
            .filter(|m| m.channel_id == channel.id && query.admits(m.timestamp))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    fn message(&self, channel: &Channel, message_id: u64) -> Result<Option<Message>, PlatformError> {
        self.record(format!("message:{message_id}"));
        Ok(self
            .history
            .borrow()
            .iter()
            .find(|m| m.channel_id == channel.id && m.id == message_id)
            .cloned())
    }

    fn delete_message(&self, _channel: &Channel, message_id: u64) -> Result<(), PlatformError> {
        self.record(format!("delete:{message_id}"));
        if self.failing_deletes.borrow().contains(&message_id) {
            return Err(PlatformError::NotFound);
        }
        self.history.borrow_mut().retain(|m| m.id != message_id);
        self.deleted.borrow_mut().push(message_id);
        Ok(())
    }

    fn send_message(
        &self,
        channel: &Channel,
        message: OutgoingMessage,
    ) -> Result<Message, PlatformError> {
        self.record(format!("send:{}", channel.id));
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let now = OffsetDateTime::now_utc();
        let mut posted = match &message.file {
            Some(file) => file_post(id, &file.filename, now),
            None => self::message(id, message.content.as_deref().unwrap_or(""), now),
        };
        posted.channel_id = channel.id;
        self.sent.borrow_mut().push(message);
        self.history.borrow_mut().push(posted.clone());
        Ok(posted)
    }
}

/// Builder double with a canned outcome.
pub enum StubBuilder {
    Html(&'static str),
    Empty,
    Fails(&'static str),
    Denied,
}

impl TranscriptBuilder for StubBuilder {
    fn build(
        &self,
        _platform: &dyn ChatPlatform,
        _guild: &Guild,
        _channel: &Channel,
        _source: MessageSource,
        _options: &TranscriptOptions,
    ) -> Result<Option<Transcript>> {
        match self {
            StubBuilder::Html(html) => Ok(Some(Transcript {
                html: html.to_string(),
                message_count: 1,
            })),
            StubBuilder::Empty => Ok(None),
            StubBuilder::Fails(reason) => Err(ExportError::Platform(PlatformError::Transport(
                reason.to_string(),
            ))),
            StubBuilder::Denied => Err(ExportError::PermissionDenied("Missing Access".to_string())),
        }
    }
}
