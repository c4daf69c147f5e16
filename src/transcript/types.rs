//! Types for building transcripts.

use time::OffsetDateTime;

use crate::platform::{HistoryQuery, Message};

/// A rendered transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub html: String,
    pub message_count: usize,
}

/// Where the builder takes messages from
#[derive(Debug, Clone)]
pub enum MessageSource {
    /// Read the channel history through the platform client
    History,
    /// Render exactly these messages
    Supplied(Vec<Message>),
}

/// Knobs accepted by every export entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptOptions {
    /// Maximum number of messages to capture, `None` for the whole history
    pub limit: Option<usize>,
    /// `UTC` or a fixed offset such as `+01:00`
    pub timezone: String,
    /// 24-hour clock when true
    pub military_time: bool,
    /// Relative "Today at" labels plus locale-aware tooltips
    pub fancy_times: bool,
    pub before: Option<OffsetDateTime>,
    pub after: Option<OffsetDateTime>,
    /// Credit line in the page footer
    pub support_dev: bool,
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            limit: None,
            timezone: "UTC".to_string(),
            military_time: true,
            fancy_times: true,
            before: None,
            after: None,
            support_dev: true,
        }
    }
}

impl TranscriptOptions {
    /// Defaults used when rendering caller-supplied messages.
    pub fn raw() -> Self {
        Self {
            military_time: false,
            ..Self::default()
        }
    }

    pub fn history_query(&self) -> HistoryQuery {
        HistoryQuery {
            limit: self.limit,
            before: self.before,
            after: self.after,
        }
    }
}
