//! Transcript construction: the builder boundary and the default HTML builder.

mod clock;
mod markup;
mod render;
mod types;

pub use clock::{Clock, parse_timezone};
pub use types::{MessageSource, Transcript, TranscriptOptions};

use time::OffsetDateTime;

use crate::error::Result;
use crate::platform::{Channel, ChatPlatform, Guild};

/// Turns a channel's messages into a transcript.
///
/// `Ok(None)` means there was nothing to export (empty channel or an empty
/// before/after window).
pub trait TranscriptBuilder {
    fn build(
        &self,
        platform: &dyn ChatPlatform,
        guild: &Guild,
        channel: &Channel,
        source: MessageSource,
        options: &TranscriptOptions,
    ) -> Result<Option<Transcript>>;
}

/// Renders a single self-contained HTML page.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTranscriptBuilder;

impl TranscriptBuilder for HtmlTranscriptBuilder {
    fn build(
        &self,
        platform: &dyn ChatPlatform,
        guild: &Guild,
        channel: &Channel,
        source: MessageSource,
        options: &TranscriptOptions,
    ) -> Result<Option<Transcript>> {
        let clock = Clock::new(
            &options.timezone,
            options.military_time,
            options.fancy_times,
        )?;
        let mut messages = match source {
            MessageSource::History => platform.history(channel, &options.history_query())?,
            MessageSource::Supplied(messages) => messages,
        };
        if messages.is_empty() {
            return Ok(None);
        }
        messages.sort_by_key(|m| (m.timestamp, m.id));

        let page = render::Page {
            guild,
            channel,
            clock: &clock,
            generated_at: OffsetDateTime::now_utc(),
            support_dev: options.support_dev,
        };
        let html = render::render_document(&page, &messages);
        tracing::debug!(
            channel = channel.id,
            messages = messages.len(),
            bytes = html.len(),
            "rendered transcript"
        );
        Ok(Some(Transcript {
            html,
            message_count: messages.len(),
        }))
    }
}
