//! Export entry points.
//!
//! Each operation is a straight sequence of platform calls: resolve, build,
//! then post or write. Nothing here retries or runs in the background.

use std::fs;
use std::path::PathBuf;

use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::platform::{
    Channel, ChatPlatform, Colour, Guild, HistoryQuery, Message, OutgoingEmbed, OutgoingMessage,
};
use crate::transcript::{MessageSource, Transcript, TranscriptBuilder, TranscriptOptions};

pub const FAILURE_TITLE: &str = "Transcript Generation Failed!";
pub const FAILURE_DESCRIPTION: &str = "Whoops! We've stumbled in to an issue here.";

/// `transcript-{channel}.html`, the name used for in-channel posts.
pub fn transcript_filename(channel: &Channel) -> String {
    format!("transcript-{}.html", channel.name)
}

/// `transcript-{channel}---{ticket}---.html`, the name used for archives.
pub fn ticket_filename(channel: &Channel, ticket_id: &str) -> String {
    format!("transcript-{}---{}---.html", channel.name, ticket_id)
}

/// Resolve the guild, then the channel inside it.
pub fn resolve_channel(
    platform: &dyn ChatPlatform,
    guild_id: u64,
    channel_id: u64,
) -> Result<(Guild, Channel)> {
    let guild = platform
        .guild(guild_id)?
        .ok_or(ExportError::GuildNotFound(guild_id))?;
    let channel = platform
        .channel(&guild, channel_id)?
        .ok_or(ExportError::ChannelNotFound {
            guild: guild_id,
            channel: channel_id,
        })?;
    Ok((guild, channel))
}

/// Build a transcript from channel history and return its HTML.
pub fn export(
    platform: &dyn ChatPlatform,
    builder: &dyn TranscriptBuilder,
    guild: &Guild,
    channel: &Channel,
    options: &TranscriptOptions,
) -> Result<Option<String>> {
    let transcript = builder.build(platform, guild, channel, MessageSource::History, options)?;
    Ok(transcript.map(|t| t.html))
}

/// Build a transcript from messages the caller already holds.
pub fn raw_export(
    platform: &dyn ChatPlatform,
    builder: &dyn TranscriptBuilder,
    guild: &Guild,
    channel: &Channel,
    messages: Vec<Message>,
    options: &TranscriptOptions,
) -> Result<Option<String>> {
    let options = TranscriptOptions {
        limit: None,
        before: None,
        after: None,
        ..options.clone()
    };
    let transcript = builder.build(
        platform,
        guild,
        channel,
        MessageSource::Supplied(messages),
        &options,
    )?;
    Ok(transcript.map(|t| t.html))
}

/// Build the whole channel history and post it back as an attachment.
///
/// Returns the posted message, or `None` when there was nothing to export.
/// Only the timezone and footer credit are taken from `options`.
pub fn quick_export(
    platform: &dyn ChatPlatform,
    builder: &dyn TranscriptBuilder,
    guild: &Guild,
    channel: &Channel,
    options: &TranscriptOptions,
) -> Result<Option<Message>> {
    let options = TranscriptOptions {
        timezone: options.timezone.clone(),
        support_dev: options.support_dev,
        ..TranscriptOptions::default()
    };
    let Some(transcript) =
        builder.build(platform, guild, channel, MessageSource::History, &options)?
    else {
        tracing::info!(channel = %channel.name, "nothing to export");
        return Ok(None);
    };

    let embed = OutgoingEmbed {
        title: None,
        description: format!("**Transcript Name:** transcript-{}\n\n", channel.name),
        colour: Colour::BLURPLE,
    };
    let outgoing = OutgoingMessage::embed(embed)
        .with_file(transcript_filename(channel), transcript.html.into_bytes());
    let posted = platform.send_message(channel, outgoing)?;
    tracing::info!(
        channel = %channel.name,
        messages = transcript.message_count,
        message_id = posted.id,
        "posted transcript"
    );
    Ok(Some(posted))
}

/// Public viewer URL for a posted transcript.
pub fn link(transcript_message: &Message, config: &ExportConfig) -> Result<String> {
    let attachment = transcript_message
        .attachments
        .first()
        .ok_or(ExportError::MissingAttachment(transcript_message.id))?;
    Ok(format!("{}?url={}", config.viewer_base_url, attachment.url))
}

/// Post an embed linking to the viewer for `transcript_message`.
pub fn quick_link(
    platform: &dyn ChatPlatform,
    channel: &Channel,
    transcript_message: &Message,
    config: &ExportConfig,
) -> Result<Message> {
    let url = link(transcript_message, config)?;
    let embed = OutgoingEmbed {
        title: Some("Transcript Link".to_string()),
        description: format!("[Click here to view the transcript]({url})"),
        colour: Colour::BLURPLE,
    };
    Ok(platform.send_message(channel, OutgoingMessage::embed(embed))?)
}

/// Delete earlier transcript posts for `channel`. Returns how many went.
pub fn cleanup_previous_transcripts(
    platform: &dyn ChatPlatform,
    channel: &Channel,
) -> Result<usize> {
    let needle = transcript_filename(channel);
    let history = platform.history(channel, &HistoryQuery::all())?;
    let mut deleted = 0;
    for message in history
        .iter()
        .filter(|m| m.attachments.iter().any(|a| a.filename.contains(&needle)))
    {
        match platform.delete_message(channel, message.id) {
            Ok(()) => deleted += 1,
            Err(err) => {
                tracing::debug!(message_id = message.id, error = %err, "skipping transcript post");
            }
        }
    }
    Ok(deleted)
}

/// A ticket channel to archive to disk.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub guild_id: u64,
    pub channel_id: u64,
    pub ticket_id: String,
    pub options: TranscriptOptions,
}

/// Resolve, build, clean up old posts and write the transcript file.
///
/// A builder failure is reported in the channel once and returned; nothing is
/// written in that case.
pub fn archive_ticket(
    platform: &dyn ChatPlatform,
    builder: &dyn TranscriptBuilder,
    request: &ArchiveRequest,
    config: &ExportConfig,
) -> Result<PathBuf> {
    let (guild, channel) = resolve_channel(platform, request.guild_id, request.channel_id)?;

    let transcript = match builder.build(
        platform,
        &guild,
        &channel,
        MessageSource::History,
        &request.options,
    ) {
        Ok(Some(transcript)) => transcript,
        Ok(None) => {
            tracing::info!(channel = %channel.name, ticket = %request.ticket_id, "nothing to archive");
            return Err(ExportError::EmptyChannel);
        }
        Err(err) => return Err(report_failure(platform, &channel, err)),
    };

    let removed = cleanup_previous_transcripts(platform, &channel)?;
    if removed > 0 {
        tracing::info!(channel = %channel.name, removed, "removed earlier transcript posts");
    }

    write_transcript(&channel, &request.ticket_id, &transcript, config)
}

fn report_failure(platform: &dyn ChatPlatform, channel: &Channel, err: ExportError) -> ExportError {
    tracing::error!(channel = %channel.name, error = %err, "transcript generation failed");
    let embed = OutgoingEmbed {
        title: Some(FAILURE_TITLE.to_string()),
        description: FAILURE_DESCRIPTION.to_string(),
        colour: Colour::RED,
    };
    if let Err(send_err) = platform.send_message(channel, OutgoingMessage::embed(embed)) {
        tracing::warn!(channel = %channel.name, error = %send_err, "could not report failure");
    }
    if matches!(
        err,
        ExportError::PermissionDenied(_) | ExportError::BuildFailed(_)
    ) {
        err
    } else {
        ExportError::BuildFailed(err.to_string())
    }
}

fn write_transcript(
    channel: &Channel,
    ticket_id: &str,
    transcript: &Transcript,
    config: &ExportConfig,
) -> Result<PathBuf> {
    fs::create_dir_all(&config.output_dir).map_err(|source| ExportError::Io {
        path: config.output_dir.clone(),
        source,
    })?;
    let path = config.output_dir.join(ticket_filename(channel, ticket_id));
    fs::write(&path, &transcript.html).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        messages = transcript.message_count,
        "archived ticket transcript"
    );
    Ok(path)
}
