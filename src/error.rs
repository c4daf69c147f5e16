//! Error types for transcript exports.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a chat platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("resource not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited after {0} attempts")]
    RateLimited(u32),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Why an export did not produce a transcript.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("guild {0} not found")]
    GuildNotFound(u64),

    #[error("channel {channel} not found in guild {guild}")]
    ChannelNotFound { guild: u64, channel: u64 },

    #[error("transcript generation failed: {0}")]
    BuildFailed(String),

    #[error("no messages to export")]
    EmptyChannel,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("message {0} has no attachments")]
    MissingAttachment(u64),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("platform error: {0}")]
    Platform(PlatformError),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<PlatformError> for ExportError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Forbidden(reason) => ExportError::PermissionDenied(reason),
            other => ExportError::Platform(other),
        }
    }
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;
