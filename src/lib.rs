pub mod config;
pub mod error;
pub mod exporter;
pub mod platform;
pub mod transcript;

#[cfg(test)]
mod test_utils;

pub use config::{Config, ExportConfig};
pub use error::{ExportError, PlatformError};
pub use exporter::{
    ArchiveRequest, archive_ticket, cleanup_previous_transcripts, export, link, quick_export,
    quick_link, raw_export, resolve_channel,
};
pub use platform::{ChatPlatform, DiscordClient};
pub use transcript::{HtmlTranscriptBuilder, Transcript, TranscriptBuilder, TranscriptOptions};
