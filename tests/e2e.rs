//! End-to-end tests against the live Discord API.
//!
//! These tests need a bot token and a scratch channel the bot can read and
//! post in:
//!   CHATEXPORT_TOKEN, CHATEXPORT_TEST_GUILD, CHATEXPORT_TEST_CHANNEL
//! Run with: cargo test --test e2e -- --ignored

use chatexport::platform::{DEFAULT_API_BASE, HistoryQuery};
use chatexport::{
    ChatPlatform, DiscordClient, ExportConfig, HtmlTranscriptBuilder, TranscriptOptions, export,
    link, quick_export, resolve_channel,
};

fn live_client() -> (DiscordClient, u64, u64) {
    let token = std::env::var("CHATEXPORT_TOKEN").expect("CHATEXPORT_TOKEN not set");
    let guild: u64 = std::env::var("CHATEXPORT_TEST_GUILD")
        .expect("CHATEXPORT_TEST_GUILD not set")
        .parse()
        .expect("guild id");
    let channel: u64 = std::env::var("CHATEXPORT_TEST_CHANNEL")
        .expect("CHATEXPORT_TEST_CHANNEL not set")
        .parse()
        .expect("channel id");
    (DiscordClient::new(DEFAULT_API_BASE, token), guild, channel)
}

#[test]
#[ignore] // Requires a bot token
fn test_live_history_is_newest_first() {
    let (client, guild_id, channel_id) = live_client();
    let (_, channel) = resolve_channel(&client, guild_id, channel_id).expect("resolve");

    let history = client
        .history(
            &channel,
            &HistoryQuery {
                limit: Some(150),
                ..HistoryQuery::all()
            },
        )
        .expect("history");

    assert!(history.len() <= 150);
    for pair in history.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }
}

#[test]
#[ignore] // Requires a bot token
fn test_live_export_renders_channel() {
    let (client, guild_id, channel_id) = live_client();
    let (guild, channel) = resolve_channel(&client, guild_id, channel_id).expect("resolve");

    let options = TranscriptOptions {
        limit: Some(25),
        ..TranscriptOptions::default()
    };
    let html = export(&client, &HtmlTranscriptBuilder, &guild, &channel, &options)
        .expect("export")
        .expect("channel has messages");

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains(&channel.name));
}

#[test]
#[ignore] // Posts into the test channel
fn test_live_quick_export_and_link() {
    let (client, guild_id, channel_id) = live_client();
    let (guild, channel) = resolve_channel(&client, guild_id, channel_id).expect("resolve");

    let posted = quick_export(
        &client,
        &HtmlTranscriptBuilder,
        &guild,
        &channel,
        &TranscriptOptions::default(),
    )
    .expect("quick export")
    .expect("channel has messages");

    assert_eq!(
        posted.attachments[0].filename,
        format!("transcript-{}.html", channel.name)
    );
    let url = link(&posted, &ExportConfig::default()).expect("link");
    assert!(url.starts_with("https://mahto.id/chat-exporter?url=https://"));

    client
        .delete_message(&channel, posted.id)
        .expect("clean up posted transcript");
}
