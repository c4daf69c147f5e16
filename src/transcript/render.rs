//! Page template for transcripts.

use maud::{DOCTYPE, Markup, PreEscaped, html};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use super::clock::Clock;
use super::markup::{self, MarkupContext};
use crate::platform::{Attachment, Channel, Embed, Emoji, Guild, Message, Reaction};

/// Consecutive messages by one author within this window share a header.
const GROUP_WINDOW: Duration = Duration::minutes(7);

const STYLE: &str = r#"
:root {
  --bg: #313338;
  --bg-alt: #2b2d31;
  --text: #dbdee1;
  --muted: #949ba4;
  --link: #00a8fc;
  --mention: rgba(88, 101, 242, 0.3);
  --code: #1e1f22;
}
* { box-sizing: border-box; }
body {
  margin: 0;
  background: var(--bg);
  color: var(--text);
  font-family: "gg sans", "Noto Sans", "Helvetica Neue", Helvetica, Arial, sans-serif;
  font-size: 15px;
  line-height: 1.375;
}
a { color: var(--link); text-decoration: none; }
a:hover { text-decoration: underline; }
.guild-header {
  display: flex;
  gap: 16px;
  align-items: center;
  padding: 20px 24px;
  background: var(--bg-alt);
  border-bottom: 1px solid #1f2023;
}
.guild-icon { width: 72px; height: 72px; border-radius: 50%; }
.guild-header h1 { margin: 0; font-size: 22px; }
.channel-name { font-size: 17px; font-weight: 600; margin-top: 2px; }
.topic, .summary { color: var(--muted); font-size: 13px; margin-top: 4px; }
.messages { padding: 16px 0 32px; }
.message-group { display: flex; gap: 16px; padding: 8px 24px 2px; }
.message-group:hover { background: rgba(0, 0, 0, 0.06); }
.avatar { width: 40px; height: 40px; border-radius: 50%; flex: none; }
.group-body { min-width: 0; flex: 1; }
.group-header { display: flex; gap: 8px; align-items: baseline; }
.author { font-weight: 600; color: #f2f3f5; }
.bot-tag {
  background: #5865f2;
  color: #fff;
  font-size: 10px;
  font-weight: 600;
  padding: 1px 4px;
  border-radius: 3px;
  text-transform: uppercase;
}
time, .short-time, .edited { color: var(--muted); font-size: 12px; }
.message { position: relative; padding: 1px 0; }
.message.pinned { border-left: 2px solid #f0b232; padding-left: 6px; }
.short-time { position: absolute; left: -56px; width: 48px; text-align: right; visibility: hidden; }
.message:hover .short-time { visibility: visible; }
.content { white-space: normal; overflow-wrap: anywhere; }
.mention { background: var(--mention); border-radius: 3px; padding: 0 2px; font-weight: 500; }
.spoiler { background: #1e1f22; color: transparent; border-radius: 3px; }
.spoiler:hover { color: inherit; }
.quote { display: block; border-left: 4px solid #4e5058; padding-left: 10px; }
.emoji { width: 22px; height: 22px; vertical-align: bottom; }
code.inline { background: var(--code); padding: 1px 3px; border-radius: 3px; font-size: 85%; }
pre.code-block {
  background: var(--code);
  border: 1px solid #1f2023;
  border-radius: 4px;
  padding: 8px;
  overflow-x: auto;
  white-space: pre-wrap;
}
.attachment {
  display: inline-flex;
  gap: 8px;
  margin-top: 6px;
  padding: 10px 12px;
  background: var(--bg-alt);
  border: 1px solid #1f2023;
  border-radius: 6px;
}
.attachment .size { color: var(--muted); font-size: 12px; }
.attachment-image { display: block; max-width: 400px; max-height: 300px; margin-top: 6px; border-radius: 6px; }
.embed {
  max-width: 520px;
  margin-top: 6px;
  padding: 8px 16px 12px 12px;
  background: var(--bg-alt);
  border-left: 4px solid #1e1f22;
  border-radius: 4px;
}
.embed-author { font-size: 13px; font-weight: 600; margin-top: 4px; }
.embed-title { font-weight: 600; margin-top: 6px; }
.embed-description { font-size: 14px; margin-top: 6px; }
.embed-fields { display: grid; grid-template-columns: repeat(3, 1fr); gap: 8px; margin-top: 8px; }
.embed-field { grid-column: 1 / -1; font-size: 14px; }
.embed-field.inline { grid-column: auto; }
.embed-field-name { font-weight: 600; }
.embed-image { max-width: 100%; border-radius: 4px; margin-top: 12px; }
.embed-thumbnail { float: right; max-width: 80px; max-height: 80px; border-radius: 4px; margin-left: 12px; }
.embed-footer { clear: both; color: var(--muted); font-size: 12px; margin-top: 8px; }
.reactions { display: flex; flex-wrap: wrap; gap: 4px; margin-top: 4px; }
.reaction {
  display: inline-flex;
  gap: 6px;
  align-items: center;
  padding: 2px 6px;
  background: var(--bg-alt);
  border: 1px solid #3f4147;
  border-radius: 8px;
  font-size: 14px;
}
.reaction .emoji { width: 16px; height: 16px; }
footer { color: var(--muted); font-size: 12px; text-align: center; padding: 16px 24px 32px; }
"#;

/// Rewrites `<time>` labels into the reader's locale after load.
const LOCAL_TIME_SCRIPT: &str = r#"
document.querySelectorAll("time[data-timestamp]").forEach(function (el) {
  var date = new Date(Number(el.dataset.timestamp) * 1000);
  el.title = date.toLocaleString();
});
"#;

/// Everything the page needs apart from the messages themselves.
pub struct Page<'a> {
    pub guild: &'a Guild,
    pub channel: &'a Channel,
    pub clock: &'a Clock,
    pub generated_at: OffsetDateTime,
    pub support_dev: bool,
}

pub fn render_document(page: &Page<'_>, messages: &[Message]) -> String {
    let topic_ctx = MarkupContext {
        guild: page.guild,
        message: None,
        clock: page.clock,
    };
    let title = format!("{} - {}", page.channel.name, page.guild.name);

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                header.guild-header {
                    @if let Some(icon) = page.guild.icon_url() {
                        img.guild-icon src=(icon) alt="";
                    }
                    div {
                        h1 { (page.guild.name) }
                        div.channel-name { "#" (page.channel.name) }
                        @if let Some(topic) = &page.channel.topic {
                            div.topic { (PreEscaped(markup::to_html(topic, &topic_ctx))) }
                        }
                        div.summary {
                            (messages.len()) " messages · exported "
                            (page.clock.full(page.generated_at)) " " (page.clock.zone_label())
                        }
                    }
                }
                main.messages {
                    @for group in group_messages(messages) {
                        (render_group(page, group))
                    }
                }
                footer {
                    "Exported " (messages.len()) " message" @if messages.len() != 1 { "s" }
                    " from #" (page.channel.name) "."
                    @if page.support_dev {
                        br;
                        "Generated with chatexport"
                    }
                }
                @if page.clock.fancy_times() {
                    script { (PreEscaped(LOCAL_TIME_SCRIPT)) }
                }
            }
        }
    }
    .into_string()
}

/// Split chronologically ordered messages into header groups.
fn group_messages(messages: &[Message]) -> Vec<&[Message]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for idx in 1..messages.len() {
        let prev = &messages[idx - 1];
        let current = &messages[idx];
        let same_author = prev.author.id == current.author.id;
        if !same_author || current.timestamp - prev.timestamp > GROUP_WINDOW {
            groups.push(&messages[start..idx]);
            start = idx;
        }
    }
    if start < messages.len() {
        groups.push(&messages[start..]);
    }
    groups
}

fn render_group(page: &Page<'_>, group: &[Message]) -> Markup {
    let Some(first) = group.first() else {
        return html! {};
    };
    html! {
        div.message-group {
            img.avatar src=(first.author.avatar_url()) alt="";
            div.group-body {
                div.group-header {
                    span.author title=(first.author.username) { (first.author.name()) }
                    @if first.author.bot {
                        span.bot-tag { "Bot" }
                    }
                    (time_tag(page.clock, first.timestamp, page.clock.label(first.timestamp, page.generated_at)))
                }
                @for (idx, message) in group.iter().enumerate() {
                    (render_message(page, message, idx > 0))
                }
            }
        }
    }
}

fn time_tag(clock: &Clock, at: OffsetDateTime, label: String) -> Markup {
    html! {
        time datetime=(at.format(&Rfc3339).unwrap_or_default())
            data-timestamp=(at.unix_timestamp())
            title=(clock.full(at)) { (label) }
    }
}

fn render_message(page: &Page<'_>, message: &Message, continued: bool) -> Markup {
    let ctx = MarkupContext {
        guild: page.guild,
        message: Some(message),
        clock: page.clock,
    };
    let class = if message.pinned { "message pinned" } else { "message" };
    html! {
        div class=(class) id=(format!("message-{}", message.id)) {
            @if continued {
                span.short-time title=(page.clock.full(message.timestamp)) {
                    (page.clock.time_of_day(message.timestamp))
                }
            }
            @if !message.content.is_empty() {
                div.content {
                    (PreEscaped(markup::to_html(&message.content, &ctx)))
                    @if let Some(edited) = message.edited_timestamp {
                        " "
                        span.edited title=(page.clock.full(edited)) { "(edited)" }
                    }
                }
            }
            @for attachment in &message.attachments {
                (render_attachment(attachment))
            }
            @for embed in &message.embeds {
                (render_embed(embed, &ctx))
            }
            @if !message.reactions.is_empty() {
                div.reactions {
                    @for reaction in &message.reactions {
                        (render_reaction(reaction))
                    }
                }
            }
        }
    }
}

fn render_attachment(attachment: &Attachment) -> Markup {
    html! {
        @if attachment.is_image() {
            a href=(attachment.url) target="_blank" rel="noopener" {
                img.attachment-image src=(attachment.url) alt=(attachment.filename);
            }
        } @else {
            div.attachment {
                a href=(attachment.url) target="_blank" rel="noopener" { (attachment.filename) }
                span.size { (human_size(attachment.size)) }
            }
        }
    }
}

fn render_embed(embed: &Embed, ctx: &MarkupContext<'_>) -> Markup {
    let border = embed
        .colour
        .map(|c| format!("border-left-color: {}", c.to_css()))
        .unwrap_or_default();
    html! {
        div.embed style=(border) {
            @if let Some(thumbnail) = &embed.thumbnail_url {
                img.embed-thumbnail src=(thumbnail) alt="";
            }
            @if let Some(author) = &embed.author_name {
                div.embed-author { (author) }
            }
            @if let Some(title) = &embed.title {
                div.embed-title {
                    @if let Some(url) = &embed.url {
                        a href=(url) target="_blank" rel="noopener" { (title) }
                    } @else {
                        (title)
                    }
                }
            }
            @if let Some(description) = &embed.description {
                div.embed-description { (PreEscaped(markup::to_html(description, ctx))) }
            }
            @if !embed.fields.is_empty() {
                div.embed-fields {
                    @for field in &embed.fields {
                        div class=(if field.inline { "embed-field inline" } else { "embed-field" }) {
                            div.embed-field-name { (field.name) }
                            div { (PreEscaped(markup::to_html(&field.value, ctx))) }
                        }
                    }
                }
            }
            @if let Some(image) = &embed.image_url {
                img.embed-image src=(image) alt="";
            }
            @if let Some(footer) = &embed.footer {
                div.embed-footer { (footer) }
            }
        }
    }
}

fn render_reaction(reaction: &Reaction) -> Markup {
    html! {
        span.reaction {
            @match &reaction.emoji {
                Emoji::Unicode(symbol) => {
                    span { (symbol) }
                }
                custom => {
                    (PreEscaped(markup::emoji_img(custom).unwrap_or_default()))
                }
            }
            span.count { (reaction.count) }
        }
    }
}

fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{bytes} bytes")
    } else if size < KB * KB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{:.1} MB", size / (KB * KB))
    }
}
