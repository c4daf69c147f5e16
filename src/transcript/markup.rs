//! Message text to HTML: escaping, mentions, emoji and Discord-flavoured markdown.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use time::OffsetDateTime;

use super::clock::Clock;
use crate::platform::{Emoji, Guild, Message};

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:([A-Za-z0-9_+-]+)\n)?(.*?)```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]\n]+)\]\((https?://[^\s)]+)\)|https?://[^\s<]+").unwrap()
});
static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&lt;@!?(\d+)&gt;").unwrap());
static ROLE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;@&amp;(\d+)&gt;").unwrap());
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;#(\d+)&gt;").unwrap());
static CUSTOM_EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;(a?):(\w+):(\d+)&gt;").unwrap());
static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;t:(-?\d+)(?::([tTdDfFR]))?&gt;").unwrap());
static EVERYONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(everyone|here)\b").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^\n]+?)\*\*").unwrap());
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__([^\n]+?)__").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^\n]+?)~~").unwrap());
static SPOILER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|\|([^\n]+?)\|\|").unwrap());
static LINK_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}(\\d+)\u{E000}").unwrap());

/// Brackets a rendered link's index while the mention and emphasis passes run.
const LINK_MARK: char = '\u{E000}';

/// What mention and timestamp tokens resolve against.
pub struct MarkupContext<'a> {
    pub guild: &'a Guild,
    /// Message owning the text; `None` for channel topics
    pub message: Option<&'a Message>,
    pub clock: &'a Clock,
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render message text to an HTML fragment. Code is emitted verbatim (escaped);
/// everything else goes through link, mention and emphasis passes.
pub fn to_html(text: &str, ctx: &MarkupContext<'_>) -> String {
    let mut out = String::new();
    let mut last = 0;
    for caps in CODE_BLOCK.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&render_inline_code(&text[last..whole.start], ctx));
        let lang = caps.get(1).map_or("", |m| m.as_str());
        let code = caps.get(2).map_or("", |m| m.as_str());
        out.push_str(&format!(
            "<pre class=\"code-block\" data-lang=\"{}\"><code>{}</code></pre>",
            escape_html(lang),
            escape_html(code.trim_matches('\n'))
        ));
        last = whole.end;
    }
    out.push_str(&render_inline_code(&text[last..], ctx));
    out
}

fn render_inline_code(text: &str, ctx: &MarkupContext<'_>) -> String {
    let mut out = String::new();
    let mut last = 0;
    for caps in INLINE_CODE.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&render_text(&text[last..whole.start], ctx));
        out.push_str("<code class=\"inline\">");
        out.push_str(&escape_html(&caps[1]));
        out.push_str("</code>");
        last = whole.end;
    }
    out.push_str(&render_text(&text[last..], ctx));
    out
}

fn render_text(text: &str, ctx: &MarkupContext<'_>) -> String {
    if text.is_empty() {
        return String::new();
    }
    let escaped = escape_html(text).replace(LINK_MARK, "");
    let mut links = Vec::new();
    let html = LINK.replace_all(&escaped, |caps: &Captures<'_>| {
        links.push(render_link(caps));
        format!("{LINK_MARK}{}{LINK_MARK}", links.len() - 1)
    });
    let html = USER_MENTION.replace_all(&html, |caps: &Captures<'_>| {
        let name = caps[1]
            .parse()
            .ok()
            .and_then(|id| ctx.message.and_then(|m| m.mentioned_user(id)))
            .map(|author| escape_html(author.name()))
            .unwrap_or_else(|| "Unknown".to_string());
        format!("<span class=\"mention\" title=\"{}\">@{name}</span>", &caps[1])
    });
    let html = ROLE_MENTION.replace_all(&html, |caps: &Captures<'_>| {
        let role = caps[1].parse().ok().and_then(|id| ctx.guild.role(id));
        match role {
            Some(role) if role.colour.0 != 0 => format!(
                "<span class=\"mention role\" style=\"color: {}\">@{}</span>",
                role.colour.to_css(),
                escape_html(&role.name)
            ),
            Some(role) => format!(
                "<span class=\"mention role\">@{}</span>",
                escape_html(&role.name)
            ),
            None => "<span class=\"mention role\">@deleted-role</span>".to_string(),
        }
    });
    let html = CHANNEL_MENTION.replace_all(&html, |caps: &Captures<'_>| {
        let name = caps[1]
            .parse()
            .ok()
            .and_then(|id| ctx.guild.channel_name(id))
            .map(escape_html)
            .unwrap_or_else(|| "deleted-channel".to_string());
        format!("<span class=\"mention channel\">#{name}</span>")
    });
    let html = CUSTOM_EMOJI.replace_all(&html, |caps: &Captures<'_>| {
        let emoji = Emoji::Custom {
            id: caps[3].parse().unwrap_or_default(),
            name: caps[2].to_string(),
            animated: &caps[1] == "a",
        };
        emoji_img(&emoji).unwrap_or_default()
    });
    let html = TIMESTAMP.replace_all(&html, |caps: &Captures<'_>| {
        let Some(at) = caps[1]
            .parse::<i64>()
            .ok()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        else {
            return caps[0].to_string();
        };
        let style = caps.get(2).and_then(|m| m.as_str().chars().next()).unwrap_or('f');
        format!(
            "<span class=\"timestamp\" title=\"{}\">{}</span>",
            ctx.clock.full(at),
            ctx.clock.styled(at, style)
        )
    });
    let html = EVERYONE.replace_all(&html, "<span class=\"mention\">@$1</span>");
    let html = BOLD.replace_all(&html, "<strong>$1</strong>");
    let html = UNDERLINE.replace_all(&html, "<u>$1</u>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    let html = STRIKE.replace_all(&html, "<s>$1</s>");
    let html = SPOILER.replace_all(&html, "<span class=\"spoiler\">$1</span>");

    let html = html
        .split('\n')
        .map(|line| match line.strip_prefix("&gt; ") {
            Some(quoted) => format!("<span class=\"quote\">{quoted}</span>"),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("<br>");

    LINK_SLOT
        .replace_all(&html, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| links.get(idx))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

fn render_link(caps: &Captures<'_>) -> String {
    if let (Some(label), Some(url)) = (caps.get(1), caps.get(2)) {
        return format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
            url.as_str(),
            label.as_str()
        );
    }
    let raw = &caps[0];
    // `<https://…>` suppresses previews; the closing bracket arrives escaped.
    let mut url = raw.trim_end_matches("&gt;");
    url = url.trim_end_matches(['.', ',', ')', '!', '?', ';', ':']);
    let tail = &raw[url.len()..];
    format!("<a href=\"{url}\" target=\"_blank\" rel=\"noopener\">{url}</a>{tail}")
}

/// `<img>` for custom emoji, `None` for unicode ones.
pub fn emoji_img(emoji: &Emoji) -> Option<String> {
    let url = emoji.image_url()?;
    let Emoji::Custom { name, .. } = emoji else {
        return None;
    };
    Some(format!(
        "<img class=\"emoji\" src=\"{url}\" alt=\":{name}:\" title=\":{name}:\">"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Author, Channel, Colour, Role};
    use time::macros::datetime;

    fn guild() -> Guild {
        Guild {
            id: 1,
            name: "Support Server".to_string(),
            icon: None,
            roles: vec![
                Role {
                    id: 7,
                    name: "Staff".to_string(),
                    colour: Colour(0x2ECC71),
                },
                Role {
                    id: 8,
                    name: "Plain".to_string(),
                    colour: Colour(0),
                },
            ],
            channels: vec![Channel {
                id: 10,
                guild_id: 1,
                name: "support".to_string(),
                topic: None,
            }],
        }
    }

    fn message_with_mention() -> Message {
        let author = Author {
            id: 20,
            username: "helper".to_string(),
            display_name: Some("Helper <3".to_string()),
            avatar: None,
            bot: false,
        };
        Message {
            id: 100,
            channel_id: 10,
            author: author.clone(),
            timestamp: datetime!(2024-03-01 10:00 UTC),
            edited_timestamp: None,
            content: String::new(),
            attachments: Vec::new(),
            embeds: Vec::new(),
            reactions: Vec::new(),
            mentions: vec![author],
            mention_roles: Vec::new(),
            pinned: false,
        }
    }

    fn render(text: &str) -> String {
        let guild = guild();
        let message = message_with_mention();
        let clock = Clock::new("UTC", true, false).unwrap();
        let ctx = MarkupContext {
            guild: &guild,
            message: Some(&message),
            clock: &clock,
        };
        to_html(text, &ctx)
    }

    #[test]
    fn escapes_raw_html() {
        assert_eq!(
            render("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn resolves_user_role_and_channel_mentions() {
        let html = render("hi <@20> and <@!99>, ping <@&7> <@&8> <@&9> in <#10> <#11>");
        assert!(html.contains("<span class=\"mention\" title=\"20\">@Helper &lt;3</span>"));
        assert!(html.contains("<span class=\"mention\" title=\"99\">@Unknown</span>"));
        assert!(html.contains("style=\"color: #2ecc71\">@Staff</span>"));
        assert!(html.contains("<span class=\"mention role\">@Plain</span>"));
        assert!(html.contains("@deleted-role"));
        assert!(html.contains("<span class=\"mention channel\">#support</span>"));
        assert!(html.contains("#deleted-channel"));
    }

    #[test]
    fn renders_custom_emoji_as_images() {
        let html = render("nice <:pog:123> <a:dance:456>");
        assert!(html.contains("src=\"https://cdn.discordapp.com/emojis/123.png\""));
        assert!(html.contains("src=\"https://cdn.discordapp.com/emojis/456.gif\""));
        assert!(html.contains("alt=\":dance:\""));
    }

    #[test]
    fn code_is_not_formatted() {
        let html = render("run `**not bold** <@20>` then\n```rust\nfn main() {}\n```**bold**");
        assert!(html.contains("<code class=\"inline\">**not bold** &lt;@20&gt;</code>"));
        assert!(html.contains("<pre class=\"code-block\" data-lang=\"rust\"><code>fn main() {}</code></pre>"));
        assert!(html.ends_with("<strong>bold</strong>"));
    }

    #[test]
    fn applies_emphasis() {
        let html = render("**b** *i* __u__ ~~s~~ ||secret||");
        assert_eq!(
            html,
            "<strong>b</strong> <em>i</em> <u>u</u> <s>s</s> <span class=\"spoiler\">secret</span>"
        );
    }

    #[test]
    fn links_masked_and_bare_urls() {
        let html = render("see [docs](https://example.com/a?b=1&c=2) or https://example.com/x.");
        assert!(html.contains(
            "<a href=\"https://example.com/a?b=1&amp;c=2\" target=\"_blank\" rel=\"noopener\">docs</a>"
        ));
        assert!(html.ends_with(
            "<a href=\"https://example.com/x\" target=\"_blank\" rel=\"noopener\">https://example.com/x</a>."
        ));
    }

    #[test]
    fn urls_are_left_alone_by_emphasis() {
        let html = render(
            "see https://docs.python.org/3/reference/datamodel.html#object.__init__ and https://example.com/**x**",
        );
        assert!(html.contains(
            "href=\"https://docs.python.org/3/reference/datamodel.html#object.__init__\""
        ));
        assert!(html.contains("href=\"https://example.com/**x**\""));
        assert!(!html.contains("<u>"));
        assert!(!html.contains("<strong>"));
    }

    #[test]
    fn emphasis_wraps_around_masked_link() {
        let html = render("**read [the ||docs||](https://a.example/__x__)**");
        assert_eq!(
            html,
            "<strong>read <a href=\"https://a.example/__x__\" target=\"_blank\" rel=\"noopener\">the ||docs||</a></strong>"
        );
    }

    #[test]
    fn private_use_marker_in_input_is_dropped() {
        assert_eq!(render("a\u{E000}0\u{E000}b"), "a0b");
    }

    #[test]
    fn suppressed_preview_link_keeps_bracket_outside_anchor() {
        let html = render("<https://example.com>");
        assert_eq!(
            html,
            "&lt;<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener\">https://example.com</a>&gt;"
        );
    }

    #[test]
    fn quotes_and_line_breaks() {
        let html = render("> quoted\nplain");
        assert_eq!(html, "<span class=\"quote\">quoted</span><br>plain");
    }

    #[test]
    fn formats_inline_timestamps() {
        let html = render("at <t:1709301900:t> on <t:1709301900:D>");
        assert!(html.contains(">14:05</span>"));
        assert!(html.contains(">1 March 2024</span>"));
    }

    #[test]
    fn everyone_and_here_are_highlighted() {
        assert_eq!(
            render("@everyone"),
            "<span class=\"mention\">@everyone</span>"
        );
    }
}
