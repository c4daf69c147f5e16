//! Discord REST client implementing [`ChatPlatform`].

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::types::{
    Attachment, Author, Channel, Colour, Embed, EmbedField, Emoji, Guild, Message,
    OutgoingMessage, Reaction, Role,
};
use super::{ChatPlatform, HistoryQuery};
use crate::error::PlatformError;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Milliseconds between the unix epoch and the first second of 2015
const DISCORD_EPOCH_MS: i128 = 1_420_070_400_000;
/// Largest page the history endpoint returns
const PAGE_SIZE: usize = 100;
const MAX_ATTEMPTS: u32 = 3;
/// Snowflakes keep 42 bits of milliseconds above the 22 worker/sequence bits
const MAX_SNOWFLAKE_MS: i128 = (1 << 42) - 1;
const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/chatexport/chatexport, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Convert an instant into the smallest snowflake created at that millisecond.
pub fn snowflake_from_time(at: OffsetDateTime) -> u64 {
    let ms = at.unix_timestamp_nanos() / 1_000_000 - DISCORD_EPOCH_MS;
    if ms <= 0 { 0 } else { (ms.min(MAX_SNOWFLAKE_MS) as u64) << 22 }
}

pub fn time_from_snowflake(id: u64) -> OffsetDateTime {
    let ms = (id >> 22) as i128 + DISCORD_EPOCH_MS;
    OffsetDateTime::from_unix_timestamp_nanos(ms * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// History walk state, newest to oldest, one `before`-cursored page at a time.
struct Pager {
    limit: Option<usize>,
    after: Option<OffsetDateTime>,
    cursor: Option<u64>,
    messages: Vec<Message>,
    done: bool,
}

impl Pager {
    fn new(query: &HistoryQuery) -> Self {
        Self {
            limit: query.limit,
            after: query.after,
            cursor: query.before.map(snowflake_from_time),
            messages: Vec::new(),
            done: false,
        }
    }

    /// Size of the next request, `None` once the walk is over.
    fn next_page(&self) -> Option<usize> {
        if self.done {
            return None;
        }
        match self.limit {
            Some(limit) if self.messages.len() >= limit => None,
            Some(limit) => Some((limit - self.messages.len()).min(PAGE_SIZE)),
            None => Some(PAGE_SIZE),
        }
    }

    /// Take one page. A short page or a message at or before `after` ends the walk.
    fn accept(&mut self, requested: usize, page: Vec<Message>) {
        let fetched = page.len();
        for message in page {
            self.cursor = Some(message.id);
            if self.after.is_some_and(|after| message.timestamp <= after) {
                self.done = true;
                return;
            }
            self.messages.push(message);
        }
        if fetched < requested {
            self.done = true;
        }
    }
}

/// Blocking client for the Discord HTTP API, authenticated with a bot token.
pub struct DiscordClient {
    agent: ureq::Agent,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}{}", self.api_base, path))
            .set("Authorization", &format!("Bot {}", self.token))
            .set("User-Agent", USER_AGENT)
    }

    /// Run a request, sleeping through 429 responses up to `MAX_ATTEMPTS` times.
    fn execute<F>(&self, send: F) -> Result<ureq::Response, PlatformError>
    where
        F: Fn() -> Result<ureq::Response, ureq::Error>,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            match send() {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(429, response)) => {
                    let retry_after = response
                        .into_json::<RateLimitBody>()
                        .map(|b| b.retry_after)
                        .unwrap_or(1.0);
                    tracing::warn!(attempt, retry_after, "rate limited by discord");
                    if attempt < MAX_ATTEMPTS {
                        std::thread::sleep(Duration::from_secs_f64(retry_after.clamp(0.0, 60.0)));
                    }
                }
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    return Err(status_error(status, body));
                }
                Err(ureq::Error::Transport(err)) => {
                    return Err(PlatformError::Transport(err.to_string()));
                }
            }
        }
        Err(PlatformError::RateLimited(MAX_ATTEMPTS))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let response = self.execute(|| {
            let mut request = self.request("GET", path);
            for (key, value) in query {
                request = request.query(key, value);
            }
            request.call()
        })?;
        response
            .into_json()
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

fn status_error(status: u16, body: String) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Forbidden(body),
        404 => PlatformError::NotFound,
        _ => PlatformError::Http { status, body },
    }
}

/// `Ok(None)` for 404, everything else passes through.
fn optional<T>(result: Result<T, PlatformError>) -> Result<Option<T>, PlatformError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PlatformError::NotFound) => Ok(None),
        Err(err) => Err(err),
    }
}

impl ChatPlatform for DiscordClient {
    fn guild(&self, guild_id: u64) -> Result<Option<Guild>, PlatformError> {
        let Some(raw) = optional(self.get_json::<RawGuild>(&format!("/guilds/{guild_id}"), &[]))?
        else {
            return Ok(None);
        };
        let channels: Vec<RawChannel> =
            self.get_json(&format!("/guilds/{guild_id}/channels"), &[])?;
        let mut guild = Guild::try_from(raw)?;
        guild.channels = channels
            .into_iter()
            .map(|c| c.into_channel(guild_id))
            .collect::<Result<_, _>>()?;
        Ok(Some(guild))
    }

    fn channel(&self, guild: &Guild, channel_id: u64) -> Result<Option<Channel>, PlatformError> {
        if let Some(channel) = guild.channels.iter().find(|c| c.id == channel_id) {
            return Ok(Some(channel.clone()));
        }
        let Some(raw) =
            optional(self.get_json::<RawChannel>(&format!("/channels/{channel_id}"), &[]))?
        else {
            return Ok(None);
        };
        let channel = raw.into_channel(0)?;
        Ok((channel.guild_id == guild.id).then_some(channel))
    }

    fn history(
        &self,
        channel: &Channel,
        query: &HistoryQuery,
    ) -> Result<Vec<Message>, PlatformError> {
        let path = format!("/channels/{}/messages", channel.id);
        let mut pager = Pager::new(query);
        while let Some(page) = pager.next_page() {
            let mut params = vec![("limit", page.to_string())];
            if let Some(before) = pager.cursor {
                params.push(("before", before.to_string()));
            }
            let raw: Vec<RawMessage> = self.get_json(&path, &params)?;
            let batch = raw
                .into_iter()
                .map(Message::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            let fetched = batch.len();
            pager.accept(page, batch);
            tracing::debug!(channel = channel.id, fetched, total = pager.messages.len(), "history page");
        }
        Ok(pager.messages)
    }

    fn message(&self, channel: &Channel, message_id: u64) -> Result<Option<Message>, PlatformError> {
        let path = format!("/channels/{}/messages/{message_id}", channel.id);
        optional(self.get_json::<RawMessage>(&path, &[]))?
            .map(Message::try_from)
            .transpose()
    }

    fn delete_message(&self, channel: &Channel, message_id: u64) -> Result<(), PlatformError> {
        let path = format!("/channels/{}/messages/{message_id}", channel.id);
        self.execute(|| self.request("DELETE", &path).call())?;
        Ok(())
    }

    fn send_message(
        &self,
        channel: &Channel,
        message: OutgoingMessage,
    ) -> Result<Message, PlatformError> {
        let path = format!("/channels/{}/messages", channel.id);
        let payload = message_payload(&message);
        let response = match &message.file {
            None => self.execute(|| self.request("POST", &path).send_json(&payload))?,
            Some(file) => {
                let boundary = format!(
                    "chatexport-{:x}",
                    OffsetDateTime::now_utc().unix_timestamp_nanos()
                );
                let body = multipart_body(&boundary, &payload, &file.filename, &file.bytes);
                let content_type = format!("multipart/form-data; boundary={boundary}");
                self.execute(|| {
                    self.request("POST", &path)
                        .set("Content-Type", &content_type)
                        .send_bytes(&body)
                })?
            }
        };
        let raw: RawMessage = response
            .into_json()
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        Message::try_from(raw)
    }
}

fn message_payload(message: &OutgoingMessage) -> serde_json::Value {
    let embeds: Vec<serde_json::Value> = message
        .embeds
        .iter()
        .map(|embed| {
            let mut value = serde_json::json!({
                "description": embed.description,
                "color": embed.colour.0,
            });
            if let Some(title) = &embed.title {
                value["title"] = serde_json::Value::String(title.clone());
            }
            value
        })
        .collect();
    let mut payload = serde_json::json!({ "embeds": embeds });
    if let Some(content) = &message.content {
        payload["content"] = serde_json::Value::String(content.clone());
    }
    if let Some(file) = &message.file {
        payload["attachments"] = serde_json::json!([{ "id": 0, "filename": file.filename }]);
    }
    payload
}

fn multipart_body(
    boundary: &str,
    payload: &serde_json::Value,
    filename: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"payload_json\"\r\nContent-Type: application/json\r\n\r\n{payload}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"files[0]\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            filename.replace('"', "_")
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

// ===== wire types =====

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Deserialize)]
struct RawGuild {
    id: String,
    name: String,
    icon: Option<String>,
    #[serde(default)]
    roles: Vec<RawRole>,
}

#[derive(Deserialize)]
struct RawRole {
    id: String,
    name: String,
    #[serde(default)]
    color: u32,
}

#[derive(Deserialize)]
struct RawChannel {
    id: String,
    guild_id: Option<String>,
    name: Option<String>,
    topic: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    username: String,
    global_name: Option<String>,
    avatar: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct RawAttachment {
    id: String,
    filename: String,
    url: String,
    #[serde(default)]
    size: u64,
    content_type: Option<String>,
}

#[derive(Deserialize)]
struct RawEmbedField {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Deserialize)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawFooter {
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawMedia {
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawEmbed {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    color: Option<u32>,
    author: Option<RawNamed>,
    #[serde(default)]
    fields: Vec<RawEmbedField>,
    footer: Option<RawFooter>,
    image: Option<RawMedia>,
    thumbnail: Option<RawMedia>,
}

#[derive(Deserialize)]
struct RawEmoji {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    animated: bool,
}

#[derive(Deserialize)]
struct RawReaction {
    count: u32,
    emoji: RawEmoji,
}

#[derive(Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    author: RawUser,
    #[serde(default)]
    content: String,
    timestamp: String,
    edited_timestamp: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    embeds: Vec<RawEmbed>,
    #[serde(default)]
    reactions: Vec<RawReaction>,
    #[serde(default)]
    mentions: Vec<RawUser>,
    #[serde(default)]
    mention_roles: Vec<String>,
    #[serde(default)]
    pinned: bool,
}

fn parse_id(value: &str) -> Result<u64, PlatformError> {
    value
        .parse()
        .map_err(|_| PlatformError::Decode(format!("invalid snowflake: {value}")))
}

fn parse_time(value: &str) -> Result<OffsetDateTime, PlatformError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| PlatformError::Decode(format!("invalid timestamp {value}: {e}")))
}

impl TryFrom<RawGuild> for Guild {
    type Error = PlatformError;

    fn try_from(raw: RawGuild) -> Result<Self, Self::Error> {
        let roles = raw
            .roles
            .into_iter()
            .map(|r| {
                Ok(Role {
                    id: parse_id(&r.id)?,
                    name: r.name,
                    colour: Colour(r.color),
                })
            })
            .collect::<Result<_, PlatformError>>()?;
        Ok(Guild {
            id: parse_id(&raw.id)?,
            name: raw.name,
            icon: raw.icon,
            roles,
            channels: Vec::new(),
        })
    }
}

impl RawChannel {
    fn into_channel(self, fallback_guild: u64) -> Result<Channel, PlatformError> {
        let guild_id = match self.guild_id.as_deref() {
            Some(id) => parse_id(id)?,
            None => fallback_guild,
        };
        Ok(Channel {
            id: parse_id(&self.id)?,
            guild_id,
            name: self.name.unwrap_or_default(),
            topic: self.topic.filter(|t| !t.is_empty()),
        })
    }
}

impl TryFrom<RawUser> for Author {
    type Error = PlatformError;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        Ok(Author {
            id: parse_id(&raw.id)?,
            username: raw.username,
            display_name: raw.global_name,
            avatar: raw.avatar,
            bot: raw.bot,
        })
    }
}

impl From<RawEmbed> for Embed {
    fn from(raw: RawEmbed) -> Self {
        Embed {
            title: raw.title,
            description: raw.description,
            url: raw.url,
            colour: raw.color.map(Colour),
            author_name: raw.author.and_then(|a| a.name),
            fields: raw
                .fields
                .into_iter()
                .map(|f| EmbedField {
                    name: f.name,
                    value: f.value,
                    inline: f.inline,
                })
                .collect(),
            footer: raw.footer.and_then(|f| f.text),
            image_url: raw.image.and_then(|m| m.url),
            thumbnail_url: raw.thumbnail.and_then(|m| m.url),
        }
    }
}

impl TryFrom<RawEmoji> for Emoji {
    type Error = PlatformError;

    fn try_from(raw: RawEmoji) -> Result<Self, Self::Error> {
        let name = raw.name.unwrap_or_else(|| "emoji".to_string());
        Ok(match raw.id {
            Some(id) => Emoji::Custom {
                id: parse_id(&id)?,
                name,
                animated: raw.animated,
            },
            None => Emoji::Unicode(name),
        })
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = PlatformError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let attachments = raw
            .attachments
            .into_iter()
            .map(|a| {
                Ok(Attachment {
                    id: parse_id(&a.id)?,
                    filename: a.filename,
                    url: a.url,
                    size: a.size,
                    content_type: a.content_type,
                })
            })
            .collect::<Result<_, PlatformError>>()?;
        let reactions = raw
            .reactions
            .into_iter()
            .map(|r| {
                Ok(Reaction {
                    emoji: Emoji::try_from(r.emoji)?,
                    count: r.count,
                })
            })
            .collect::<Result<_, PlatformError>>()?;
        Ok(Message {
            id: parse_id(&raw.id)?,
            channel_id: parse_id(&raw.channel_id)?,
            author: Author::try_from(raw.author)?,
            timestamp: parse_time(&raw.timestamp)?,
            edited_timestamp: raw.edited_timestamp.as_deref().map(parse_time).transpose()?,
            content: raw.content,
            attachments,
            embeds: raw.embeds.into_iter().map(Embed::from).collect(),
            reactions,
            mentions: raw
                .mentions
                .into_iter()
                .map(Author::try_from)
                .collect::<Result<_, _>>()?,
            mention_roles: raw
                .mention_roles
                .iter()
                .map(|id| parse_id(id))
                .collect::<Result<_, _>>()?,
            pinned: raw.pinned,
        })
    }
}
