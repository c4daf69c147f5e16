//! Types shared between platform clients and the transcript builder.

use time::OffsetDateTime;

/// An RGB colour as used by embeds and roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colour(pub u32);

impl Colour {
    pub const BLURPLE: Colour = Colour(0x5865F2);
    pub const RED: Colour = Colour(0xE74C3C);

    /// CSS hex form, e.g. `#5865f2`
    pub fn to_css(self) -> String {
        format!("#{:06x}", self.0 & 0x00FF_FFFF)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: u64,
    pub name: String,
    /// Zero means the role has no colour
    pub colour: Colour,
}

#[derive(Debug, Clone)]
pub struct Guild {
    pub id: u64,
    pub name: String,
    pub icon: Option<String>,
    pub roles: Vec<Role>,
    pub channels: Vec<Channel>,
}

impl Guild {
    pub fn role(&self, id: u64) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn channel_name(&self, id: u64) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    pub fn icon_url(&self) -> Option<String> {
        self.icon
            .as_ref()
            .map(|hash| format!("https://cdn.discordapp.com/icons/{}/{hash}.png", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub bot: bool,
}

impl Author {
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }

    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("https://cdn.discordapp.com/avatars/{}/{hash}.png", self.id),
            None => format!(
                "https://cdn.discordapp.com/embed/avatars/{}.png",
                (self.id >> 22) % 6
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: u64,
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        if let Some(kind) = &self.content_type {
            return kind.starts_with("image/");
        }
        let lower = self.filename.to_lowercase();
        [".png", ".jpg", ".jpeg", ".gif", ".webp"]
            .iter()
            .any(|ext| lower.ends_with(ext))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A rich embed as received on a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub colour: Option<Colour>,
    pub author_name: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emoji {
    Unicode(String),
    Custom { id: u64, name: String, animated: bool },
}

impl Emoji {
    pub fn image_url(&self) -> Option<String> {
        match self {
            Emoji::Unicode(_) => None,
            Emoji::Custom { id, animated, .. } => {
                let ext = if *animated { "gif" } else { "png" };
                Some(format!("https://cdn.discordapp.com/emojis/{id}.{ext}"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: Emoji,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub author: Author,
    pub timestamp: OffsetDateTime,
    pub edited_timestamp: Option<OffsetDateTime>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
    pub reactions: Vec<Reaction>,
    /// Users mentioned in `content`, used to resolve `<@id>` tokens
    pub mentions: Vec<Author>,
    pub mention_roles: Vec<u64>,
    pub pinned: bool,
}

impl Message {
    pub fn mentioned_user(&self, id: u64) -> Option<&Author> {
        self.mentions.iter().find(|a| a.id == id)
    }
}

/// Embed posted by the exporter itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmbed {
    pub title: Option<String>,
    pub description: String,
    pub colour: Colour,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embeds: Vec<OutgoingEmbed>,
    pub file: Option<OutgoingFile>,
}

impl OutgoingMessage {
    pub fn embed(embed: OutgoingEmbed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn with_file(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.file = Some(OutgoingFile {
            filename: filename.into(),
            bytes,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(display: Option<&str>) -> Author {
        Author {
            id: 80351110224678912,
            username: "nelly".to_string(),
            display_name: display.map(|s| s.to_string()),
            avatar: None,
            bot: false,
        }
    }

    #[test]
    fn author_name_prefers_display_name() {
        assert_eq!(author(Some("Nelly")).name(), "Nelly");
        assert_eq!(author(None).name(), "nelly");
        assert_eq!(author(Some("  ")).name(), "nelly");
    }

    #[test]
    fn default_avatar_uses_snowflake_bucket() {
        let url = author(None).avatar_url();
        assert!(url.starts_with("https://cdn.discordapp.com/embed/avatars/"));
        assert!(url.ends_with(".png"));
    }

    #[test]
    fn colour_css_is_six_hex_digits() {
        assert_eq!(Colour::BLURPLE.to_css(), "#5865f2");
        assert_eq!(Colour(0xff).to_css(), "#0000ff");
    }

    #[test]
    fn attachment_image_detection() {
        let mut attachment = Attachment {
            id: 1,
            filename: "Shot.PNG".to_string(),
            url: "https://cdn.example.com/shot.png".to_string(),
            size: 10,
            content_type: None,
        };
        assert!(attachment.is_image());
        attachment.content_type = Some("text/html".to_string());
        assert!(!attachment.is_image());
    }

    #[test]
    fn custom_emoji_url_respects_animation() {
        let emoji = Emoji::Custom {
            id: 42,
            name: "party".to_string(),
            animated: true,
        };
        assert_eq!(
            emoji.image_url().as_deref(),
            Some("https://cdn.discordapp.com/emojis/42.gif")
        );
        assert_eq!(Emoji::Unicode("👍".to_string()).image_url(), None);
    }
}
