use crate::config::{DISCORD_EMBED_LIMIT, DISCORD_MESSAGE_LIMIT};
use poise::serenity_prelude as serenity;
use tracing::debug;

pub const FAILURE_TITLE: &str = "Problem Amputating";
pub const FAILURE_BODY: &str = "Sorry, I couldn't amputate that link.";

/// Rendered reply, independent of how it will be delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyContent {
    pub title: String,
    pub body: String,
    pub fields: Vec<(String, String)>,
}

impl ReplyContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Text used when the reply is not sent as an embed.
    pub fn plain_text(&self) -> String {
        if self.fields.is_empty() {
            return self.body.clone();
        }
        let mut lines: Vec<String> = Vec::new();
        if !self.body.is_empty() {
            lines.push(self.body.clone());
        }
        for (name, value) in &self.fields {
            lines.push(format!("{}: {}", name, value));
        }
        lines.join("\n")
    }
}

/// Title and body for a set of canonical URLs, or the failure message when
/// there are none.
pub fn format_amputation(urls: &[String]) -> ReplyContent {
    if urls.is_empty() {
        return failure();
    }
    let plural = if urls.len() > 1 { "s" } else { "" };
    ReplyContent::new(format!("Amputated Link{}", plural), urls.join("\n"))
}

pub fn failure() -> ReplyContent {
    ReplyContent::new(FAILURE_TITLE, FAILURE_BODY)
}

/// How a server wants replies delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStyle {
    Embed,
    Reply,
    Send,
}

impl ReplyStyle {
    pub fn from_flags(use_embed: bool, reply_to_original: bool) -> Self {
        match (use_embed, reply_to_original) {
            (true, _) => ReplyStyle::Embed,
            (false, true) => ReplyStyle::Reply,
            (false, false) => ReplyStyle::Send,
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Deliver `content` in response to `original` using `style`.
pub async fn send(
    http: impl serenity::CacheHttp,
    original: &serenity::Message,
    style: ReplyStyle,
    content: &ReplyContent,
) -> Result<serenity::Message, serenity::Error> {
    debug!(
        "Sending {:?} reply '{}' in channel {}",
        style, content.title, original.channel_id
    );

    let builder = match style {
        ReplyStyle::Embed => {
            let mut embed = serenity::CreateEmbed::new()
                .title(&content.title)
                .color(0x5865F2);
            if !content.body.is_empty() {
                embed = embed.description(truncate_chars(&content.body, DISCORD_EMBED_LIMIT));
            }
            for (name, value) in &content.fields {
                embed = embed.field(name, value, false);
            }
            serenity::CreateMessage::new().embed(embed)
        }
        ReplyStyle::Reply => serenity::CreateMessage::new()
            .content(truncate_chars(&content.plain_text(), DISCORD_MESSAGE_LIMIT))
            .reference_message(original),
        ReplyStyle::Send => serenity::CreateMessage::new()
            .content(truncate_chars(&content.plain_text(), DISCORD_MESSAGE_LIMIT)),
    };

    original.channel_id.send_message(http, builder).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_link() {
        let reply = format_amputation(&["https://example.com/story".to_string()]);
        assert_eq!(reply.title, "Amputated Link");
        assert_eq!(reply.body, "https://example.com/story");
    }

    #[test]
    fn test_multiple_links_keep_order() {
        let urls = vec!["https://b.com/2".to_string(), "https://a.com/1".to_string()];
        let reply = format_amputation(&urls);
        assert_eq!(reply.title, "Amputated Links");
        assert_eq!(reply.body, "https://b.com/2\nhttps://a.com/1");
    }

    #[test]
    fn test_no_links_is_failure() {
        let reply = format_amputation(&[]);
        assert_eq!(reply, failure());
        assert_eq!(reply.title, "Problem Amputating");
        assert_eq!(reply.body, "Sorry, I couldn't amputate that link.");
    }

    #[test]
    fn test_reply_style_flags() {
        assert_eq!(ReplyStyle::from_flags(true, true), ReplyStyle::Embed);
        assert_eq!(ReplyStyle::from_flags(false, true), ReplyStyle::Reply);
        assert_eq!(ReplyStyle::from_flags(false, false), ReplyStyle::Send);
    }

    #[test]
    fn test_plain_text_with_fields() {
        let reply = ReplyContent::new("Amputation Stats", "")
            .with_field("Messages Sent", "3")
            .with_field("Servers Watched", "1");
        assert_eq!(reply.plain_text(), "Messages Sent: 3\nServers Watched: 1");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        let long = "x".repeat(20);
        let cut = truncate_chars(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with("..."));
    }
}
