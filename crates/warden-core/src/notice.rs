//! User-facing notice shapes sent back to the originating channel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedNotice {
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelNotice {
    Text(String),
    Embed(EmbedNotice),
}

impl ChannelNotice {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text(body.into())
    }

    /// Plain text rendering, used for logs and for transports without embeds.
    pub fn plain_text(&self) -> &str {
        match self {
            Self::Text(body) => body,
            Self::Embed(embed) => &embed.description,
        }
    }
}
