//! Thin Discord REST client covering the endpoints the bot needs.
//!
//! Requests carry the bot token and are retried with linear backoff on
//! transport errors, rate limiting, and server errors. Everything else maps to
//! a `PlatformError` on the first response.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use warden_core::PlatformError;

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DISCORD_TEXT_CHANNEL_TYPE: u8 = 0;
pub const DISCORD_DM_CHANNEL_TYPE: u8 = 1;
const DISCORD_OVERWRITE_ROLE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordApiConfig {
    pub api_base: String,
    pub bot_token: String,
    pub http_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for DiscordApiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token: String::new(),
            http_timeout_ms: 10_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    pub author: DiscordUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum OverwriteTarget {
    Role,
    Member,
}

impl From<u8> for OverwriteTarget {
    fn from(raw: u8) -> Self {
        if raw == DISCORD_OVERWRITE_ROLE {
            Self::Role
        } else {
            Self::Member
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionOverwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub target: OverwriteTarget,
    #[serde(default, deserialize_with = "deserialize_permission_bits")]
    pub allow: u64,
    #[serde(default, deserialize_with = "deserialize_permission_bits")]
    pub deny: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordChannel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordRole {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default, deserialize_with = "deserialize_permission_bits")]
    pub permissions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordGuildMember {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordGuild {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscordEmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscordEmbed {
    pub description: String,
    pub author: DiscordEmbedAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
/// Enumerates supported `DiscordMessagePayload` values.
pub enum DiscordMessagePayload {
    Content { content: String },
    Embeds { embeds: Vec<DiscordEmbed> },
}

fn deserialize_permission_bits<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // The API serializes permission bitfields as decimal strings.
    match Value::deserialize(deserializer)? {
        Value::String(raw) => raw.trim().parse::<u64>().map_err(serde::de::Error::custom),
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("permission bits must be unsigned")),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "unexpected permission bits value: {other}"
        ))),
    }
}

/// Orders snowflake ids numerically, falling back to lexical order.
pub fn compare_snowflakes(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.trim().parse::<u64>(), right.trim().parse::<u64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

#[derive(Debug, Clone)]
pub struct DiscordApiClient {
    config: DiscordApiConfig,
    client: reqwest::Client,
}

impl DiscordApiClient {
    pub fn new(config: DiscordApiConfig) -> Result<Self, PlatformError> {
        if config.bot_token.trim().is_empty() {
            return Err(PlatformError::Unsupported(
                "discord bot token cannot be empty".to_string(),
            ));
        }
        if config.api_base.trim().trim_end_matches('/').is_empty() {
            return Err(PlatformError::Unsupported(
                "discord api base cannot be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms.max(1)))
            .build()
            .map_err(|error| {
                PlatformError::Transport(format!("failed to build discord http client: {error}"))
            })?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim().trim_end_matches('/'), path)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, PlatformError> {
        let url = self.endpoint(path);
        let authorization = format!("Bot {}", self.config.bot_token.trim());
        let max_attempts = self.config.retry_max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt = attempt.saturating_add(1);
            let mut request = self
                .client
                .request(method.clone(), url.as_str())
                .header("authorization", authorization.as_str());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(error) => {
                    if attempt < max_attempts {
                        sleep_retry_backoff(self.config.retry_base_delay_ms, attempt).await;
                        continue;
                    }
                    return Err(PlatformError::Transport(format!(
                        "{method} {path} transport error: {error}"
                    )));
                }
            };

            let status = response.status();
            if status.is_success() {
                if status == StatusCode::NO_CONTENT {
                    return serde_json::from_value(Value::Null).map_err(|error| {
                        PlatformError::Transport(format!("{method} {path} empty response: {error}"))
                    });
                }
                return response.json::<T>().await.map_err(|error| {
                    PlatformError::Transport(format!("{method} {path} response parse error: {error}"))
                });
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < max_attempts {
                tracing::debug!(
                    method = %method,
                    path,
                    status = status.as_u16(),
                    attempt,
                    "retrying discord request"
                );
                sleep_retry_backoff(self.config.retry_base_delay_ms, attempt).await;
                continue;
            }
            let detail = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                return Err(PlatformError::NotFound(format!("{method} {path}")));
            }
            return Err(PlatformError::Transport(format!(
                "{method} {path} failed with status {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<DiscordChannel, PlatformError> {
        self.request_json(Method::GET, &format!("/channels/{}", channel_id.trim()), &[], None)
            .await
    }

    /// Messages newer than `after`, oldest first.
    pub async fn list_channel_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>, PlatformError> {
        let mut query = vec![("limit", limit.clamp(1, 100).to_string())];
        if let Some(after) = after {
            query.push(("after", after.trim().to_string()));
        }
        let mut messages: Vec<DiscordMessage> = self
            .request_json(
                Method::GET,
                &format!("/channels/{}/messages", channel_id.trim()),
                &query,
                None,
            )
            .await?;
        messages.sort_by(|left, right| compare_snowflakes(&left.id, &right.id));
        Ok(messages)
    }

    pub async fn create_message(
        &self,
        channel_id: &str,
        payload: &DiscordMessagePayload,
    ) -> Result<DiscordMessage, PlatformError> {
        let body = serde_json::to_value(payload).map_err(|error| {
            PlatformError::Transport(format!("failed to encode message payload: {error}"))
        })?;
        self.request_json(
            Method::POST,
            &format!("/channels/{}/messages", channel_id.trim()),
            &[],
            Some(&body),
        )
        .await
    }

    pub async fn get_guild(&self, guild_id: &str) -> Result<DiscordGuild, PlatformError> {
        self.request_json(Method::GET, &format!("/guilds/{}", guild_id.trim()), &[], None)
            .await
    }

    pub async fn get_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<DiscordGuildMember, PlatformError> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{}/members/{}", guild_id.trim(), user_id.trim()),
            &[],
            None,
        )
        .await
    }

    pub async fn list_guild_roles(&self, guild_id: &str) -> Result<Vec<DiscordRole>, PlatformError> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{}/roles", guild_id.trim()),
            &[],
            None,
        )
        .await
    }

    pub async fn list_guild_channels(
        &self,
        guild_id: &str,
    ) -> Result<Vec<DiscordChannel>, PlatformError> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{}/channels", guild_id.trim()),
            &[],
            None,
        )
        .await
    }

    pub async fn create_guild_text_channel(
        &self,
        guild_id: &str,
        name: &str,
    ) -> Result<DiscordChannel, PlatformError> {
        let body = json!({ "name": name, "type": DISCORD_TEXT_CHANNEL_TYPE });
        self.request_json(
            Method::POST,
            &format!("/guilds/{}/channels", guild_id.trim()),
            &[],
            Some(&body),
        )
        .await
    }

    pub async fn list_current_user_guilds(&self) -> Result<Vec<DiscordGuild>, PlatformError> {
        self.request_json(Method::GET, "/users/@me/guilds", &[], None)
            .await
    }

    pub async fn get_current_user(&self) -> Result<DiscordUser, PlatformError> {
        self.request_json(Method::GET, "/users/@me", &[], None).await
    }
}

async fn sleep_retry_backoff(retry_base_delay_ms: u64, attempt: usize) {
    if retry_base_delay_ms == 0 {
        return;
    }
    let delay_ms = retry_base_delay_ms.saturating_mul(u64::try_from(attempt).unwrap_or(1));
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}
