//! Discord-backed implementations of the platform collaborator traits.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use warden_core::{
    ChannelNotice, GuildChannelDirectory, InvocationContext, NoticeSink, PermissionResolver,
    PlatformError,
};

use crate::discord_api::{
    DiscordApiClient, DiscordChannel, DiscordEmbed, DiscordEmbedAuthor, DiscordMessagePayload,
    DISCORD_TEXT_CHANNEL_TYPE,
};
use crate::discord_permissions::{
    compute_channel_permissions, permission_names, MemberPermissionInput,
};

pub(crate) fn notice_payload(notice: ChannelNotice) -> DiscordMessagePayload {
    match notice {
        ChannelNotice::Text(content) => DiscordMessagePayload::Content { content },
        ChannelNotice::Embed(embed) => DiscordMessagePayload::Embeds {
            embeds: vec![DiscordEmbed {
                description: embed.description,
                author: DiscordEmbedAuthor {
                    name: embed.author_name,
                    icon_url: embed.author_avatar_url,
                },
            }],
        },
    }
}

#[derive(Clone)]
pub struct DiscordNoticeSink {
    api: Arc<DiscordApiClient>,
}

impl DiscordNoticeSink {
    pub fn new(api: Arc<DiscordApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl NoticeSink for DiscordNoticeSink {
    async fn send_notice(
        &self,
        channel_id: &str,
        notice: ChannelNotice,
    ) -> Result<(), PlatformError> {
        self.api
            .create_message(channel_id, &notice_payload(notice))
            .await
            .map(|_| ())
    }
}

#[derive(Clone)]
pub struct DiscordPermissionResolver {
    api: Arc<DiscordApiClient>,
}

impl DiscordPermissionResolver {
    pub fn new(api: Arc<DiscordApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PermissionResolver for DiscordPermissionResolver {
    async fn effective_permissions(
        &self,
        ctx: &InvocationContext,
    ) -> Result<BTreeSet<String>, PlatformError> {
        let Some(guild_id) = ctx.guild_id.as_deref() else {
            return Err(PlatformError::Unsupported(
                "permissions are only defined inside a guild".to_string(),
            ));
        };
        let guild = self.api.get_guild(guild_id).await?;
        let member = self.api.get_guild_member(guild_id, &ctx.author_id).await?;
        let roles = self.api.list_guild_roles(guild_id).await?;
        let channel = self.api.get_channel(&ctx.channel_id).await?;

        let bits = compute_channel_permissions(&MemberPermissionInput {
            guild_id,
            guild_owner_id: guild.owner_id.as_deref(),
            user_id: &ctx.author_id,
            member_role_ids: &member.roles,
            guild_roles: &roles,
            channel_overwrites: &channel.permission_overwrites,
        });
        Ok(permission_names(bits))
    }
}

/// Channel listing and creation in the bot's primary guild: the configured
/// guild, or else the first guild the bot belongs to.
pub struct DiscordGuildDirectory {
    api: Arc<DiscordApiClient>,
    configured_guild_id: Option<String>,
    resolved_guild_id: OnceCell<String>,
}

impl DiscordGuildDirectory {
    pub fn new(api: Arc<DiscordApiClient>, configured_guild_id: Option<String>) -> Self {
        Self {
            api,
            configured_guild_id: configured_guild_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            resolved_guild_id: OnceCell::new(),
        }
    }

    pub async fn primary_guild_id(&self) -> Result<&str, PlatformError> {
        let guild_id = self
            .resolved_guild_id
            .get_or_try_init(|| async {
                if let Some(configured) = &self.configured_guild_id {
                    return Ok::<String, PlatformError>(configured.clone());
                }
                self.api
                    .list_current_user_guilds()
                    .await?
                    .into_iter()
                    .next()
                    .map(|guild| guild.id)
                    .ok_or_else(|| {
                        PlatformError::NotFound("bot is not a member of any guild".to_string())
                    })
            })
            .await?;
        Ok(guild_id.as_str())
    }

    pub async fn text_channels(&self) -> Result<Vec<DiscordChannel>, PlatformError> {
        let guild_id = self.primary_guild_id().await?;
        Ok(self
            .api
            .list_guild_channels(guild_id)
            .await?
            .into_iter()
            .filter(|channel| channel.kind == DISCORD_TEXT_CHANNEL_TYPE)
            .collect())
    }

}

#[async_trait]
impl GuildChannelDirectory for DiscordGuildDirectory {
    async fn primary_guild_channel_names(&self) -> Result<Vec<String>, PlatformError> {
        let guild_id = self.primary_guild_id().await?;
        Ok(self
            .api
            .list_guild_channels(guild_id)
            .await?
            .into_iter()
            .filter_map(|channel| channel.name)
            .collect())
    }

    async fn create_text_channel(&self, name: &str) -> Result<(), PlatformError> {
        let guild_id = self.primary_guild_id().await?;
        let created = self.api.create_guild_text_channel(guild_id, name).await?;
        if created.kind != DISCORD_TEXT_CHANNEL_TYPE {
            tracing::warn!(
                channel = %name,
                kind = created.kind,
                "created channel is not a text channel"
            );
        }
        Ok(())
    }
}
