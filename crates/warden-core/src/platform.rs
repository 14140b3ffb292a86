//! Collaborator traits supplied by the host chat platform.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::{ChannelNotice, InvocationContext};

/// Errors surfaced by host-platform collaborators.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Transport(String),
    #[error("platform resource not found: {0}")]
    NotFound(String),
    #[error("operation not supported in this context: {0}")]
    Unsupported(String),
}

/// Sends notices to a channel.
#[async_trait]
pub trait NoticeSink: Send + Sync {
    async fn send_notice(&self, channel_id: &str, notice: ChannelNotice)
        -> Result<(), PlatformError>;
}

/// Resolves the invoker's effective permission names in the invocation channel,
/// combining guild-level role grants with channel overwrites.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn effective_permissions(
        &self,
        ctx: &InvocationContext,
    ) -> Result<BTreeSet<String>, PlatformError>;
}

/// Channel listing and creation inside the primary guild.
#[async_trait]
pub trait GuildChannelDirectory: Send + Sync {
    async fn primary_guild_channel_names(&self) -> Result<Vec<String>, PlatformError>;
    async fn create_text_channel(&self, name: &str) -> Result<(), PlatformError>;
}
