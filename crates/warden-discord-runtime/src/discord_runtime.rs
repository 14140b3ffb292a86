//! Polling runtime: pulls new messages from the configured channels, turns
//! prefixed ones into invocations, and drives them through the command guard.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use warden_audit::AuditOutcome;
use warden_core::{AuthorRole, InvocationContext, NoticeSink, PlatformError};
use warden_dispatch::{CommandGuard, CommandRunOutcome, DispatchError, ErrorDisposition};

use crate::command_router::{
    parse_prefixed_command, CommandRegistry, CommandRequest, ParsedCommand, ResolvedCommand,
};
use crate::discord_api::{DiscordApiClient, DiscordMessage};
use crate::discord_collaborators::DiscordGuildDirectory;

const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordRuntimeConfig {
    pub command_prefix: String,
    pub ingress_channel_ids: Vec<String>,
    pub poll_interval_ms: u64,
    pub poll_batch_size: usize,
    /// Dispatch messages already present at startup instead of skipping them.
    pub replay_backlog: bool,
    pub poll_once: bool,
}

impl Default for DiscordRuntimeConfig {
    fn default() -> Self {
        Self {
            command_prefix: ".".to_string(),
            ingress_channel_ids: Vec::new(),
            poll_interval_ms: 2_000,
            poll_batch_size: 50,
            replay_backlog: false,
            poll_once: false,
        }
    }
}

#[derive(Debug)]
/// Enumerates supported `MessageDisposition` values.
pub enum MessageDisposition {
    Ignored,
    ContextUnavailable { error: String },
    UnknownCommand { disposition: ErrorDisposition },
    Dispatched {
        command: String,
        outcome: CommandRunOutcome,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCycleSummary {
    pub fetched_messages: usize,
    pub ignored_messages: usize,
    pub dispatched_commands: usize,
    pub unknown_commands: usize,
    pub failed_messages: usize,
    pub channel_errors: usize,
}

/// Turns one chat message into a guarded command run.
#[derive(Clone)]
pub struct MessageDispatcher {
    api: Arc<DiscordApiClient>,
    guard: Arc<CommandGuard>,
    registry: Arc<CommandRegistry>,
    replies: Arc<dyn NoticeSink>,
    command_prefix: String,
}

impl MessageDispatcher {
    pub fn new(
        api: Arc<DiscordApiClient>,
        guard: Arc<CommandGuard>,
        registry: Arc<CommandRegistry>,
        replies: Arc<dyn NoticeSink>,
        command_prefix: impl Into<String>,
    ) -> Self {
        Self {
            api,
            guard,
            registry,
            replies,
            command_prefix: command_prefix.into(),
        }
    }

    pub fn guard(&self) -> &CommandGuard {
        &self.guard
    }

    pub async fn dispatch(&self, message: &DiscordMessage) -> MessageDisposition {
        if message.author.bot {
            return MessageDisposition::Ignored;
        }
        let Some(parsed) = parse_prefixed_command(&message.content, &self.command_prefix) else {
            return MessageDisposition::Ignored;
        };
        let resolved = self.registry.resolve(&parsed);
        let ctx = match self
            .invocation_context(message, &parsed, resolved.as_ref())
            .await
        {
            Ok(ctx) => ctx,
            Err(error) => {
                tracing::warn!(
                    message_id = %message.id,
                    channel_id = %message.channel_id,
                    error = %error,
                    "failed to build invocation context"
                );
                return MessageDisposition::ContextUnavailable {
                    error: error.to_string(),
                };
            }
        };

        let Some(resolved) = resolved else {
            let disposition = self.guard.reject_unknown(&ctx, &parsed.invoked_with).await;
            return MessageDisposition::UnknownCommand { disposition };
        };

        let outcome = self
            .guard
            .run(&ctx, || async {
                if let Some(parameter) = resolved.spec.missing_argument(&resolved.arguments) {
                    return Err(DispatchError::MissingArgument {
                        parameter: parameter.to_string(),
                    });
                }
                resolved
                    .handler
                    .execute(CommandRequest {
                        ctx: &ctx,
                        arguments: &resolved.arguments,
                        replies: self.replies.as_ref(),
                    })
                    .await
            })
            .await;
        MessageDisposition::Dispatched {
            command: resolved.spec.name,
            outcome,
        }
    }

    async fn invocation_context(
        &self,
        message: &DiscordMessage,
        parsed: &ParsedCommand,
        resolved: Option<&ResolvedCommand>,
    ) -> Result<InvocationContext, PlatformError> {
        let channel = self.api.get_channel(&message.channel_id).await?;
        let author_roles = match channel.guild_id.as_deref() {
            Some(guild_id) => self.author_roles(guild_id, &message.author.id).await?,
            None => Vec::new(),
        };
        let command_name = resolved
            .map(|resolved| resolved.spec.name.clone())
            .unwrap_or_else(|| parsed.invoked_with.clone());
        Ok(InvocationContext {
            author_id: message.author.id.clone(),
            author_roles,
            channel_id: message.channel_id.clone(),
            channel_name: channel.name.unwrap_or_default(),
            guild_id: channel.guild_id,
            command_name,
            invoked_with: parsed.invoked_with.clone(),
            invoked_subcommand: resolved.and_then(|resolved| resolved.invoked_subcommand.clone()),
        })
    }

    /// Member roles including `@everyone`, ranked by hierarchy position.
    async fn author_roles(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Vec<AuthorRole>, PlatformError> {
        let member = self.api.get_guild_member(guild_id, user_id).await?;
        let roles = self.api.list_guild_roles(guild_id).await?;
        Ok(roles
            .into_iter()
            .filter(|role| role.id == guild_id || member.roles.contains(&role.id))
            .map(|role| AuthorRole::new(role.name, role.position))
            .collect())
    }
}

pub struct DiscordRuntime {
    dispatcher: MessageDispatcher,
    config: DiscordRuntimeConfig,
    cursors: Mutex<BTreeMap<String, String>>,
    pending_audits: Mutex<Vec<JoinHandle<AuditOutcome>>>,
    shutdown: Arc<Notify>,
    channel_discovery: Option<Arc<DiscordGuildDirectory>>,
}

impl DiscordRuntime {
    pub fn new(
        dispatcher: MessageDispatcher,
        config: DiscordRuntimeConfig,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            dispatcher,
            config,
            cursors: Mutex::new(BTreeMap::new()),
            pending_audits: Mutex::new(Vec::new()),
            shutdown,
            channel_discovery: None,
        }
    }

    /// Polls every text channel of the primary guild when no ingress channels
    /// are configured.
    pub fn with_channel_discovery(mut self, directory: Arc<DiscordGuildDirectory>) -> Self {
        self.channel_discovery = Some(directory);
        self
    }

    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Ready handling, then poll until shutdown. Audit writes still in flight
    /// are awaited before returning.
    pub async fn run(&mut self) -> Result<(), PlatformError> {
        match self.dispatcher.guard().on_ready().await {
            Ok(outcome) => tracing::info!(?outcome, "platform ready"),
            Err(error) => tracing::error!(error = %error, "branch channel bootstrap failed"),
        }
        if self.config.ingress_channel_ids.is_empty() {
            if let Some(directory) = &self.channel_discovery {
                self.config.ingress_channel_ids = self.discover_ingress_channels(directory).await?;
            }
        }
        if self.config.ingress_channel_ids.is_empty() {
            return Err(PlatformError::Unsupported(
                "no ingress channels configured or discovered".to_string(),
            ));
        }
        tracing::info!(
            channels = self.config.ingress_channel_ids.len(),
            prefix = %self.config.command_prefix,
            "discord runtime polling"
        );

        loop {
            let summary = self.poll_cycle().await;
            tracing::debug!(
                fetched = summary.fetched_messages,
                dispatched = summary.dispatched_commands,
                unknown = summary.unknown_commands,
                channel_errors = summary.channel_errors,
                "poll cycle complete"
            );
            if self.config.poll_once {
                break;
            }
            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms.max(1))) => {}
            }
        }
        self.drain_pending_audits().await;
        Ok(())
    }

    /// Text channels of the primary guild that this deployment handles. An
    /// isolated-test instance only polls its branch channel.
    async fn discover_ingress_channels(
        &self,
        directory: &DiscordGuildDirectory,
    ) -> Result<Vec<String>, PlatformError> {
        let deployment = self.dispatcher.guard().deployment();
        Ok(directory
            .text_channels()
            .await?
            .into_iter()
            .filter(|channel| {
                channel
                    .name
                    .as_deref()
                    .is_some_and(|name| deployment.owns_channel(name))
            })
            .map(|channel| channel.id)
            .collect())
    }

    pub async fn poll_cycle(&self) -> PollCycleSummary {
        let mut summary = PollCycleSummary::default();
        let mut in_flight = JoinSet::new();

        for channel_id in &self.config.ingress_channel_ids {
            let channel_id = channel_id.trim();
            if channel_id.is_empty() {
                continue;
            }
            let cursor = self.cursor(channel_id);
            if cursor.is_none() && !self.config.replay_backlog {
                if let Err(error) = self.prime_cursor(channel_id).await {
                    summary.channel_errors += 1;
                    tracing::warn!(channel_id, error = %error, "failed to prime channel cursor");
                }
                continue;
            }

            let messages = match self
                .dispatcher
                .api
                .list_channel_messages(channel_id, cursor.as_deref(), self.config.poll_batch_size)
                .await
            {
                Ok(messages) => messages,
                Err(error) => {
                    summary.channel_errors += 1;
                    tracing::warn!(channel_id, error = %error, "failed to poll channel");
                    continue;
                }
            };
            if let Some(latest) = messages.last() {
                self.set_cursor(channel_id, &latest.id);
            }
            summary.fetched_messages += messages.len();
            for message in messages {
                let dispatcher = self.dispatcher.clone();
                in_flight.spawn(async move { dispatcher.dispatch(&message).await });
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(MessageDisposition::Ignored) => summary.ignored_messages += 1,
                Ok(MessageDisposition::ContextUnavailable { .. }) => summary.failed_messages += 1,
                Ok(MessageDisposition::UnknownCommand { .. }) => summary.unknown_commands += 1,
                Ok(MessageDisposition::Dispatched { outcome, .. }) => {
                    summary.dispatched_commands += 1;
                    if let Some(audit) = outcome.audit {
                        self.track_audit(audit);
                    }
                }
                Err(error) => {
                    summary.failed_messages += 1;
                    tracing::error!(error = %error, "message dispatch task failed");
                }
            }
        }
        summary
    }

    fn cursor(&self, channel_id: &str) -> Option<String> {
        self.cursors
            .lock()
            .ok()
            .and_then(|cursors| cursors.get(channel_id).cloned())
    }

    fn set_cursor(&self, channel_id: &str, message_id: &str) {
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.insert(channel_id.to_string(), message_id.to_string());
        }
    }

    async fn prime_cursor(&self, channel_id: &str) -> Result<(), PlatformError> {
        let latest = self
            .dispatcher
            .api
            .list_channel_messages(channel_id, None, 1)
            .await?;
        let cursor = latest
            .last()
            .map(|message| message.id.clone())
            .unwrap_or_else(|| "0".to_string());
        self.set_cursor(channel_id, &cursor);
        Ok(())
    }

    fn track_audit(&self, audit: JoinHandle<AuditOutcome>) {
        if let Ok(mut pending) = self.pending_audits.lock() {
            pending.retain(|handle| !handle.is_finished());
            pending.push(audit);
        }
    }

    async fn drain_pending_audits(&self) {
        let pending = self
            .pending_audits
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default();
        for handle in pending {
            match tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(outcome)) => {
                    tracing::debug!(reason_code = outcome.reason_code(), "audit drained")
                }
                Ok(Err(error)) => tracing::error!(error = %error, "audit task failed"),
                Err(_) => tracing::warn!("audit write still pending at shutdown"),
            }
        }
    }
}
