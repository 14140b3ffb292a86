//! Prefix command parsing, the command registry, and built-in commands.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use warden_access::{DeploymentConfig, ADMIN_ESCAPE_COMMAND};
use warden_core::{ChannelNotice, InvocationContext, NoticeSink};
use warden_dispatch::{debug_info_reply, DispatchError, DEBUG_INFO_COMMAND};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Token directly after the prefix; empty for a bare prefix.
    pub invoked_with: String,
    pub arguments: Vec<String>,
}

/// Splits `content` into command token and arguments when it starts with
/// `prefix`. Returns `None` for ordinary chat messages.
pub fn parse_prefixed_command(content: &str, prefix: &str) -> Option<ParsedCommand> {
    if prefix.is_empty() {
        return None;
    }
    let rest = content.trim_start().strip_prefix(prefix)?;
    if rest.starts_with(char::is_whitespace) {
        return Some(ParsedCommand {
            invoked_with: String::new(),
            arguments: rest.split_whitespace().map(str::to_string).collect(),
        });
    }
    let mut tokens = rest.split_whitespace();
    let invoked_with = tokens.next().unwrap_or_default().to_string();
    Some(ParsedCommand {
        invoked_with,
        arguments: tokens.map(str::to_string).collect(),
    })
}

/// Arguments and reply channel handed to a command body.
pub struct CommandRequest<'a> {
    pub ctx: &'a InvocationContext,
    pub arguments: &'a [String],
    pub replies: &'a dyn NoticeSink,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, request: CommandRequest<'_>) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub name: String,
    pub aliases: Vec<String>,
    /// Positional parameters that must be present, in order.
    pub required_arguments: Vec<String>,
    pub subcommands: Vec<String>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|alias| alias.to_string()).collect();
        self
    }

    pub fn with_required_arguments(mut self, parameters: &[&str]) -> Self {
        self.required_arguments = parameters.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_subcommands(mut self, subcommands: &[&str]) -> Self {
        self.subcommands = subcommands.iter().map(|name| name.to_string()).collect();
        self
    }

    /// First required parameter the supplied arguments do not cover.
    pub fn missing_argument(&self, arguments: &[String]) -> Option<&str> {
        self.required_arguments
            .get(arguments.len())
            .map(String::as_str)
    }
}

struct RegisteredCommand {
    spec: CommandSpec,
    handler: Arc<dyn CommandHandler>,
}

/// A parsed message bound to a registered command.
pub struct ResolvedCommand {
    pub spec: CommandSpec,
    pub handler: Arc<dyn CommandHandler>,
    pub invoked_with: String,
    pub invoked_subcommand: Option<String>,
    pub arguments: Vec<String>,
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<RegisteredCommand>,
    lookup: BTreeMap<String, usize>,
}

impl CommandRegistry {
    pub fn register(&mut self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) {
        let index = self.commands.len();
        self.lookup.insert(spec.name.clone(), index);
        for alias in &spec.aliases {
            self.lookup.insert(alias.clone(), index);
        }
        self.commands.push(RegisteredCommand { spec, handler });
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|command| command.spec.name.as_str())
    }

    pub fn resolve(&self, parsed: &ParsedCommand) -> Option<ResolvedCommand> {
        let index = *self.lookup.get(&parsed.invoked_with)?;
        let command = &self.commands[index];
        let mut arguments = parsed.arguments.clone();
        let invoked_subcommand = if arguments
            .first()
            .is_some_and(|first| command.spec.subcommands.contains(first))
        {
            Some(arguments.remove(0))
        } else {
            None
        };
        Some(ResolvedCommand {
            spec: command.spec.clone(),
            handler: Arc::clone(&command.handler),
            invoked_with: parsed.invoked_with.clone(),
            invoked_subcommand,
            arguments,
        })
    }
}

/// Replies with the branch under test; silent in production.
pub struct DebugInfoCommand {
    deployment: DeploymentConfig,
}

impl DebugInfoCommand {
    pub fn new(deployment: DeploymentConfig) -> Self {
        Self { deployment }
    }
}

#[async_trait]
impl CommandHandler for DebugInfoCommand {
    async fn execute(&self, request: CommandRequest<'_>) -> Result<(), DispatchError> {
        let Some(reply) = debug_info_reply(&self.deployment) else {
            return Ok(());
        };
        request
            .replies
            .send_notice(&request.ctx.channel_id, ChannelNotice::text(reply))
            .await
            .map_err(|error| DispatchError::Unhandled(error.into()))
    }
}

/// Stops the runtime loop.
pub struct ShutdownCommand {
    signal: Arc<Notify>,
}

impl ShutdownCommand {
    pub fn new(signal: Arc<Notify>) -> Self {
        Self { signal }
    }
}

#[async_trait]
impl CommandHandler for ShutdownCommand {
    async fn execute(&self, request: CommandRequest<'_>) -> Result<(), DispatchError> {
        tracing::info!(author_id = %request.ctx.author_id, "shutdown requested");
        self.signal.notify_one();
        Ok(())
    }
}

pub fn builtin_command_registry(
    deployment: DeploymentConfig,
    shutdown: Arc<Notify>,
) -> CommandRegistry {
    let mut registry = CommandRegistry::default();
    registry.register(
        CommandSpec::new(DEBUG_INFO_COMMAND),
        Arc::new(DebugInfoCommand::new(deployment)),
    );
    registry.register(
        CommandSpec::new(ADMIN_ESCAPE_COMMAND).with_aliases(&["exit"]),
        Arc::new(ShutdownCommand::new(shutdown)),
    );
    registry
}
