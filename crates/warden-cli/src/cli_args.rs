use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::CliEnvironment;

mod audit_flags;

pub use audit_flags::CliAuditFlags;

pub(crate) fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "warden",
    about = "Command access control and audit trail for a Discord bot",
    version
)]
pub struct WardenCli {
    #[arg(
        long,
        env = "WARDEN_ENVIRONMENT",
        value_enum,
        default_value = "production",
        help = "Deployment mode. `test` confines the bot to the channel named after --branch-name"
    )]
    pub environment: CliEnvironment,

    #[arg(
        long = "branch-name",
        env = "WARDEN_BRANCH_NAME",
        help = "Branch or pull request identifier; required with --environment test"
    )]
    pub branch_name: Option<String>,

    #[arg(
        long = "discord-token",
        env = "WARDEN_DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token"
    )]
    pub discord_token: Option<String>,

    #[arg(
        long = "discord-api-base",
        env = "WARDEN_DISCORD_API_BASE",
        default_value = warden_discord_runtime::DEFAULT_DISCORD_API_BASE,
        help = "Base URL for the Discord REST API"
    )]
    pub discord_api_base: String,

    #[arg(
        long = "guild-id",
        env = "WARDEN_GUILD_ID",
        help = "Primary guild id. Defaults to the first guild the bot belongs to"
    )]
    pub guild_id: Option<String>,

    #[arg(
        long = "channel-ids",
        env = "WARDEN_CHANNEL_IDS",
        value_delimiter = ',',
        help = "Channel ids to poll for commands. Empty polls every text channel of the primary guild"
    )]
    pub channel_ids: Vec<String>,

    #[arg(
        long = "command-prefix",
        env = "WARDEN_COMMAND_PREFIX",
        default_value = ".",
        help = "Prefix that marks a message as a command"
    )]
    pub command_prefix: String,

    #[arg(
        long = "poll-interval-ms",
        env = "WARDEN_POLL_INTERVAL_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64,
        help = "Delay between channel polls"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "replay-backlog",
        env = "WARDEN_REPLAY_BACKLOG",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Dispatch commands already present in the channels at startup"
    )]
    pub replay_backlog: bool,

    #[arg(
        long = "poll-once",
        env = "WARDEN_POLL_ONCE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Run a single poll cycle and exit"
    )]
    pub poll_once: bool,

    #[arg(
        long = "policy-file",
        env = "WARDEN_POLICY_FILE",
        default_value = ".warden/command-access.json",
        help = "JSON policy table mapping commands to allowed roles or permissions"
    )]
    pub policy_file: PathBuf,

    #[arg(
        long = "bot-name",
        env = "WARDEN_BOT_NAME",
        default_value = "wall_e",
        help = "Author name shown on embed notices"
    )]
    pub bot_name: String,

    #[arg(
        long = "bot-avatar-url",
        env = "WARDEN_BOT_AVATAR_URL",
        help = "Author avatar shown on embed notices"
    )]
    pub bot_avatar_url: Option<String>,

    #[command(flatten)]
    pub audit: CliAuditFlags,
}
