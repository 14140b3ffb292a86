use std::path::PathBuf;

use clap::{ArgAction, Args};
use warden_audit::DEFAULT_AUDIT_MAX_INSERT_ATTEMPTS;

use crate::cli_args::parse_positive_usize;
use crate::CliAuditBackend;

/// Command audit store flags flattened into `WardenCli`.
#[derive(Debug, Args)]
pub struct CliAuditFlags {
    #[arg(
        long = "audit-enabled",
        env = "WARDEN_AUDIT_ENABLED",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Record one CommandStats row per dispatched command"
    )]
    pub audit_enabled: bool,

    #[arg(
        long = "audit-backend",
        env = "WARDEN_AUDIT_BACKEND",
        value_enum,
        default_value = "postgres",
        help = "Store that receives audit rows"
    )]
    pub audit_backend: CliAuditBackend,

    #[arg(
        long = "db-host",
        env = "WARDEN_DB_HOST",
        conflicts_with = "compose_project_name",
        help = "PostgreSQL host for the audit store"
    )]
    pub db_host: Option<String>,

    #[arg(
        long = "compose-project-name",
        env = "WARDEN_COMPOSE_PROJECT_NAME",
        help = "Compose project name; the audit host becomes <project>_wall_e_db"
    )]
    pub compose_project_name: Option<String>,

    #[arg(long = "db-port", env = "WARDEN_DB_PORT", help = "PostgreSQL port")]
    pub db_port: Option<u16>,

    #[arg(
        long = "db-name",
        env = "WARDEN_DB_NAME",
        default_value = "csss_discord_db",
        help = "PostgreSQL database name"
    )]
    pub db_name: String,

    #[arg(
        long = "db-user",
        env = "WARDEN_DB_USER",
        default_value = "wall_e",
        help = "PostgreSQL user"
    )]
    pub db_user: String,

    #[arg(
        long = "db-password",
        env = "WARDEN_DB_PASSWORD",
        hide_env_values = true,
        help = "PostgreSQL password"
    )]
    pub db_password: Option<String>,

    #[arg(
        long = "sqlite-path",
        env = "WARDEN_SQLITE_PATH",
        default_value = ".warden/audit.sqlite",
        help = "SQLite audit store path used with --audit-backend sqlite"
    )]
    pub sqlite_path: PathBuf,

    #[arg(
        long = "audit-pool-size",
        env = "WARDEN_AUDIT_POOL_SIZE",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum concurrently open audit store connections"
    )]
    pub audit_pool_size: usize,

    #[arg(
        long = "audit-max-insert-attempts",
        env = "WARDEN_AUDIT_MAX_INSERT_ATTEMPTS",
        default_value_t = DEFAULT_AUDIT_MAX_INSERT_ATTEMPTS,
        value_parser = parse_positive_usize,
        help = "Insert attempts per audit row before giving up on key collisions"
    )]
    pub audit_max_insert_attempts: usize,
}
