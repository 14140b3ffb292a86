//! Builds the runtime graph from parsed flags and runs it until shutdown.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::Notify;
use warden_access::{load_policy_table_file, AccessEvaluator, DeploymentConfig, EnvironmentGate};
use warden_audit::{
    AuditConnectionPool, AuditRecorder, AuditRecorderConfig, CommandAuditSink,
    PostgresAuditConfig, PostgresAuditConnector, SqliteAuditConnector,
};
use warden_core::{NoticeSink, SystemWallClock};
use warden_discord_runtime::{
    builtin_command_registry, DiscordApiClient, DiscordApiConfig, DiscordGuildDirectory,
    DiscordNoticeSink, DiscordPermissionResolver, DiscordRuntime, DiscordRuntimeConfig,
    MessageDispatcher,
};
use warden_dispatch::{
    BootstrapChannelEnsurer, BotProfile, CommandGuard, DispatchErrorClassifier,
    StderrOperatorStream,
};

use crate::{CliAuditBackend, CliAuditFlags, CliEnvironment, WardenCli};

pub fn deployment_config_from_cli(cli: &WardenCli) -> Result<DeploymentConfig> {
    match cli.environment {
        CliEnvironment::Production => Ok(DeploymentConfig::production()),
        CliEnvironment::Test => {
            let branch_name = cli
                .branch_name
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .context("--branch-name is required when --environment test")?;
            Ok(DeploymentConfig::isolated_test(branch_name))
        }
    }
}

pub fn postgres_audit_config_from_flags(flags: &CliAuditFlags) -> Result<PostgresAuditConfig> {
    let host = match (
        flags.db_host.as_deref().map(str::trim),
        flags.compose_project_name.as_deref().map(str::trim),
    ) {
        (Some(host), _) if !host.is_empty() => host.to_string(),
        (_, Some(project)) if !project.is_empty() => PostgresAuditConfig::compose_host(project),
        _ => bail!("postgres audit store requires --db-host or --compose-project-name"),
    };
    let password = flags
        .db_password
        .clone()
        .context("postgres audit store requires --db-password")?;
    Ok(PostgresAuditConfig {
        host,
        port: flags.db_port,
        dbname: flags.db_name.clone(),
        user: flags.db_user.clone(),
        password,
    })
}

/// `None` when auditing is disabled.
pub fn build_audit_sink(flags: &CliAuditFlags) -> Result<Option<Arc<dyn CommandAuditSink>>> {
    if !flags.audit_enabled {
        tracing::info!("command audit disabled");
        return Ok(None);
    }
    let config = AuditRecorderConfig {
        max_insert_attempts: flags.audit_max_insert_attempts,
    };
    let clock = Arc::new(SystemWallClock);
    let sink: Arc<dyn CommandAuditSink> = match flags.audit_backend {
        CliAuditBackend::Postgres => {
            let connector = PostgresAuditConnector::new(postgres_audit_config_from_flags(flags)?);
            Arc::new(AuditRecorder::new(
                AuditConnectionPool::new(connector, flags.audit_pool_size),
                clock,
                config,
            ))
        }
        CliAuditBackend::Sqlite => Arc::new(AuditRecorder::new(
            AuditConnectionPool::new(
                SqliteAuditConnector::new(&flags.sqlite_path),
                flags.audit_pool_size,
            ),
            clock,
            config,
        )),
    };
    tracing::info!(
        backend = ?flags.audit_backend,
        pool_size = flags.audit_pool_size,
        max_insert_attempts = flags.audit_max_insert_attempts,
        "command audit enabled"
    );
    Ok(Some(sink))
}

pub fn build_runtime(cli: &WardenCli) -> Result<DiscordRuntime> {
    let deployment = deployment_config_from_cli(cli)?;
    let policy = load_policy_table_file(&cli.policy_file).with_context(|| {
        format!("failed to load policy table {}", cli.policy_file.display())
    })?;
    tracing::info!(
        commands = policy.len(),
        mode = deployment.mode.as_str(),
        "access policy loaded"
    );

    let token = cli
        .discord_token
        .clone()
        .context("--discord-token is required")?;
    let api = Arc::new(
        DiscordApiClient::new(DiscordApiConfig {
            api_base: cli.discord_api_base.clone(),
            bot_token: token,
            ..DiscordApiConfig::default()
        })
        .context("failed to build discord api client")?,
    );
    let notices: Arc<dyn NoticeSink> = Arc::new(DiscordNoticeSink::new(Arc::clone(&api)));
    let directory = Arc::new(DiscordGuildDirectory::new(
        Arc::clone(&api),
        cli.guild_id.clone(),
    ));

    let gate = Arc::new(EnvironmentGate::new(deployment.clone()));
    let evaluator = AccessEvaluator::new(
        Arc::new(policy),
        Arc::clone(&notices),
        Arc::new(DiscordPermissionResolver::new(Arc::clone(&api))),
    );
    let classifier = DispatchErrorClassifier::new(
        Arc::clone(&gate),
        Arc::clone(&notices),
        BotProfile {
            name: cli.bot_name.clone(),
            avatar_url: cli.bot_avatar_url.clone(),
        },
        Arc::new(StderrOperatorStream),
    );
    let bootstrap = BootstrapChannelEnsurer::new(deployment.clone(), directory.clone());
    let guard = Arc::new(CommandGuard::new(
        gate,
        evaluator,
        build_audit_sink(&cli.audit)?,
        classifier,
        bootstrap,
    ));

    let shutdown = Arc::new(Notify::new());
    let registry = builtin_command_registry(deployment, Arc::clone(&shutdown));
    let dispatcher = MessageDispatcher::new(
        api,
        guard,
        Arc::new(registry),
        notices,
        cli.command_prefix.clone(),
    );
    Ok(DiscordRuntime::new(
        dispatcher,
        DiscordRuntimeConfig {
            command_prefix: cli.command_prefix.clone(),
            ingress_channel_ids: cli.channel_ids.clone(),
            poll_interval_ms: cli.poll_interval_ms,
            replay_backlog: cli.replay_backlog,
            poll_once: cli.poll_once,
            ..DiscordRuntimeConfig::default()
        },
        shutdown,
    )
    .with_channel_discovery(directory))
}

pub async fn run_cli(cli: WardenCli) -> Result<()> {
    let mut runtime = build_runtime(&cli)?;
    let shutdown = runtime.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            shutdown.notify_one();
        }
    });
    runtime.run().await.context("discord runtime failed")
}
