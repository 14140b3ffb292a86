use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use warden_access::{
    load_policy_table_file, AccessEvaluator, DeploymentConfig, EnvironmentGate,
    ACCESS_DENIED_NOTICE,
};
use warden_audit::{
    read_sqlite_audit_records, AuditConnectionPool, AuditRecorder, AuditRecorderConfig,
    CommandAuditSink, SqliteAuditConnector,
};
use warden_core::{
    AuthorRole, ChannelNotice, FixedWallClock, GuildChannelDirectory, InvocationContext,
    NoticeSink, PermissionResolver, PlatformError,
};
use warden_dispatch::{
    BootstrapChannelEnsurer, BootstrapOutcome, BotProfile, BufferedOperatorStream, CommandGuard,
    DispatchError, DispatchErrorClassifier, ErrorDisposition,
};

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

const POLICY_JSON: &str = r#"{
  "schema_version": 1,
  "commands": {
    "ban":   { "access": "roles",       "roles": ["Moderator", "Admin"] },
    "purge": { "access": "permissions", "permissions": ["manage_messages"] },
    "ping":  { "access": "roles",       "roles": ["Member"] }
  }
}"#;

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "warden-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[derive(Default)]
struct RecordingNotices {
    sent: AsyncMutex<Vec<(String, ChannelNotice)>>,
}

#[async_trait]
impl NoticeSink for RecordingNotices {
    async fn send_notice(
        &self,
        channel_id: &str,
        notice: ChannelNotice,
    ) -> Result<(), PlatformError> {
        self.sent
            .lock()
            .await
            .push((channel_id.to_string(), notice));
        Ok(())
    }
}

struct ScriptedPermissions {
    granted: BTreeSet<String>,
}

#[async_trait]
impl PermissionResolver for ScriptedPermissions {
    async fn effective_permissions(
        &self,
        _ctx: &InvocationContext,
    ) -> Result<BTreeSet<String>, PlatformError> {
        Ok(self.granted.clone())
    }
}

#[derive(Default)]
struct ScriptedGuild {
    channels: AsyncMutex<Vec<String>>,
}

#[async_trait]
impl GuildChannelDirectory for ScriptedGuild {
    async fn primary_guild_channel_names(&self) -> Result<Vec<String>, PlatformError> {
        Ok(self.channels.lock().await.clone())
    }

    async fn create_text_channel(&self, name: &str) -> Result<(), PlatformError> {
        self.channels.lock().await.push(name.to_string());
        Ok(())
    }
}

struct Pipeline {
    guard: Arc<CommandGuard>,
    notices: Arc<RecordingNotices>,
    operator: Arc<BufferedOperatorStream>,
    guild: Arc<ScriptedGuild>,
    audit_path: PathBuf,
}

fn pipeline(workspace: &IsolatedWorkspace, deployment: DeploymentConfig) -> Pipeline {
    let policy_path = workspace.root().join("command-access.json");
    fs::write(&policy_path, POLICY_JSON).expect("write policy");
    let policy = load_policy_table_file(&policy_path).expect("load policy");
    let audit_path = workspace.root().join("audit").join("command_stats.sqlite");

    let notices = Arc::new(RecordingNotices::default());
    let operator = Arc::new(BufferedOperatorStream::default());
    let guild = Arc::new(ScriptedGuild::default());
    let gate = Arc::new(EnvironmentGate::new(deployment.clone()));
    let evaluator = AccessEvaluator::new(
        Arc::new(policy),
        notices.clone(),
        Arc::new(ScriptedPermissions {
            granted: BTreeSet::from(["manage_messages".to_string()]),
        }),
    );
    let audit: Arc<dyn CommandAuditSink> = Arc::new(AuditRecorder::new(
        AuditConnectionPool::new(SqliteAuditConnector::new(&audit_path), 3),
        Arc::new(FixedWallClock::at_unix_seconds(1_715_000_000)),
        AuditRecorderConfig::default(),
    ));
    let classifier = DispatchErrorClassifier::new(
        Arc::clone(&gate),
        notices.clone(),
        BotProfile {
            name: "wall_e".to_string(),
            avatar_url: None,
        },
        operator.clone(),
    );
    let bootstrap = BootstrapChannelEnsurer::new(deployment, guild.clone());
    Pipeline {
        guard: Arc::new(CommandGuard::new(
            gate,
            evaluator,
            Some(audit),
            classifier,
            bootstrap,
        )),
        notices,
        operator,
        guild,
        audit_path,
    }
}

fn invocation(command: &str, channel: &str, roles: &[&str]) -> InvocationContext {
    InvocationContext {
        author_id: "4242".to_string(),
        author_roles: roles
            .iter()
            .enumerate()
            .map(|(rank, name)| AuthorRole::new(*name, rank as i64 + 1))
            .collect(),
        channel_id: format!("{channel}-id"),
        channel_name: channel.to_string(),
        guild_id: Some("csss".to_string()),
        command_name: command.to_string(),
        invoked_with: command.to_string(),
        invoked_subcommand: None,
    }
}

#[tokio::test]
async fn integration_admitted_and_denied_commands_share_one_audit_trail() {
    let workspace = IsolatedWorkspace::new("admit-deny");
    let pipeline = pipeline(&workspace, DeploymentConfig::production());

    let admitted = pipeline
        .guard
        .run(&invocation("ban", "general", &["Moderator"]), || async {
            Ok(())
        })
        .await;
    assert!(admitted.completed());

    let denied = pipeline
        .guard
        .run(&invocation("ban", "general", &["Member"]), || async {
            Err(DispatchError::from(anyhow::anyhow!("denied body ran")))
        })
        .await;
    // A body that ran would surface as an operator report instead.
    assert_eq!(denied.disposition, Some(ErrorDisposition::AuthorizationProbe));

    let by_permission = pipeline
        .guard
        .run(&invocation("purge", "general", &[]), || async { Ok(()) })
        .await;
    assert!(by_permission.completed());

    for outcome in [admitted, denied, by_permission] {
        let audit = outcome.audit.expect("audit spawned");
        assert_eq!(audit.await.expect("join").reason_code(), "audit_persisted");
    }

    let rows = read_sqlite_audit_records(&pipeline.audit_path).expect("rows");
    assert_eq!(
        rows.iter().map(|row| row.epoch_time).collect::<Vec<_>>(),
        vec![1_715_000_000, 1_715_000_001, 1_715_000_002]
    );

    let sent = pipeline.notices.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "general-id");
    assert_eq!(sent[0].1.plain_text(), ACCESS_DENIED_NOTICE);
}

#[tokio::test]
async fn integration_command_without_policy_entry_is_denied_silently() {
    let workspace = IsolatedWorkspace::new("unlisted");
    let pipeline = pipeline(&workspace, DeploymentConfig::production());

    let unlisted = pipeline
        .guard
        .run(&invocation("debuginfo", "general", &["Admin"]), || async {
            Err(DispatchError::from(anyhow::anyhow!("unlisted body ran")))
        })
        .await;
    assert_eq!(
        unlisted.disposition,
        Some(ErrorDisposition::AuthorizationProbe)
    );
    unlisted.audit.expect("audit").await.expect("join");

    assert!(pipeline.notices.sent.lock().await.is_empty());
    assert!(pipeline.operator.reports().is_empty());
}

#[tokio::test]
async fn integration_unknown_commands_missing_arguments_and_failures_are_routed() {
    let workspace = IsolatedWorkspace::new("routing");
    let pipeline = pipeline(&workspace, DeploymentConfig::production());

    let suppressed = pipeline
        .guard
        .reject_unknown(&invocation("..", "general", &[]), "..")
        .await;
    assert_eq!(suppressed, ErrorDisposition::Suppressed);

    let missing = pipeline
        .guard
        .run(&invocation("ping", "general", &["Member"]), || async {
            Err(DispatchError::MissingArgument {
                parameter: "target".to_string(),
            })
        })
        .await;
    assert_eq!(
        missing.disposition,
        Some(ErrorDisposition::ArgumentNotice {
            parameter: "target".to_string()
        })
    );

    let failed = pipeline
        .guard
        .run(&invocation("ping", "general", &["Member"]), || async {
            Err(DispatchError::from(anyhow::anyhow!("upstream timed out")))
        })
        .await;
    assert_eq!(failed.disposition, Some(ErrorDisposition::OperatorReport));

    let reports = pipeline.operator.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("upstream timed out"));
    let sent = pipeline.notices.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.plain_text(), "Missing argument: target");
}

#[tokio::test]
async fn integration_isolated_test_deployment_is_confined_to_branch_channel() {
    let workspace = IsolatedWorkspace::new("isolated");
    let pipeline = pipeline(&workspace, DeploymentConfig::isolated_test("Audit-Retry"));

    let first = pipeline.guard.on_ready().await.expect("ready");
    let second = pipeline.guard.on_ready().await.expect("ready again");
    assert_eq!(
        first,
        BootstrapOutcome::Created {
            channel_name: "audit-retry".to_string()
        }
    );
    assert!(matches!(second, BootstrapOutcome::AlreadyPresent { .. }));
    assert_eq!(pipeline.guild.channels.lock().await.len(), 1);

    let elsewhere = pipeline
        .guard
        .run(&invocation("ping", "general", &["Member"]), || async {
            Ok(())
        })
        .await;
    assert_eq!(elsewhere.disposition, Some(ErrorDisposition::OutOfScope));
    assert!(elsewhere.audit.is_none());

    let here = pipeline
        .guard
        .run(&invocation("ping", "Audit-Retry", &["Member"]), || async {
            Ok(())
        })
        .await;
    assert!(here.completed());
    here.audit.expect("audit").await.expect("join");

    let rows = read_sqlite_audit_records(&pipeline.audit_path).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].channel_name, "Audit-Retry");
    assert!(pipeline.notices.sent.lock().await.is_empty());
}

#[tokio::test]
async fn integration_concurrent_invocations_in_one_second_keep_every_row() {
    let workspace = IsolatedWorkspace::new("concurrent");
    let pipeline = pipeline(&workspace, DeploymentConfig::production());

    let mut handles = Vec::new();
    for index in 0..20 {
        let guard = Arc::clone(&pipeline.guard);
        handles.push(tokio::spawn(async move {
            let ctx = invocation("ping", &format!("room-{index}"), &["Member"]);
            let outcome = guard.run(&ctx, || async { Ok(()) }).await;
            outcome.audit.expect("audit").await.expect("join")
        }));
    }
    for handle in handles {
        assert_eq!(
            handle.await.expect("task").reason_code(),
            "audit_persisted"
        );
    }

    let rows = read_sqlite_audit_records(&pipeline.audit_path).expect("rows");
    assert_eq!(rows.len(), 20);
    let keys = rows.iter().map(|row| row.epoch_time).collect::<BTreeSet<_>>();
    assert_eq!(keys, (1_715_000_000..1_715_000_020).collect::<BTreeSet<_>>());
}
