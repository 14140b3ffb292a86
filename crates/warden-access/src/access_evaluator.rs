//! Admission decisions for command invocations.

use std::sync::Arc;

use serde::Serialize;
use warden_core::{ChannelNotice, InvocationContext, NoticeSink, PermissionResolver};

use crate::{AccessMode, PolicyTable, ADMIN_ESCAPE_COMMAND};

pub const ACCESS_DENIED_NOTICE: &str =
    "You do not have adequate permission to execute this command, incident will be reported";

const ALLOW_ADMIN_ESCAPE: &str = "allow_admin_escape";
const ALLOW_ROLE_INTERSECTION: &str = "allow_role_intersection";
const ALLOW_PERMISSION_INTERSECTION: &str = "allow_permission_intersection";
const DENY_POLICY_MISSING: &str = "deny_policy_missing";
const DENY_NO_ROLE_INTERSECTION: &str = "deny_no_role_intersection";
const DENY_NO_PERMISSION_INTERSECTION: &str = "deny_no_permission_intersection";
const DENY_PERMISSION_RESOLUTION_FAILED: &str = "deny_permission_resolution_failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Enumerates supported `AccessDecision` values.
pub enum AccessDecision {
    Allow { reason_code: String },
    Deny { reason_code: String },
}

impl AccessDecision {
    fn allow(reason_code: &str) -> Self {
        Self::Allow {
            reason_code: reason_code.to_string(),
        }
    }

    fn deny(reason_code: &str) -> Self {
        Self::Deny {
            reason_code: reason_code.to_string(),
        }
    }

    pub fn reason_code(&self) -> &str {
        match self {
            Self::Allow { reason_code } | Self::Deny { reason_code } => reason_code,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Evaluates the policy table for one invocation. Shared across concurrent
/// events; holds no mutable state.
#[derive(Clone)]
pub struct AccessEvaluator {
    policy: Arc<PolicyTable>,
    notices: Arc<dyn NoticeSink>,
    permissions: Arc<dyn PermissionResolver>,
}

impl AccessEvaluator {
    pub fn new(
        policy: Arc<PolicyTable>,
        notices: Arc<dyn NoticeSink>,
        permissions: Arc<dyn PermissionResolver>,
    ) -> Self {
        Self {
            policy,
            notices,
            permissions,
        }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Computes the decision without side effects beyond permission lookup.
    pub async fn evaluate(&self, ctx: &InvocationContext) -> AccessDecision {
        if ctx.command_name == ADMIN_ESCAPE_COMMAND {
            return AccessDecision::allow(ALLOW_ADMIN_ESCAPE);
        }
        let Some(entry) = self.policy.get(&ctx.command_name) else {
            return AccessDecision::deny(DENY_POLICY_MISSING);
        };

        match entry.mode {
            AccessMode::Role => {
                let roles = ctx.role_names();
                if entry.allowed.iter().any(|role| roles.contains(role.as_str())) {
                    AccessDecision::allow(ALLOW_ROLE_INTERSECTION)
                } else {
                    AccessDecision::deny(DENY_NO_ROLE_INTERSECTION)
                }
            }
            AccessMode::Permission => match self.permissions.effective_permissions(ctx).await {
                Ok(granted) => {
                    if entry.allowed.intersection(&granted).next().is_some() {
                        AccessDecision::allow(ALLOW_PERMISSION_INTERSECTION)
                    } else {
                        AccessDecision::deny(DENY_NO_PERMISSION_INTERSECTION)
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        command = %ctx.command_name,
                        author_id = %ctx.author_id,
                        error = %error,
                        "permission resolution failed"
                    );
                    AccessDecision::deny(DENY_PERMISSION_RESOLUTION_FAILED)
                }
            },
        }
    }

    /// Pre-execution check. A denial against a policy entry sends one notice
    /// to the originating channel and records an access-denial incident; a
    /// command with no entry is denied silently.
    pub async fn authorize(&self, ctx: &InvocationContext) -> bool {
        let decision = self.evaluate(ctx).await;
        match &decision {
            AccessDecision::Allow { reason_code } => {
                tracing::debug!(
                    command = %ctx.command_name,
                    author_id = %ctx.author_id,
                    reason_code = %reason_code,
                    "command admitted"
                );
                true
            }
            AccessDecision::Deny { reason_code } if reason_code == DENY_POLICY_MISSING => {
                tracing::warn!(
                    command = %ctx.command_name,
                    author_id = %ctx.author_id,
                    reason_code = %reason_code,
                    "command has no policy entry"
                );
                false
            }
            AccessDecision::Deny { reason_code } => {
                tracing::warn!(
                    command = %ctx.command_name,
                    author_id = %ctx.author_id,
                    channel = %ctx.channel_name,
                    reason_code = %reason_code,
                    "access denied; incident reported"
                );
                if let Err(error) = self
                    .notices
                    .send_notice(&ctx.channel_id, ChannelNotice::text(ACCESS_DENIED_NOTICE))
                    .await
                {
                    tracing::error!(
                        channel = %ctx.channel_name,
                        error = %error,
                        "failed to send access denial notice"
                    );
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use warden_core::{AuthorRole, PlatformError};

    use super::*;
    use crate::PolicyEntry;

    #[derive(Default)]
    struct RecordingNoticeSink {
        sent: Mutex<Vec<(String, ChannelNotice)>>,
    }

    impl RecordingNoticeSink {
        fn sent(&self) -> Vec<(String, ChannelNotice)> {
            self.sent.lock().expect("notice lock").clone()
        }
    }

    #[async_trait]
    impl NoticeSink for RecordingNoticeSink {
        async fn send_notice(
            &self,
            channel_id: &str,
            notice: ChannelNotice,
        ) -> Result<(), PlatformError> {
            self.sent
                .lock()
                .expect("notice lock")
                .push((channel_id.to_string(), notice));
            Ok(())
        }
    }

    struct StaticPermissions(Result<Vec<&'static str>, ()>);

    #[async_trait]
    impl PermissionResolver for StaticPermissions {
        async fn effective_permissions(
            &self,
            _ctx: &InvocationContext,
        ) -> Result<BTreeSet<String>, PlatformError> {
            match &self.0 {
                Ok(names) => Ok(names.iter().map(|name| name.to_string()).collect()),
                Err(()) => Err(PlatformError::Transport("gateway unavailable".to_string())),
            }
        }
    }

    fn entry(command: &str, mode: AccessMode, allowed: &[&str]) -> PolicyEntry {
        PolicyEntry {
            command_name: command.to_string(),
            mode,
            allowed: allowed.iter().map(|value| value.to_string()).collect(),
        }
    }

    fn context(command: &str, roles: &[&str]) -> InvocationContext {
        InvocationContext {
            author_id: "1001".to_string(),
            author_roles: roles
                .iter()
                .enumerate()
                .map(|(rank, name)| AuthorRole::new(*name, rank as i64))
                .collect(),
            channel_id: "chan-1".to_string(),
            channel_name: "general".to_string(),
            guild_id: Some("guild-1".to_string()),
            command_name: command.to_string(),
            invoked_with: command.to_string(),
            invoked_subcommand: None,
        }
    }

    fn build_evaluator(
        permissions: StaticPermissions,
    ) -> (AccessEvaluator, Arc<RecordingNoticeSink>) {
        let policy = PolicyTable::from_entries([
            entry("ban", AccessMode::Role, &["Moderator", "Admin"]),
            entry("purge", AccessMode::Permission, &["manage_messages"]),
        ])
        .expect("policy");
        let notices = Arc::new(RecordingNoticeSink::default());
        let evaluator =
            AccessEvaluator::new(Arc::new(policy), notices.clone(), Arc::new(permissions));
        (evaluator, notices)
    }

    #[tokio::test]
    async fn functional_role_mode_denies_without_intersection_and_sends_one_notice() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Ok(Vec::new())));
        assert!(!evaluator.authorize(&context("ban", &["Member"])).await);
        let sent = notices.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "chan-1");
        assert_eq!(sent[0].1, ChannelNotice::text(ACCESS_DENIED_NOTICE));
    }

    #[tokio::test]
    async fn functional_role_mode_admits_on_intersection_without_notice() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Ok(Vec::new())));
        assert!(
            evaluator
                .authorize(&context("ban", &["Moderator", "Member"]))
                .await
        );
        assert!(notices.sent().is_empty());
    }

    #[tokio::test]
    async fn functional_admin_escape_is_admitted_without_policy_entry() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Err(())));
        let decision = evaluator.evaluate(&context("shutdown", &[])).await;
        assert_eq!(decision.reason_code(), "allow_admin_escape");
        assert!(evaluator.authorize(&context("shutdown", &[])).await);
        assert!(notices.sent().is_empty());
    }

    #[tokio::test]
    async fn functional_unregistered_command_is_denied() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Ok(vec!["Administrator"])));
        let ctx = context("rolldice", &["Admin"]);
        assert_eq!(
            evaluator.evaluate(&ctx).await,
            AccessDecision::Deny {
                reason_code: "deny_policy_missing".to_string()
            }
        );
        assert!(!evaluator.authorize(&ctx).await);
        assert!(notices.sent().is_empty());
    }

    #[tokio::test]
    async fn regression_hidden_command_without_policy_entry_sends_no_notice() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Ok(Vec::new())));
        assert!(!evaluator.authorize(&context("debuginfo", &["Admin"])).await);
        assert!(!evaluator.authorize(&context("ban", &["Member"])).await);
        let sent = notices.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, ChannelNotice::text(ACCESS_DENIED_NOTICE));
    }

    #[tokio::test]
    async fn functional_permission_mode_uses_permission_intersection() {
        let (evaluator, _) = build_evaluator(StaticPermissions(Ok(vec![
            "Send Messages",
            "manage_messages",
        ])));
        assert!(evaluator.authorize(&context("purge", &[])).await);

        // A role named like the permission must not satisfy a permission-mode entry.
        let (evaluator, notices) = build_evaluator(StaticPermissions(Ok(vec!["Send Messages"])));
        assert!(
            !evaluator
                .authorize(&context("purge", &["manage_messages"]))
                .await
        );
        assert_eq!(notices.sent().len(), 1);
    }

    #[tokio::test]
    async fn regression_permission_resolution_failure_fails_closed() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Err(())));
        let ctx = context("purge", &["Admin"]);
        assert_eq!(
            evaluator.evaluate(&ctx).await.reason_code(),
            "deny_permission_resolution_failed"
        );
        assert!(!evaluator.authorize(&ctx).await);
        assert_eq!(notices.sent().len(), 1);
    }

    #[tokio::test]
    async fn integration_concurrent_authorizations_share_one_evaluator() {
        let (evaluator, notices) = build_evaluator(StaticPermissions(Ok(Vec::new())));
        let mut handles = Vec::new();
        for index in 0..16 {
            let evaluator = evaluator.clone();
            handles.push(tokio::spawn(async move {
                let roles: &[&str] = if index % 2 == 0 { &["Admin"] } else { &["Guest"] };
                evaluator.authorize(&context("ban", roles)).await
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.expect("join") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 8);
        assert_eq!(notices.sent().len(), 8);
    }
}
