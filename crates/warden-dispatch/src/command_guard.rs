//! Per-invocation pipeline wiring: audit trigger, pre-execution checks, the
//! command body, and error routing.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use warden_access::{AccessEvaluator, DeploymentConfig, EnvironmentGate};
use warden_audit::{spawn_command_audit, AuditOutcome, CommandAuditSink};
use warden_core::{InvocationContext, PlatformError};

use crate::{
    BootstrapChannelEnsurer, BootstrapOutcome, DispatchError, DispatchErrorClassifier,
    ErrorDisposition,
};

/// Result of one guarded command run.
#[derive(Debug)]
pub struct CommandRunOutcome {
    /// `None` when the body completed.
    pub disposition: Option<ErrorDisposition>,
    /// Background audit write, when auditing is enabled and the gate is open.
    pub audit: Option<JoinHandle<AuditOutcome>>,
}

impl CommandRunOutcome {
    pub fn completed(&self) -> bool {
        self.disposition.is_none()
    }
}

pub struct CommandGuard {
    gate: Arc<EnvironmentGate>,
    evaluator: AccessEvaluator,
    audit: Option<Arc<dyn CommandAuditSink>>,
    classifier: DispatchErrorClassifier,
    bootstrap: BootstrapChannelEnsurer,
}

impl CommandGuard {
    pub fn new(
        gate: Arc<EnvironmentGate>,
        evaluator: AccessEvaluator,
        audit: Option<Arc<dyn CommandAuditSink>>,
        classifier: DispatchErrorClassifier,
        bootstrap: BootstrapChannelEnsurer,
    ) -> Self {
        Self {
            gate,
            evaluator,
            audit,
            classifier,
            bootstrap,
        }
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        self.gate.config()
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit.is_some()
    }

    pub fn check_environment(&self, ctx: &InvocationContext) -> bool {
        self.gate.allows(ctx)
    }

    pub async fn check_privilege(&self, ctx: &InvocationContext) -> bool {
        self.evaluator.authorize(ctx).await
    }

    /// Both global checks; the environment gate runs first so out-of-scope
    /// invocations never reach the evaluator or its denial notice.
    pub async fn pre_dispatch_checks(&self, ctx: &InvocationContext) -> Result<(), DispatchError> {
        if !self.check_environment(ctx) || !self.check_privilege(ctx).await {
            return Err(DispatchError::CheckFailure {
                command: ctx.command_name.clone(),
            });
        }
        Ok(())
    }

    /// Successful-dispatch hook. Returns the spawned audit task, if any.
    pub fn on_command(&self, ctx: &InvocationContext) -> Option<JoinHandle<AuditOutcome>> {
        if !self.check_environment(ctx) {
            return None;
        }
        let sink = self.audit.as_ref()?;
        Some(spawn_command_audit(Arc::clone(sink), ctx.clone()))
    }

    pub async fn on_command_error(
        &self,
        ctx: &InvocationContext,
        error: &DispatchError,
    ) -> ErrorDisposition {
        self.classifier.classify(ctx, error).await
    }

    pub async fn on_ready(&self) -> Result<BootstrapOutcome, PlatformError> {
        self.bootstrap.ensure().await
    }

    /// Runs a resolved command: audit trigger, global checks, then `body`.
    /// Any failure is routed through the classifier.
    pub async fn run<F, Fut>(&self, ctx: &InvocationContext, body: F) -> CommandRunOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DispatchError>>,
    {
        let audit = self.on_command(ctx);
        let result = match self.pre_dispatch_checks(ctx).await {
            Ok(()) => body().await,
            Err(error) => Err(error),
        };
        let disposition = match result {
            Ok(()) => None,
            Err(error) => Some(self.on_command_error(ctx, &error).await),
        };
        CommandRunOutcome { disposition, audit }
    }

    /// Routes an unknown-command failure; there is no resolved command to
    /// audit or check.
    pub async fn reject_unknown(&self, ctx: &InvocationContext, name: &str) -> ErrorDisposition {
        let error = DispatchError::CommandNotFound {
            name: name.to_string(),
        };
        self.on_command_error(ctx, &error).await
    }
}
