//! Routing of dispatch failures to the user, the operator, or nowhere.

use std::error::Error as _;
use std::sync::{Arc, Mutex};

use warden_access::EnvironmentGate;
use warden_core::{ChannelNotice, EmbedNotice, InvocationContext, NoticeSink};

use crate::DispatchError;

/// Author shown on embed notices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BotProfile {
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Operator-facing error output. Never shown to chat users.
pub trait OperatorErrorStream: Send + Sync {
    fn report(&self, rendered: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StderrOperatorStream;

impl OperatorErrorStream for StderrOperatorStream {
    fn report(&self, rendered: &str) {
        eprintln!("{rendered}");
    }
}

/// Keeps reports in memory; used by tests and by operator tooling that wants
/// to inspect recent failures.
#[derive(Debug, Default)]
pub struct BufferedOperatorStream {
    reports: Mutex<Vec<String>>,
}

impl BufferedOperatorStream {
    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl OperatorErrorStream for BufferedOperatorStream {
    fn report(&self, rendered: &str) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(rendered.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `ErrorDisposition` values.
pub enum ErrorDisposition {
    /// The environment gate is closed for this context; nothing was done.
    OutOfScope,
    ArgumentNotice { parameter: String },
    Suppressed,
    AuthorizationProbe,
    OperatorReport,
}

pub struct DispatchErrorClassifier {
    gate: Arc<EnvironmentGate>,
    notices: Arc<dyn NoticeSink>,
    profile: BotProfile,
    operator: Arc<dyn OperatorErrorStream>,
}

impl DispatchErrorClassifier {
    pub fn new(
        gate: Arc<EnvironmentGate>,
        notices: Arc<dyn NoticeSink>,
        profile: BotProfile,
        operator: Arc<dyn OperatorErrorStream>,
    ) -> Self {
        Self {
            gate,
            notices,
            profile,
            operator,
        }
    }

    pub async fn classify(
        &self,
        ctx: &InvocationContext,
        error: &DispatchError,
    ) -> ErrorDisposition {
        if !self.gate.allows(ctx) {
            return ErrorDisposition::OutOfScope;
        }

        if let DispatchError::MissingArgument { parameter } = error {
            tracing::error!(
                command = %ctx.command_name,
                parameter = %parameter,
                "missing argument"
            );
            let notice = ChannelNotice::Embed(EmbedNotice {
                author_name: self.profile.name.clone(),
                author_avatar_url: self.profile.avatar_url.clone(),
                description: format!("Missing argument: {parameter}"),
            });
            if let Err(send_error) = self.notices.send_notice(&ctx.channel_id, notice).await {
                tracing::error!(
                    channel = %ctx.channel_name,
                    error = %send_error,
                    "failed to send missing argument notice"
                );
            }
            return ErrorDisposition::ArgumentNotice {
                parameter: parameter.clone(),
            };
        }

        if error.is_suppressed_default() {
            return ErrorDisposition::Suppressed;
        }

        if let DispatchError::CheckFailure { command } = error {
            tracing::warn!(
                author_id = %ctx.author_id,
                command = %command,
                "user probably tried to access a command they are not supposed to"
            );
            return ErrorDisposition::AuthorizationProbe;
        }

        tracing::error!(
            command = %ctx.command_name,
            kind = error.kind(),
            error = %error,
            "unhandled dispatch error"
        );
        self.operator.report(&render_operator_report(ctx, error));
        ErrorDisposition::OperatorReport
    }
}

/// Renders the error, its cause chain, and a captured backtrace if any.
pub fn render_operator_report(ctx: &InvocationContext, error: &DispatchError) -> String {
    let mut rendered = format!(
        "Ignoring exception in command {}:\n{}: {}",
        ctx.command_name,
        error.kind(),
        error
    );
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(&format!("\nCaused by: {cause}"));
        source = cause.source();
    }
    if let DispatchError::Unhandled(inner) = error {
        let backtrace = inner.backtrace();
        if matches!(
            backtrace.status(),
            std::backtrace::BacktraceStatus::Captured
        ) {
            rendered.push_str(&format!("\nStack backtrace:\n{backtrace}"));
        }
    }
    rendered
}
