use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{CalendarStamp, InvocationContext, WallClock};

use crate::{
    insert_with_collision_retry, AuditConnectionPool, AuditConnector, AuditRecord,
    AuditStoreError,
};

pub const DEFAULT_AUDIT_MAX_INSERT_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRecorderConfig {
    /// Upper bound on insert attempts per event, including the first one.
    pub max_insert_attempts: usize,
}

impl Default for AuditRecorderConfig {
    fn default() -> Self {
        Self {
            max_insert_attempts: DEFAULT_AUDIT_MAX_INSERT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `AuditOutcome` values.
pub enum AuditOutcome {
    Persisted { epoch_time: i64, attempts: usize },
    ConnectionFailed { error: String },
    RetriesExhausted { last_epoch_time: i64, attempts: usize },
    WriteFailed { error: String },
}

impl AuditOutcome {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Persisted { .. } => "audit_persisted",
            Self::ConnectionFailed { .. } => "audit_connection_failed",
            Self::RetriesExhausted { .. } => "audit_retries_exhausted",
            Self::WriteFailed { .. } => "audit_write_failed",
        }
    }
}

/// Destination for per-command audit rows. Implementations never fail the
/// caller; problems are reported through the returned outcome and logs.
#[async_trait]
pub trait CommandAuditSink: Send + Sync {
    async fn record(&self, ctx: &InvocationContext) -> AuditOutcome;
}

/// Writes one audit row per dispatched command through a bounded pool.
pub struct AuditRecorder<C: AuditConnector> {
    pool: AuditConnectionPool<C>,
    clock: Arc<dyn WallClock>,
    config: AuditRecorderConfig,
}

impl<C: AuditConnector> AuditRecorder<C> {
    pub fn new(
        pool: AuditConnectionPool<C>,
        clock: Arc<dyn WallClock>,
        config: AuditRecorderConfig,
    ) -> Self {
        Self {
            pool,
            clock,
            config,
        }
    }

    pub fn pool(&self) -> &AuditConnectionPool<C> {
        &self.pool
    }

    async fn write(&self, record: AuditRecord) -> AuditOutcome {
        let mut pooled = match self.pool.acquire().await {
            Ok(pooled) => pooled,
            Err(error) => {
                tracing::error!(
                    store = %self.pool.describe(),
                    command = %record.command,
                    error = %error,
                    "audit store connection failed; dropping audit record"
                );
                return AuditOutcome::ConnectionFailed {
                    error: error.to_string(),
                };
            }
        };

        let max_attempts = self.config.max_insert_attempts;
        let joined = tokio::task::spawn_blocking(move || {
            let result = pooled.connection_mut().and_then(|connection| {
                insert_with_collision_retry(connection, record, max_attempts)
            });
            if matches!(result, Err(AuditStoreError::Write(_))) {
                pooled.discard();
            }
            result
        })
        .await;

        match joined {
            Ok(Ok(report)) => {
                tracing::info!(
                    epoch_time = report.epoch_time,
                    attempts = report.attempts,
                    "audit record persisted"
                );
                AuditOutcome::Persisted {
                    epoch_time: report.epoch_time,
                    attempts: report.attempts,
                }
            }
            Ok(Err(AuditStoreError::RetriesExhausted {
                last_epoch_time,
                attempts,
            })) => {
                tracing::error!(
                    last_epoch_time,
                    attempts,
                    "audit insert retries exhausted; dropping audit record"
                );
                AuditOutcome::RetriesExhausted {
                    last_epoch_time,
                    attempts,
                }
            }
            Ok(Err(error)) => {
                tracing::error!(error = %error, "audit insert failed");
                AuditOutcome::WriteFailed {
                    error: error.to_string(),
                }
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "audit insert task failed");
                AuditOutcome::WriteFailed {
                    error: join_error.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl<C: AuditConnector> CommandAuditSink for AuditRecorder<C> {
    async fn record(&self, ctx: &InvocationContext) -> AuditOutcome {
        let stamp = CalendarStamp::now(self.clock.as_ref());
        let record = AuditRecord::from_invocation(ctx, stamp);
        tracing::debug!(
            command = %record.command,
            channel = %record.channel_name,
            epoch_time = record.epoch_time,
            "recording command audit"
        );
        self.write(record).await
    }
}

/// Runs `sink.record` on its own task so the command pipeline never waits on
/// the audit store.
pub fn spawn_command_audit(
    sink: Arc<dyn CommandAuditSink>,
    ctx: InvocationContext,
) -> tokio::task::JoinHandle<AuditOutcome> {
    tokio::spawn(async move { sink.record(&ctx).await })
}
