use thiserror::Error;

use crate::AuditRecord;

/// Result type for audit store operations.
pub type AuditStoreResult<T> = Result<T, AuditStoreError>;

/// Errors returned by audit connectors and the recorder.
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("failed to connect to audit store: {0}")]
    Connect(String),
    #[error("audit key {epoch_time} already exists")]
    KeyCollision { epoch_time: i64 },
    #[error("audit insert gave up after {attempts} attempts (last key {last_epoch_time})")]
    RetriesExhausted { last_epoch_time: i64, attempts: usize },
    #[error("audit write failed: {0}")]
    Write(String),
    #[error("audit connection already released")]
    ConnectionReleased,
    #[error("audit connection pool is closed")]
    PoolClosed,
}

/// A live connection able to insert one audit row.
///
/// Implementations must report a primary-key or uniqueness violation as
/// [`AuditStoreError::KeyCollision`] and anything else as another variant.
pub trait AuditConnection: Send + 'static {
    fn insert_record(&mut self, record: &AuditRecord) -> AuditStoreResult<()>;
}

/// Opens connections for the pool. `connect` blocks and is always called from
/// the blocking thread pool.
pub trait AuditConnector: Send + Sync + 'static {
    type Connection: AuditConnection;

    fn connect(&self) -> AuditStoreResult<Self::Connection>;

    /// Human-readable target, safe for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditInsertReport {
    pub epoch_time: i64,
    pub attempts: usize,
}

/// Inserts `record`, advancing its key by one second after each collision,
/// for at most `max_attempts` tries.
pub fn insert_with_collision_retry<T>(
    connection: &mut T,
    mut record: AuditRecord,
    max_attempts: usize,
) -> AuditStoreResult<AuditInsertReport>
where
    T: AuditConnection + ?Sized,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match connection.insert_record(&record) {
            Ok(()) => {
                return Ok(AuditInsertReport {
                    epoch_time: record.epoch_time,
                    attempts: attempt,
                })
            }
            Err(AuditStoreError::KeyCollision { epoch_time }) => {
                if attempt == max_attempts {
                    return Err(AuditStoreError::RetriesExhausted {
                        last_epoch_time: epoch_time,
                        attempts: max_attempts,
                    });
                }
                record.epoch_time = epoch_time.saturating_add(1);
                tracing::debug!(
                    collided = epoch_time,
                    next_epoch_time = record.epoch_time,
                    attempt,
                    "audit key collision; retrying with advanced key"
                );
            }
            Err(error) => return Err(error),
        }
    }
    Err(AuditStoreError::RetriesExhausted {
        last_epoch_time: record.epoch_time,
        attempts: max_attempts,
    })
}
