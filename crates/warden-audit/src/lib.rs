//! Command audit trail.
//!
//! Every dispatched command becomes one `CommandStats` row keyed by the epoch
//! second it ran in. Writers resolve key collisions by advancing the key and
//! retrying; audit failures are logged and never reach the command pipeline.

mod audit_pool;
mod audit_record;
mod audit_recorder;
mod audit_store;
mod postgres_store;
mod sqlite_store;

pub use audit_pool::{AuditConnectionPool, PooledAuditConnection};
pub use audit_record::{sanitize_audit_field, AuditRecord, AUDIT_QUOTE_ESCAPE_TOKEN};
pub use audit_recorder::{
    spawn_command_audit, AuditOutcome, AuditRecorder, AuditRecorderConfig, CommandAuditSink,
    DEFAULT_AUDIT_MAX_INSERT_ATTEMPTS,
};
pub use audit_store::{
    insert_with_collision_retry, AuditConnection, AuditConnector, AuditInsertReport,
    AuditStoreError, AuditStoreResult,
};
pub use postgres_store::{PostgresAuditConfig, PostgresAuditConnector};
pub use sqlite_store::{read_sqlite_audit_records, SqliteAuditConnector};
