//! SQLite-backed audit connector for single-host deployments and tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{ffi, params, Connection, ErrorCode};

use crate::{AuditConnection, AuditConnector, AuditRecord, AuditStoreError, AuditStoreResult};

const SQLITE_AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS CommandStats (
    epoch_time INTEGER PRIMARY KEY,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    day INTEGER NOT NULL,
    hour INTEGER NOT NULL,
    channel_name TEXT NOT NULL,
    command TEXT NOT NULL,
    invoked_with TEXT NOT NULL,
    invoked_subcommand TEXT NULL
);
"#;

#[derive(Debug, Clone)]
pub struct SqliteAuditConnector {
    db_path: PathBuf,
}

impl SqliteAuditConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            db_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn open_audit_sqlite_connection(path: &Path) -> AuditStoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| {
                AuditStoreError::Connect(format!(
                    "failed to create audit directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
    }
    let connection = Connection::open(path).map_err(|error| {
        AuditStoreError::Connect(format!(
            "failed to open sqlite audit store {}: {error}",
            path.display()
        ))
    })?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .and_then(|_| {
            connection.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            )
        })
        .and_then(|_| connection.execute_batch(SQLITE_AUDIT_SCHEMA))
        .map_err(|error| {
            AuditStoreError::Connect(format!(
                "failed to initialize sqlite audit schema {}: {error}",
                path.display()
            ))
        })?;
    Ok(connection)
}

impl AuditConnector for SqliteAuditConnector {
    type Connection = SqliteAuditConnection;

    fn connect(&self) -> AuditStoreResult<SqliteAuditConnection> {
        Ok(SqliteAuditConnection {
            connection: open_audit_sqlite_connection(&self.db_path)?,
        })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }
}

pub struct SqliteAuditConnection {
    connection: Connection,
}

impl AuditConnection for SqliteAuditConnection {
    fn insert_record(&mut self, record: &AuditRecord) -> AuditStoreResult<()> {
        self.connection
            .execute(
                r#"
                INSERT INTO CommandStats (
                    epoch_time, year, month, day, hour,
                    channel_name, command, invoked_with, invoked_subcommand
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    record.epoch_time,
                    record.year,
                    record.month,
                    record.day,
                    record.hour,
                    record.channel_name,
                    record.command,
                    record.invoked_with,
                    record.invoked_subcommand,
                ],
            )
            .map(|_| ())
            .map_err(|error| map_sqlite_insert_error(error, record.epoch_time))
    }
}

fn map_sqlite_insert_error(error: rusqlite::Error, epoch_time: i64) -> AuditStoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error {
        if failure.code == ErrorCode::ConstraintViolation
            && matches!(
                failure.extended_code,
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
            )
        {
            return AuditStoreError::KeyCollision { epoch_time };
        }
    }
    AuditStoreError::Write(error.to_string())
}

/// Reads every stored row ordered by key.
pub fn read_sqlite_audit_records(path: &Path) -> AuditStoreResult<Vec<AuditRecord>> {
    let connection = open_audit_sqlite_connection(path)?;
    let mut statement = connection
        .prepare(
            r#"
            SELECT epoch_time, year, month, day, hour,
                   channel_name, command, invoked_with, invoked_subcommand
            FROM CommandStats
            ORDER BY epoch_time ASC
            "#,
        )
        .map_err(|error| AuditStoreError::Write(error.to_string()))?;
    let rows = statement
        .query_map([], |row| {
            Ok(AuditRecord {
                epoch_time: row.get(0)?,
                year: row.get(1)?,
                month: row.get(2)?,
                day: row.get(3)?,
                hour: row.get(4)?,
                channel_name: row.get(5)?,
                command: row.get(6)?,
                invoked_with: row.get(7)?,
                invoked_subcommand: row.get(8)?,
            })
        })
        .map_err(|error| AuditStoreError::Write(error.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|error| AuditStoreError::Write(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert_with_collision_retry;

    fn record(epoch_time: i64, command: &str) -> AuditRecord {
        AuditRecord {
            epoch_time,
            year: 2024,
            month: 5,
            day: 17,
            hour: 9,
            channel_name: "general".to_string(),
            command: command.to_string(),
            invoked_with: command.to_string(),
            invoked_subcommand: None,
        }
    }

    #[test]
    fn functional_duplicate_key_maps_to_collision() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let connector = SqliteAuditConnector::new(tempdir.path().join("audit.sqlite"));
        let mut connection = connector.connect().expect("connect");
        connection.insert_record(&record(10, "ping")).expect("first");
        let error = connection
            .insert_record(&record(10, "pong"))
            .expect_err("duplicate key");
        assert!(matches!(
            error,
            AuditStoreError::KeyCollision { epoch_time: 10 }
        ));
    }

    #[test]
    fn integration_two_connections_resolve_same_second_collision() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested").join("audit.sqlite");
        let connector = SqliteAuditConnector::new(&path);
        let mut first = connector.connect().expect("first connection");
        let mut second = connector.connect().expect("second connection");

        let a = insert_with_collision_retry(&mut first, record(500, "ping"), 8).expect("a");
        let b = insert_with_collision_retry(&mut second, record(500, "roll"), 8).expect("b");
        assert_eq!((a.epoch_time, a.attempts), (500, 1));
        assert_eq!((b.epoch_time, b.attempts), (501, 2));

        let stored = read_sqlite_audit_records(&path).expect("read back");
        assert_eq!(
            stored
                .iter()
                .map(|row| (row.epoch_time, row.command.as_str()))
                .collect::<Vec<_>>(),
            vec![(500, "ping"), (501, "roll")]
        );
    }

    #[test]
    fn functional_quoted_fields_and_null_subcommand_round_trip() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("audit.sqlite");
        let connector = SqliteAuditConnector::new(&path);
        let mut connection = connector.connect().expect("connect");
        let mut row = record(42, "it[single_quote]s");
        row.invoked_subcommand = Some("add".to_string());
        connection.insert_record(&row).expect("insert");
        connection.insert_record(&record(43, "ping")).expect("insert");

        let stored = read_sqlite_audit_records(&path).expect("read");
        assert_eq!(stored[0], row);
        assert_eq!(stored[1].invoked_subcommand, None);
    }
}
