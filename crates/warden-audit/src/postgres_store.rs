//! PostgreSQL-backed audit connector.

use postgres::error::SqlState;
use postgres::{Client, NoTls};

use crate::{AuditConnection, AuditConnector, AuditRecord, AuditStoreError, AuditStoreResult};

const POSTGRES_AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS CommandStats (
    epoch_time BIGINT PRIMARY KEY,
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresAuditConfig {
    pub host: String,
    pub port: Option<u16>,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl PostgresAuditConfig {
    /// Host name used by compose deployments: `<project>_wall_e_db`.
    pub fn compose_host(compose_project_name: &str) -> String {
        format!("{}_wall_e_db", compose_project_name.trim())
    }

    /// libpq-style connection string including the password.
    pub fn connection_string(&self) -> String {
        format!(
            "{} password='{}'",
            self.connection_string_redacted_base(),
            quote_conninfo_value(&self.password)
        )
    }

    /// Connection string with the password removed, safe to log.
    pub fn connection_string_redacted(&self) -> String {
        format!("{} password='***'", self.connection_string_redacted_base())
    }

    fn connection_string_redacted_base(&self) -> String {
        let mut rendered = format!(
            "dbname='{}' user='{}' host='{}'",
            quote_conninfo_value(&self.dbname),
            quote_conninfo_value(&self.user),
            quote_conninfo_value(&self.host)
        );
        if let Some(port) = self.port {
            rendered.push_str(&format!(" port='{port}'"));
        }
        rendered
    }
}

fn quote_conninfo_value(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Debug, Clone)]
pub struct PostgresAuditConnector {
    config: PostgresAuditConfig,
}

impl PostgresAuditConnector {
    pub fn new(config: PostgresAuditConfig) -> Self {
        Self { config }
    }
}

impl AuditConnector for PostgresAuditConnector {
    type Connection = PostgresAuditConnection;

    fn connect(&self) -> AuditStoreResult<PostgresAuditConnection> {
        tracing::info!(
            connection = %self.config.connection_string_redacted(),
            "opening postgres audit connection"
        );
        let mut client = Client::connect(&self.config.connection_string(), NoTls)
            .map_err(|error| AuditStoreError::Connect(error.to_string()))?;
        client
            .batch_execute(POSTGRES_AUDIT_SCHEMA)
            .map_err(|error| {
                AuditStoreError::Connect(format!("failed to initialize audit schema: {error}"))
            })?;
        Ok(PostgresAuditConnection { client })
    }

    fn describe(&self) -> String {
        self.config.connection_string_redacted()
    }
}

/// Statements run outside explicit transactions, so each insert autocommits.
pub struct PostgresAuditConnection {
    client: Client,
}

impl AuditConnection for PostgresAuditConnection {
    fn insert_record(&mut self, record: &AuditRecord) -> AuditStoreResult<()> {
        self.client
            .execute(
                r#"
                INSERT INTO CommandStats (
                    epoch_time, year, month, day, hour,
                    channel_name, command, invoked_with, invoked_subcommand
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
                &[
                    &record.epoch_time,
                    &record.year,
                    &record.month,
                    &record.day,
                    &record.hour,
                    &record.channel_name,
                    &record.command,
                    &record.invoked_with,
                    &record.invoked_subcommand,
                ],
            )
            .map(|_| ())
            .map_err(|error| {
                if error.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    AuditStoreError::KeyCollision {
                        epoch_time: record.epoch_time,
                    }
                } else {
                    AuditStoreError::Write(error.to_string())
                }
            })
    }
}
