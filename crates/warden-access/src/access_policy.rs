use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ACCESS_POLICY_SCHEMA_VERSION: u32 = 1;

/// Command that is admitted regardless of the policy table so an operator can
/// always stop the bot.
pub const ADMIN_ESCAPE_COMMAND: &str = "shutdown";

#[derive(Debug, Error)]
pub enum PolicyTableError {
    #[error("failed to read access policy {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse access policy {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported access policy schema_version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },
    #[error("access policy contains an empty command name")]
    EmptyCommandName,
    #[error("access policy for command '{command}' has an empty allowed set")]
    EmptyAllowedSet { command: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `AccessMode` values.
pub enum AccessMode {
    Role,
    Permission,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Permission => "permission",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub command_name: String,
    pub mode: AccessMode,
    pub allowed: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "access", rename_all = "snake_case")]
enum PolicyEntryFile {
    Roles { roles: Vec<String> },
    Permissions { permissions: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct PolicyTableFile {
    schema_version: u32,
    #[serde(default)]
    commands: BTreeMap<String, PolicyEntryFile>,
}

/// Read-only mapping from command name to its access requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    entries: BTreeMap<String, PolicyEntry>,
}

impl PolicyTable {
    pub fn from_entries(
        entries: impl IntoIterator<Item = PolicyEntry>,
    ) -> Result<Self, PolicyTableError> {
        let mut table = BTreeMap::new();
        for entry in entries {
            validate_policy_entry(&entry)?;
            table.insert(entry.command_name.clone(), entry);
        }
        Ok(Self { entries: table })
    }

    pub fn get(&self, command_name: &str) -> Option<&PolicyEntry> {
        self.entries.get(command_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn validate_policy_entry(entry: &PolicyEntry) -> Result<(), PolicyTableError> {
    if entry.command_name.trim().is_empty() {
        return Err(PolicyTableError::EmptyCommandName);
    }
    if entry.allowed.is_empty() {
        return Err(PolicyTableError::EmptyAllowedSet {
            command: entry.command_name.clone(),
        });
    }
    Ok(())
}

/// Loads the policy table from a JSON file. A missing file yields an empty
/// table, which denies everything except [`ADMIN_ESCAPE_COMMAND`].
pub fn load_policy_table_file(path: &Path) -> Result<PolicyTable, PolicyTableError> {
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "access policy file missing; every command except shutdown will be denied"
        );
        return Ok(PolicyTable::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| PolicyTableError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let table = parse_policy_table(&raw).map_err(|error| match error {
        PolicyTableError::Parse { source, .. } => PolicyTableError::Parse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    tracing::info!(
        path = %path.display(),
        commands = table.len(),
        "loaded access policy table"
    );
    Ok(table)
}

pub fn parse_policy_table(raw: &str) -> Result<PolicyTable, PolicyTableError> {
    let parsed =
        serde_json::from_str::<PolicyTableFile>(raw).map_err(|source| PolicyTableError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
    if parsed.schema_version != ACCESS_POLICY_SCHEMA_VERSION {
        return Err(PolicyTableError::UnsupportedSchema {
            found: parsed.schema_version,
            expected: ACCESS_POLICY_SCHEMA_VERSION,
        });
    }
    PolicyTable::from_entries(parsed.commands.into_iter().map(|(command_name, entry)| {
        let (mode, allowed) = match entry {
            PolicyEntryFile::Roles { roles } => (AccessMode::Role, roles),
            PolicyEntryFile::Permissions { permissions } => (AccessMode::Permission, permissions),
        };
        PolicyEntry {
            command_name: command_name.trim().to_string(),
            mode,
            allowed: allowed
                .into_iter()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }))
}
