//! Per-event invocation context handed to every gate and handler.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A role held by the invoking member. `rank` is the platform hierarchy
/// position; admission never depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRole {
    pub name: String,
    pub rank: i64,
}

impl AuthorRole {
    pub fn new(name: impl Into<String>, rank: i64) -> Self {
        Self {
            name: name.into(),
            rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Snapshot of one command invocation as delivered by the host platform.
pub struct InvocationContext {
    pub author_id: String,
    pub author_roles: Vec<AuthorRole>,
    pub channel_id: String,
    pub channel_name: String,
    /// `None` for direct messages.
    pub guild_id: Option<String>,
    pub command_name: String,
    pub invoked_with: String,
    pub invoked_subcommand: Option<String>,
}

impl InvocationContext {
    pub fn guild_present(&self) -> bool {
        self.guild_id.is_some()
    }

    pub fn role_names(&self) -> BTreeSet<&str> {
        self.author_roles
            .iter()
            .map(|role| role.name.as_str())
            .collect()
    }
}
