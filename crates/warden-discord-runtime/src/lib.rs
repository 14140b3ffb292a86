//! Discord host for the command access-control and audit layer.
//!
//! Talks to the Discord REST API directly: polls the configured channels for
//! prefixed commands, resolves roles and channel permissions, and posts
//! notices back. Every invocation runs through `warden_dispatch::CommandGuard`.

pub mod command_router;
pub mod discord_api;
pub mod discord_collaborators;
pub mod discord_permissions;
pub mod discord_runtime;

pub use command_router::*;
pub use discord_api::*;
pub use discord_collaborators::*;
pub use discord_permissions::*;
pub use discord_runtime::*;
