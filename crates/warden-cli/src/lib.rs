//! Command-line configuration and startup wiring for the `warden` binary.

pub mod cli_args;
pub mod cli_types;
pub mod startup;

pub use cli_args::{CliAuditFlags, WardenCli};
pub use cli_types::*;
pub use startup::*;
