use clap::ValueEnum;

use warden_access::DeploymentMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliEnvironment {
    Production,
    /// Isolated-test deployment bound to one branch channel.
    Test,
}

impl From<CliEnvironment> for DeploymentMode {
    fn from(value: CliEnvironment) -> Self {
        match value {
            CliEnvironment::Production => DeploymentMode::Production,
            CliEnvironment::Test => DeploymentMode::IsolatedTest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliAuditBackend {
    Postgres,
    Sqlite,
}
