use serde::{Deserialize, Serialize};
use warden_core::InvocationContext;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `DeploymentMode` values.
pub enum DeploymentMode {
    #[default]
    Production,
    /// One bot instance per branch, confined to the channel named after it.
    IsolatedTest,
}

impl DeploymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::IsolatedTest => "isolated_test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeploymentConfig {
    pub mode: DeploymentMode,
    pub branch_name: String,
}

impl DeploymentConfig {
    pub fn production() -> Self {
        Self::default()
    }

    pub fn isolated_test(branch_name: impl Into<String>) -> Self {
        Self {
            mode: DeploymentMode::IsolatedTest,
            branch_name: branch_name.into(),
        }
    }

    pub fn is_isolated_test(&self) -> bool {
        self.mode == DeploymentMode::IsolatedTest
    }

    /// Name of the channel an isolated-test instance owns.
    pub fn branch_channel_name(&self) -> String {
        self.branch_name.to_lowercase()
    }

    /// True when commands posted in `channel_name` are this instance's to
    /// handle: every guild channel in production, only the branch channel
    /// (case-insensitive) in isolated-test mode.
    pub fn owns_channel(&self, channel_name: &str) -> bool {
        !self.is_isolated_test() || channel_name.to_lowercase() == self.branch_channel_name()
    }
}

/// Restricts processing to the branch channel in isolated-test deployments.
#[derive(Debug, Clone)]
pub struct EnvironmentGate {
    config: DeploymentConfig,
}

impl EnvironmentGate {
    pub fn new(config: DeploymentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn allows(&self, ctx: &InvocationContext) -> bool {
        !ctx.guild_present() || self.config.owns_channel(&ctx.channel_name)
    }
}
