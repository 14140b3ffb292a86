use std::sync::Arc;

use tokio::sync::Mutex;
use warden_access::DeploymentConfig;
use warden_core::{GuildChannelDirectory, PlatformError};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `BootstrapOutcome` values.
pub enum BootstrapOutcome {
    NotIsolatedTest,
    AlreadyPresent { channel_name: String },
    Created { channel_name: String },
}

/// Creates the branch channel an isolated-test instance listens in.
pub struct BootstrapChannelEnsurer {
    deployment: DeploymentConfig,
    directory: Arc<dyn GuildChannelDirectory>,
    // Serializes overlapping ready events so a reconnect cannot race a create.
    in_flight: Mutex<()>,
}

impl BootstrapChannelEnsurer {
    pub fn new(deployment: DeploymentConfig, directory: Arc<dyn GuildChannelDirectory>) -> Self {
        Self {
            deployment,
            directory,
            in_flight: Mutex::new(()),
        }
    }

    /// Logs the primary guild's channel count in every mode; only an
    /// isolated-test deployment goes on to create its branch channel.
    pub async fn ensure(&self) -> Result<BootstrapOutcome, PlatformError> {
        let _guard = self.in_flight.lock().await;

        let existing = self.directory.primary_guild_channel_names().await?;
        tracing::info!(channels = existing.len(), "acquired primary guild channels");
        if !self.deployment.is_isolated_test() {
            return Ok(BootstrapOutcome::NotIsolatedTest);
        }

        let channel_name = self.deployment.branch_channel_name();
        if existing.iter().any(|name| *name == channel_name) {
            return Ok(BootstrapOutcome::AlreadyPresent { channel_name });
        }

        tracing::info!(channel = %channel_name, "creating branch text channel");
        self.directory.create_text_channel(&channel_name).await?;
        Ok(BootstrapOutcome::Created { channel_name })
    }
}
