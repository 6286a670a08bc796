//! # pushsync
//!
//! Local HTTP service that lists recently modified files and pushes selected
//! files to a remote host over SSH (SFTP, falling back to SCP).

pub mod api;
pub mod cli;
pub mod logging;

use api::ApiService;
use cli::Cli;
use psync_core::AppConfig;
use psync_ssh::ssh::SecureChannelFactory;
use std::sync::Arc;
use tracing::info;

/// Load configuration, build the SSH connector and serve the API until the
/// listener fails.
pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    let policy = config.ssh.trust_policy()?;
    let factory = SecureChannelFactory::from_config(&config.ssh)?;
    info!(
        host = %config.ssh.endpoint().address(),
        user = %config.ssh.username,
        trust = %policy,
        "configuration loaded from {}",
        cli.config.display()
    );

    let listen = config.server.listen.clone();
    let api = Arc::new(ApiService::new(config, Arc::new(factory)));
    api.start_server(&listen).await
}
