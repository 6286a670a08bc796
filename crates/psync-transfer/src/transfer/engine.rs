// ── Transfer engine ──────────────────────────────────────────────────

use super::{scp, sftp};
use log::{debug, info};
use psync_core::{
    ProtocolMode, SecureChannel, SyncError, SyncResult, TransferItem, TransferSummary,
};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Deadline for each item, including the wait for remote commands.
    pub item_timeout: Option<Duration>,
}

/// Moves files over one channel using the protocol chosen at negotiation.
pub struct TransferEngine<'a> {
    channel: &'a dyn SecureChannel,
    mode: ProtocolMode,
    options: TransferOptions,
}

impl<'a> TransferEngine<'a> {
    /// Probe the SFTP subsystem once and commit to a protocol for this
    /// channel.
    pub async fn negotiate(channel: &'a dyn SecureChannel, options: TransferOptions) -> Self {
        let mode = match channel.open_sftp().await {
            Ok(probe) => {
                if let Err(e) = probe.close().await {
                    debug!("Closing SFTP probe session: {}", e);
                }
                ProtocolMode::HighLevel
            }
            Err(e) => {
                info!(
                    "SFTP unavailable on {} ({}), using SCP for this connection",
                    channel.endpoint().address(),
                    e.message
                );
                ProtocolMode::LowLevelFallback
            }
        };
        Self::with_mode(channel, mode, options)
    }

    pub fn with_mode(
        channel: &'a dyn SecureChannel,
        mode: ProtocolMode,
        options: TransferOptions,
    ) -> Self {
        Self {
            channel,
            mode,
            options,
        }
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Transfer `items` in order, stopping at the first failure.
    pub async fn transfer_all(&self, items: &[TransferItem]) -> SyncResult<TransferSummary> {
        let mut summary = TransferSummary::new(self.mode);
        for item in items {
            info!(
                "Transferring {} to {} via {}",
                item.local_path, item.remote_path, self.mode
            );
            let bytes = self.transfer_one(item).await?;
            info!("Successfully transferred {} ({} bytes)", item.local_path, bytes);
            summary.record(bytes);
        }
        Ok(summary)
    }

    pub async fn transfer_one(&self, item: &TransferItem) -> SyncResult<u64> {
        let attempt = self.dispatch(item);
        let result = match self.options.item_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::timeout(format!(
                    "transfer of {} did not finish within {:?}",
                    item.local_path, limit
                ))),
            },
            None => attempt.await,
        };
        result.map_err(|e| e.with_item(item.local_path.clone()))
    }

    async fn dispatch(&self, item: &TransferItem) -> SyncResult<u64> {
        match self.mode {
            ProtocolMode::LowLevelFallback => scp::upload(self.channel, item).await,
            ProtocolMode::HighLevel => {
                let mut session = match self.channel.open_sftp().await {
                    Ok(session) => session,
                    Err(e) => {
                        info!(
                            "SFTP session for {} could not be opened ({}), sending it with SCP",
                            item.local_path, e.message
                        );
                        return scp::upload(self.channel, item).await;
                    }
                };
                let result = sftp::upload(session.as_mut(), item).await;
                if let Err(e) = session.close().await {
                    debug!("Closing SFTP session: {}", e);
                }
                result
            }
        }
    }
}
