use async_trait::async_trait;
use psync_core::{RemoteEntryKind, RemoteWriter, SftpSession, SyncError, SyncResult};

/// `SftpSession` over a russh-sftp client.
pub struct RemoteSftp {
    sftp: russh_sftp::client::SftpSession,
}

impl RemoteSftp {
    pub(crate) fn new(sftp: russh_sftp::client::SftpSession) -> Self {
        Self { sftp }
    }
}

#[async_trait]
impl SftpSession for RemoteSftp {
    async fn entry_kind(&mut self, path: &str) -> SyncResult<Option<RemoteEntryKind>> {
        let exists = self
            .sftp
            .try_exists(path)
            .await
            .map_err(|e| SyncError::connection(format!("SFTP stat {} failed: {}", path, e)))?;
        if !exists {
            return Ok(None);
        }
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| SyncError::connection(format!("SFTP stat {} failed: {}", path, e)))?;
        Ok(Some(if metadata.is_dir() {
            RemoteEntryKind::Directory
        } else {
            RemoteEntryKind::File
        }))
    }

    async fn create_dir(&mut self, path: &str) -> SyncResult<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| SyncError::connection(format!("SFTP mkdir {} failed: {}", path, e)))
    }

    async fn create(&mut self, path: &str) -> SyncResult<RemoteWriter> {
        let file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| SyncError::connection(format!("SFTP create {} failed: {}", path, e)))?;
        Ok(Box::new(file))
    }

    async fn close(self: Box<Self>) -> SyncResult<()> {
        self.sftp
            .close()
            .await
            .map_err(|e| SyncError::connection(format!("SFTP close failed: {}", e)))
    }
}
