// ── SFTP upload ──────────────────────────────────────────────────────

use super::remote_dir::ensure_dir_sftp;
use super::remote_path::parent_dir;
use psync_core::{RemoteWriter, SftpSession, SyncError, SyncResult, TransferItem};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub(crate) const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Upload one file through an open SFTP session.  Returns the bytes copied.
pub async fn upload(sftp: &mut dyn SftpSession, item: &TransferItem) -> SyncResult<u64> {
    if let Some(dir) = parent_dir(&item.remote_path) {
        ensure_dir_sftp(sftp, dir).await?;
    }

    let mut local = File::open(&item.local_path).await.map_err(|e| {
        SyncError::local_read(format!(
            "failed to open local file {}: {}",
            item.local_path, e
        ))
    })?;
    let mut remote = sftp.create(&item.remote_path).await.map_err(|e| {
        SyncError::remote_write(format!(
            "failed to create remote file {}: {}",
            item.remote_path, e.message
        ))
    })?;

    let copied = copy_to_remote(&mut local, &mut remote, item).await?;
    remote.shutdown().await.map_err(|e| {
        SyncError::remote_write(format!(
            "failed to close remote file {}: {}",
            item.remote_path, e
        ))
    })?;
    Ok(copied)
}

/// Copy loop that keeps read and write failures apart.
async fn copy_to_remote(
    local: &mut File,
    remote: &mut RemoteWriter,
    item: &TransferItem,
) -> SyncResult<u64> {
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = local.read(&mut buf).await.map_err(|e| {
            SyncError::local_read(format!(
                "failed to read local file {}: {}",
                item.local_path, e
            ))
        })?;
        if n == 0 {
            break;
        }
        remote.write_all(&buf[..n]).await.map_err(|e| {
            SyncError::remote_write(format!(
                "failed to write remote file {}: {}",
                item.remote_path, e
            ))
        })?;
        copied += n as u64;
    }
    Ok(copied)
}
