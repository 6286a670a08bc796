// ── Remote directory creation ────────────────────────────────────────

use super::remote_path::{dir_prefixes, shell_quote};
use log::debug;
use psync_core::{RemoteEntryKind, SecureChannel, SftpSession, SyncError, SyncResult};

pub fn mkdir_command(dir: &str) -> String {
    format!("mkdir -p {}", shell_quote(dir))
}

async fn kind_of(sftp: &mut dyn SftpSession, path: &str) -> SyncResult<Option<RemoteEntryKind>> {
    sftp.entry_kind(path).await.map_err(|e| {
        SyncError::remote_directory(format!("failed to stat remote {}: {}", path, e.message))
    })
}

/// Create `dir` and any missing ancestors through SFTP.
pub async fn ensure_dir_sftp(sftp: &mut dyn SftpSession, dir: &str) -> SyncResult<()> {
    if kind_of(sftp, dir).await? == Some(RemoteEntryKind::Directory) {
        return Ok(());
    }
    for prefix in dir_prefixes(dir) {
        match kind_of(sftp, &prefix).await? {
            Some(RemoteEntryKind::Directory) => continue,
            Some(RemoteEntryKind::File) => {
                return Err(SyncError::remote_directory(format!(
                    "remote {} exists and is not a directory",
                    prefix
                )));
            }
            None => {}
        }
        if let Err(e) = sftp.create_dir(&prefix).await {
            // Another writer may have created it in the meantime.
            if kind_of(sftp, &prefix).await? != Some(RemoteEntryKind::Directory) {
                return Err(SyncError::remote_directory(format!(
                    "failed to create remote directory {}: {}",
                    prefix, e.message
                )));
            }
        }
        debug!("Created remote directory {}", prefix);
    }
    Ok(())
}

/// Create `dir` with `mkdir -p` in an exec session.
pub async fn ensure_dir_exec(channel: &dyn SecureChannel, dir: &str) -> SyncResult<()> {
    let command = mkdir_command(dir);
    let output = channel.exec(&command, None).await.map_err(|e| {
        SyncError::remote_directory(format!(
            "failed to create remote directory {}: {}",
            dir, e.message
        ))
    })?;
    if !output.success() {
        return Err(SyncError::remote_directory(format!(
            "failed to create remote directory {}: `{}` exited with status {}: {}",
            dir,
            command,
            output.exit_status,
            output.diagnostic()
        )));
    }
    Ok(())
}
