//! Seams between the transfer engine and the SSH implementation.
//!
//! [`ChannelConnector`] produces one authenticated [`SecureChannel`] per
//! transfer request.  The channel hands out SFTP sub-sessions and runs remote
//! commands; the engine only ever talks to these traits.

use crate::error::SyncResult;
use crate::types::HostEndpoint;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// Remote file opened for writing; data is committed on `shutdown`.
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bytes forwarded to a remote command's stdin.  Dropping every sender
/// closes stdin.
pub type StdinPipe = mpsc::Receiver<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEntryKind {
    Directory,
    /// Anything that is not a directory.
    File,
}

/// Result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_status: u32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn exited(exit_status: u32) -> Self {
        Self {
            exit_status,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Human-readable error text: stderr, then stdout with SCP status bytes
    /// (`\0`, `\x01`, `\x02`) removed.
    pub fn diagnostic(&self) -> String {
        let mut text = String::new();
        for stream in [&self.stderr, &self.stdout] {
            let cleaned: Vec<u8> = stream
                .iter()
                .copied()
                .filter(|b| !matches!(b, 0 | 1 | 2))
                .collect();
            let cleaned = String::from_utf8_lossy(&cleaned);
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push_str("; ");
            }
            text.push_str(cleaned);
        }
        if text.is_empty() {
            text.push_str("no output");
        }
        text
    }
}

/// SFTP sub-session on an open channel.
#[async_trait]
pub trait SftpSession: Send {
    /// `None` when nothing exists at `path`.
    async fn entry_kind(&mut self, path: &str) -> SyncResult<Option<RemoteEntryKind>>;

    async fn create_dir(&mut self, path: &str) -> SyncResult<()>;

    /// Create or truncate `path`.
    async fn create(&mut self, path: &str) -> SyncResult<RemoteWriter>;

    async fn close(self: Box<Self>) -> SyncResult<()>;
}

/// Authenticated connection to exactly one host.
#[async_trait]
pub trait SecureChannel: Send + Sync {
    fn endpoint(&self) -> &HostEndpoint;

    async fn open_sftp(&self) -> SyncResult<Box<dyn SftpSession>>;

    /// Run `command` in a fresh exec session.  With `stdin`, chunks are
    /// forwarded until the pipe closes, then EOF is sent; without it, EOF is
    /// sent immediately.  Returns once the remote side closes the session.
    async fn exec(&self, command: &str, stdin: Option<StdinPipe>) -> SyncResult<ExecOutput>;

    async fn close(&self) -> SyncResult<()>;
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self) -> SyncResult<Box<dyn SecureChannel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_strips_scp_status_bytes() {
        let out = ExecOutput {
            exit_status: 1,
            stdout: b"\0\x01scp: /srv/x: Permission denied\n".to_vec(),
            stderr: Vec::new(),
        };
        assert_eq!(out.diagnostic(), "scp: /srv/x: Permission denied");
        assert!(!out.success());
    }

    #[test]
    fn test_diagnostic_joins_streams() {
        let out = ExecOutput {
            exit_status: 1,
            stdout: b"partial".to_vec(),
            stderr: b"mkdir: denied\n".to_vec(),
        };
        assert_eq!(out.diagnostic(), "mkdir: denied; partial");
        assert_eq!(ExecOutput::exited(0).diagnostic(), "no output");
    }
}
