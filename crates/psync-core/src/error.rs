//! Categorised error type shared by the pushsync crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised transfer / connection error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    /// Connection stage that failed, for errors raised while connecting.
    pub stage: Option<ConnectStage>,
    /// Local path of the transfer item that failed, if any.
    pub item: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncErrorKind {
    /// Missing or invalid settings, unreadable known_hosts store.
    Configuration,
    /// Private key unreadable or unparsable.
    Key,
    /// Presented host key differs from, or is revoked in, the store.
    TrustViolation,
    /// Host absent from the store under strict checking.
    UnknownHost,
    /// Dial, handshake, authentication or channel failure.
    Connection,
    /// Local file could not be opened or read.
    LocalRead,
    /// Remote parent directory could not be created.
    RemoteDirectory,
    /// Remote file could not be created or written.
    RemoteWrite,
    /// Per-item deadline expired.
    Timeout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectStage {
    Dial,
    HostVerification,
    Authentication,
}

pub type SyncResult<T> = Result<T, SyncError>;

// ── Construction helpers ─────────────────────────────────────────────

impl SyncError {
    pub fn new(kind: SyncErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            stage: None,
            item: None,
        }
    }

    pub fn with_stage(mut self, stage: ConnectStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_item(mut self, local_path: impl Into<String>) -> Self {
        self.item = Some(local_path.into());
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Configuration, msg)
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Key, msg)
    }

    pub fn trust_violation(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::TrustViolation, msg)
    }

    pub fn unknown_host(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::UnknownHost, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Connection, msg)
    }

    pub fn local_read(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::LocalRead, msg)
    }

    pub fn remote_directory(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::RemoteDirectory, msg)
    }

    pub fn remote_write(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::RemoteWrite, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Timeout, msg)
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncErrorKind::Configuration => "configuration",
            SyncErrorKind::Key => "key",
            SyncErrorKind::TrustViolation => "trust violation",
            SyncErrorKind::UnknownHost => "unknown host",
            SyncErrorKind::Connection => "connection",
            SyncErrorKind::LocalRead => "local read",
            SyncErrorKind::RemoteDirectory => "remote directory",
            SyncErrorKind::RemoteWrite => "remote write",
            SyncErrorKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectStage::Dial => "dial",
            ConnectStage::HostVerification => "host verification",
            ConnectStage::Authentication => "authentication",
        };
        f.write_str(name)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = self.stage {
            write!(f, "[{} during {}] {}", self.kind, stage, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for SyncError {}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::configuration(format!("invalid JSON: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_stage() {
        let err = SyncError::connection("refused").with_stage(ConnectStage::Dial);
        assert_eq!(err.to_string(), "[connection during dial] refused");

        let err = SyncError::local_read("gone");
        assert_eq!(err.to_string(), "[local read] gone");
    }

    #[test]
    fn test_with_item_keeps_kind() {
        let err = SyncError::remote_write("disk full").with_item("/tmp/a.txt");
        assert_eq!(err.kind, SyncErrorKind::RemoteWrite);
        assert_eq!(err.item.as_deref(), Some("/tmp/a.txt"));
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(SyncError::from(io).kind, SyncErrorKind::Timeout);

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(SyncError::from(io).kind, SyncErrorKind::Connection);
    }

    #[test]
    fn test_serializes_camel_case() {
        let err = SyncError::trust_violation("changed").with_stage(ConnectStage::HostVerification);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "trustViolation");
        assert_eq!(json["stage"], "hostVerification");
    }
}
