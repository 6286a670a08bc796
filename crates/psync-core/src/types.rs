use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_SSH_PORT: u16 = 22;

// ── Endpoint ─────────────────────────────────────────────────────────

/// Remote party of a transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl HostEndpoint {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
        }
    }

    /// `host:port`, for log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name under which the host is recorded in a known_hosts file:
    /// the bare host on port 22, `[host]:port` otherwise.
    pub fn known_hosts_name(&self) -> String {
        if self.port == DEFAULT_SSH_PORT {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        }
    }
}

// ── Trust policy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Only hosts already recorded in the store are accepted.
    Strict { known_hosts: PathBuf },
    /// Unseen hosts are recorded on first contact; recorded hosts are checked.
    TrustOnFirstUse { known_hosts: PathBuf },
}

impl TrustPolicy {
    pub fn known_hosts_path(&self) -> &Path {
        match self {
            TrustPolicy::Strict { known_hosts } | TrustPolicy::TrustOnFirstUse { known_hosts } => {
                known_hosts
            }
        }
    }

    pub fn learns_new_hosts(&self) -> bool {
        matches!(self, TrustPolicy::TrustOnFirstUse { .. })
    }
}

impl fmt::Display for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustPolicy::Strict { known_hosts } => {
                write!(f, "strict ({})", known_hosts.display())
            }
            TrustPolicy::TrustOnFirstUse { known_hosts } => {
                write!(f, "trust-on-first-use ({})", known_hosts.display())
            }
        }
    }
}

// ── Transfers ────────────────────────────────────────────────────────

/// One file to move: `localPath` on this machine to `remotePath` on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub local_path: String,
    pub remote_path: String,
}

impl TransferItem {
    pub fn new(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }
}

/// File-transfer protocol committed to for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolMode {
    /// SFTP subsystem.
    HighLevel,
    /// `scp -t` sink over exec sessions.
    LowLevelFallback,
}

impl ProtocolMode {
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProtocolMode::HighLevel => "SFTP",
            ProtocolMode::LowLevelFallback => "SCP",
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_name())
    }
}

/// Totals for a fully successful transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub mode: ProtocolMode,
    pub files: usize,
    pub bytes: u64,
}

impl TransferSummary {
    pub fn new(mode: ProtocolMode) -> Self {
        Self {
            mode,
            files: 0,
            bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hosts_name_brackets_non_default_port() {
        assert_eq!(
            HostEndpoint::new("example.com", 22, "deploy").known_hosts_name(),
            "example.com"
        );
        assert_eq!(
            HostEndpoint::new("example.com", 2222, "deploy").known_hosts_name(),
            "[example.com]:2222"
        );
    }

    #[test]
    fn test_transfer_item_camel_case() {
        let item: TransferItem =
            serde_json::from_str(r#"{"localPath":"/tmp/a.txt","remotePath":"/srv/a.txt"}"#)
                .unwrap();
        assert_eq!(item, TransferItem::new("/tmp/a.txt", "/srv/a.txt"));
    }

    #[test]
    fn test_summary_accumulates() {
        let mut summary = TransferSummary::new(ProtocolMode::LowLevelFallback);
        summary.record(10);
        summary.record(0);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes, 10);
        assert_eq!(summary.mode.to_string(), "SCP");
    }

    #[test]
    fn test_trust_policy_path() {
        let policy = TrustPolicy::TrustOnFirstUse {
            known_hosts: PathBuf::from("/tmp/kh"),
        };
        assert!(policy.learns_new_hosts());
        assert_eq!(policy.known_hosts_path(), Path::new("/tmp/kh"));
    }
}
