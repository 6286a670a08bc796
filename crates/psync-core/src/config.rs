use crate::error::{SyncError, SyncResult};
use crate::types::{HostEndpoint, TrustPolicy, DEFAULT_SSH_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}
fn default_false() -> bool {
    false
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_listen() -> String {
    "127.0.0.1:8080".into()
}
fn default_allowed_origin() -> String {
    "http://localhost:5173".into()
}

// ── Configuration ────────────────────────────────────────────────────

/// Process configuration, loaded once at startup from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    /// Private key used for public-key authentication.
    #[serde(default)]
    pub key_file: String,
    /// Defaults to `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts_file: Option<String>,
    /// Record unseen host keys instead of rejecting them.
    #[serde(default = "default_false")]
    pub allow_new_host: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-item deadline; unbounded when absent.
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            key_file: String::new(),
            known_hosts_file: None,
            allow_new_host: default_false(),
            connect_timeout_secs: default_connect_timeout_secs(),
            transfer_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Value sent in `Access-Control-Allow-Origin`.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl AppConfig {
    /// Read, parse and validate the configuration file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::configuration(format!(
                "error opening config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> SyncResult<Self> {
        let mut config: AppConfig = serde_json::from_str(text)
            .map_err(|e| SyncError::configuration(format!("error decoding config file: {}", e)))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Replace zero values with their defaults.
    pub fn normalize(&mut self) {
        if self.ssh.port == 0 {
            self.ssh.port = default_ssh_port();
        }
        if self.ssh.connect_timeout_secs == 0 {
            self.ssh.connect_timeout_secs = default_connect_timeout_secs();
        }
        if self.ssh.transfer_timeout_secs == Some(0) {
            self.ssh.transfer_timeout_secs = None;
        }
        if self
            .ssh
            .known_hosts_file
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.ssh.known_hosts_file = None;
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.ssh.host.trim().is_empty() {
            return Err(SyncError::configuration("SSH host is required in config"));
        }
        if self.ssh.username.trim().is_empty() {
            return Err(SyncError::configuration(
                "SSH username is required in config",
            ));
        }
        if self.ssh.key_file.trim().is_empty() {
            return Err(SyncError::configuration(
                "SSH key file is required in config",
            ));
        }
        if self.server.listen.trim().is_empty() {
            return Err(SyncError::configuration("server listen address is empty"));
        }
        Ok(())
    }
}

impl SshConfig {
    pub fn endpoint(&self) -> HostEndpoint {
        HostEndpoint::new(self.host.clone(), self.port, self.username.clone())
    }

    pub fn key_path(&self) -> PathBuf {
        PathBuf::from(&self.key_file)
    }

    /// Resolve the known_hosts location and pick strict or first-use trust.
    pub fn trust_policy(&self) -> SyncResult<TrustPolicy> {
        let known_hosts = match &self.known_hosts_file {
            Some(path) => PathBuf::from(path),
            None => dirs::home_dir()
                .ok_or_else(|| SyncError::configuration("failed to get user home directory"))?
                .join(".ssh")
                .join("known_hosts"),
        };
        Ok(if self.allow_new_host {
            TrustPolicy::TrustOnFirstUse { known_hosts }
        } else {
            TrustPolicy::Strict { known_hosts }
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncErrorKind;
    use std::io::Write;

    const MINIMAL: &str =
        r#"{"ssh":{"host":"example.com","username":"deploy","keyFile":"/keys/id_ed25519"}}"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.ssh.port, 22);
        assert!(!config.ssh.allow_new_host);
        assert_eq!(config.ssh.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.ssh.transfer_timeout(), None);
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.allowed_origin, "http://localhost:5173");
    }

    #[test]
    fn test_zero_port_treated_as_unset() {
        let config = AppConfig::from_json_str(
            r#"{"ssh":{"host":"h","port":0,"username":"u","keyFile":"k","transferTimeoutSecs":0}}"#,
        )
        .unwrap();
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.ssh.transfer_timeout_secs, None);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = AppConfig::from_json_str(r#"{"ssh":{"username":"u","keyFile":"k"}}"#).unwrap_err();
        assert_eq!(err.kind, SyncErrorKind::Configuration);
        assert!(err.message.contains("host"));

        let err = AppConfig::from_json_str(r#"{"ssh":{"host":"h","keyFile":"k"}}"#).unwrap_err();
        assert!(err.message.contains("username"));

        let err = AppConfig::from_json_str(r#"{"ssh":{"host":"h","username":"u"}}"#).unwrap_err();
        assert!(err.message.contains("key file"));

        let err = AppConfig::from_json_str("{").unwrap_err();
        assert!(err.message.starts_with("error decoding config file"));
    }

    #[test]
    fn test_trust_policy_follows_allow_new_host() {
        let mut config = AppConfig::from_json_str(MINIMAL).unwrap();
        config.ssh.known_hosts_file = Some("/tmp/known_hosts".into());
        assert_eq!(
            config.ssh.trust_policy().unwrap(),
            TrustPolicy::Strict {
                known_hosts: PathBuf::from("/tmp/known_hosts")
            }
        );

        config.ssh.allow_new_host = true;
        assert!(config.ssh.trust_policy().unwrap().learns_new_hosts());
    }

    #[test]
    fn test_default_known_hosts_under_home() {
        let config = AppConfig::from_json_str(MINIMAL).unwrap();
        if let Some(home) = dirs::home_dir() {
            let policy = config.ssh.trust_policy().unwrap();
            assert_eq!(
                policy.known_hosts_path(),
                home.join(".ssh").join("known_hosts")
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.ssh.endpoint().address(), "example.com:22");

        let err = AppConfig::load(Path::new("/nonexistent/pushsync.json")).unwrap_err();
        assert!(err.message.starts_with("error opening config file"));
    }
}
