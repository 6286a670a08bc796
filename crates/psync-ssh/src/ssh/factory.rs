// ── Secure channel factory ───────────────────────────────────────────

use super::known_hosts::HostKey;
use super::session::RemoteSession;
use super::trust::{HostKeyVerifier, TrustManager};
use async_trait::async_trait;
use log::{debug, info, warn};
use psync_core::{
    ChannelConnector, ConnectStage, HostEndpoint, SecureChannel, SshConfig, SyncError, SyncResult,
};
use russh::client;
use russh_keys::key;
use russh_keys::PublicKeyBase64;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Opens one authenticated connection per call, checking the server's host
/// key through the injected verifier.
pub struct SecureChannelFactory {
    endpoint: HostEndpoint,
    key_file: PathBuf,
    verifier: Arc<dyn HostKeyVerifier>,
    connect_timeout: Duration,
}

impl SecureChannelFactory {
    pub fn new(
        endpoint: HostEndpoint,
        key_file: impl Into<PathBuf>,
        verifier: Arc<dyn HostKeyVerifier>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            key_file: key_file.into(),
            verifier,
            connect_timeout,
        }
    }

    /// Factory with a known_hosts-backed [`TrustManager`] built from `config`.
    pub fn from_config(config: &SshConfig) -> SyncResult<Self> {
        let policy = config.trust_policy()?;
        Ok(Self::new(
            config.endpoint(),
            config.key_path(),
            Arc::new(TrustManager::new(policy)),
            config.connect_timeout(),
        ))
    }

    pub fn endpoint(&self) -> &HostEndpoint {
        &self.endpoint
    }

    pub async fn open(&self) -> SyncResult<RemoteSession> {
        let key_pair = load_private_key(&self.key_file)?;
        let addr = self.endpoint.address();

        let rejection = Arc::new(StdMutex::new(None));
        let handler = VerifyingHandler {
            host: self.endpoint.known_hosts_name(),
            verifier: self.verifier.clone(),
            rejection: rejection.clone(),
        };
        let config = Arc::new(client::Config::default());

        info!("SSH connecting to {}", addr);
        let dial = client::connect(
            config,
            (self.endpoint.host.as_str(), self.endpoint.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(self.connect_timeout, dial).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                if let Some(rejected) = take_rejection(&rejection) {
                    return Err(rejected.with_stage(ConnectStage::HostVerification));
                }
                return Err(SyncError::connection(format!(
                    "failed to connect to {}: {}",
                    addr, e
                ))
                .with_stage(ConnectStage::Dial));
            }
            Err(_) => {
                return Err(SyncError::connection(format!(
                    "timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs(),
                    addr
                ))
                .with_stage(ConnectStage::Dial));
            }
        };

        let authenticated = handle
            .authenticate_publickey(self.endpoint.username.clone(), Arc::new(key_pair))
            .await
            .map_err(|e| {
                SyncError::connection(format!(
                    "public key authentication as {} on {} failed: {}",
                    self.endpoint.username, addr, e
                ))
                .with_stage(ConnectStage::Authentication)
            })?;
        if !authenticated {
            return Err(SyncError::connection(format!(
                "server {} rejected public key authentication for {}",
                addr, self.endpoint.username
            ))
            .with_stage(ConnectStage::Authentication));
        }

        info!("SSH authenticated to {} as {}", addr, self.endpoint.username);
        Ok(RemoteSession::new(self.endpoint.clone(), handle))
    }
}

#[async_trait]
impl ChannelConnector for SecureChannelFactory {
    async fn connect(&self) -> SyncResult<Box<dyn SecureChannel>> {
        Ok(Box::new(self.open().await?))
    }
}

pub(crate) fn load_private_key(path: &Path) -> SyncResult<key::KeyPair> {
    let pem = std::fs::read_to_string(path).map_err(|e| {
        SyncError::key(format!(
            "unable to read private key from {}: {}",
            path.display(),
            e
        ))
    })?;
    russh_keys::decode_secret_key(&pem, None).map_err(|e| {
        SyncError::key(format!(
            "unable to parse private key {}: {}",
            path.display(),
            e
        ))
    })
}

fn take_rejection(slot: &StdMutex<Option<SyncError>>) -> Option<SyncError> {
    slot.lock().unwrap_or_else(|p| p.into_inner()).take()
}

// ── Handshake handler ────────────────────────────────────────────────

pub struct VerifyingHandler {
    host: String,
    verifier: Arc<dyn HostKeyVerifier>,
    rejection: Arc<StdMutex<Option<SyncError>>>,
}

#[async_trait]
impl client::Handler for VerifyingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        self,
        server_public_key: &key::PublicKey,
    ) -> Result<(Self, bool), Self::Error> {
        let presented = HostKey::new(server_public_key.name(), server_public_key.public_key_bytes());
        match self.verifier.verify(&self.host, &presented).await {
            Ok(trusted) => {
                debug!("Host key for {} accepted ({:?})", self.host, trusted);
                Ok((self, true))
            }
            Err(e) => {
                warn!("Host key verification failed for {}: {}", self.host, e);
                *self.rejection.lock().unwrap_or_else(|p| p.into_inner()) = Some(e);
                Ok((self, false))
            }
        }
    }
}
