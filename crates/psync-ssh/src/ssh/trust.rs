// ── Host trust ───────────────────────────────────────────────────────

use super::known_hosts::{append_entry, HostKey, HostLookup, KnownHostsStore};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use psync_core::{SyncError, SyncResult, TrustPolicy};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

lazy_static! {
    /// One lock per known_hosts path, held across load, lookup and append.
    static ref STORE_LOCKS: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>> =
        StdMutex::new(HashMap::new());
}

fn store_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut locks = STORE_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
    locks
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trusted {
    /// Key already recorded for the host.
    Known,
    /// Host was unseen and its key has been recorded.
    Learned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Learn,
}

/// Policy decision for a lookup result.  A changed or revoked key is
/// rejected under both policies.
pub fn decide(policy: &TrustPolicy, host: &str, lookup: &HostLookup) -> SyncResult<Decision> {
    let store = policy.known_hosts_path().display();
    match lookup {
        HostLookup::Match { .. } => Ok(Decision::Accept),
        HostLookup::Revoked { line } => Err(SyncError::trust_violation(format!(
            "host key for {} is marked @revoked in {}:{}",
            host, store, line
        ))),
        HostLookup::Mismatch { line } => Err(SyncError::trust_violation(format!(
            "host key for {} does not match the key recorded in {}:{}; \
             remove that line if the host key was legitimately changed",
            host, store, line
        ))),
        HostLookup::NotFound if policy.learns_new_hosts() => Ok(Decision::Learn),
        HostLookup::NotFound => Err(SyncError::unknown_host(format!(
            "host {} is not in {}; add its key or set allowNewHost",
            host, store
        ))),
    }
}

/// Verifies the key a server presents during the handshake.
#[async_trait]
pub trait HostKeyVerifier: Send + Sync {
    async fn verify(&self, host: &str, key: &HostKey) -> SyncResult<Trusted>;
}

/// `HostKeyVerifier` backed by a known_hosts file.
#[derive(Debug, Clone)]
pub struct TrustManager {
    policy: TrustPolicy,
}

impl TrustManager {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl HostKeyVerifier for TrustManager {
    async fn verify(&self, host: &str, key: &HostKey) -> SyncResult<Trusted> {
        let path = self.policy.known_hosts_path();
        let lock = store_lock(path);
        let _guard = lock.lock().await;

        let store = KnownHostsStore::load(path)?;
        let lookup = store.lookup(host, key);
        match decide(&self.policy, host, &lookup) {
            Ok(Decision::Accept) => {
                debug!("Host key for {} ({}) verified", host, key.key_type);
                Ok(Trusted::Known)
            }
            Ok(Decision::Learn) => {
                append_entry(store.path(), host, key)?;
                info!(
                    "Added new host key for {} ({}) to {}",
                    host,
                    key.key_type,
                    store.path().display()
                );
                Ok(Trusted::Learned)
            }
            Err(e) => {
                warn!("Rejected host key for {}: {}", host, e.message);
                Err(e)
            }
        }
    }
}
