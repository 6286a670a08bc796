use futures::future::join_all;
use psync_core::{SyncErrorKind, TrustPolicy};
use psync_ssh::ssh::known_hosts::{append_entry, HostKey, KnownHostsStore};
use psync_ssh::ssh::{HostKeyVerifier, TrustManager, Trusted};
use std::sync::Arc;

fn key(seed: u8) -> HostKey {
    HostKey::new("ssh-ed25519", vec![0, 0, 0, 11, seed, seed, seed])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_records_host_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".ssh").join("known_hosts");
    let manager = Arc::new(TrustManager::new(TrustPolicy::TrustOnFirstUse {
        known_hosts: path.clone(),
    }));

    let attempts = (0..8).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.verify("[build.example.com]:2222", &key(7)).await })
    });
    let results: Vec<Trusted> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|t| **t == Trusted::Learned).count(), 1);
    let store = KnownHostsStore::load(&path).unwrap();
    assert_eq!(store.count_for("[build.example.com]:2222"), 1);
    assert_eq!(store.entries().len(), 1);
}

#[tokio::test]
async fn test_strict_mismatch_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_hosts");
    append_entry(&path, "example.com", &key(1)).unwrap();
    let before = std::fs::read(&path).unwrap();

    let manager = TrustManager::new(TrustPolicy::Strict {
        known_hosts: path.clone(),
    });
    let err = manager.verify("example.com", &key(2)).await.unwrap_err();
    assert_eq!(err.kind, SyncErrorKind::TrustViolation);
    assert_eq!(std::fs::read(&path).unwrap(), before);

    assert_eq!(
        manager.verify("example.com", &key(1)).await.unwrap(),
        Trusted::Known
    );
}

#[tokio::test]
async fn test_first_use_then_strict_accepts_learned_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_hosts");

    let learner = TrustManager::new(TrustPolicy::TrustOnFirstUse {
        known_hosts: path.clone(),
    });
    assert_eq!(
        learner.verify("example.com", &key(3)).await.unwrap(),
        Trusted::Learned
    );

    let strict = TrustManager::new(TrustPolicy::Strict { known_hosts: path });
    assert_eq!(
        strict.verify("example.com", &key(3)).await.unwrap(),
        Trusted::Known
    );
    let err = strict.verify("other.example.com", &key(3)).await.unwrap_err();
    assert_eq!(err.kind, SyncErrorKind::UnknownHost);
}
