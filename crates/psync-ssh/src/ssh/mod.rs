pub mod factory;
pub mod known_hosts;
pub mod session;
pub mod sftp;
pub mod trust;

pub use factory::SecureChannelFactory;
pub use known_hosts::{HostKey, HostLookup, KnownHostEntry, KnownHostsStore, Marker};
pub use session::RemoteSession;
pub use trust::{decide, Decision, HostKeyVerifier, TrustManager, Trusted};
