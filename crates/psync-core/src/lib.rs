//! # pushsync – core
//!
//! Building blocks shared by every pushsync crate:
//!
//! * [`config`] – JSON configuration loading and validation
//! * [`error`] – the categorised [`SyncError`] type
//! * [`types`] – endpoints, transfer items, protocol mode, trust policy
//! * [`channel`] – the traits that keep the transfer engine independent of
//!   the SSH library

pub mod channel;
pub mod config;
pub mod error;
pub mod types;

pub use channel::{
    ChannelConnector, ExecOutput, RemoteEntryKind, RemoteWriter, SecureChannel, SftpSession,
    StdinPipe,
};
pub use config::{AppConfig, ServerConfig, SshConfig};
pub use error::{ConnectStage, SyncError, SyncErrorKind, SyncResult};
pub use types::{
    HostEndpoint, ProtocolMode, TransferItem, TransferSummary, TrustPolicy, DEFAULT_SSH_PORT,
};
