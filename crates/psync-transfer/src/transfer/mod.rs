pub mod engine;
pub mod remote_dir;
pub mod remote_path;
pub mod scp;
pub mod sftp;

#[cfg(any(test, feature = "fake-channel"))]
pub mod fake;


pub use engine::{TransferEngine, TransferOptions};
