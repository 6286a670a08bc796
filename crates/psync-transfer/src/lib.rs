//! # pushsync – Transfer engine
//!
//! Moves an ordered list of files over one open [`psync_core::SecureChannel`].
//! SFTP is probed once per connection; when it is unavailable every file goes
//! through an `scp -t` sink instead.  Remote parent directories are created
//! before each file is written.

pub mod transfer;
