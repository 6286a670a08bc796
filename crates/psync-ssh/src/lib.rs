//! # pushsync – SSH
//!
//! Opens authenticated SSH connections for the transfer engine.
//!
//! * `ssh::known_hosts` – OpenSSH known_hosts parsing, lookup and append
//! * `ssh::trust` – strict / trust-on-first-use host key decisions
//! * `ssh::factory` – key loading, bounded dial, public-key authentication
//! * `ssh::session` – russh-backed `SecureChannel` (exec pump, SFTP)

pub mod ssh;
