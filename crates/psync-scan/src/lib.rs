//! # pushsync – Scanner
//!
//! Walks local directories and reports files modified within a look-back
//! window, newest first.

pub mod scanner;

pub use scanner::{scan, scan_at, FileInfo, ScanRequest, DEFAULT_DAYS_TO_LOOK_BACK};
