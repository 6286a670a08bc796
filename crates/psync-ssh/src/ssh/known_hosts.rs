//! OpenSSH `known_hosts` store.
//!
//! Lines have the form `[marker] hostpatterns keytype base64key [comment]`.
//! Host patterns are comma separated and may use `*` / `?` wildcards, a
//! leading `!` for negation, or the hashed `|1|salt|hash` form.  Lines that
//! cannot be parsed are skipped with a warning.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use glob::Pattern;
use hmac::{Hmac, Mac};
use log::warn;
use psync_core::{SyncError, SyncResult};
use sha1::Sha1;
use std::fs::{DirBuilder, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HASHED_HOST_PREFIX: &str = "|1|";

// ── Host keys ────────────────────────────────────────────────────────

/// Public host key: algorithm name plus the decoded wire blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKey {
    pub key_type: String,
    pub blob: Vec<u8>,
}

impl HostKey {
    pub fn new(key_type: impl Into<String>, blob: Vec<u8>) -> Self {
        Self {
            key_type: key_type.into(),
            blob,
        }
    }

    pub fn from_base64(key_type: &str, encoded: &str) -> Option<Self> {
        let blob = STANDARD.decode(encoded).ok()?;
        if blob.is_empty() {
            return None;
        }
        Some(Self::new(key_type, blob))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.blob)
    }
}

// ── Entries ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Revoked,
    CertAuthority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHostEntry {
    /// 1-based line number in the file.
    pub line: usize,
    pub marker: Option<Marker>,
    pub hosts: String,
    pub key: HostKey,
}

impl KnownHostEntry {
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.hosts.starts_with(HASHED_HOST_PREFIX) {
            return hashed_host_matches(&self.hosts, &host);
        }
        let mut matched = false;
        for pattern in self.hosts.split(',') {
            let (negated, pattern) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern),
            };
            if host_pattern_matches(pattern, &host) {
                if negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

fn host_pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    if !pattern.contains(|c| c == '*' || c == '?') {
        return pattern == host;
    }
    // Only `*` and `?` are wildcards; everything else (notably `[` in the
    // `[host]:port` form) is literal.
    let mut glob = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' | '?' => glob.push(c),
            _ => glob.push_str(&Pattern::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    Pattern::new(&glob)
        .map(|p| p.matches(host))
        .unwrap_or(false)
}

fn hashed_host_matches(field: &str, host: &str) -> bool {
    let mut parts = field[HASHED_HOST_PREFIX.len()..].splitn(2, '|');
    let (Some(salt), Some(hash)) = (parts.next(), parts.next()) else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (STANDARD.decode(salt), STANDARD.decode(hash)) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(&salt) else {
        return false;
    };
    mac.update(host.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn parse_line(line: usize, raw: &str) -> Option<KnownHostEntry> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let mut fields = trimmed.split_whitespace();
    let mut hosts = fields.next()?;
    let marker = match hosts {
        "@revoked" => Some(Marker::Revoked),
        "@cert-authority" => Some(Marker::CertAuthority),
        other if other.starts_with('@') => {
            warn!("known_hosts line {}: unknown marker {}, skipping", line, other);
            return None;
        }
        _ => None,
    };
    if marker.is_some() {
        hosts = match fields.next() {
            Some(h) => h,
            None => {
                warn!("known_hosts line {}: marker without host pattern, skipping", line);
                return None;
            }
        };
    }
    let key = match (fields.next(), fields.next()) {
        (Some(key_type), Some(encoded)) => HostKey::from_base64(key_type, encoded),
        _ => None,
    };
    match key {
        Some(key) => Some(KnownHostEntry {
            line,
            marker,
            hosts: hosts.to_string(),
            key,
        }),
        None => {
            warn!("known_hosts line {}: malformed entry, skipping", line);
            None
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Outcome of looking a presented key up in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostLookup {
    Match { line: usize },
    /// Host is recorded, but only with other keys.
    Mismatch { line: usize },
    Revoked { line: usize },
    NotFound,
}

#[derive(Debug, Clone)]
pub struct KnownHostsStore {
    path: PathBuf,
    entries: Vec<KnownHostEntry>,
}

impl KnownHostsStore {
    /// Load the store at `path`.  A missing file is an empty store.
    pub fn load(path: &Path) -> SyncResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(path, &text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::parse(path, "")),
            Err(e) => Err(SyncError::configuration(format!(
                "could not read known_hosts file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn parse(path: &Path, text: &str) -> Self {
        let entries = text
            .lines()
            .enumerate()
            .filter_map(|(idx, raw)| parse_line(idx + 1, raw))
            .collect();
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[KnownHostEntry] {
        &self.entries
    }

    pub fn lookup(&self, host: &str, key: &HostKey) -> HostLookup {
        let mut matched = None;
        let mut mismatch = None;
        for entry in self.entries.iter().filter(|e| e.matches_host(host)) {
            match entry.marker {
                Some(Marker::Revoked) if entry.key == *key => {
                    return HostLookup::Revoked { line: entry.line };
                }
                Some(_) => {}
                None if entry.key == *key => {
                    matched.get_or_insert(entry.line);
                }
                None => {
                    mismatch.get_or_insert(entry.line);
                }
            }
        }
        match (matched, mismatch) {
            (Some(line), _) => HostLookup::Match { line },
            (None, Some(line)) => HostLookup::Mismatch { line },
            (None, None) => HostLookup::NotFound,
        }
    }

    /// Number of plain (unmarked) entries that match `host`.
    pub fn count_for(&self, host: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.marker.is_none() && e.matches_host(host))
            .count()
    }
}

pub fn format_entry(host: &str, key: &HostKey) -> String {
    format!("{} {} {}", host, key.key_type, key.to_base64())
}

/// Append `host key` to the store at `path`, creating the parent directory
/// (0700) and the file (0600) when absent.
pub fn append_entry(path: &Path, host: &str, key: &HostKey) -> SyncResult<()> {
    let fail = |what: &str, e: std::io::Error| {
        SyncError::configuration(format!(
            "failed to {} known_hosts file {}: {}",
            what,
            path.display(),
            e
        ))
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            let mut builder = DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(parent).map_err(|e| fail("create directory for", e))?;
        }
    }

    let mut options = OpenOptions::new();
    options.read(true).append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| fail("open", e))?;

    let mut line = String::new();
    if !ends_with_newline(&mut file).map_err(|e| fail("read", e))? {
        line.push('\n');
    }
    line.push_str(&format_entry(host, key));
    line.push('\n');
    file.write_all(line.as_bytes())
        .map_err(|e| fail("write", e))?;
    file.sync_all().map_err(|e| fail("sync", e))
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut std::fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> HostKey {
        HostKey::new("ssh-ed25519", vec![0, 0, 0, 11, seed, seed, seed, seed])
    }

    fn line(hosts: &str, k: &HostKey) -> String {
        format_entry(hosts, k)
    }

    fn store(text: &str) -> KnownHostsStore {
        KnownHostsStore::parse(Path::new("/tmp/known_hosts"), text)
    }

    #[test]
    fn test_plain_match_and_mismatch() {
        let s = store(&format!("# comment\n\n{}\n", line("example.com", &key(1))));
        assert_eq!(s.lookup("example.com", &key(1)), HostLookup::Match { line: 3 });
        assert_eq!(
            s.lookup("example.com", &key(2)),
            HostLookup::Mismatch { line: 3 }
        );
        assert_eq!(s.lookup("other.com", &key(1)), HostLookup::NotFound);
    }

    #[test]
    fn test_host_lists_and_case() {
        let s = store(&line("alpha,Beta.example.com,10.0.0.5", &key(1)));
        assert!(matches!(s.lookup("beta.example.com", &key(1)), HostLookup::Match { .. }));
        assert!(matches!(s.lookup("10.0.0.5", &key(1)), HostLookup::Match { .. }));
        assert_eq!(s.lookup("gamma", &key(1)), HostLookup::NotFound);
    }

    #[test]
    fn test_wildcards_and_negation() {
        let s = store(&line("*.example.com,!bad.example.com,host?", &key(1)));
        assert!(matches!(s.lookup("web.example.com", &key(1)), HostLookup::Match { .. }));
        assert!(matches!(s.lookup("host7", &key(1)), HostLookup::Match { .. }));
        assert_eq!(s.lookup("bad.example.com", &key(1)), HostLookup::NotFound);
        assert_eq!(s.lookup("host77", &key(1)), HostLookup::NotFound);
    }

    #[test]
    fn test_bracketed_port_form() {
        let s = store(&line("[example.com]:2222", &key(1)));
        assert!(matches!(
            s.lookup("[example.com]:2222", &key(1)),
            HostLookup::Match { .. }
        ));
        assert_eq!(s.lookup("example.com", &key(1)), HostLookup::NotFound);

        let s = store(&line("[*.example.com]:2222", &key(1)));
        assert!(matches!(
            s.lookup("[web.example.com]:2222", &key(1)),
            HostLookup::Match { .. }
        ));
    }

    #[test]
    fn test_hashed_host() {
        let salt = b"0123456789abcdefghij";
        let mut mac = Hmac::<Sha1>::new_from_slice(salt).unwrap();
        mac.update(b"secret.example.com");
        let hash = mac.finalize().into_bytes();
        let hosts = format!("|1|{}|{}", STANDARD.encode(salt), STANDARD.encode(hash));

        let s = store(&line(&hosts, &key(1)));
        assert!(matches!(
            s.lookup("secret.example.com", &key(1)),
            HostLookup::Match { .. }
        ));
        assert_eq!(s.lookup("public.example.com", &key(1)), HostLookup::NotFound);
    }

    #[test]
    fn test_revoked_wins_over_match() {
        let text = format!(
            "{}\n@revoked {}\n",
            line("example.com", &key(1)),
            line("*", &key(1))
        );
        let s = store(&text);
        assert_eq!(s.lookup("example.com", &key(1)), HostLookup::Revoked { line: 2 });
    }

    #[test]
    fn test_cert_authority_lines_ignored() {
        let s = store(&format!("@cert-authority {}\n", line("*", &key(1))));
        assert_eq!(s.entries().len(), 1);
        assert_eq!(s.lookup("example.com", &key(1)), HostLookup::NotFound);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let text = format!(
            "garbage\nhost ssh-ed25519 !!!notbase64\n@bogus host ssh-ed25519 AAAA\n{}\n",
            line("example.com", &key(1))
        );
        let s = store(&text);
        assert_eq!(s.entries().len(), 1);
        assert_eq!(s.entries()[0].line, 4);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = KnownHostsStore::load(&dir.path().join("absent")).unwrap();
        assert!(s.entries().is_empty());
    }

    #[test]
    fn test_unreadable_store_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KnownHostsStore::load(dir.path()).unwrap_err();
        assert_eq!(err.kind, psync_core::SyncErrorKind::Configuration);
    }

    #[test]
    fn test_append_creates_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("known_hosts");
        append_entry(&path, "example.com", &key(1)).unwrap();
        append_entry(&path, "[other]:2222", &key(2)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let s = KnownHostsStore::load(&path).unwrap();
        assert!(matches!(s.lookup("example.com", &key(1)), HostLookup::Match { .. }));
        assert!(matches!(s.lookup("[other]:2222", &key(2)), HostLookup::Match { .. }));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
            let mode = std::fs::metadata(path.parent().unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_append_adds_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(&path, line("first", &key(1))).unwrap();
        append_entry(&path, "second", &key(2)).unwrap();

        let s = KnownHostsStore::load(&path).unwrap();
        assert_eq!(s.entries().len(), 2);
        assert_eq!(s.entries()[1].hosts, "second");
    }
}
