//! In-memory [`SecureChannel`] for tests.
//!
//! Emulates a remote host with an SFTP subsystem, a `mkdir -p` command and an
//! `scp -t` sink that parses the header / bytes / terminator stream it is fed.
//! Clones share the same remote state, so a test can hand one clone to the
//! code under test and inspect the other.

use super::remote_path::{dir_prefixes, parent_dir};
use async_trait::async_trait;
use psync_core::{
    ChannelConnector, ExecOutput, HostEndpoint, RemoteEntryKind, RemoteWriter, SecureChannel,
    SftpSession, StdinPipe, SyncError, SyncResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

#[derive(Debug, Default)]
struct FakeRemote {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    denied_dirs: BTreeSet<String>,
    sftp_available: bool,
    sftp_failures_left: usize,
    sftp_opens: usize,
    reject_scp: bool,
    stall_exec: bool,
    commands: Vec<String>,
    closed: bool,
}

impl FakeRemote {
    fn is_dir(&self, path: &str) -> bool {
        path == "/" || self.dirs.contains(path.trim_end_matches('/'))
    }

    fn parent_exists(&self, path: &str) -> bool {
        parent_dir(path).map_or(true, |parent| self.is_dir(parent))
    }

    /// Single-level mkdir, as SFTP does it.
    fn mkdir(&mut self, path: &str) -> Result<(), String> {
        if self.denied_dirs.contains(path) {
            return Err(format!("{}: Permission denied", path));
        }
        if self.is_dir(path) || self.files.contains_key(path) {
            return Err(format!("{}: File exists", path));
        }
        if !self.parent_exists(path) {
            return Err(format!("{}: No such file or directory", path));
        }
        self.dirs.insert(path.to_string());
        Ok(())
    }

    fn mkdir_p(&mut self, path: &str) -> Result<(), String> {
        for prefix in dir_prefixes(path) {
            if self.is_dir(&prefix) {
                continue;
            }
            if self.files.contains_key(&prefix) {
                return Err(format!(
                    "cannot create directory '{}': Not a directory",
                    prefix
                ));
            }
            if self.denied_dirs.contains(&prefix) {
                return Err(format!(
                    "cannot create directory '{}': Permission denied",
                    prefix
                ));
            }
            self.dirs.insert(prefix);
        }
        Ok(())
    }
}

fn lock(remote: &Mutex<FakeRemote>) -> MutexGuard<'_, FakeRemote> {
    remote.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── FakeChannel ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeChannel {
    endpoint: HostEndpoint,
    remote: Arc<Mutex<FakeRemote>>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        let remote = FakeRemote {
            sftp_available: true,
            ..FakeRemote::default()
        };
        Self {
            endpoint: HostEndpoint::new("fake.example.com", 22, "deploy"),
            remote: Arc::new(Mutex::new(remote)),
        }
    }
}

impl FakeChannel {
    /// Remote with a working SFTP subsystem and only `/`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote whose SFTP subsystem is never available.
    pub fn without_sftp() -> Self {
        let channel = Self::default();
        lock(&channel.remote).sftp_available = false;
        channel
    }

    /// Fail the next `n` SFTP opens.
    pub fn failing_sftp_opens(self, n: usize) -> Self {
        self.fail_next_sftp_opens(n);
        self
    }

    /// Like [`failing_sftp_opens`](Self::failing_sftp_opens), for a channel
    /// already lent to an engine.
    pub fn fail_next_sftp_opens(&self, n: usize) {
        lock(&self.remote).sftp_failures_left = n;
    }

    pub fn with_dir(self, dir: &str) -> Self {
        {
            let mut remote = lock(&self.remote);
            for prefix in dir_prefixes(dir) {
                remote.dirs.insert(prefix);
            }
        }
        self
    }

    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        lock(&self.remote)
            .files
            .insert(path.to_string(), contents.to_vec());
        self
    }

    /// Refuse to create `dir` through either protocol.
    pub fn deny_directory(self, dir: &str) -> Self {
        lock(&self.remote).denied_dirs.insert(dir.to_string());
        self
    }

    /// Make every `scp -t` sink exit 1 without reading its input.
    pub fn rejecting_scp(self) -> Self {
        lock(&self.remote).reject_scp = true;
        self
    }

    /// Make every exec session hang forever.
    pub fn stalling_exec(self) -> Self {
        lock(&self.remote).stall_exec = true;
        self
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.remote).files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        lock(&self.remote).is_dir(path)
    }

    /// SFTP open attempts, successful or not.
    pub fn sftp_opens(&self) -> usize {
        lock(&self.remote).sftp_opens
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.remote).commands.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.remote).closed
    }

    async fn scp_sink(&self, target: &str, stdin: Option<StdinPipe>) -> ExecOutput {
        let refusal = {
            let remote = lock(&self.remote);
            if remote.reject_scp {
                Some(format!("scp: {}: Permission denied", target))
            } else if !remote.parent_exists(target) {
                Some(format!("scp: {}: No such file or directory", target))
            } else {
                None
            }
        };
        if let Some(msg) = refusal {
            drop(stdin);
            return ExecOutput {
                exit_status: 1,
                stdout: format!("\x01{}\n", msg).into_bytes(),
                stderr: Vec::new(),
            };
        }

        let mut stream = Vec::new();
        if let Some(mut rx) = stdin {
            while let Some(chunk) = rx.recv().await {
                stream.extend_from_slice(&chunk);
            }
        }

        match parse_scp_upload(&stream) {
            Ok(upload) => {
                let mut remote = lock(&self.remote);
                let path = if remote.is_dir(target) {
                    format!("{}/{}", target.trim_end_matches('/'), upload.name)
                } else {
                    target.to_string()
                };
                remote.files.insert(path, upload.contents);
                ExecOutput {
                    exit_status: 0,
                    stdout: vec![0, 0, 0],
                    stderr: Vec::new(),
                }
            }
            Err(msg) => ExecOutput {
                exit_status: 1,
                stdout: format!("\x01scp: protocol error: {}\n", msg).into_bytes(),
                stderr: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl SecureChannel for FakeChannel {
    fn endpoint(&self) -> &HostEndpoint {
        &self.endpoint
    }

    async fn open_sftp(&self) -> SyncResult<Box<dyn SftpSession>> {
        let mut remote = lock(&self.remote);
        remote.sftp_opens += 1;
        if remote.sftp_failures_left > 0 {
            remote.sftp_failures_left -= 1;
            return Err(SyncError::connection("SFTP subsystem request failed"));
        }
        if !remote.sftp_available {
            return Err(SyncError::connection("subsystem sftp not configured"));
        }
        Ok(Box::new(FakeSftp {
            remote: self.remote.clone(),
        }))
    }

    async fn exec(&self, command: &str, stdin: Option<StdinPipe>) -> SyncResult<ExecOutput> {
        let stall = {
            let mut remote = lock(&self.remote);
            remote.commands.push(command.to_string());
            remote.stall_exec
        };
        if stall {
            std::future::pending::<()>().await;
        }

        if let Some(arg) = command.strip_prefix("mkdir -p ") {
            let dir = shell_unquote(arg)?;
            let created = lock(&self.remote).mkdir_p(&dir);
            return Ok(match created {
                Ok(()) => ExecOutput::exited(0),
                Err(msg) => ExecOutput {
                    exit_status: 1,
                    stdout: Vec::new(),
                    stderr: format!("mkdir: {}\n", msg).into_bytes(),
                },
            });
        }
        if let Some(arg) = command.strip_prefix("scp -t ") {
            let target = shell_unquote(arg)?;
            return Ok(self.scp_sink(&target, stdin).await);
        }
        Ok(ExecOutput {
            exit_status: 127,
            stdout: Vec::new(),
            stderr: format!("sh: {}: command not found\n", command).into_bytes(),
        })
    }

    async fn close(&self) -> SyncResult<()> {
        lock(&self.remote).closed = true;
        Ok(())
    }
}

/// Undo [`shell_quote`](super::remote_path::shell_quote).
fn shell_unquote(s: &str) -> SyncResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' => quoted = !quoted,
            '\\' if !quoted => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            c => out.push(c),
        }
    }
    if quoted {
        return Err(SyncError::connection(format!("unterminated quote in {}", s)));
    }
    Ok(out)
}

// ── SCP stream parsing ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpUpload {
    pub mode: u32,
    pub name: String,
    pub contents: Vec<u8>,
}

/// Parse a single-file sink stream: `C<mode> <size> <name>\n`, the bytes,
/// then one NUL.
pub fn parse_scp_upload(stream: &[u8]) -> Result<ScpUpload, String> {
    let newline = stream
        .iter()
        .position(|b| *b == b'\n')
        .ok_or("missing header line")?;
    let header = std::str::from_utf8(&stream[..newline]).map_err(|_| "header is not UTF-8")?;
    let rest = header
        .strip_prefix('C')
        .ok_or_else(|| format!("unexpected header {:?}", header))?;
    let mut fields = rest.splitn(3, ' ');
    let mode = fields.next().ok_or("missing mode")?;
    let mode = u32::from_str_radix(mode, 8).map_err(|_| format!("bad mode {:?}", mode))?;
    let size = fields.next().ok_or("missing size")?;
    let size: usize = size.parse().map_err(|_| format!("bad size {:?}", size))?;
    let name = fields.next().ok_or("missing name")?.to_string();

    let body = &stream[newline + 1..];
    if body.len() != size + 1 {
        return Err(format!(
            "expected {} bytes and a terminator, got {} bytes",
            size,
            body.len()
        ));
    }
    if body[size] != 0 {
        return Err("missing NUL terminator".into());
    }
    Ok(ScpUpload {
        mode,
        name,
        contents: body[..size].to_vec(),
    })
}

// ── SFTP ─────────────────────────────────────────────────────────────

struct FakeSftp {
    remote: Arc<Mutex<FakeRemote>>,
}

#[async_trait]
impl SftpSession for FakeSftp {
    async fn entry_kind(&mut self, path: &str) -> SyncResult<Option<RemoteEntryKind>> {
        let remote = lock(&self.remote);
        Ok(if remote.is_dir(path) {
            Some(RemoteEntryKind::Directory)
        } else if remote.files.contains_key(path) {
            Some(RemoteEntryKind::File)
        } else {
            None
        })
    }

    async fn create_dir(&mut self, path: &str) -> SyncResult<()> {
        lock(&self.remote).mkdir(path).map_err(SyncError::connection)
    }

    async fn create(&mut self, path: &str) -> SyncResult<RemoteWriter> {
        let mut remote = lock(&self.remote);
        if remote.is_dir(path) {
            return Err(SyncError::connection(format!("{}: Is a directory", path)));
        }
        if !remote.parent_exists(path) {
            return Err(SyncError::connection(format!(
                "{}: No such file or directory",
                path
            )));
        }
        remote.files.insert(path.to_string(), Vec::new());
        Ok(Box::new(FakeRemoteFile {
            path: path.to_string(),
            buffer: Vec::new(),
            remote: self.remote.clone(),
        }))
    }

    async fn close(self: Box<Self>) -> SyncResult<()> {
        Ok(())
    }
}

/// Buffers writes and stores them on shutdown.
struct FakeRemoteFile {
    path: String,
    buffer: Vec<u8>,
    remote: Arc<Mutex<FakeRemote>>,
}

impl AsyncWrite for FakeRemoteFile {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let contents = std::mem::take(&mut this.buffer);
        lock(&this.remote).files.insert(this.path.clone(), contents);
        Poll::Ready(Ok(()))
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Connector handing out clones of one [`FakeChannel`], or a fixed error.
pub struct FakeConnector {
    channel: FakeChannel,
    failure: Option<SyncError>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(channel: FakeChannel) -> Self {
        Self {
            channel,
            failure: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: SyncError) -> Self {
        Self {
            channel: FakeChannel::new(),
            failure: Some(error),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(&self) -> SyncResult<Box<dyn SecureChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(Box::new(self.channel.clone())),
        }
    }
}
