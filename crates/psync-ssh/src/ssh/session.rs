// ── russh-backed SecureChannel ───────────────────────────────────────

use super::factory::VerifyingHandler;
use super::sftp::RemoteSftp;
use async_trait::async_trait;
use log::debug;
use psync_core::{
    ExecOutput, HostEndpoint, SecureChannel, SftpSession, StdinPipe, SyncError, SyncResult,
};
use russh::{client, ChannelMsg, Disconnect};
use std::fmt;

/// Authenticated connection to one host.
pub struct RemoteSession {
    endpoint: HostEndpoint,
    handle: client::Handle<VerifyingHandler>,
}

impl RemoteSession {
    pub(crate) fn new(endpoint: HostEndpoint, handle: client::Handle<VerifyingHandler>) -> Self {
        Self { endpoint, handle }
    }
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Next chunk from the stdin pipe, or never once it is gone.
async fn next_chunk(stdin: &mut Option<StdinPipe>) -> Option<Vec<u8>> {
    match stdin {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl SecureChannel for RemoteSession {
    fn endpoint(&self) -> &HostEndpoint {
        &self.endpoint
    }

    async fn open_sftp(&self) -> SyncResult<Box<dyn SftpSession>> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SyncError::connection(format!("failed to open SFTP channel: {}", e)))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SyncError::connection(format!("SFTP subsystem request failed: {}", e)))?;
        // Wait for the reply so a server without SFTP fails the probe at once.
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => break,
                Some(ChannelMsg::Failure) => {
                    return Err(SyncError::connection("server refused the SFTP subsystem"))
                }
                Some(_) => {}
                None => {
                    return Err(SyncError::connection(
                        "channel closed before the SFTP subsystem started",
                    ))
                }
            }
        }
        let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SyncError::connection(format!("SFTP subsystem unavailable: {}", e)))?;
        Ok(Box::new(RemoteSftp::new(sftp)))
    }

    async fn exec(&self, command: &str, stdin: Option<StdinPipe>) -> SyncResult<ExecOutput> {
        let mut channel = self.handle.channel_open_session().await.map_err(|e| {
            SyncError::connection(format!("failed to open session for `{}`: {}", command, e))
        })?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SyncError::connection(format!("failed to run `{}`: {}", command, e)))?;

        let mut stdin = stdin;
        if stdin.is_none() {
            channel.eof().await.map_err(|e| {
                SyncError::connection(format!("failed to close stdin of `{}`: {}", command, e))
            })?;
        }

        let mut output = ExecOutput::default();
        let mut exit_status = None;
        loop {
            tokio::select! {
                chunk = next_chunk(&mut stdin) => match chunk {
                    Some(bytes) => {
                        if let Err(e) = channel.data(&bytes[..]).await {
                            // The command stopped reading; its exit status tells why.
                            debug!("stdin of `{}` closed early: {}", command, e);
                            stdin = None;
                        }
                    }
                    None => {
                        stdin = None;
                        if let Err(e) = channel.eof().await {
                            debug!("failed to send EOF to `{}`: {}", command, e);
                        }
                    }
                },
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { ref data }) => output.stdout.extend_from_slice(data),
                    Some(ChannelMsg::ExtendedData { ref data, ext: 1 }) => {
                        output.stderr.extend_from_slice(data)
                    }
                    Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                        exit_status = Some(status)
                    }
                    Some(ChannelMsg::Failure) => {
                        return Err(SyncError::connection(format!(
                            "server refused to run `{}`",
                            command
                        )))
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        match exit_status {
            Some(status) => {
                output.exit_status = status;
                Ok(output)
            }
            None => Err(SyncError::connection(format!(
                "`{}` ended without an exit status: {}",
                command,
                output.diagnostic()
            ))),
        }
    }

    async fn close(&self) -> SyncResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| {
                SyncError::connection(format!(
                    "failed to disconnect from {}: {}",
                    self.endpoint.address(),
                    e
                ))
            })
    }
}
