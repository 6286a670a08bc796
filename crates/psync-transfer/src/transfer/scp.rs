// ── SCP sink upload (fallback mode) ──────────────────────────────────
//
// The remote side runs `scp -t <path>`; we feed its stdin with
//   C<mode> <size> <name>\n  <size raw bytes>  \0
// from a spawned writer task while the exec pump collects the sink's output.

use super::remote_dir::ensure_dir_exec;
use super::remote_path::{base_name, parent_dir, shell_quote};
use super::sftp::COPY_CHUNK_SIZE;
use log::debug;
use psync_core::{SecureChannel, SyncError, SyncResult, TransferItem};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SCP_FILE_MODE: u32 = 0o644;
const PIPE_DEPTH: usize = 8;

pub fn scp_header(mode: u32, size: u64, name: &str) -> String {
    format!("C{:04o} {} {}\n", mode, size, name)
}

pub fn scp_sink_command(remote_path: &str) -> String {
    format!("scp -t {}", shell_quote(remote_path))
}

#[derive(Debug)]
enum WriterError {
    LocalRead(String),
    /// The sink stopped reading before the stream was complete.
    PipeClosed,
}

/// Writer task handle; the task is aborted if the upload is dropped early.
struct PayloadWriter(Option<JoinHandle<Result<(), WriterError>>>);

impl PayloadWriter {
    async fn join(mut self) -> Result<(), WriterError> {
        match self.0.take() {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(WriterError::LocalRead(format!("writer task failed: {}", e))),
            },
            None => Ok(()),
        }
    }
}

impl Drop for PayloadWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Upload one file through an `scp -t` sink.  Returns the bytes sent.
pub async fn upload(channel: &dyn SecureChannel, item: &TransferItem) -> SyncResult<u64> {
    let local = File::open(&item.local_path).await.map_err(|e| {
        SyncError::local_read(format!(
            "failed to open local file {}: {}",
            item.local_path, e
        ))
    })?;
    let size = local
        .metadata()
        .await
        .map_err(|e| {
            SyncError::local_read(format!(
                "failed to stat local file {}: {}",
                item.local_path, e
            ))
        })?
        .len();

    if let Some(dir) = parent_dir(&item.remote_path) {
        ensure_dir_exec(channel, dir).await?;
    }

    let header = scp_header(SCP_FILE_MODE, size, base_name(&item.remote_path));
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    let writer = PayloadWriter(Some(tokio::spawn(write_payload(
        local,
        size,
        header,
        item.local_path.clone(),
        tx,
    ))));

    let command = scp_sink_command(&item.remote_path);
    let exec = channel.exec(&command, Some(rx)).await;
    let written = writer.join().await;

    match (exec, written) {
        (_, Err(WriterError::LocalRead(msg))) => Err(SyncError::local_read(msg)),
        (Err(e), _) => Err(SyncError::remote_write(format!(
            "scp sink for {} failed: {}",
            item.remote_path, e.message
        ))),
        (Ok(output), _) if !output.success() => Err(SyncError::remote_write(format!(
            "scp sink for {} exited with status {}: {}",
            item.remote_path,
            output.exit_status,
            output.diagnostic()
        ))),
        (Ok(_), Err(WriterError::PipeClosed)) => Err(SyncError::remote_write(format!(
            "scp sink for {} stopped reading before the file was complete",
            item.remote_path
        ))),
        (Ok(_), Ok(())) => Ok(size),
    }
}

async fn write_payload(
    mut local: File,
    size: u64,
    header: String,
    local_path: String,
    tx: mpsc::Sender<Vec<u8>>,
) -> Result<(), WriterError> {
    send(&tx, header.into_bytes()).await?;

    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(COPY_CHUNK_SIZE as u64) as usize;
        let mut chunk = vec![0u8; want];
        let n = local.read(&mut chunk).await.map_err(|e| {
            WriterError::LocalRead(format!("failed to read local file {}: {}", local_path, e))
        })?;
        if n == 0 {
            return Err(WriterError::LocalRead(format!(
                "local file {} shrank while sending: read {} of {} bytes",
                local_path,
                size - remaining,
                size
            )));
        }
        chunk.truncate(n);
        send(&tx, chunk).await?;
        remaining -= n as u64;
    }

    send(&tx, vec![0]).await?;
    debug!("Sent {} bytes of {} to scp sink", size, local_path);
    Ok(())
}

async fn send(tx: &mpsc::Sender<Vec<u8>>, bytes: Vec<u8>) -> Result<(), WriterError> {
    tx.send(bytes).await.map_err(|_| WriterError::PipeClosed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_format() {
        assert_eq!(scp_header(SCP_FILE_MODE, 0, "a.txt"), "C0644 0 a.txt\n");
        assert_eq!(scp_header(0o755, 1048577, "run.sh"), "C0755 1048577 run.sh\n");
    }

    #[test]
    fn test_sink_command_quotes_path() {
        assert_eq!(
            scp_sink_command("/srv/app/it's.txt"),
            "scp -t '/srv/app/it'\\''s.txt'"
        );
    }
}
