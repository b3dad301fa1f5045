//! Per-connection upload pipeline.
//!
//! Receive -> hash -> deduplicate -> (transcode) -> finalize -> enqueue,
//! with exactly one terminal status written back at the single exit point.
//! DupCheck, MaybeCompress, Finalize and Admit all run under the per-hash
//! lock, so racing uploads of identical content serialize and the loser
//! observes the winner's finalized file.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};
use vidgate_protocol::{naming, wire, ProtocolError, TerminalStatus};

use crate::config::ServerConfig;
use crate::dedup;
use crate::hash_lock::HashLockTable;
use crate::hasher;
use crate::queue::{VideoHandle, VideoQueue};
use crate::transcode::{TranscodeError, Transcoder};

/// Shared state handed to every connection handler.
pub struct IngestState {
    pub config: ServerConfig,
    pub queue: Arc<VideoQueue>,
    pub locks: HashLockTable,
    pub transcoder: Transcoder,
}

impl IngestState {
    pub fn new(config: ServerConfig) -> Self {
        let queue = Arc::new(VideoQueue::new(config.queue_capacity));
        let transcoder = Transcoder::new(&config.transcoder_program, config.transcode_timeout);
        Self {
            config,
            queue,
            locks: HashLockTable::new(),
            transcoder,
        }
    }
}

/// Failure taxonomy of the pipeline. Every variant maps onto the one
/// status the producer sees.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("queue at capacity")]
    QueueFull,

    #[error("content hash {hash} already finalized")]
    Duplicate { hash: String },

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("transfer failed: {reason}")]
    Transfer { reason: String },

    #[error("internal error: {0}")]
    Internal(#[source] io::Error),
}

impl HandlerError {
    pub fn status(&self) -> TerminalStatus {
        match self {
            HandlerError::QueueFull => TerminalStatus::QueueFull,
            HandlerError::Duplicate { .. } => TerminalStatus::DuplicateFile,
            HandlerError::Transcode(_) => TerminalStatus::CompressionFailed,
            HandlerError::Transfer { .. } => TerminalStatus::TransferError,
            HandlerError::Internal(_) => TerminalStatus::InternalError,
        }
    }
}

/// Entry point for one accepted socket.
pub fn handle_connection(state: &IngestState, mut stream: TcpStream, conn_id: u64) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!(conn_id, %peer, "connection accepted");

    let status = match run_pipeline(state, &mut stream, conn_id) {
        Ok(handle) => {
            info!(
                conn_id,
                path = %handle.path.display(),
                hash = %handle.hash,
                "upload finalized and enqueued"
            );
            TerminalStatus::Success
        }
        Err(err) => {
            let status = err.status();
            match &err {
                // Duplicates and full queues are normal operation.
                HandlerError::QueueFull | HandlerError::Duplicate { .. } => {
                    info!(conn_id, %status, "upload rejected: {err}");
                }
                _ => {
                    warn!(conn_id, %status, "upload failed: {err}");
                }
            }
            status
        }
    };

    if let Err(err) = wire::write_status(&mut stream, status) {
        warn!(conn_id, %status, "failed to write terminal status: {err}");
    }
    debug!(conn_id, %status, "connection finished");
}

/// Drive the pipeline over any byte stream. Split from `handle_connection`
/// so tests can use in-memory streams instead of sockets.
pub(crate) fn run_pipeline<S: Read + Write>(
    state: &IngestState,
    stream: &mut S,
    conn_id: u64,
) -> Result<VideoHandle, HandlerError> {
    // ReadMeta: filename frame, then the declared payload size.
    let original_name = wire::read_utf(stream).map_err(|err| meta_error("filename", err))?;
    let declared_size =
        wire::read_file_size(stream).map_err(|err| meta_error("declared size", err))?;
    let declared_size = declared_size as u64;
    let sanitized = naming::sanitize_filename(&original_name);
    debug!(
        conn_id,
        original = %original_name,
        sanitized = %sanitized,
        declared_size,
        "metadata received"
    );

    // PreQueueCheck: best-effort early reject. Admit re-checks atomically.
    if state.queue.is_full() {
        return Err(HandlerError::QueueFull);
    }

    // CreateTemp: fresh exclusive file in the uploads directory. The guard
    // unlinks the working file on every exit path until finalize disarms it.
    let opaque = naming::fresh_opaque();
    let temp_path = state
        .config
        .uploads_dir
        .join(naming::temp_file_name(&opaque));
    let temp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(HandlerError::Internal)?;
    let mut work = WorkFile::new(temp_path);

    // Receive: exactly `declared_size` bytes, verified against the disk.
    receive_payload(stream, temp_file, declared_size, work.path())?;

    // Hash.
    let hash = hasher::sha256_file(work.path()).map_err(HandlerError::Internal)?;
    debug!(conn_id, %hash, "payload hashed");

    // Everything below runs inside the per-hash critical section.
    let lock = state.locks.lock_for(&hash);
    let _hash_guard = lock.lock().expect("hash lock poisoned");

    // DupCheck, ignoring our own temp file.
    if dedup::duplicate_exists(&state.config.uploads_dir, &hash, work.path()) {
        return Err(HandlerError::Duplicate { hash });
    }

    // MaybeCompress: oversized uploads go through the transcoder and the
    // guard adopts its output as the working file.
    if declared_size > state.config.compression_threshold {
        debug!(
            conn_id,
            declared_size,
            threshold = state.config.compression_threshold,
            "upload exceeds threshold, transcoding"
        );
        let compressed = state.transcoder.transcode(work.path())?;
        work.adopt(compressed);
    }

    // Finalize: rename into the immutable naming scheme, same directory.
    let final_name = naming::finalized_file_name(Local::now(), &opaque, &sanitized);
    let final_path = state.config.uploads_dir.join(final_name);
    std::fs::rename(work.path(), &final_path).map_err(HandlerError::Internal)?;
    work.disarm();

    // Admit: the queue's atomic check-then-insert is the authoritative
    // admission decision; on rejection the finalize is undone.
    let handle = VideoHandle {
        path: final_path.clone(),
        hash,
        created_at: SystemTime::now(),
    };
    if !state.queue.offer(handle.clone()) {
        if let Err(err) = std::fs::remove_file(&final_path) {
            warn!(
                conn_id,
                "failed to undo finalize after queue rejection: {err}"
            );
        }
        return Err(HandlerError::QueueFull);
    }

    Ok(handle)
}

/// Copy exactly `declared` bytes from the stream into the temp file, then
/// verify the on-disk size.
fn receive_payload<S: Read>(
    stream: &mut S,
    file: std::fs::File,
    declared: u64,
    path: &Path,
) -> Result<(), HandlerError> {
    let mut writer = BufWriter::new(file);
    let copied = io::copy(&mut stream.take(declared), &mut writer).map_err(|err| {
        HandlerError::Transfer {
            reason: format!("receiving payload: {err}"),
        }
    })?;
    if copied != declared {
        return Err(HandlerError::Transfer {
            reason: format!("connection closed after {copied} of {declared} bytes"),
        });
    }

    writer
        .into_inner()
        .map_err(|err| HandlerError::Transfer {
            reason: format!("flushing payload: {}", err.error()),
        })?;

    let on_disk = std::fs::metadata(path)
        .map_err(HandlerError::Internal)?
        .len();
    if on_disk != declared {
        return Err(HandlerError::Transfer {
            reason: format!("on-disk size {on_disk} does not match declared {declared}"),
        });
    }
    Ok(())
}

fn meta_error(what: &str, err: ProtocolError) -> HandlerError {
    HandlerError::Transfer {
        reason: format!("reading {what}: {err}"),
    }
}

/// Owns the on-disk working file for one connection. Unless disarmed by a
/// successful finalize, the file is unlinked when the handler exits.
struct WorkFile {
    path: PathBuf,
    armed: bool,
}

impl WorkFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Switch to the transcoder output: the previous working file is
    /// removed and the guard takes ownership of the new path.
    fn adopt(&mut self, new_path: PathBuf) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(
                "failed to remove temp file {} after transcode: {err}",
                self.path.display()
            );
        }
        self.path = new_path;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WorkFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "failed to clean up working file {}: {err}",
                self.path.display()
            ),
        }
    }
}
