//! Receiver configuration (plain data).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Result};
use vidgate_protocol::defaults;

/// Runtime configuration for the ingestion server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on. Port 0 binds an ephemeral port (tests).
    pub listen_port: u16,
    /// Number of connection-handler workers.
    pub worker_count: usize,
    /// Capacity of the bounded hand-off queue.
    pub queue_capacity: usize,
    /// Directory receiving temp and finalized files; created on start.
    pub uploads_dir: PathBuf,
    /// Uploads with a declared size above this many bytes are transcoded.
    pub compression_threshold: u64,
    /// External transcoder program, resolved via PATH.
    pub transcoder_program: PathBuf,
    /// Wall-clock limit for one transcoder run.
    pub transcode_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: defaults::DEFAULT_LISTEN_PORT,
            worker_count: defaults::DEFAULT_WORKER_COUNT,
            queue_capacity: defaults::DEFAULT_QUEUE_CAPACITY,
            uploads_dir: PathBuf::from("uploads"),
            compression_threshold: defaults::COMPRESSION_THRESHOLD_BYTES,
            transcoder_program: PathBuf::from(defaults::TRANSCODER_PROGRAM),
            transcode_timeout: defaults::TRANSCODE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.worker_count >= 1, "worker count must be >= 1");
        ensure!(self.queue_capacity >= 1, "queue capacity must be >= 1");
        Ok(())
    }
}
