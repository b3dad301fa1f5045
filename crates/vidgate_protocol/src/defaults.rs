//! Canonical default values shared by the receiver and its tools.

use std::time::Duration;

/// TCP port the receiver listens on.
pub const DEFAULT_LISTEN_PORT: u16 = 9090;

/// Default number of connection-handler workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default bounded-queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Uploads with a declared size above this many bytes are transcoded.
pub const COMPRESSION_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// Wall-clock limit for one transcoder invocation.
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(120);

/// External program used to compress oversized uploads, resolved via PATH.
pub const TRANSCODER_PROGRAM: &str = "ffmpeg";

/// Chunk size for streaming file I/O (hashing, payload copy).
pub const IO_CHUNK_SIZE: usize = 8 * 1024;
