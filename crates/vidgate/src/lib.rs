//! Vidgate ingestion engine
//!
//! The receiving half of a producer/consumer video pipeline: a TCP acceptor
//! feeds a fixed pool of handler workers, each driving one connection
//! through receive -> hash -> deduplicate -> (transcode) -> finalize ->
//! enqueue. Admitted uploads land on a bounded FIFO queue drained by the
//! downstream consumer.

pub mod config;
pub mod dedup;
pub mod handler;
pub mod hash_lock;
pub mod hasher;
pub mod queue;
pub mod server;
pub mod transcode;

pub use config::ServerConfig;
pub use handler::{HandlerError, IngestState};
pub use queue::{QueueClosed, VideoHandle, VideoQueue};
pub use server::{IngestServer, ServerHandle};
pub use transcode::{TranscodeError, Transcoder};
