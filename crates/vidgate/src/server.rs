//! TCP acceptor and handler worker pool.
//!
//! The listener runs non-blocking and is polled so the accept loop can
//! observe the stop flag; accepted sockets are handed to a fixed pool of
//! handler threads over a channel. Closing the channel is the "no new
//! work" signal: workers drain the backlog and exit, in-flight handlers
//! finish their current connection.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::handler::{self, IngestState};
use crate::queue::VideoQueue;

/// Poll interval of the non-blocking accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct IngestServer;

impl IngestServer {
    /// Create the uploads directory, bind the listener, start the worker
    /// pool, and return a handle to the running server.
    pub fn start(config: ServerConfig) -> Result<ServerHandle> {
        config.validate()?;

        std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
            format!(
                "creating uploads directory {}",
                config.uploads_dir.display()
            )
        })?;

        let listener = TcpListener::bind(("0.0.0.0", config.listen_port))
            .with_context(|| format!("binding TCP port {}", config.listen_port))?;
        let local_addr = listener.local_addr().context("reading bound address")?;
        listener
            .set_nonblocking(true)
            .context("switching listener to non-blocking")?;

        let state = Arc::new(IngestState::new(config));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (conn_tx, conn_rx) = crossbeam_channel::unbounded::<(u64, TcpStream)>();

        let mut workers = Vec::with_capacity(state.config.worker_count);
        for worker_id in 0..state.config.worker_count {
            let conn_rx = conn_rx.clone();
            let state = Arc::clone(&state);
            let worker = thread::Builder::new()
                .name(format!("vidgate-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, conn_rx, state))
                .context("spawning handler worker")?;
            workers.push(worker);
        }
        drop(conn_rx);

        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("vidgate-acceptor".to_string())
                .spawn(move || accept_loop(listener, conn_tx, shutdown))
                .context("spawning acceptor")?
        };

        info!(
            addr = %local_addr,
            workers = state.config.worker_count,
            queue_capacity = state.config.queue_capacity,
            "ingest server started"
        );

        Ok(ServerHandle {
            queue: Arc::clone(&state.queue),
            shutdown,
            acceptor: Some(acceptor),
            workers,
            local_addr,
        })
    }
}

/// Handle to a running server: the stop flag plus the threads to join.
pub struct ServerHandle {
    queue: Arc<VideoQueue>,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The hand-off queue, for the downstream consumer.
    pub fn queue(&self) -> Arc<VideoQueue> {
        Arc::clone(&self.queue)
    }

    /// Ask the acceptor to stop. No new connections are accepted;
    /// in-flight handlers finish their current connection.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Wait for the acceptor and every worker to exit. Call `stop` first.
    pub fn join(mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("acceptor thread panicked");
            }
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("handler worker panicked");
            }
        }
        info!("ingest server stopped");
    }
}

fn accept_loop(
    listener: TcpListener,
    conn_tx: Sender<(u64, TcpStream)>,
    shutdown: Arc<AtomicBool>,
) {
    let mut next_conn_id: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                // The listener is non-blocking; hand the socket back to
                // blocking mode before a worker touches it.
                if let Err(err) = stream.set_nonblocking(false) {
                    warn!(%peer, "failed to restore blocking mode, dropping: {err}");
                    continue;
                }
                next_conn_id += 1;
                debug!(conn_id = next_conn_id, %peer, "connection queued for handler pool");
                if conn_tx.send((next_conn_id, stream)).is_err() {
                    // Workers are gone; nothing left to hand work to.
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                warn!("accept failed, retrying: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    debug!("acceptor stopped");
    // Dropping conn_tx closes the channel; workers drain the backlog of
    // already-accepted sockets and exit.
}

fn worker_loop(worker_id: usize, conn_rx: Receiver<(u64, TcpStream)>, state: Arc<IngestState>) {
    debug!(worker_id, "handler worker started");
    while let Ok((conn_id, stream)) = conn_rx.recv() {
        handler::handle_connection(&state, stream, conn_id);
    }
    debug!(worker_id, "handler worker stopped");
}
