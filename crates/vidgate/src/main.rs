//! Vidgate receiver: TCP video-ingestion server.
//!
//! Usage:
//!     vidgate [workers] [queue-capacity]

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use vidgate::{IngestServer, ServerConfig};
use vidgate_logging::LogConfig;

#[derive(Parser, Debug)]
#[command(name = "vidgate", about = "TCP video-ingestion receiver")]
struct Args {
    /// Number of connection-handler workers (>= 1)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,

    /// Bounded queue capacity (>= 1)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    queue_capacity: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // clap would exit with code 2; this tool promises usage on
            // stderr and exit code 1 for every bad invocation.
            let _ = err.print();
            std::process::exit(1);
        }
    };

    vidgate_logging::init_logging(LogConfig {
        app_name: "vidgate",
        verbose: false,
    })?;

    let mut config = ServerConfig::default();
    if let Some(workers) = args.workers {
        config.worker_count = workers as usize;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity as usize;
    }

    info!("starting vidgate receiver");
    info!("  port: {}", config.listen_port);
    info!("  workers: {}", config.worker_count);
    info!("  queue capacity: {}", config.queue_capacity);
    info!("  uploads dir: {}", config.uploads_dir.display());

    if which::which(&config.transcoder_program).is_err() {
        warn!(
            "{} not found on PATH; uploads above {} bytes will fail with COMPRESSION_FAILED",
            config.transcoder_program.display(),
            config.compression_threshold
        );
    }

    let server = IngestServer::start(config)?;
    let queue = server.queue();

    // Downstream hand-off point: drain the queue and log each delivery.
    // The display layer that consumes these lives outside this process.
    let drain = {
        let queue = std::sync::Arc::clone(&queue);
        std::thread::Builder::new()
            .name("vidgate-drain".to_string())
            .spawn(move || {
                while let Ok(handle) = queue.take() {
                    info!(
                        path = %handle.path.display(),
                        hash = %handle.hash,
                        queued = queue.size(),
                        "video ready for display"
                    );
                }
                info!("queue closed, drain loop exiting");
            })
            .context("spawning drain thread")?
    };

    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl-C handler")?;

    let _ = stop_rx.recv();
    info!("shutdown requested");

    server.stop();
    queue.close();
    server.join();
    if drain.join().is_err() {
        warn!("drain thread panicked");
    }

    Ok(())
}
