//! Shared tracing setup for the vidgate binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "vidgate=info,vidgate_protocol=info";
const MAX_ROTATED_FILES: usize = 3;
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Logging configuration for a vidgate binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a size-rotated file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = ensure_log_dir().context("Failed to ensure log directory")?;
    let writer = SharedLogWriter::open(dir, config.app_name)
        .context("Failed to open rotating log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Log directory: `$VIDGATE_LOG_DIR`, or `./logs` next to the uploads dir.
pub fn log_dir() -> PathBuf {
    std::env::var("VIDGATE_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

fn ensure_log_dir() -> Result<PathBuf> {
    let dir = log_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    Ok(dir)
}

/// Append-only log file that rotates by size: `<app>.log` is current,
/// `<app>.log.1` is the newest rotation, up to `MAX_ROTATED_FILES`.
struct RotatingFile {
    dir: PathBuf,
    base_name: String,
    file: File,
    current_size: u64,
}

impl RotatingFile {
    fn open(dir: PathBuf, base_name: String) -> io::Result<Self> {
        let (file, current_size) = open_current(&dir, &base_name)?;
        Ok(Self {
            dir,
            base_name,
            file,
            current_size,
        })
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.rotated_path(MAX_ROTATED_FILES);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..MAX_ROTATED_FILES).rev() {
            let src = self.rotated_path(index);
            if src.exists() {
                fs::rename(&src, self.rotated_path(index + 1))?;
            }
        }
        fs::rename(self.current_path(), self.rotated_path(1))?;

        let (file, size) = open_current(&self.dir, &self.base_name)?;
        self.file = file;
        self.current_size = size;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_current(dir: &std::path::Path, base_name: &str) -> io::Result<(File, u64)> {
    let path = dir.join(format!("{base_name}.log"));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl SharedLogWriter {
    fn open(dir: PathBuf, app_name: &str) -> Result<Self> {
        let file = RotatingFile::open(dir, sanitize_base_name(app_name))
            .with_context(|| format!("Failed to open log file for {app_name}"))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct SharedLogWriterGuard {
    inner: Arc<Mutex<RotatingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedLogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_base_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
