//! External transcoder wrapper.
//!
//! Shells out to ffmpeg for uploads above the compression threshold. The
//! child is polled against a wall-clock deadline rather than waited on, so
//! a hung encode cannot pin a handler forever. Both pipes are drained on
//! reader threads; a full pipe buffer must never block the child.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

/// How often the child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How much captured stderr is carried into a failure.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to spawn transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("transcoder timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("transcoder exited with {code:?}: {stderr_tail}")]
    Failed {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("transcoder succeeded but produced no usable output at {path}")]
    EmptyOutput { path: PathBuf },

    #[error("transcoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wrapper around the external compression program.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Output naming convention: `compressed_<stem>.mp4` beside the input.
    /// The stem comes from the unique temp name, so concurrent transcodes
    /// cannot collide.
    pub fn output_path_for(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let name = format!("compressed_{stem}.mp4");
        match input.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Compress `input`, returning the output path on success. Partial
    /// output is removed on every failure path.
    pub fn transcode(&self, input: &Path) -> Result<PathBuf, TranscodeError> {
        let output = Self::output_path_for(input);
        debug!(
            input = %input.display(),
            output = %output.display(),
            "starting transcode"
        );

        let mut child = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-crf", "28", "-preset", "fast"])
            .args(["-c:a", "aac"])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
        let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

        let status = match self.wait_with_deadline(&mut child) {
            Ok(Some(status)) => status,
            Ok(None) => {
                if let Err(err) = child.kill() {
                    warn!("failed to kill timed-out transcoder: {err}");
                }
                let _ = child.wait();
                // Orphaned grandchildren can hold the pipes open; dropping
                // the reader handles instead of joining keeps the handler
                // from blocking on them.
                drop(stdout_reader);
                drop(stderr_reader);
                remove_partial(&output);
                return Err(TranscodeError::Timeout {
                    timeout: self.timeout,
                });
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                drop(stdout_reader);
                drop(stderr_reader);
                remove_partial(&output);
                return Err(TranscodeError::Io(err));
            }
        };

        let stdout = drain_reader(stdout_reader);
        if !stdout.is_empty() {
            trace!("transcoder stdout:\n{stdout}");
        }
        let stderr = drain_reader(stderr_reader);

        if !status.success() {
            remove_partial(&output);
            return Err(TranscodeError::Failed {
                code: status.code(),
                stderr_tail: tail(&stderr, STDERR_TAIL_BYTES),
            });
        }

        match std::fs::metadata(&output) {
            Ok(meta) if meta.len() > 0 => {
                debug!(
                    output = %output.display(),
                    bytes = meta.len(),
                    "transcode finished"
                );
                Ok(output)
            }
            _ => {
                remove_partial(&output);
                Err(TranscodeError::EmptyOutput { path: output })
            }
        }
    }

    /// Poll `try_wait` until the child exits or the deadline passes.
    fn wait_with_deadline(&self, child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(self.timeout));
        }
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = String::new();
        let _ = pipe.read_to_string(&mut captured);
        captured
    })
}

fn drain_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(
                "failed to remove partial transcoder output {}: {err}",
                path.display()
            );
        }
    }
}

fn tail(text: &str, max_bytes: usize) -> String {
    let trimmed = text.trim_end();
    if trimmed.len() <= max_bytes {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max_bytes;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_is_beside_the_input() {
        let output = Transcoder::output_path_for(Path::new("/uploads/vid-abc123def456.tmp"));
        assert_eq!(
            output,
            Path::new("/uploads/compressed_vid-abc123def456.mp4")
        );
    }

    #[test]
    fn missing_program_fails_with_spawn() {
        let transcoder = Transcoder::new("vidgate-test-missing-ffmpeg", Duration::from_secs(1));
        let result = transcoder.transcode(Path::new("/nonexistent/input.tmp"));
        assert!(matches!(result, Err(TranscodeError::Spawn(_))));
    }

    #[test]
    fn tail_keeps_the_end_of_long_output() {
        let long = "x".repeat(5000);
        let tailed = tail(&long, 100);
        assert!(tailed.starts_with("..."));
        assert_eq!(tailed.len(), 103);

        assert_eq!(tail("short", 100), "short");
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Install a fake transcoder script. Arguments arrive as
        /// `-y -i <input> -c:v ... <output>`, so `$3` is the input and the
        /// last argument is the output.
        fn fake_transcoder(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            let script = format!("#!/bin/sh\nfor arg in \"$@\"; do out=\"$arg\"; done\n{body}\n");
            std::fs::write(&path, script).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn input_file(dir: &Path) -> PathBuf {
            let input = dir.join("vid-aaaabbbbcccc.tmp");
            std::fs::write(&input, b"raw video bytes").unwrap();
            input
        }

        #[test]
        fn successful_run_returns_the_output_path() {
            let dir = TempDir::new().unwrap();
            let program = fake_transcoder(dir.path(), "cp \"$3\" \"$out\"");
            let input = input_file(dir.path());

            let transcoder = Transcoder::new(&program, Duration::from_secs(5));
            let output = transcoder.transcode(&input).unwrap();

            assert_eq!(output, dir.path().join("compressed_vid-aaaabbbbcccc.mp4"));
            assert_eq!(std::fs::read(&output).unwrap(), b"raw video bytes");
        }

        #[test]
        fn nonzero_exit_cleans_partial_output() {
            let dir = TempDir::new().unwrap();
            let program = fake_transcoder(
                dir.path(),
                "echo partial > \"$out\"\necho encode exploded >&2\nexit 3",
            );
            let input = input_file(dir.path());

            let transcoder = Transcoder::new(&program, Duration::from_secs(5));
            let err = transcoder.transcode(&input).unwrap_err();

            match err {
                TranscodeError::Failed { code, stderr_tail } => {
                    assert_eq!(code, Some(3));
                    assert!(stderr_tail.contains("encode exploded"));
                }
                other => panic!("expected Failed, got {other:?}"),
            }
            assert!(!dir.path().join("compressed_vid-aaaabbbbcccc.mp4").exists());
        }

        #[test]
        fn hung_child_is_killed_at_the_deadline() {
            let dir = TempDir::new().unwrap();
            let program = fake_transcoder(dir.path(), "echo partial > \"$out\"\nsleep 30");
            let input = input_file(dir.path());

            let transcoder = Transcoder::new(&program, Duration::from_millis(300));
            let started = Instant::now();
            let err = transcoder.transcode(&input).unwrap_err();

            assert!(matches!(err, TranscodeError::Timeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(!dir.path().join("compressed_vid-aaaabbbbcccc.mp4").exists());
        }

        #[test]
        fn empty_output_is_a_failure() {
            let dir = TempDir::new().unwrap();
            let program = fake_transcoder(dir.path(), ": > \"$out\"\nexit 0");
            let input = input_file(dir.path());

            let transcoder = Transcoder::new(&program, Duration::from_secs(5));
            let err = transcoder.transcode(&input).unwrap_err();

            assert!(matches!(err, TranscodeError::EmptyOutput { .. }));
            assert!(!dir.path().join("compressed_vid-aaaabbbbcccc.mp4").exists());
        }

        #[test]
        fn missing_output_is_a_failure() {
            let dir = TempDir::new().unwrap();
            let program = fake_transcoder(dir.path(), "exit 0");
            let input = input_file(dir.path());

            let transcoder = Transcoder::new(&program, Duration::from_secs(5));
            let err = transcoder.transcode(&input).unwrap_err();

            assert!(matches!(err, TranscodeError::EmptyOutput { .. }));
        }
    }
}
