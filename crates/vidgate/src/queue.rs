//! Bounded hand-off queue between connection handlers and the consumer.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::SystemTime;

use thiserror::Error;

/// Handle to a finalized upload. Plain data, created only after a
/// successful finalize; identity and equality are the finalized path.
#[derive(Debug, Clone)]
pub struct VideoHandle {
    pub path: PathBuf,
    pub hash: String,
    pub created_at: SystemTime,
}

impl PartialEq for VideoHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for VideoHandle {}

/// Error returned by `take` once the queue has been closed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("video queue closed")]
pub struct QueueClosed;

struct QueueState {
    items: VecDeque<VideoHandle>,
    closed: bool,
}

/// Fixed-capacity FIFO with a non-blocking bounded `offer` and a blocking
/// `take`. The size check and the append in `offer` happen under one lock
/// acquisition, so admission is atomic with respect to every other
/// operation; `size`/`is_full` are point-in-time hints only.
pub struct VideoQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl VideoQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "queue capacity must be >= 1");
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `handle` if there is room. Never blocks.
    pub fn offer(&self, handle: VideoHandle) -> bool {
        let mut state = self.lock();
        if state.items.len() >= self.capacity {
            return false;
        }
        state.items.push_back(handle);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Remove and return the head, blocking while the queue is empty.
    /// Fails once `close` has been called.
    pub fn take(&self) -> Result<VideoHandle, QueueClosed> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if let Some(handle) = state.items.pop_front() {
                return Ok(handle);
            }
            state = self
                .available
                .wait(state)
                .expect("queue mutex poisoned");
        }
    }

    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_full(&self) -> bool {
        self.lock().items.len() >= self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.lock().items.len()
    }

    /// Cancellation signal for consumer shutdown: wakes every blocked
    /// `take` and makes all subsequent takes fail. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("queue mutex poisoned")
    }
}
