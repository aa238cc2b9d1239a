//! Shared test utilities
//!
//! Common helpers used across test modules. Only compiled in test builds.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory stream that keeps every `write` call as a separate chunk.
///
/// Clones share the same buffer, so a test can hand one clone to a handler
/// and inspect the other.
#[derive(Clone, Default)]
pub struct RecordingStream {
    chunks: Arc<Mutex<Vec<String>>>,
    failures: Arc<AtomicUsize>,
}

impl RecordingStream {
    /// Create an empty recording stream
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All chunks written so far, one entry per `write` call
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.chunks.lock().unwrap().clone()
    }

    /// Make the next `count` writes fail with `BrokenPipe`
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Everything written so far, concatenated
    #[must_use]
    pub fn contents(&self) -> String {
        self.writes().concat()
    }
}

impl io::Write for RecordingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
        }
        self.chunks
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stream that accepts a fixed number of writes and then fails every one.
pub struct FailingStream {
    remaining: usize,
}

impl FailingStream {
    /// Allow `writes` successful writes before failing
    #[must_use]
    pub const fn after(writes: usize) -> Self {
        Self { remaining: writes }
    }
}

impl io::Write for FailingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
        }
        self.remaining -= 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
