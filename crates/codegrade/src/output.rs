//! Per-case output sink.
//!
//! [`OutputBuffer`] is created fresh for every test case and installed as the
//! case interpreter's `sys.stdout` / `sys.stderr`. Nothing process-global is
//! redirected, so there is no stream to restore and a crashing case cannot
//! leak into the next one's capture.
//!
//! The buffer is shared between the grading thread (which reads results) and
//! the VM thread (which writes) via `Arc<Mutex<_>>`.
//!
//! # Timeout path
//!
//! A VM thread that ignored its interrupt and was abandoned still holds a
//! clone. The grading thread calls [`cancel`](OutputBuffer::cancel) so the runaway
//! code's next write raises, and [`into_strings`](OutputBuffer::into_strings)
//! copies out whatever was written so far.

use std::sync::{Arc, Mutex};

use crate::types::ExecutionError;

struct OutputBufferInner {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    max_bytes: usize,
    limit_exceeded: bool,
    cancelled: bool,
}

impl OutputBufferInner {
    fn total_len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }
}

/// Which stream a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Why a write was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRefused {
    /// The combined byte limit would be exceeded.
    Limit(ExecutionError),
    /// The case was abandoned; the writer should stop.
    Cancelled,
}

/// Capture sink for one test case. Cheap to clone; clones share data.
#[derive(Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<OutputBufferInner>>,
}

impl OutputBuffer {
    /// A sink accepting up to `max_bytes` across stdout and stderr.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputBufferInner {
                stdout: Vec::new(),
                stderr: Vec::new(),
                max_bytes,
                limit_exceeded: false,
                cancelled: false,
            })),
        }
    }

    /// Append `data` to `stream`.
    ///
    /// A write that would push the combined total over the limit is rejected
    /// whole and flags the buffer; writes after [`cancel`](Self::cancel) are
    /// always rejected.
    pub fn write(&self, stream: Stream, data: &[u8]) -> Result<(), WriteRefused> {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        if inner.cancelled {
            return Err(WriteRefused::Cancelled);
        }
        if inner.total_len() + data.len() > inner.max_bytes {
            inner.limit_exceeded = true;
            return Err(WriteRefused::Limit(ExecutionError::OutputLimitExceeded {
                limit_bytes: inner.max_bytes,
            }));
        }
        match stream {
            Stream::Stdout => inner.stdout.extend_from_slice(data),
            Stream::Stderr => inner.stderr.extend_from_slice(data),
        }
        Ok(())
    }

    pub fn write_stdout(&self, data: &[u8]) -> Result<(), WriteRefused> {
        self.write(Stream::Stdout, data)
    }

    pub fn write_stderr(&self, data: &[u8]) -> Result<(), WriteRefused> {
        self.write(Stream::Stderr, data)
    }

    /// Reject every later write.
    pub fn cancel(&self) {
        self.inner
            .lock()
            .expect("OutputBuffer mutex poisoned")
            .cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().expect("OutputBuffer mutex poisoned").cancelled
    }

    /// `true` once any write has been rejected for size.
    pub fn is_limit_exceeded(&self) -> bool {
        self.inner
            .lock()
            .expect("OutputBuffer mutex poisoned")
            .limit_exceeded
    }

    /// `(stdout, stderr)` as UTF-8, lossy. Falls back to copying when another
    /// clone is still alive (abandoned VM thread).
    pub fn into_strings(self) -> (String, String) {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => {
                let inner = mutex.into_inner().expect("OutputBuffer mutex poisoned");
                (
                    String::from_utf8_lossy(&inner.stdout).into_owned(),
                    String::from_utf8_lossy(&inner.stderr).into_owned(),
                )
            }
            Err(arc) => {
                let inner = arc.lock().expect("OutputBuffer mutex poisoned");
                (
                    String::from_utf8_lossy(&inner.stdout).into_owned(),
                    String::from_utf8_lossy(&inner.stderr).into_owned(),
                )
            }
        }
    }
}
