/*!
 * Log Buffer
 * Fixed-capacity ring buffer of process output backed by ringbuf
 */

use super::types::{LogLine, LogStream};
use parking_lot::RwLock;
use ringbuf::{traits::*, HeapRb};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Circular log store; the oldest line is overwritten on overflow
pub struct LogBuffer {
    lines: RwLock<HeapRb<LogLine>>,
    capacity: usize,
    /// Lines ever written, including overwritten ones
    written: AtomicU64,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: RwLock::new(HeapRb::new(capacity)),
            capacity,
            written: AtomicU64::new(0),
        }
    }

    pub fn push(&self, line: LogLine) {
        self.lines.write().push_overwrite(line);
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_line(&self, stream: LogStream, text: impl Into<String>) {
        self.push(LogLine::new(stream, text));
    }

    /// Copy of every retained line, oldest first
    pub fn read_all(&self) -> Vec<LogLine> {
        self.lines.read().iter().cloned().collect()
    }

    /// Copy of the newest `n` lines, oldest first
    pub fn tail(&self, n: usize) -> Vec<LogLine> {
        let lines = self.lines.read();
        let skip = lines.occupied_len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.read().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        *self.lines.write() = HeapRb::new(self.capacity);
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("written", &self.total_written())
            .finish()
    }
}
