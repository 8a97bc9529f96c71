// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `Buffer`: an SPMC FIFO of one `SampleFormat`. Each `Reader` owns an
//! independent cursor; a `Writer` is the single producer. Closing every
//! `Reader` idles the producer (its next `write` call reports `Idle`).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Poll interval used by `Reader::read_interruptible` so a worker's stop
/// flag is observed within a bounded time even with no new data arriving.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

use crate::format::SampleFormat;

static NEXT_READER_ID: AtomicUsize = AtomicUsize::new(1);

struct Inner {
    format: SampleFormat,
    log: VecDeque<u8>,
    /// Global byte offset of `log[0]`.
    base: usize,
    /// Global byte offset one past the last written byte.
    write_pos: usize,
    /// Producer closed (EOF).
    closed: bool,
    /// Byte offset each live reader has consumed up to.
    reader_positions: HashMap<usize, usize>,
}

impl Inner {
    fn trim(&mut self) {
        let min_pos = self
            .reader_positions
            .values()
            .copied()
            .min()
            .unwrap_or(self.write_pos);
        if min_pos > self.base {
            let drop = min_pos - self.base;
            self.log.drain(..drop);
            self.base = min_pos;
        }
    }
}

/// Shared SPMC FIFO carrying one `SampleFormat`.
pub struct Buffer {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Buffer {
    pub fn new(format: SampleFormat) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                format,
                log: VecDeque::new(),
                base: 0,
                write_pos: 0,
                closed: false,
                reader_positions: HashMap::new(),
            }),
            cond: Condvar::new(),
        })
    }

    pub fn format(&self) -> SampleFormat {
        self.inner.lock().unwrap().format
    }

    /// Open a new reader with a fresh cursor positioned at the current
    /// write head (readers never see data written before they subscribed).
    pub fn reader(self: &Arc<Self>) -> Reader {
        let id = NEXT_READER_ID.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        let write_pos = inner.write_pos;
        inner.reader_positions.insert(id, write_pos);
        Reader {
            buffer: Arc::clone(self),
            id,
        }
    }

    pub fn writer(self: &Arc<Self>) -> Writer {
        Writer {
            buffer: Arc::clone(self),
        }
    }

    pub fn open_reader_count(&self) -> usize {
        self.inner.lock().unwrap().reader_positions.len()
    }
}

/// Outcome of a write attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// No readers remain open; the producer should idle.
    Idle,
}

/// Cheap to clone: clones share the same underlying `Buffer`. The
/// orchestrator hands clones to whichever stage currently owns a given
/// capability (e.g. `MetaProvider`) so a writer set once by `DspManager`
/// survives a demodulator swap.
#[derive(Clone)]
pub struct Writer {
    buffer: Arc<Buffer>,
}

impl Writer {
    pub fn format(&self) -> SampleFormat {
        self.buffer.format()
    }

    pub fn write(&self, bytes: &[u8]) -> WriteOutcome {
        let mut inner = self.buffer.inner.lock().unwrap();
        if inner.reader_positions.is_empty() {
            return WriteOutcome::Idle;
        }
        inner.log.extend(bytes.iter().copied());
        inner.write_pos += bytes.len();
        drop(inner);
        self.buffer.cond.notify_all();
        WriteOutcome::Written
    }

    /// Signal EOF: readers blocked on `read` return `None` once drained.
    pub fn close(&self) {
        let mut inner = self.buffer.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.buffer.cond.notify_all();
    }
}

pub struct Reader {
    buffer: Arc<Buffer>,
    id: usize,
}

impl Reader {
    pub fn format(&self) -> SampleFormat {
        self.buffer.format()
    }

    /// Block until at least one byte is available, returning everything
    /// buffered since the last read. Returns `None` at EOF (producer
    /// closed and no more data is pending for this reader).
    pub fn read(&self) -> Option<Vec<u8>> {
        let mut inner = self.buffer.inner.lock().unwrap();
        loop {
            let pos = *inner.reader_positions.get(&self.id).unwrap_or(&inner.write_pos);
            if pos < inner.write_pos {
                let start = pos - inner.base;
                let end = inner.write_pos - inner.base;
                let bytes: Vec<u8> = inner.log.iter().skip(start).take(end - start).copied().collect();
                let write_pos = inner.write_pos;
                inner.reader_positions.insert(self.id, write_pos);
                inner.trim();
                return Some(bytes);
            }
            if inner.closed {
                return None;
            }
            inner = self.buffer.cond.wait(inner).unwrap();
        }
    }

    /// Like `read`, but wakes periodically to check `running`; returns
    /// `None` as soon as `running` goes false, bounding how long a stop
    /// request can take even when no data or EOF ever arrives.
    pub fn read_interruptible(&self, running: &AtomicBool) -> Option<Vec<u8>> {
        let mut inner = self.buffer.inner.lock().unwrap();
        loop {
            let pos = *inner.reader_positions.get(&self.id).unwrap_or(&inner.write_pos);
            if pos < inner.write_pos {
                let start = pos - inner.base;
                let end = inner.write_pos - inner.base;
                let bytes: Vec<u8> = inner.log.iter().skip(start).take(end - start).copied().collect();
                let write_pos = inner.write_pos;
                inner.reader_positions.insert(self.id, write_pos);
                inner.trim();
                return Some(bytes);
            }
            if inner.closed || !running.load(Ordering::Relaxed) {
                return None;
            }
            let (guard, _timeout) = self
                .buffer
                .cond
                .wait_timeout(inner, STOP_POLL_INTERVAL)
                .unwrap();
            inner = guard;
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        let mut inner = self.buffer.inner.lock().unwrap();
        inner.reader_positions.remove(&self.id);
        inner.trim();
        drop(inner);
        self.buffer.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_cursors_each_see_full_stream() {
        let buf = Buffer::new(SampleFormat::Char);
        let writer = buf.writer();
        let reader_a = buf.reader();
        let reader_b = buf.reader();

        writer.write(&[1, 2, 3]);
        assert_eq!(reader_a.read(), Some(vec![1, 2, 3]));
        writer.write(&[4, 5]);
        assert_eq!(reader_a.read(), Some(vec![4, 5]));
        assert_eq!(reader_b.read(), Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn closing_all_readers_idles_producer() {
        let buf = Buffer::new(SampleFormat::Char);
        let writer = buf.writer();
        {
            let _reader = buf.reader();
            assert_eq!(writer.write(&[1]), WriteOutcome::Written);
        }
        assert_eq!(writer.write(&[2]), WriteOutcome::Idle);
    }

    #[test]
    fn read_returns_none_at_eof_once_drained() {
        let buf = Buffer::new(SampleFormat::Char);
        let writer = buf.writer();
        let reader = buf.reader();
        writer.write(&[9]);
        writer.close();
        assert_eq!(reader.read(), Some(vec![9]));
        assert_eq!(reader.read(), None);
    }
}
