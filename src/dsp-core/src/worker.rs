// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The `Worker` trait every DSP stage implements, plus `WorkerThread`, a
//! small helper most concrete workers use to run their processing loop on
//! a dedicated thread and stop it within a bounded time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::buffer::{Reader, Writer};
use crate::format::SampleFormat;

/// A single DSP processing stage. Implementors are composed into a
/// `Chain`; a `Chain` is itself a `Worker`.
pub trait Worker: Send {
    fn set_reader(&mut self, reader: Reader);
    fn set_writer(&mut self, writer: Writer);
    fn input_format(&self) -> Option<SampleFormat>;
    fn output_format(&self) -> Option<SampleFormat>;
    /// Begin processing on a dedicated thread once reader/writer (as
    /// applicable for this stage) are wired. Idempotent: a worker that is
    /// already running ignores a second call.
    fn start(&mut self);
    /// Stop processing. Idempotent, bounded-time, cascades EOF downstream
    /// by closing this stage's writer.
    fn stop(&mut self);
}

/// Drives a `FnMut(Vec<u8>) -> Option<Vec<u8>>`-shaped transform on its own
/// thread, reading from one `Reader` and writing to one `Writer`, honoring
/// a shared stop flag. Most single-input single-output workers (Selector,
/// analog demodulators, FftChain, ClientAudioChain) build on this instead
/// of hand-rolling thread/flag bookkeeping.
pub struct WorkerThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn `body` on a dedicated thread. `body` should loop on
    /// `reader.read_interruptible(&running)` and return when it yields
    /// `None`; the returned flag must be checked inside that loop.
    pub fn spawn<F>(&mut self, body: F)
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        if self.is_running() {
            return;
        }
        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        self.handle = Some(std::thread::spawn(move || body(running)));
    }

    /// Signal the thread to stop and join it. Bounded by the thread's
    /// poll interval on its blocking read (see `Reader::read_interruptible`).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for WorkerThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A pass-through worker that copies its input to its output unchanged.
/// Used as the "stopped" primary demodulator (`stop_demodulator`) and as
/// `Chain::replace`'s transient placeholder while swapping workers.
pub struct DummyWorker {
    format: SampleFormat,
    reader: Option<Reader>,
    writer: Option<Writer>,
    thread: WorkerThread,
}

impl DummyWorker {
    pub fn with_format(format: SampleFormat) -> Self {
        Self {
            format,
            reader: None,
            writer: None,
            thread: WorkerThread::new(),
        }
    }
}

impl Default for DummyWorker {
    fn default() -> Self {
        Self::with_format(SampleFormat::ComplexFloat)
    }
}

impl Worker for DummyWorker {
    fn set_reader(&mut self, reader: Reader) {
        self.reader = Some(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.writer = Some(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        Some(self.format)
    }

    fn output_format(&self) -> Option<SampleFormat> {
        Some(self.format)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        self.thread.spawn(move |running| {
            while let Some(bytes) = reader.read_interruptible(&running) {
                if writer.write(&bytes) == crate::buffer::WriteOutcome::Idle {
                    break;
                }
            }
            writer.close();
        });
    }

    fn stop(&mut self) {
        self.thread.stop();
    }
}

/// A stopped demodulator declares no capabilities: `stop_demodulator`
/// installs one of these in the primary slot, matching the old
/// demodulator's output format so `ClientAudioChain` doesn't churn.
impl crate::capability::Demodulator for DummyWorker {
    fn capabilities(&self) -> crate::capability::Capabilities {
        crate::capability::Capabilities::none()
    }
}
