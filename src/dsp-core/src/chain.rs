// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `Chain`: an ordered composition of `Worker`s, itself a `Worker`.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::buffer::{Buffer, Reader, Writer};
use crate::error::{DspError, DspResult};
use crate::format::SampleFormat;
use crate::worker::Worker;

/// Connect `a`'s output to `b`'s input through a freshly allocated
/// `Buffer`. If `format` is given it must match `a`'s output format;
/// otherwise the buffer takes `a`'s output format. A mismatch between
/// the buffer's format and `b`'s declared input format is a hard error.
pub fn connect(
    a: &mut dyn Worker,
    b: &mut dyn Worker,
    format: Option<SampleFormat>,
) -> DspResult<Arc<Buffer>> {
    let a_out = a.output_format().ok_or(DspError::FormatMismatch {
        expected: format.unwrap_or(SampleFormat::Float),
        actual: format.unwrap_or(SampleFormat::Float),
    })?;
    let buf_format = format.unwrap_or(a_out);
    if buf_format != a_out {
        return Err(DspError::FormatMismatch {
            expected: buf_format,
            actual: a_out,
        });
    }
    if let Some(b_in) = b.input_format() {
        if b_in != buf_format {
            return Err(DspError::FormatMismatch {
                expected: b_in,
                actual: buf_format,
            });
        }
    }
    let buffer = Buffer::new(buf_format);
    a.set_writer(buffer.writer());
    b.set_reader(buffer.reader());
    Ok(buffer)
}

/// An ordered pipeline of workers. Adjacent workers are connected by an
/// internally held `Buffer`; the first worker's input and the last
/// worker's output are the chain's own ports.
pub struct Chain {
    workers: Vec<Box<dyn Worker>>,
    /// `internal_buffers[i]` connects `workers[i]` to `workers[i + 1]`.
    internal_buffers: Vec<Arc<Buffer>>,
    pump_handle: Option<JoinHandle<()>>,
}

impl Chain {
    /// Build a chain from workers already in pipeline order, connecting
    /// each adjacent pair. Fails with `FormatMismatch` if any pair's
    /// formats don't line up; already-connected pairs are left wired.
    pub fn new(mut workers: Vec<Box<dyn Worker>>) -> DspResult<Self> {
        let mut internal_buffers = Vec::new();
        for i in 0..workers.len().saturating_sub(1) {
            let (left, right) = workers.split_at_mut(i + 1);
            let buffer = connect(left[i].as_mut(), right[0].as_mut(), None)?;
            internal_buffers.push(buffer);
        }
        Ok(Self {
            workers,
            internal_buffers,
            pump_handle: None,
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Replace the worker at `index` with `new_worker`, disconnecting and
    /// stopping the old one and reconnecting the new one to its
    /// neighbors. Returns `FormatMismatch` (without leaving the chain in
    /// an inconsistent state, the old worker remains stopped but
    /// unrewired) if `new_worker`'s ports don't line up with its
    /// neighbors — the caller must adjust the neighbor's format first
    /// (e.g. via a prior `replace`) and retry.
    pub fn replace(&mut self, index: usize, mut new_worker: Box<dyn Worker>) -> DspResult<()> {
        debug!(index, "chain: replacing worker");
        let mut old = std::mem::replace(&mut self.workers[index], new_worker_placeholder());
        old.stop();

        if index > 0 {
            let buffer = connect(self.workers[index - 1].as_mut(), new_worker.as_mut(), None)?;
            self.internal_buffers[index - 1] = buffer;
        }
        if index + 1 < self.workers.len() {
            let buffer = connect(new_worker.as_mut(), self.workers[index + 1].as_mut(), None)?;
            self.internal_buffers[index] = buffer;
        }
        new_worker.start();
        self.workers[index] = new_worker;
        Ok(())
    }

    pub fn worker(&self, index: usize) -> &dyn Worker {
        self.workers[index].as_ref()
    }

    pub fn worker_mut(&mut self, index: usize) -> &mut Box<dyn Worker> {
        &mut self.workers[index]
    }

    /// Run `on_data` on a dedicated thread for every chunk produced by
    /// this chain's output, until the chain is stopped or its last
    /// worker closes its writer (EOF).
    pub fn pump<F>(&mut self, on_data: F) -> DspResult<()>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let Some(last) = self.workers.last_mut() else {
            return Ok(());
        };
        let tap = Buffer::new(
            last.output_format()
                .ok_or(DspError::FormatMismatch {
                    expected: SampleFormat::Float,
                    actual: SampleFormat::Float,
                })?,
        );
        last.set_writer(tap.writer());
        let reader = tap.reader();
        let mut on_data = on_data;
        self.pump_handle = Some(std::thread::spawn(move || {
            while let Some(bytes) = reader.read() {
                on_data(bytes);
            }
        }));
        Ok(())
    }
}

fn new_worker_placeholder() -> Box<dyn Worker> {
    Box::new(crate::worker::DummyWorker::default())
}

impl Worker for Chain {
    fn set_reader(&mut self, reader: Reader) {
        if let Some(first) = self.workers.first_mut() {
            first.set_reader(reader);
        }
    }

    fn set_writer(&mut self, writer: Writer) {
        if let Some(last) = self.workers.last_mut() {
            last.set_writer(writer);
        }
    }

    fn input_format(&self) -> Option<SampleFormat> {
        self.workers.first().and_then(|w| w.input_format())
    }

    fn output_format(&self) -> Option<SampleFormat> {
        self.workers.last().and_then(|w| w.output_format())
    }

    fn start(&mut self) {
        for worker in &mut self.workers {
            worker.start();
        }
    }

    fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
        if let Some(handle) = self.pump_handle.take() {
            if handle.join().is_err() {
                warn!("chain: pump thread panicked during stop");
            }
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::DummyWorker;

    #[test]
    fn connect_rejects_mismatched_formats() {
        let mut a = DummyWorker::with_format(SampleFormat::ComplexFloat);
        let mut b = DummyWorker::with_format(SampleFormat::Float);
        let result = connect(&mut a, &mut b, None);
        assert!(matches!(result, Err(DspError::FormatMismatch { .. })));
    }

    #[test]
    fn chain_of_two_matching_workers_builds() {
        let a = Box::new(DummyWorker::with_format(SampleFormat::ComplexFloat));
        let b = Box::new(DummyWorker::with_format(SampleFormat::ComplexFloat));
        let chain = Chain::new(vec![a, b]).unwrap();
        assert_eq!(chain.len(), 2);
    }
}
