// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `AudioChopper`: slices a continuous audio stream into fixed-length,
//! wall-clock-aligned segments (e.g. 15s for FT8, 120s for WSPR) the way
//! the original feeds digital-mode decoders a complete cycle at a time
//! rather than a rolling window. Sits ahead of an
//! [`ExternalProcessDemodulator`](crate::demod::external::ExternalProcessDemodulator)
//! in the secondary chain: each completed segment is flushed as one
//! write, so the downstream decoder sees one call per cycle.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::{SampleFormat, Worker, WorkerThread};
use tracing::debug;

use crate::primitives::floats_from_bytes;

pub struct AudioChopper {
    reader: Option<Reader>,
    writer: Option<Writer>,
    sample_rate: u32,
    period_seconds: u32,
    thread: WorkerThread,
}

impl AudioChopper {
    pub fn new(sample_rate: u32, period_seconds: u32) -> Self {
        Self {
            reader: None,
            writer: None,
            sample_rate,
            period_seconds: period_seconds.max(1),
            thread: WorkerThread::new(),
        }
    }

    fn segment_len(&self) -> usize {
        self.sample_rate as usize * self.period_seconds as usize
    }
}

fn seconds_into_current_period(period_seconds: u32) -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64() % period_seconds as f64
}

impl Worker for AudioChopper {
    fn set_reader(&mut self, reader: Reader) {
        self.reader = Some(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.writer = Some(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::Float)
    }

    fn output_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::Float)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let segment_len = self.segment_len();
        let period_seconds = self.period_seconds;
        let sample_rate = self.sample_rate;
        self.thread.spawn(move |running| {
            // Drop the partial first segment so every emitted chunk
            // starts at a period boundary.
            let lead_in = (seconds_into_current_period(period_seconds) * sample_rate as f64) as usize;
            let mut to_discard = lead_in;
            let mut segment: Vec<f32> = Vec::with_capacity(segment_len);

            while let Some(bytes) = reader.read_interruptible(&running) {
                let mut samples = floats_from_bytes(&bytes);
                if to_discard > 0 {
                    let drop = to_discard.min(samples.len());
                    samples.drain(..drop);
                    to_discard -= drop;
                }
                segment.extend(samples);
                while segment.len() >= segment_len {
                    let chunk: Vec<f32> = segment.drain(..segment_len).collect();
                    if writer.write(&crate::primitives::floats_to_bytes(&chunk)) == WriteOutcome::Idle {
                        debug!("audio_chopper: no readers left, idling");
                        writer.close();
                        return;
                    }
                }
            }
            writer.close();
        });
    }

    fn stop(&mut self) {
        self.thread.stop();
    }
}

/// An `AudioChopper` feeding an `ExternalProcessDemodulator`, composed as
/// a single `Demodulator` so the registry can hand `ModeRegistry` one
/// boxed value per mode. The chopper's output becomes the decoder's
/// input over an internal buffer the graph never sees; `capabilities()`
/// and the `set_*` hooks pass straight through to the wrapped decoder,
/// since the chopper itself declares no capability tags.
pub struct ChoppedExternalDemodulator {
    chopper: AudioChopper,
    inner: crate::demod::external::ExternalProcessDemodulator,
}

impl ChoppedExternalDemodulator {
    pub fn new(
        sample_rate: u32,
        period_seconds: u32,
        inner: crate::demod::external::ExternalProcessDemodulator,
    ) -> Self {
        Self {
            chopper: AudioChopper::new(sample_rate, period_seconds),
            inner,
        }
    }
}

impl Worker for ChoppedExternalDemodulator {
    fn set_reader(&mut self, reader: Reader) {
        self.chopper.set_reader(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.inner.set_writer(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        self.chopper.input_format()
    }

    fn output_format(&self) -> Option<SampleFormat> {
        self.inner.output_format()
    }

    fn start(&mut self) {
        let bridge = dsp_core::buffer::Buffer::new(SampleFormat::Float);
        self.chopper.set_writer(bridge.writer());
        self.inner.set_reader(bridge.reader());
        self.chopper.start();
        self.inner.start();
    }

    fn stop(&mut self) {
        self.chopper.stop();
        self.inner.stop();
    }
}

impl dsp_core::capability::Demodulator for ChoppedExternalDemodulator {
    fn capabilities(&self) -> dsp_core::capability::Capabilities {
        self.inner.capabilities()
    }
}

/// Shared state an `AudioChopper`'s downstream decoder output can be
/// paired with: tags each decoded record with the mode name it came
/// from, for multiplexing onto a single `secondary_demod`/`meta` channel
/// when several secondary demodulators run at once.
#[derive(Clone, Default)]
pub struct ChopperTag(Arc<Mutex<String>>);

impl ChopperTag {
    pub fn new(label: &str) -> Self {
        Self(Arc::new(Mutex::new(label.to_string())))
    }

    pub fn label(&self) -> String {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::buffer::Buffer;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn emits_full_segments_only() {
        let mut chopper = AudioChopper::new(100, 1);
        let input = Buffer::new(SampleFormat::Float);
        let output = Buffer::new(SampleFormat::Float);
        chopper.set_reader(input.reader());
        chopper.set_writer(output.writer());
        let reader = output.reader();
        let writer = input.writer();
        chopper.start();

        let samples = vec![0.5f32; 250];
        writer.write(&crate::primitives::floats_to_bytes(&samples));
        sleep(Duration::from_millis(50));
        writer.close();

        let mut total = 0usize;
        while let Some(bytes) = reader.read() {
            total += bytes.len() / 4;
        }
        assert_eq!(total % 100, 0);
        chopper.stop();
    }
}
