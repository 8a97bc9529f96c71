// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The `Selector`: NCO mix to the dial offset, bandpass filter, decimate
//! or interpolate to the output rate, then gate on squelch. Also taps a
//! periodic RMS power estimate to an optional S-meter writer.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::{SampleFormat, Worker, WorkerThread};
use tracing::debug;

use crate::primitives::{complex_from_bytes, complex_to_bytes, FirFilter, Nco, PowerMeter, RateConverter};

/// S-meter updates are emitted at least this often while samples flow.
const MIN_SMETER_HZ: f64 = 10.0;
/// `-150 dBFS` is the sentinel that disables squelch entirely.
pub const SQUELCH_DISABLED: f32 = -150.0;

#[derive(Clone, Copy)]
struct SelectorParams {
    input_rate: u32,
    output_rate: u32,
    offset_hz: f64,
    low_cut: Option<f64>,
    high_cut: Option<f64>,
    squelch_dbfs: f32,
}

pub struct Selector {
    reader: Option<Reader>,
    writer: Option<Writer>,
    power_writer: Arc<Mutex<Option<Writer>>>,
    params: Arc<Mutex<SelectorParams>>,
    thread: WorkerThread,
}

impl Selector {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            reader: None,
            writer: None,
            power_writer: Arc::new(Mutex::new(None)),
            params: Arc::new(Mutex::new(SelectorParams {
                input_rate,
                output_rate,
                offset_hz: 0.0,
                low_cut: None,
                high_cut: None,
                squelch_dbfs: SQUELCH_DISABLED,
            })),
            thread: WorkerThread::new(),
        }
    }

    pub fn set_input_rate(&mut self, rate: u32) {
        self.params.lock().unwrap().input_rate = rate;
    }

    pub fn input_rate(&self) -> u32 {
        self.params.lock().unwrap().input_rate
    }

    pub fn set_output_rate(&mut self, rate: u32) {
        self.params.lock().unwrap().output_rate = rate;
    }

    pub fn output_rate(&self) -> u32 {
        self.params.lock().unwrap().output_rate
    }

    pub fn set_frequency_offset(&mut self, offset_hz: f64) {
        self.params.lock().unwrap().offset_hz = offset_hz;
    }

    pub fn set_bandpass(&mut self, low_cut: Option<f64>, high_cut: Option<f64>) {
        let mut params = self.params.lock().unwrap();
        params.low_cut = low_cut;
        params.high_cut = high_cut;
    }

    pub fn set_low_cut(&mut self, low_cut: Option<f64>) {
        self.params.lock().unwrap().low_cut = low_cut;
    }

    pub fn set_high_cut(&mut self, high_cut: Option<f64>) {
        self.params.lock().unwrap().high_cut = high_cut;
    }

    pub fn set_squelch_level(&mut self, dbfs: f32) {
        self.params.lock().unwrap().squelch_dbfs = dbfs;
    }

    pub fn squelch_level(&self) -> f32 {
        self.params.lock().unwrap().squelch_dbfs
    }

    /// Install a writer that receives periodic RMS power (dBFS) updates,
    /// for the client S-meter. Format is `Float`, one `f32` per update.
    pub fn set_power_writer(&mut self, writer: Option<Writer>) {
        *self.power_writer.lock().unwrap() = writer;
    }
}

impl Worker for Selector {
    fn set_reader(&mut self, reader: Reader) {
        self.reader = Some(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.writer = Some(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::ComplexFloat)
    }

    fn output_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::ComplexFloat)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let params = Arc::clone(&self.params);
        let power_writer = Arc::clone(&self.power_writer);
        self.thread.spawn(move |running| {
            let mut nco = Nco::new(0.0, 48_000);
            let mut fir = FirFilter::new(None, None, 48_000);
            let mut active = {
                let p = *params.lock().unwrap();
                (p.input_rate, p.output_rate, p.offset_hz, p.low_cut, p.high_cut)
            };
            let mut converter = RateConverter::new(active.0, active.1);
            let mut meter = PowerMeter::new();
            let mut last_meter_emit = Instant::now();
            let meter_interval = Duration::from_secs_f64(1.0 / MIN_SMETER_HZ);

            while let Some(bytes) = reader.read_interruptible(&running) {
                let samples = complex_from_bytes(&bytes);
                let snapshot = *params.lock().unwrap();
                let current = (
                    snapshot.input_rate,
                    snapshot.output_rate,
                    snapshot.offset_hz,
                    snapshot.low_cut,
                    snapshot.high_cut,
                );
                if current.0 != active.0 || current.1 != active.1 {
                    converter = RateConverter::new(current.0, current.1);
                }
                if current.2 != active.1 as f64 && current.2 != active.2 {
                    nco.set_offset(current.2, current.0);
                }
                if current.3 != active.3 || current.4 != active.4 {
                    fir = FirFilter::new(current.3, current.4, current.0);
                }
                active = current;

                let mut mixed = samples.clone();
                nco.mix(&mut mixed);
                let filtered = fir.process(&mixed);
                let resampled = converter.process(&filtered);

                meter.push(&resampled);
                if last_meter_emit.elapsed() >= meter_interval {
                    if let Some(dbfs) = meter.take_dbfs() {
                        if let Some(power_out) = power_writer.lock().unwrap().as_ref() {
                            power_out.write(&dbfs.to_le_bytes());
                        }
                    }
                    last_meter_emit = Instant::now();
                }

                let gated = if snapshot.squelch_dbfs <= SQUELCH_DISABLED {
                    resampled
                } else {
                    let level = instantaneous_dbfs(&resampled);
                    if level >= snapshot.squelch_dbfs {
                        resampled
                    } else {
                        vec![num_complex::Complex32::new(0.0, 0.0); resampled.len()]
                    }
                };

                if writer.write(&complex_to_bytes(&gated)) == WriteOutcome::Idle {
                    debug!("selector: no readers left, idling");
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

fn instantaneous_dbfs(samples: &[num_complex::Complex32]) -> f32 {
    if samples.is_empty() {
        return SQUELCH_DISABLED;
    }
    let sum_sq: f32 = samples.iter().map(|c| c.norm_sqr()).sum();
    let mean_sq = sum_sq / samples.len() as f32;
    20.0 * mean_sq.sqrt().max(1e-12).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::buffer::Buffer;
    use std::thread::sleep;

    #[test]
    fn squelch_gates_low_power_input() {
        let mut selector = Selector::new(48_000, 48_000);
        selector.set_squelch_level(-20.0);

        let input = Buffer::new(SampleFormat::ComplexFloat);
        let output = Buffer::new(SampleFormat::ComplexFloat);
        selector.set_reader(input.reader());
        selector.set_writer(output.writer());
        selector.start();

        let reader = output.reader();
        let writer = input.writer();
        let quiet = complex_to_bytes(&vec![num_complex::Complex32::new(0.0001, 0.0); 256]);
        writer.write(&quiet);
        sleep(Duration::from_millis(50));
        writer.close();

        let mut total_energy = 0.0f32;
        while let Some(bytes) = reader.read() {
            for c in complex_from_bytes(&bytes) {
                total_energy += c.norm_sqr();
            }
        }
        assert_eq!(total_energy, 0.0);
        selector.stop();
    }

    #[test]
    fn disabled_squelch_passes_everything() {
        let mut selector = Selector::new(48_000, 48_000);
        assert_eq!(selector.squelch_level(), SQUELCH_DISABLED);

        let input = Buffer::new(SampleFormat::ComplexFloat);
        let output = Buffer::new(SampleFormat::ComplexFloat);
        selector.set_reader(input.reader());
        selector.set_writer(output.writer());
        selector.start();

        let reader = output.reader();
        let writer = input.writer();
        let tone = complex_to_bytes(&vec![num_complex::Complex32::new(0.01, 0.0); 256]);
        writer.write(&tone);
        sleep(Duration::from_millis(50));
        writer.close();

        let mut saw_samples = false;
        while let Some(bytes) = reader.read() {
            if !bytes.is_empty() {
                saw_samples = true;
            }
        }
        assert!(saw_samples);
        selector.stop();
    }
}
