// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `FftChain`: windowed, overlapped FFT spectrum frames at a bounded
//! frame rate, for the secondary waterfall display.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::{SampleFormat, Worker, WorkerThread};
use num_complex::Complex32;
use rustfft::FftPlanner;
use tracing::debug;

use crate::primitives::{complex_from_bytes, floats_to_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftCompression {
    Adpcm,
    None,
}

impl FftCompression {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "adpcm" => Some(Self::Adpcm),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn output_format(self) -> SampleFormat {
        match self {
            FftCompression::Adpcm => SampleFormat::Char,
            FftCompression::None => SampleFormat::Float,
        }
    }
}

#[derive(Clone, Copy)]
struct FftParams {
    size: usize,
    overlap_factor: f32,
    fps: f32,
    compression: FftCompression,
}

pub struct FftChain {
    reader: Option<Reader>,
    writer: Option<Writer>,
    params: Arc<Mutex<FftParams>>,
    thread: WorkerThread,
}

impl FftChain {
    pub fn new(size: usize, overlap_factor: f32, fps: f32, compression: FftCompression) -> Self {
        Self {
            reader: None,
            writer: None,
            params: Arc::new(Mutex::new(FftParams {
                size: size.next_power_of_two(),
                overlap_factor: overlap_factor.clamp(0.01, 0.99),
                fps: fps.max(0.1),
                compression,
            })),
            thread: WorkerThread::new(),
        }
    }

    pub fn set_sample_rate(&mut self, _rate: u32) {
        // Rate only affects how fast windows fill relative to fps; the
        // processing loop paces purely on wall-clock fps, so nothing to
        // store here beyond what params already carries.
    }

    pub fn set_fps(&mut self, fps: f32) {
        self.params.lock().unwrap().fps = fps.max(0.1);
    }

    pub fn set_overlap_factor(&mut self, overlap_factor: f32) {
        self.params.lock().unwrap().overlap_factor = overlap_factor.clamp(0.01, 0.99);
    }

    pub fn set_size(&mut self, size: usize) {
        self.params.lock().unwrap().size = size.next_power_of_two();
    }

    /// Returns `true` if this changes the output format (the caller must
    /// re-wire the downstream writer), matching
    /// `set_secondary_fft_compression`'s documented contract.
    pub fn set_compression(&mut self, compression: FftCompression) -> bool {
        let mut params = self.params.lock().unwrap();
        let changed = params.compression.output_format() != compression.output_format();
        params.compression = compression;
        changed
    }

    pub fn output_format_for(compression: FftCompression) -> SampleFormat {
        compression.output_format()
    }
}

impl Worker for FftChain {
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
        Some(self.params.lock().unwrap().compression.output_format())
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let params = Arc::clone(&self.params);
        self.thread.spawn(move |running| {
            let mut planner = FftPlanner::<f32>::new();
            let mut window_buf: Vec<Complex32> = Vec::new();
            let mut last_emit = Instant::now();
            let mut active_size = 0usize;

            while let Some(bytes) = reader.read_interruptible(&running) {
                window_buf.extend(complex_from_bytes(&bytes));

                let snapshot = *params.lock().unwrap();
                if window_buf.len() < snapshot.size {
                    continue;
                }
                let frame_interval = Duration::from_secs_f32(1.0 / snapshot.fps);
                if last_emit.elapsed() < frame_interval {
                    // Drop stale data rather than queueing it: keep only
                    // the most recent window worth of samples.
                    let keep = snapshot.size;
                    if window_buf.len() > keep {
                        let drop = window_buf.len() - keep;
                        window_buf.drain(..drop);
                    }
                    continue;
                }

                if active_size != snapshot.size {
                    active_size = snapshot.size;
                }
                let fft = planner.plan_fft_forward(snapshot.size);
                let mut frame: Vec<Complex32> = window_buf[..snapshot.size].to_vec();
                apply_hann_window(&mut frame);
                fft.process(&mut frame);

                let magnitudes: Vec<f32> = frame.iter().map(|c| c.norm()).collect();
                let payload = match snapshot.compression {
                    FftCompression::None => floats_to_bytes(&magnitudes),
                    FftCompression::Adpcm => adpcm_encode(&magnitudes),
                };

                if writer.write(&payload) == WriteOutcome::Idle {
                    debug!("fft_chain: no readers left, idling");
                    break;
                }

                let overlap = (snapshot.size as f32 * snapshot.overlap_factor) as usize;
                let advance = snapshot.size.saturating_sub(overlap).max(1);
                window_buf.drain(..advance.min(window_buf.len()));
                last_emit = Instant::now();
            }
            writer.close();
        });
    }

    fn stop(&mut self) {
        self.thread.stop();
    }
}

fn apply_hann_window(frame: &mut [Complex32]) {
    let n = frame.len();
    if n <= 1 {
        return;
    }
    for (i, sample) in frame.iter_mut().enumerate() {
        let w = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos();
        *sample *= w;
    }
}

/// Simple IMA-ADPCM-style 4-bit delta encoder over the magnitude values,
/// quantized to `u8` first. Not a drop-in replacement for any specific
/// external codec: a compact, named compression token for the waterfall
/// wire format.
fn adpcm_encode(magnitudes: &[f32]) -> Vec<u8> {
    let max = magnitudes.iter().cloned().fold(1e-6f32, f32::max);
    let mut prev: i16 = 0;
    let mut out = Vec::with_capacity(magnitudes.len() / 2 + 1);
    let mut nibble_buf: Option<u8> = None;
    for &m in magnitudes {
        let quantized = ((m / max).clamp(0.0, 1.0) * 255.0) as i16;
        let delta = (quantized - prev).clamp(-8, 7);
        prev += delta;
        let nibble = (delta & 0x0f) as u8;
        match nibble_buf.take() {
            Some(high) => out.push((high << 4) | nibble),
            None => nibble_buf = Some(nibble),
        }
    }
    if let Some(high) = nibble_buf {
        out.push(high << 4);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_output_formats_differ() {
        assert_eq!(FftCompression::Adpcm.output_format(), SampleFormat::Char);
        assert_eq!(FftCompression::None.output_format(), SampleFormat::Float);
    }

    #[test]
    fn set_compression_reports_format_change() {
        let mut chain = FftChain::new(1024, 0.3, 9.0, FftCompression::Adpcm);
        assert!(!chain.set_compression(FftCompression::Adpcm));
        assert!(chain.set_compression(FftCompression::None));
    }

    #[test]
    fn adpcm_encode_halves_sample_count() {
        let magnitudes = vec![1.0f32; 10];
        let encoded = adpcm_encode(&magnitudes);
        assert_eq!(encoded.len(), 5);
    }
}
