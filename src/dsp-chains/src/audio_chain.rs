// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `ClientAudioChain`: resamples demodulated audio to the client's
//! requested rate, applies an optional noise-reduction gate, and
//! compresses to the named wire format the client asked for.
//!
//! Compression formats here are named tokens, not bit-exact
//! reimplementations of a particular external codec (that's excluded by
//! this crate's scope) — `pcm16` is uncompressed 16-bit PCM and `adpcm`
//! is a simple 4-bit delta codec, matching the compression semantics the
//! secondary FFT chain already uses for its own named tokens.

use std::sync::{Arc, Mutex};

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::error::{DspError, DspResult};
use dsp_core::{SampleFormat, Worker, WorkerThread};
use tracing::debug;

use crate::primitives::{floats_from_bytes, RealRateConverter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCompression {
    Pcm16,
    Adpcm,
}

impl AudioCompression {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "pcm16" | "none" => Some(Self::Pcm16),
            "adpcm" => Some(Self::Adpcm),
            _ => None,
        }
    }
}

struct AudioParams {
    input_format: SampleFormat,
    input_rate: u32,
    client_rate: u32,
    compression: AudioCompression,
    nr_enabled: bool,
    nr_threshold_dbfs: f32,
}

pub struct ClientAudioChain {
    reader: Option<Reader>,
    writer: Option<Writer>,
    params: Arc<Mutex<AudioParams>>,
    thread: WorkerThread,
}

impl ClientAudioChain {
    pub fn new(input_rate: u32, client_rate: u32) -> Self {
        Self {
            reader: None,
            writer: None,
            params: Arc::new(Mutex::new(AudioParams {
                input_format: SampleFormat::Float,
                input_rate,
                client_rate,
                compression: AudioCompression::Pcm16,
                nr_enabled: false,
                nr_threshold_dbfs: -40.0,
            })),
            thread: WorkerThread::new(),
        }
    }

    /// Push the new primary demod's output format; rejection (anything
    /// other than `Float`/`Short`) is swallowed by the caller per the
    /// orchestrator's `set_demodulator` sequence.
    pub fn try_set_input_format(&mut self, format: SampleFormat) -> DspResult<()> {
        if format != SampleFormat::Float && format != SampleFormat::Short {
            return Err(DspError::FormatMismatch {
                expected: SampleFormat::Float,
                actual: format,
            });
        }
        self.params.lock().unwrap().input_format = format;
        Ok(())
    }

    pub fn set_input_rate(&mut self, rate: u32) {
        self.params.lock().unwrap().input_rate = rate;
    }

    pub fn set_client_rate(&mut self, rate: u32) {
        self.params.lock().unwrap().client_rate = rate;
    }

    pub fn client_rate(&self) -> u32 {
        self.params.lock().unwrap().client_rate
    }

    pub fn set_compression(&mut self, compression: AudioCompression) {
        self.params.lock().unwrap().compression = compression;
    }

    pub fn set_nr_enabled(&mut self, enabled: bool) {
        self.params.lock().unwrap().nr_enabled = enabled;
    }

    pub fn set_nr_threshold(&mut self, threshold_dbfs: f32) {
        self.params.lock().unwrap().nr_threshold_dbfs = threshold_dbfs;
    }
}

impl Worker for ClientAudioChain {
    fn set_reader(&mut self, reader: Reader) {
        self.reader = Some(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.writer = Some(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        Some(self.params.lock().unwrap().input_format)
    }

    fn output_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::Char)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let params = Arc::clone(&self.params);
        self.thread.spawn(move |running| {
            let mut active_rates = {
                let p = params.lock().unwrap();
                (p.input_rate, p.client_rate)
            };
            let mut converter = RealRateConverter::new(active_rates.0, active_rates.1);
            let mut nr_state = 0.0f32;

            while let Some(bytes) = reader.read_interruptible(&running) {
                let snapshot_format;
                let snapshot_compression;
                let snapshot_nr;
                {
                    let p = params.lock().unwrap();
                    snapshot_format = p.input_format;
                    snapshot_compression = p.compression;
                    snapshot_nr = (p.nr_enabled, p.nr_threshold_dbfs);
                    let rates = (p.input_rate, p.client_rate);
                    if rates != active_rates {
                        converter = RealRateConverter::new(rates.0, rates.1);
                        active_rates = rates;
                    }
                }

                let samples = match snapshot_format {
                    SampleFormat::Float => floats_from_bytes(&bytes),
                    SampleFormat::Short => bytes
                        .chunks_exact(2)
                        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
                        .collect(),
                    _ => Vec::new(),
                };

                let resampled = converter.process(&samples);
                let denoised = if snapshot_nr.0 {
                    apply_noise_gate(&resampled, snapshot_nr.1, &mut nr_state)
                } else {
                    resampled
                };

                let payload = match snapshot_compression {
                    AudioCompression::Pcm16 => encode_pcm16(&denoised),
                    AudioCompression::Adpcm => encode_adpcm(&denoised),
                };

                if writer.write(&payload) == WriteOutcome::Idle {
                    debug!("audio_chain: no readers left, idling");
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

/// A one-pole smoothed noise gate: samples below `threshold_dbfs` are
/// attenuated toward silence rather than hard-clipped, avoiding audible
/// chatter at the gate boundary.
fn apply_noise_gate(samples: &[f32], threshold_dbfs: f32, state: &mut f32) -> Vec<f32> {
    let threshold_linear = 10f32.powf(threshold_dbfs / 20.0);
    samples
        .iter()
        .map(|&s| {
            let target = if s.abs() >= threshold_linear { 1.0 } else { 0.0 };
            *state += 0.2 * (target - *state);
            s * *state
        })
        .collect()
}

fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&clamped.to_le_bytes());
    }
    out
}

fn encode_adpcm(samples: &[f32]) -> Vec<u8> {
    let mut prev: i16 = 0;
    let mut out = Vec::with_capacity(samples.len() / 2 + 1);
    let mut nibble_buf: Option<u8> = None;
    for &s in samples {
        let quantized = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        let delta = ((quantized - prev) >> 9).clamp(-8, 7);
        prev = prev.saturating_add(delta << 9);
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
    fn rejects_complex_float_input_format() {
        let mut chain = ClientAudioChain::new(12_000, 12_000);
        let err = chain
            .try_set_input_format(SampleFormat::ComplexFloat)
            .unwrap_err();
        assert!(matches!(err, DspError::FormatMismatch { .. }));
    }

    #[test]
    fn noise_gate_silences_samples_below_threshold() {
        let mut state = 0.0;
        let quiet = vec![0.0001f32; 50];
        let out = apply_noise_gate(&quiet, -20.0, &mut state);
        assert!(out.iter().all(|&s| s.abs() < 0.001));
    }

    #[test]
    fn pcm16_round_trips_full_scale() {
        let encoded = encode_pcm16(&[1.0, -1.0, 0.0]);
        assert_eq!(encoded.len(), 6);
    }
}
