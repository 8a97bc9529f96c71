// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Analog demodulators: FM discriminator (NFM/WFM), envelope/product
//! detector (AM/SAM), and the trivial real-part extraction SSB/CW need
//! once the selector has already shifted and bandpass-filtered to
//! baseband.

use std::sync::{Arc, Mutex};

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::capability::{Capabilities, Demodulator};
use dsp_core::{SampleFormat, Worker, WorkerThread};
use num_complex::Complex32;
use tracing::debug;

use crate::demod::rds::RdsDecoder;
use crate::primitives::{complex_from_bytes, floats_to_bytes, OnePole};
use dsp_core::decode::DecodedMessage;

/// FM discriminator: `atan2` of each sample against the previous one,
/// normalized so a full +/-pi phase step per sample maps to +/-1.0.
fn fm_discriminate(samples: &[Complex32], prev: &mut Complex32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    for &sample in samples {
        let delta = sample * prev.conj();
        out.push(delta.arg() / std::f32::consts::PI);
        *prev = sample;
    }
    out
}

fn envelope_detect(samples: &[Complex32]) -> Vec<f32> {
    samples.iter().map(|c| c.norm()).collect()
}

pub struct NfmDemodulator {
    reader: Option<Reader>,
    writer: Option<Writer>,
    thread: WorkerThread,
}

impl NfmDemodulator {
    pub fn new() -> Self {
        Self {
            reader: None,
            writer: None,
            thread: WorkerThread::new(),
        }
    }
}

impl Default for NfmDemodulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker for NfmDemodulator {
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
        Some(SampleFormat::Float)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        self.thread.spawn(move |running| {
            let mut prev = Complex32::new(1.0, 0.0);
            while let Some(bytes) = reader.read_interruptible(&running) {
                let samples = complex_from_bytes(&bytes);
                let audio = fm_discriminate(&samples, &mut prev);
                if writer.write(&floats_to_bytes(&audio)) == WriteOutcome::Idle {
                    debug!("nfm: no readers left, idling");
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

impl Demodulator for NfmDemodulator {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_squelch().with_secondary_fft_shown()
    }
}

/// Wideband FM: same discriminator as NFM, plus de-emphasis and an
/// optional RDS subcarrier decode tapped before the de-emphasis low-pass
/// (the 57 kHz subcarrier sits well above the audio de-emphasis corner).
pub struct WfmDemodulator {
    reader: Option<Reader>,
    writer: Option<Writer>,
    meta_writer: Arc<Mutex<Option<Writer>>>,
    deemphasis_tau: Arc<Mutex<f64>>,
    rds_enabled: Arc<Mutex<bool>>,
    sample_rate: Arc<Mutex<u32>>,
    thread: WorkerThread,
}

impl WfmDemodulator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            reader: None,
            writer: None,
            meta_writer: Arc::new(Mutex::new(None)),
            deemphasis_tau: Arc::new(Mutex::new(50e-6)),
            rds_enabled: Arc::new(Mutex::new(false)),
            sample_rate: Arc::new(Mutex::new(sample_rate)),
            thread: WorkerThread::new(),
        }
    }

    pub fn set_deemphasis_tau(&mut self, tau_seconds: f64) {
        *self.deemphasis_tau.lock().unwrap() = tau_seconds;
    }

    pub fn set_rds_enabled(&mut self, enabled: bool) {
        *self.rds_enabled.lock().unwrap() = enabled;
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        *self.sample_rate.lock().unwrap() = rate;
    }

    /// Install the sidecar writer that receives newline-delimited JSON
    /// `DecodedMessage::Rds` records as PS/RadioText groups complete.
    pub fn set_meta_writer(&mut self, writer: Option<Writer>) {
        *self.meta_writer.lock().unwrap() = writer;
    }
}

impl Default for WfmDemodulator {
    fn default() -> Self {
        Self::new(250_000)
    }
}

impl Worker for WfmDemodulator {
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
        Some(SampleFormat::Float)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let meta_writer = Arc::clone(&self.meta_writer);
        let deemphasis_tau = Arc::clone(&self.deemphasis_tau);
        let rds_enabled = Arc::clone(&self.rds_enabled);
        let sample_rate = Arc::clone(&self.sample_rate);
        self.thread.spawn(move |running| {
            let mut prev = Complex32::new(1.0, 0.0);
            let rate = *sample_rate.lock().unwrap();
            let mut deemph = OnePole::from_tau(rate, *deemphasis_tau.lock().unwrap());
            let mut active_tau = *deemphasis_tau.lock().unwrap();
            let mut rds = RdsDecoder::new(rate);

            while let Some(bytes) = reader.read_interruptible(&running) {
                let samples = complex_from_bytes(&bytes);
                let discriminated = fm_discriminate(&samples, &mut prev);

                if *rds_enabled.lock().unwrap() {
                    if let Some(meta) = meta_writer.lock().unwrap().as_ref() {
                        for &sample in &discriminated {
                            if let Some(snapshot) = rds.process_sample(sample) {
                                let record = DecodedMessage::Rds(snapshot);
                                if let Ok(mut line) = serde_json::to_vec(&record) {
                                    line.push(b'\n');
                                    meta.write(&line);
                                }
                            }
                        }
                    }
                }

                let tau = *deemphasis_tau.lock().unwrap();
                if (tau - active_tau).abs() > f64::EPSILON {
                    deemph = OnePole::from_tau(rate, tau);
                    active_tau = tau;
                }
                let audio: Vec<f32> = discriminated.iter().map(|&s| deemph.process(s)).collect();

                if writer.write(&floats_to_bytes(&audio)) == WriteOutcome::Idle {
                    debug!("wfm: no readers left, idling");
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

impl Demodulator for WfmDemodulator {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with_hd_audio()
            .with_deemphasis_tau()
            .with_rds()
            .with_meta_provider()
            .with_secondary_fft_shown()
    }

    fn set_sample_rate(&mut self, rate: u32) {
        self.set_sample_rate(rate);
    }

    fn set_deemphasis_tau(&mut self, tau_seconds: f64) {
        self.set_deemphasis_tau(tau_seconds);
    }

    fn set_rds_enabled(&mut self, enabled: bool) {
        self.set_rds_enabled(enabled);
    }

    fn set_meta_writer(&mut self, writer: Option<Writer>) {
        self.set_meta_writer(writer);
    }
}

/// Envelope (AM) or crudely-synchronous (SAM) detector. SAM here skips
/// carrier phase tracking (no PLL): it removes the DC bias a plain
/// envelope detector leaves behind, which is the practical difference a
/// listener notices between the two modes at this scope.
pub struct AmDemodulator {
    reader: Option<Reader>,
    writer: Option<Writer>,
    synchronous: bool,
    thread: WorkerThread,
}

impl AmDemodulator {
    pub fn new(synchronous: bool) -> Self {
        Self {
            reader: None,
            writer: None,
            synchronous,
            thread: WorkerThread::new(),
        }
    }
}

impl Worker for AmDemodulator {
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
        Some(SampleFormat::Float)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let synchronous = self.synchronous;
        self.thread.spawn(move |running| {
            let mut dc = OnePole::from_tau(48_000, 0.05);
            while let Some(bytes) = reader.read_interruptible(&running) {
                let samples = complex_from_bytes(&bytes);
                let mut audio = envelope_detect(&samples);
                if synchronous {
                    for sample in &mut audio {
                        let bias = dc.process(*sample);
                        *sample -= bias;
                    }
                }
                if writer.write(&floats_to_bytes(&audio)) == WriteOutcome::Idle {
                    debug!("am: no readers left, idling");
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

impl Demodulator for AmDemodulator {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_squelch().with_secondary_fft_shown()
    }
}

/// SSB/CW: the selector has already mixed the dial offset to baseband and
/// bandpass-filtered to the (asymmetric) sideband passband, so recovering
/// audio is just taking the real part.
pub struct SsbDemodulator {
    reader: Option<Reader>,
    writer: Option<Writer>,
    thread: WorkerThread,
}

impl SsbDemodulator {
    pub fn new() -> Self {
        Self {
            reader: None,
            writer: None,
            thread: WorkerThread::new(),
        }
    }
}

impl Default for SsbDemodulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker for SsbDemodulator {
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
        Some(SampleFormat::Float)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        self.thread.spawn(move |running| {
            while let Some(bytes) = reader.read_interruptible(&running) {
                let samples = complex_from_bytes(&bytes);
                let audio: Vec<f32> = samples.iter().map(|c| c.re).collect();
                if writer.write(&floats_to_bytes(&audio)) == WriteOutcome::Idle {
                    debug!("ssb: no readers left, idling");
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

impl Demodulator for SsbDemodulator {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_squelch().with_secondary_fft_shown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fm_discriminator_is_zero_for_constant_phase() {
        let mut prev = Complex32::new(1.0, 0.0);
        let samples = vec![Complex32::new(1.0, 0.0); 4];
        let audio = fm_discriminate(&samples, &mut prev);
        assert!(audio.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn envelope_detect_tracks_magnitude() {
        let samples = vec![Complex32::new(3.0, 4.0)];
        assert_eq!(envelope_detect(&samples), vec![5.0]);
    }
}
