// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `ClientDemodulatorChain`: the per-client demodulator pipeline. Backbone
//! is `[Selector, primary, ClientAudioChain]`; a secondary demodulator (and
//! optionally its own selector and a secondary FFT) taps either the raw IF
//! (`selector_buffer`) or the primary's audio output (`audio_buffer`).
//!
//! Kept out of `dsp_core::Chain`: `Selector`/`ClientAudioChain` carry extra
//! methods (`set_power_writer`, `set_nr_enabled`, ...) a `Box<dyn Worker>`
//! would erase, so the backbone is wired by hand here instead of through
//! `Chain::replace`, mirroring the same stop -> reconnect -> start
//! discipline `Chain` uses internally.

use std::sync::Arc;

use dsp_chains::audio_chain::AudioCompression;
use dsp_chains::fft_chain::FftCompression;
use dsp_chains::selector::SQUELCH_DISABLED;
use dsp_chains::{ClientAudioChain, FftChain, Selector};
use dsp_core::buffer::{Buffer, Reader, Writer};
use dsp_core::capability::{Capabilities, Demodulator};
use dsp_core::error::{DspError, DspResult};
use dsp_core::format::SampleFormat;
use dsp_core::worker::{DummyWorker, Worker};
use serde::Serialize;
use tracing::{info, warn};

/// Side-channel update pushed whenever the secondary chain's bandwidth,
/// FFT size, or IF sample rate changes, for a client's spectrum display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SecondaryDspConfig {
    pub secondary_fft_size: Option<usize>,
    pub secondary_bw: Option<u32>,
    pub if_samp_rate: Option<u32>,
}

fn selector_output_rate(
    primary: &Capabilities,
    secondary: Option<&Capabilities>,
    hd_output_rate: u32,
    output_rate: u32,
) -> DspResult<u32> {
    if let Some(rate) = primary.fixed_if_sample_rate {
        return Ok(rate);
    }
    if let Some(sec) = secondary {
        if let Some(rate) = sec.fixed_audio_rate {
            if let Some(primary_rate) = primary.fixed_audio_rate {
                if primary_rate != rate {
                    return Err(DspError::IncompatibleRates {
                        primary_hz: primary_rate,
                        secondary_hz: rate,
                    });
                }
            }
            return Ok(rate);
        }
    }
    Ok(if primary.hd_audio { hd_output_rate } else { output_rate })
}

fn client_audio_input_rate(
    primary: &Capabilities,
    secondary: Option<&Capabilities>,
    hd_output_rate: u32,
    output_rate: u32,
) -> u32 {
    if let Some(rate) = primary.fixed_audio_rate {
        return rate;
    }
    if let Some(rate) = secondary.and_then(|s| s.fixed_audio_rate) {
        return rate;
    }
    if primary.hd_audio {
        hd_output_rate
    } else {
        output_rate
    }
}

fn client_rate(primary: &Capabilities, hd_output_rate: u32, output_rate: u32) -> u32 {
    if primary.hd_audio {
        hd_output_rate
    } else {
        output_rate
    }
}

pub struct ClientDemodulatorChain {
    source_rate: u32,
    output_rate: u32,
    hd_output_rate: u32,

    center_frequency: f64,
    frequency_offset: f64,
    secondary_frequency_offset: f64,
    low_cut: Option<f64>,
    high_cut: Option<f64>,
    squelch_level: f32,

    wfm_deemphasis_tau: f64,
    rds_rbds: bool,

    fft_size: usize,
    fft_overlap: f32,
    fft_fps: f32,
    fft_compression: FftCompression,

    selector: Selector,
    primary: Box<dyn Demodulator>,
    client_audio: ClientAudioChain,

    secondary_selector: Option<Selector>,
    secondary: Option<Box<dyn Demodulator>>,
    secondary_fft: Option<FftChain>,

    selector_buffer: Option<Arc<Buffer>>,
    audio_buffer: Option<Arc<Buffer>>,
    audio_buffer_format: Option<SampleFormat>,
    secondary_input_buffer: Option<Arc<Buffer>>,

    audio_output_writer: Option<Writer>,
    meta_writer: Option<Writer>,
    secondary_fft_writer: Option<Writer>,
    secondary_demod_writer: Option<Writer>,

    secondary_config_sink: Option<Box<dyn FnMut(SecondaryDspConfig) + Send>>,
}

impl ClientDemodulatorChain {
    pub fn new(
        source_rate: u32,
        output_rate: u32,
        hd_output_rate: u32,
        initial_primary: Box<dyn Demodulator>,
    ) -> DspResult<Self> {
        let selector_buffer = Buffer::new(SampleFormat::ComplexFloat);
        let mut selector = Selector::new(source_rate, output_rate);
        selector.set_writer(selector_buffer.writer());

        let mut chain = Self {
            source_rate,
            output_rate,
            hd_output_rate,
            center_frequency: 0.0,
            frequency_offset: 0.0,
            secondary_frequency_offset: 0.0,
            low_cut: None,
            high_cut: None,
            squelch_level: SQUELCH_DISABLED,
            wfm_deemphasis_tau: 50e-6,
            rds_rbds: false,
            fft_size: 2048,
            fft_overlap: 0.3,
            fft_fps: 9.0,
            fft_compression: FftCompression::Adpcm,
            selector,
            primary: Box::new(DummyWorker::with_format(SampleFormat::Float)),
            client_audio: ClientAudioChain::new(output_rate, output_rate),
            secondary_selector: None,
            secondary: None,
            secondary_fft: None,
            selector_buffer: Some(selector_buffer),
            audio_buffer: None,
            audio_buffer_format: None,
            secondary_input_buffer: None,
            audio_output_writer: None,
            meta_writer: None,
            secondary_fft_writer: None,
            secondary_demod_writer: None,
            secondary_config_sink: None,
        };
        chain.set_demodulator(initial_primary)?;
        Ok(chain)
    }

    /// Wire the selector's input to the SDR source and start it. Must be
    /// called once the source reports running; `DspManager` owns the
    /// deferred-start logic.
    pub fn set_source_reader(&mut self, reader: Reader) {
        self.selector.stop();
        self.selector.set_reader(reader);
        self.selector.start();
    }

    pub fn set_secondary_config_sink<F>(&mut self, sink: F)
    where
        F: FnMut(SecondaryDspConfig) + Send + 'static,
    {
        self.secondary_config_sink = Some(Box::new(sink));
    }

    fn notify_secondary(&mut self, config: SecondaryDspConfig) {
        if let Some(sink) = self.secondary_config_sink.as_mut() {
            sink(config);
        }
    }

    fn dial_frequency(&self) -> f64 {
        let mut dial = self.center_frequency + self.frequency_offset;
        if self.secondary_selector.is_some() {
            dial += self.secondary_frequency_offset;
        }
        dial
    }

    fn push_dial_frequency(&mut self) {
        let dial = self.dial_frequency();
        if self.primary.capabilities().dial_frequency_receiver {
            self.primary.set_dial_frequency(dial);
        }
        if let Some(sec) = self.secondary.as_mut() {
            if sec.capabilities().dial_frequency_receiver {
                sec.set_dial_frequency(dial);
            }
        }
    }

    fn resync_squelch(&mut self) {
        let primary_ok = self.primary.capabilities().supports_squelch;
        let secondary_ok = self
            .secondary
            .as_ref()
            .map(|s| s.capabilities().supports_squelch)
            .unwrap_or(true);
        let effective = if primary_ok && secondary_ok {
            self.squelch_level
        } else {
            SQUELCH_DISABLED
        };
        self.selector.set_squelch_level(effective);
    }

    /// Swap the primary demodulator. Rates are validated before anything
    /// running is touched, so a failed transition leaves the previous
    /// configuration untouched and active.
    pub fn set_demodulator(&mut self, mut new: Box<dyn Demodulator>) -> DspResult<()> {
        let new_format = new.output_format().unwrap_or(SampleFormat::Float);
        let _ = self.client_audio.try_set_input_format(new_format);

        let new_caps = new.capabilities();
        let secondary_caps = self.secondary.as_ref().map(|s| s.capabilities());
        let sel_rate = selector_output_rate(&new_caps, secondary_caps.as_ref(), self.hd_output_rate, self.output_rate)?;
        let aud_rate = client_audio_input_rate(&new_caps, secondary_caps.as_ref(), self.hd_output_rate, self.output_rate);
        let cli_rate = client_rate(&new_caps, self.hd_output_rate, self.output_rate);

        self.primary.stop();

        self.selector.set_output_rate(sel_rate);
        new.set_sample_rate(sel_rate);
        if new_caps.deemphasis_tau {
            new.set_deemphasis_tau(self.wfm_deemphasis_tau);
        }
        if new_caps.rds {
            new.set_rds_enabled(self.rds_rbds);
        }
        if new_caps.meta_provider {
            new.set_meta_writer(self.meta_writer.clone());
        }

        self.primary = new;
        self.install_primary_wiring(aud_rate)?;
        self.client_audio.set_client_rate(cli_rate);

        self.push_dial_frequency();
        self.resync_squelch();
        info!(rate = sel_rate, "primary demodulator installed");
        Ok(())
    }

    /// Reader/writer ports are consumed by `Worker::start`; reconnecting a
    /// stage after a stop always needs both resupplied, even when only one
    /// side actually changed.
    fn install_primary_wiring(&mut self, aud_rate: u32) -> DspResult<()> {
        let new_format = self.primary.output_format().unwrap_or(SampleFormat::Float);
        let selector_buffer = self
            .selector_buffer
            .clone()
            .ok_or(DspError::SourceUnavailable)?;
        self.primary.set_reader(selector_buffer.reader());

        let need_new_audio_buffer = self.audio_buffer_format != Some(new_format);
        if need_new_audio_buffer {
            self.audio_buffer = Some(Buffer::new(new_format));
            self.audio_buffer_format = Some(new_format);
        }
        let audio_buffer = self.audio_buffer.clone().expect("audio buffer allocated above");
        self.primary.set_writer(audio_buffer.writer());
        self.primary.start();

        self.client_audio.set_input_rate(aud_rate);
        if need_new_audio_buffer {
            self.client_audio.stop();
            self.client_audio.set_reader(audio_buffer.reader());
            if let Some(writer) = &self.audio_output_writer {
                self.client_audio.set_writer(writer.clone());
            }
            self.client_audio.start();
            self.rebind_secondary_audio_consumer();
        }
        Ok(())
    }

    /// Install a dummy primary matching the old output format (so
    /// `ClientAudioChain` doesn't churn), and drop the secondary chain.
    pub fn stop_demodulator(&mut self) -> DspResult<()> {
        let format = self.primary.output_format().unwrap_or(SampleFormat::Float);
        self.set_demodulator(Box::new(DummyWorker::with_format(format)))?;
        self.set_secondary_demodulator(None)
    }

    /// Swap the secondary demodulator. `None` clears it. Rates are
    /// validated before the old secondary is stopped, same as
    /// `set_demodulator`.
    pub fn set_secondary_demodulator(&mut self, new: Option<Box<dyn Demodulator>>) -> DspResult<()> {
        let primary_caps = self.primary.capabilities();
        let new_caps = new.as_ref().map(|s| s.capabilities());

        let sel_rate = selector_output_rate(&primary_caps, new_caps.as_ref(), self.hd_output_rate, self.output_rate)?;
        let aud_rate = client_audio_input_rate(&primary_caps, new_caps.as_ref(), self.hd_output_rate, self.output_rate);

        if let Some(old) = self.secondary.as_mut() {
            old.stop();
        }
        self.secondary_selector = None;
        self.secondary_fft = None;
        self.secondary = new;

        self.selector.set_output_rate(sel_rate);
        self.primary.set_sample_rate(sel_rate);
        self.client_audio.set_input_rate(aud_rate);

        if let Some(caps) = new_caps {
            if let Some(bw) = caps.secondary_selector_bandwidth {
                let mut sel = Selector::new(sel_rate, bw.max(1_000));
                let half = bw as f64 / 2.0;
                sel.set_bandpass(Some(-half), Some(half));
                sel.set_frequency_offset(self.secondary_frequency_offset);
                self.secondary_selector = Some(sel);
                self.notify_secondary(SecondaryDspConfig {
                    secondary_bw: Some(bw),
                    ..Default::default()
                });
            }
        }

        self.rewire_secondary_input();

        if let Some(sec) = self.secondary.as_mut() {
            if let Some(writer) = &self.secondary_demod_writer {
                sec.set_writer(writer.clone());
            }
            sec.start();
        }
        if let Some(sel) = self.secondary_selector.as_mut() {
            sel.start();
        }

        self.manage_secondary_fft(sel_rate);
        self.push_dial_frequency();
        self.resync_squelch();
        Ok(())
    }

    /// Recompute which buffer the secondary demod reads from (its own
    /// selector's dedicated buffer, the raw IF, or the primary's audio
    /// output) and wire it. Stores the chosen buffer so a later audio
    /// format change can rebind without re-deriving the routing rule.
    fn rewire_secondary_input(&mut self) {
        let Some(sec) = self.secondary.as_mut() else {
            self.secondary_input_buffer = None;
            return;
        };
        let buffer = if let Some(sel) = self.secondary_selector.as_mut() {
            let buf = Buffer::new(SampleFormat::ComplexFloat);
            sel.set_reader(self.selector_buffer.as_ref().expect("selector buffer exists").reader());
            sel.set_writer(buf.writer());
            buf
        } else if sec.input_format() == Some(SampleFormat::ComplexFloat) {
            self.selector_buffer.as_ref().expect("selector buffer exists").clone()
        } else {
            self.audio_buffer.clone().expect("audio buffer exists once primary installed")
        };
        sec.set_reader(buffer.reader());
        self.secondary_input_buffer = Some(buffer);
    }

    /// Re-homes the secondary demod's reader after `audio_buffer` is
    /// reallocated. No-op when the secondary is fed from its own selector
    /// or straight from the raw IF — only an audio-consuming secondary is
    /// affected by the primary's output format changing.
    fn rebind_secondary_audio_consumer(&mut self) {
        if self.secondary_selector.is_some() {
            return;
        }
        let Some(sec) = self.secondary.as_mut() else {
            return;
        };
        if sec.input_format() == Some(SampleFormat::ComplexFloat) {
            return;
        }
        let buf = self.audio_buffer.clone().expect("audio buffer exists");
        sec.stop();
        sec.set_reader(buf.reader());
        if let Some(writer) = &self.secondary_demod_writer {
            sec.set_writer(writer.clone());
        }
        sec.start();
        self.secondary_input_buffer = Some(buf);
    }

    fn manage_secondary_fft(&mut self, sel_rate: u32) {
        let wants_fft = self.primary.capabilities().secondary_fft_shown
            || self
                .secondary
                .as_ref()
                .map(|s| s.capabilities().secondary_fft_shown)
                .unwrap_or(false);

        if !wants_fft {
            self.secondary_fft = None;
            return;
        }
        if self.secondary_fft.is_none() {
            let mut fft = FftChain::new(self.fft_size, self.fft_overlap, self.fft_fps, self.fft_compression);
            fft.set_reader(self.selector_buffer.as_ref().expect("selector buffer exists").reader());
            if let Some(writer) = &self.secondary_fft_writer {
                fft.set_writer(writer.clone());
            }
            fft.start();
            self.secondary_fft = Some(fft);
        }
        self.secondary_fft.as_mut().unwrap().set_sample_rate(sel_rate);
        self.notify_secondary(SecondaryDspConfig {
            if_samp_rate: Some(sel_rate),
            secondary_fft_size: Some(self.fft_size),
            ..Default::default()
        });
    }

    pub fn set_low_cut(&mut self, low_cut: Option<f64>) {
        self.low_cut = low_cut;
        self.selector.set_low_cut(low_cut);
    }

    pub fn set_high_cut(&mut self, high_cut: Option<f64>) {
        self.high_cut = high_cut;
        self.selector.set_high_cut(high_cut);
    }

    pub fn set_bandpass(&mut self, low_cut: Option<f64>, high_cut: Option<f64>) {
        self.low_cut = low_cut;
        self.high_cut = high_cut;
        self.selector.set_bandpass(low_cut, high_cut);
    }

    pub fn set_frequency_offset(&mut self, offset_hz: f64) {
        self.frequency_offset = offset_hz;
        self.selector.set_frequency_offset(offset_hz);
        self.push_dial_frequency();
    }

    pub fn set_secondary_frequency_offset(&mut self, offset_hz: f64) {
        self.secondary_frequency_offset = offset_hz;
        if let Some(sel) = self.secondary_selector.as_mut() {
            sel.set_frequency_offset(offset_hz);
        }
        self.push_dial_frequency();
    }

    pub fn set_center_frequency(&mut self, hz: f64) {
        self.center_frequency = hz;
        self.push_dial_frequency();
    }

    pub fn set_audio_compression(&mut self, compression: AudioCompression) {
        self.client_audio.set_compression(compression);
    }

    pub fn set_nr_enabled(&mut self, enabled: bool) {
        self.client_audio.set_nr_enabled(enabled);
    }

    pub fn set_nr_threshold(&mut self, threshold_dbfs: f32) {
        self.client_audio.set_nr_threshold(threshold_dbfs);
    }

    pub fn set_squelch_level(&mut self, dbfs: f32) {
        self.squelch_level = dbfs;
        self.resync_squelch();
    }

    fn apply_rate_change(&mut self) -> DspResult<()> {
        let primary_caps = self.primary.capabilities();
        let secondary_caps = self.secondary.as_ref().map(|s| s.capabilities());

        if primary_caps.fixed_if_sample_rate.is_none() {
            let sel_rate = selector_output_rate(&primary_caps, secondary_caps.as_ref(), self.hd_output_rate, self.output_rate)?;
            self.selector.set_output_rate(sel_rate);
            self.primary.set_sample_rate(sel_rate);
            if let Some(sel) = self.secondary_selector.as_mut() {
                sel.set_input_rate(sel_rate);
            }
            self.manage_secondary_fft(sel_rate);
        }
        if primary_caps.fixed_audio_rate.is_none() {
            let cli_rate = client_rate(&primary_caps, self.hd_output_rate, self.output_rate);
            self.client_audio.set_client_rate(cli_rate);
        }
        Ok(())
    }

    pub fn set_output_rate(&mut self, rate: u32) -> DspResult<()> {
        self.output_rate = rate;
        self.apply_rate_change()
    }

    pub fn set_hd_output_rate(&mut self, rate: u32) -> DspResult<()> {
        self.hd_output_rate = rate;
        self.apply_rate_change()
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        self.source_rate = rate;
        self.selector.set_input_rate(rate);
    }

    pub fn set_slot_filter(&mut self, slot: i32) {
        if self.primary.capabilities().slot_filter {
            self.primary.set_slot_filter(slot);
        }
    }

    pub fn set_audio_service_id(&mut self, id: i32) {
        if self.primary.capabilities().audio_service_selector {
            self.primary.set_audio_service_id(id);
        }
    }

    pub fn set_wfm_deemphasis_tau(&mut self, tau_seconds: f64) {
        self.wfm_deemphasis_tau = tau_seconds;
        if self.primary.capabilities().deemphasis_tau {
            self.primary.set_deemphasis_tau(tau_seconds);
        }
    }

    pub fn set_rds_rbds(&mut self, enabled: bool) {
        self.rds_rbds = enabled;
        if self.primary.capabilities().rds {
            self.primary.set_rds_enabled(enabled);
        }
    }

    pub fn set_secondary_fft_fps(&mut self, fps: f32) {
        self.fft_fps = fps;
        if let Some(fft) = self.secondary_fft.as_mut() {
            fft.set_fps(fps);
        }
    }

    pub fn set_secondary_fft_overlap(&mut self, overlap_factor: f32) {
        self.fft_overlap = overlap_factor;
        if let Some(fft) = self.secondary_fft.as_mut() {
            fft.set_overlap_factor(overlap_factor);
        }
    }

    pub fn set_secondary_fft_size(&mut self, size: usize) {
        self.fft_size = size;
        if let Some(fft) = self.secondary_fft.as_mut() {
            fft.set_size(size);
            self.notify_secondary(SecondaryDspConfig {
                secondary_fft_size: Some(size),
                ..Default::default()
            });
        }
    }

    /// Returns `true` if this changed the secondary FFT's output format —
    /// the caller (`DspManager`) must re-wire `secondary_fft`'s writer.
    pub fn set_secondary_fft_compression(&mut self, compression: FftCompression) -> bool {
        self.fft_compression = compression;
        self.secondary_fft
            .as_mut()
            .map(|fft| fft.set_compression(compression))
            .unwrap_or(false)
    }

    pub fn secondary_fft_output_format(&self) -> SampleFormat {
        self.secondary_fft
            .as_ref()
            .and_then(|fft| fft.output_format())
            .unwrap_or_else(|| self.fft_compression.output_format())
    }

    pub fn audio_output_format(&self) -> SampleFormat {
        self.client_audio.output_format().unwrap_or(SampleFormat::Char)
    }

    /// Whether the active primary wants the HD audio channel rather than
    /// the regular one. `DspManager` uses this to decide which channel's
    /// `Writer` to hand to `set_audio_writer`.
    pub fn is_hd_audio_active(&self) -> bool {
        self.primary.capabilities().hd_audio
    }

    /// `DspManager` hands this the channel `Writer` for `audio`/`hd_audio`
    /// whenever the active channel changes (a `HdAudio` toggle moves
    /// `ClientAudioChain`'s single output between two distinct buffers).
    pub fn set_audio_writer(&mut self, writer: Writer) {
        self.audio_output_writer = Some(writer.clone());
        self.client_audio.stop();
        if let Some(buf) = &self.audio_buffer {
            self.client_audio.set_reader(buf.reader());
        }
        self.client_audio.set_writer(writer);
        self.client_audio.start();
    }

    pub fn set_power_writer(&mut self, writer: Option<Writer>) {
        self.selector.set_power_writer(writer);
    }

    pub fn set_meta_writer(&mut self, writer: Option<Writer>) {
        self.meta_writer = writer.clone();
        if self.primary.capabilities().meta_provider {
            self.primary.set_meta_writer(writer);
        }
    }

    pub fn set_secondary_fft_writer(&mut self, writer: Option<Writer>) {
        self.secondary_fft_writer = writer.clone();
        let Some(fft) = self.secondary_fft.as_mut() else {
            return;
        };
        let Some(selector_buffer) = self.selector_buffer.clone() else {
            warn!("secondary fft writer set before selector buffer existed");
            return;
        };
        fft.stop();
        fft.set_reader(selector_buffer.reader());
        if let Some(writer) = writer {
            fft.set_writer(writer);
        }
        fft.start();
    }

    pub fn set_secondary_demod_writer(&mut self, writer: Option<Writer>) {
        self.secondary_demod_writer = writer.clone();
        let Some(sec) = self.secondary.as_mut() else {
            return;
        };
        let Some(input) = self.secondary_input_buffer.clone() else {
            warn!("secondary demod writer set before its input buffer existed");
            return;
        };
        sec.stop();
        sec.set_reader(input.reader());
        if let Some(writer) = writer {
            sec.set_writer(writer);
        }
        sec.start();
    }

    /// Stop every running stage. Idempotent, bounded-time: each `Worker`'s
    /// `stop` joins its thread.
    pub fn stop(&mut self) {
        self.selector.stop();
        self.primary.stop();
        self.client_audio.stop();
        if let Some(sec) = self.secondary.as_mut() {
            sec.stop();
        }
        if let Some(sel) = self.secondary_selector.as_mut() {
            sel.stop();
        }
        if let Some(fft) = self.secondary_fft.as_mut() {
            fft.stop();
        }
    }
}

impl Drop for ClientDemodulatorChain {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_chains::demod::analog::{NfmDemodulator, WfmDemodulator};

    fn nfm() -> Box<dyn Demodulator> {
        Box::new(NfmDemodulator::new())
    }

    #[test]
    fn construction_installs_default_primary_and_allocates_audio_buffer() {
        let chain = ClientDemodulatorChain::new(250_000, 12_000, 48_000, nfm()).unwrap();
        assert_eq!(chain.audio_output_format(), SampleFormat::Char);
    }

    #[test]
    fn squelch_is_forced_off_when_primary_lacks_support() {
        let mut chain = ClientDemodulatorChain::new(250_000, 12_000, 48_000, nfm()).unwrap();
        chain.set_squelch_level(-20.0);
        assert_eq!(chain.selector.squelch_level(), -20.0);

        chain
            .set_demodulator(Box::new(WfmDemodulator::new(250_000)))
            .unwrap();
        assert_eq!(chain.selector.squelch_level(), SQUELCH_DISABLED);
    }

    #[test]
    fn hd_audio_primary_uses_hd_output_rate_for_client_rate() {
        let mut chain = ClientDemodulatorChain::new(250_000, 12_000, 48_000, nfm()).unwrap();
        chain.set_output_rate(12_000).unwrap();
        chain.set_hd_output_rate(48_000).unwrap();
        // NFM has no HdAudio capability: client rate should stay at output_rate.
        assert_eq!(chain.client_audio.client_rate(), 12_000);
    }

    #[test]
    fn wfm_primary_routes_client_rate_to_hd_output_rate() {
        let mut chain = ClientDemodulatorChain::new(250_000, 12_000, 48_000, nfm()).unwrap();
        chain
            .set_demodulator(Box::new(WfmDemodulator::new(250_000)))
            .unwrap();
        // WFM declares HdAudio: client rate should follow hd_output_rate.
        assert_eq!(chain.client_audio.client_rate(), 48_000);
    }

    #[test]
    fn round_trip_mode_switch_restores_client_rate() {
        let mut chain = ClientDemodulatorChain::new(250_000, 12_000, 48_000, nfm()).unwrap();
        let before = chain.client_audio.client_rate();
        chain
            .set_demodulator(Box::new(WfmDemodulator::new(250_000)))
            .unwrap();
        chain.set_demodulator(nfm()).unwrap();
        assert_eq!(chain.client_audio.client_rate(), before);
    }

    #[test]
    fn dial_frequency_includes_secondary_offset_only_when_selector_active() {
        let mut chain = ClientDemodulatorChain::new(250_000, 12_000, 48_000, nfm()).unwrap();
        chain.set_center_frequency(14_074_000.0);
        chain.set_frequency_offset(1_000.0);
        chain.set_secondary_frequency_offset(500.0);
        assert_eq!(chain.dial_frequency(), 14_075_000.0);
    }
}
