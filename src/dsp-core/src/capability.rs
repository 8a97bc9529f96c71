// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Demodulator capability tags.
//!
//! The original dispatch checked concrete demodulator types at runtime
//! (`isinstance`) to decide which behaviors applied. Here every demodulator
//! declares its capabilities up front as an explicit bit set; orchestrator
//! code consults `Capabilities`, never a type test.

/// Orthogonal capability tags a demodulator (primary or secondary) may
/// declare. Multiple tags can be set simultaneously.
/// A `Worker` that additionally advertises its `Capabilities`. All
/// demodulators (primary and secondary) implement this; the orchestrator
/// never downcasts to a concrete demodulator type, it only reads tags.
///
/// The `set_*` methods mirror the capability tags: the orchestrator calls
/// one only when `capabilities()` set the matching flag. A demodulator
/// that doesn't declare a flag can leave the corresponding method at its
/// no-op default.
pub trait Demodulator: crate::worker::Worker {
    fn capabilities(&self) -> Capabilities;

    /// Push the selector's current output rate (this demod's input IF
    /// rate), for demodulators whose internal filters are rate-dependent
    /// (e.g. WFM de-emphasis, RDS bit timing).
    fn set_sample_rate(&mut self, _rate: u32) {}
    /// `DeemphasisTau` capability.
    fn set_deemphasis_tau(&mut self, _tau_seconds: f64) {}
    /// `Rds` capability.
    fn set_rds_enabled(&mut self, _enabled: bool) {}
    /// `MetaProvider` capability: the writer metadata records are sent to.
    fn set_meta_writer(&mut self, _writer: Option<crate::buffer::Writer>) {}
    /// `DialFrequencyReceiver` capability.
    fn set_dial_frequency(&mut self, _hz: f64) {}
    /// `SlotFilter` capability (e.g. DMR talkgroup/slot).
    fn set_slot_filter(&mut self, _slot: i32) {}
    /// `AudioServiceSelector` capability (e.g. DAB service id).
    fn set_audio_service_id(&mut self, _id: i32) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Capabilities {
    /// Demodulator requires the selector to output at a fixed IF rate,
    /// independent of the client's requested output rate (e.g. DAB).
    pub fixed_if_sample_rate: Option<u32>,
    /// Demodulator requires audio at a fixed rate, independent of the
    /// client's requested output rate (e.g. a digital voice vocoder).
    pub fixed_audio_rate: Option<u32>,
    /// Demodulator can produce a second, higher-rate "HD" audio output.
    pub hd_audio: bool,
    /// Demodulator accepts a de-emphasis time constant (WFM).
    pub deemphasis_tau: bool,
    /// Demodulator accepts an RDS/RBDS toggle (WFM).
    pub rds: bool,
    /// Demodulator publishes structured metadata (e.g. RDS PS/RT).
    pub meta_provider: bool,
    /// Demodulator wants dial-frequency (center + offset) pushes.
    pub dial_frequency_receiver: bool,
    /// Demodulator accepts a slot/talkgroup filter (e.g. DMR).
    pub slot_filter: bool,
    /// Demodulator can select among multiple audio services (e.g. DAB).
    pub audio_service_selector: bool,
    /// Demodulator wants a secondary selector ahead of it, with the given
    /// bandwidth in Hz.
    pub secondary_selector_bandwidth: Option<u32>,
    /// Demodulator's secondary spectrum should be shown to the client.
    pub secondary_fft_shown: bool,
    /// Demodulator honors a squelch level; when absent, squelch is
    /// forced off for that mode regardless of the configured level.
    pub supports_squelch: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_fixed_if_sample_rate(mut self, hz: u32) -> Self {
        self.fixed_if_sample_rate = Some(hz);
        self
    }

    pub fn with_fixed_audio_rate(mut self, hz: u32) -> Self {
        self.fixed_audio_rate = Some(hz);
        self
    }

    pub fn with_hd_audio(mut self) -> Self {
        self.hd_audio = true;
        self
    }

    pub fn with_deemphasis_tau(mut self) -> Self {
        self.deemphasis_tau = true;
        self
    }

    pub fn with_rds(mut self) -> Self {
        self.rds = true;
        self
    }

    pub fn with_meta_provider(mut self) -> Self {
        self.meta_provider = true;
        self
    }

    pub fn with_dial_frequency_receiver(mut self) -> Self {
        self.dial_frequency_receiver = true;
        self
    }

    pub fn with_slot_filter(mut self) -> Self {
        self.slot_filter = true;
        self
    }

    pub fn with_audio_service_selector(mut self) -> Self {
        self.audio_service_selector = true;
        self
    }

    pub fn with_secondary_selector_bandwidth(mut self, hz: u32) -> Self {
        self.secondary_selector_bandwidth = Some(hz);
        self
    }

    pub fn with_secondary_fft_shown(mut self) -> Self {
        self.secondary_fft_shown = true;
        self
    }

    pub fn with_squelch(mut self) -> Self {
        self.supports_squelch = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_only_requested_tags() {
        let caps = Capabilities::none()
            .with_fixed_if_sample_rate(2_048_000)
            .with_hd_audio();
        assert_eq!(caps.fixed_if_sample_rate, Some(2_048_000));
        assert!(caps.hd_audio);
        assert!(!caps.rds);
        assert_eq!(caps.fixed_audio_rate, None);
    }
}
