// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The mode catalog and the mode-token → demodulator-constructor registry.
//!
//! The original dispatched on mode token through a long `if`/`elif`
//! cascade. Per the redesign, that becomes a registry populated at
//! startup (mirroring `trx-backend::RegistrationContext`): a lowercase
//! token maps to a constructor function, and unknown tokens are a single
//! `UnknownMode` error instead of falling off the end of a chain of
//! comparisons. This is a maintenance artifact, not a design requirement.

use std::collections::HashMap;

use crate::capability::Demodulator;
use crate::error::{DspError, DspResult};

/// Passband edges relative to the dial frequency. `None` on either side
/// means no constraint on that edge (low-pass- or high-pass-only).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bandpass {
    pub low_cut: Option<f64>,
    pub high_cut: Option<f64>,
}

impl Bandpass {
    pub fn new(low_cut: f64, high_cut: f64) -> Self {
        Self {
            low_cut: Some(low_cut),
            high_cut: Some(high_cut),
        }
    }

    /// Minimum IF bandwidth this bandpass needs, mirroring the original's
    /// `get_bandwidth`: twice the wider excursion from zero, so a
    /// passband offset far from DC is still captured symmetrically.
    pub fn bandwidth(&self, min_if_rate: u32) -> u32 {
        let edge = self
            .low_cut
            .unwrap_or(0.0)
            .abs()
            .max(self.high_cut.unwrap_or(0.0).abs());
        ((edge * 2.0) as u32).max(min_if_rate)
    }
}

/// One entry in the mode catalog: a lowercase token plus the metadata the
/// orchestrator needs before it ever constructs a demodulator for it.
#[derive(Debug, Clone)]
pub struct Mode {
    pub modulation: String,
    pub name: String,
    pub requirements: Vec<String>,
    pub service: bool,
    pub bandpass: Option<Bandpass>,
    /// Fixed IF sample rate this mode demands of the selector (DAB-like
    /// modes), independent of the client's requested output rate.
    pub if_rate: Option<u32>,
    pub squelch: bool,
    /// For a digital overlay, the analog mode(s) it rides on top of.
    /// Empty for analog modes.
    pub underlying: Vec<String>,
    pub secondary_fft: bool,
}

impl Mode {
    pub fn analog(token: &str, name: &str, bandpass: Bandpass) -> Self {
        Self {
            modulation: token.to_string(),
            name: name.to_string(),
            requirements: Vec::new(),
            service: false,
            bandpass: Some(bandpass),
            if_rate: None,
            squelch: true,
            underlying: Vec::new(),
            secondary_fft: true,
        }
    }

    pub fn digital(token: &str, name: &str, underlying: &[&str]) -> Self {
        Self {
            modulation: token.to_string(),
            name: name.to_string(),
            requirements: Vec::new(),
            service: false,
            bandpass: None,
            if_rate: None,
            squelch: false,
            underlying: underlying.iter().map(|s| s.to_string()).collect(),
            secondary_fft: true,
        }
    }

    pub fn with_requirements(mut self, reqs: &[&str]) -> Self {
        self.requirements = reqs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_if_rate(mut self, hz: u32) -> Self {
        self.if_rate = Some(hz);
        self
    }

    pub fn with_squelch(mut self, squelch: bool) -> Self {
        self.squelch = squelch;
        self
    }

    pub fn as_service(mut self) -> Self {
        self.service = true;
        self
    }

    pub fn without_secondary_fft(mut self) -> Self {
        self.secondary_fft = false;
        self
    }
}

fn normalize_token(token: &str) -> String {
    token.to_ascii_lowercase()
}

/// Constructs a demodulator for a registered mode token. Pure function
/// pointer, not a closure, matching `trx-backend::BackendFactory` — every
/// mode is a stateless constructor, any per-instance state lives on the
/// `Box<dyn Demodulator>` it returns.
pub type DemodulatorFactory = fn() -> Box<dyn Demodulator>;

/// Mode catalog plus demodulator-constructor registry. Built once at
/// startup: the catalog is populated by `register_builtin_modes` (this
/// crate) and demodulator factories by `dsp_chains::register_builtin_demodulators`
/// (it depends on `dsp-core`, not the reverse).
#[derive(Default)]
pub struct ModeRegistry {
    modes: HashMap<String, Mode>,
    factories: HashMap<String, DemodulatorFactory>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mode(&mut self, mode: Mode) {
        self.modes.insert(normalize_token(&mode.modulation), mode);
    }

    pub fn register_factory(&mut self, token: &str, factory: DemodulatorFactory) {
        self.factories.insert(normalize_token(token), factory);
    }

    pub fn mode(&self, token: &str) -> Option<&Mode> {
        self.modes.get(&normalize_token(token))
    }

    pub fn is_registered(&self, token: &str) -> bool {
        self.factories.contains_key(&normalize_token(token))
    }

    pub fn registered_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.factories.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn build(&self, token: &str) -> DspResult<Box<dyn Demodulator>> {
        let key = normalize_token(token);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| DspError::UnknownMode(token.to_string()))?;
        Ok(factory())
    }
}

/// The catalog data itself — tokens, bandpass, requirement tags, service/
/// squelch/secondary-FFT flags. Grounded on the original mode catalog;
/// kept here even though demodulator construction for every entry isn't
/// implemented, because the registry *shape* (not full mode coverage) is
/// what the redesign calls for.
pub fn register_builtin_modes(registry: &mut ModeRegistry) {
    registry.register_mode(Mode::analog("nfm", "FM", Bandpass::new(-4000.0, 4000.0)));
    registry.register_mode(Mode::analog("wfm", "WFM", Bandpass::new(-75000.0, 75000.0)));
    registry.register_mode(Mode::analog("am", "AM", Bandpass::new(-4000.0, 4000.0)));
    registry.register_mode(Mode::analog("lsb", "LSB", Bandpass::new(-2750.0, -150.0)));
    registry.register_mode(Mode::analog("usb", "USB", Bandpass::new(150.0, 2750.0)));
    registry.register_mode(Mode::analog("cw", "CW", Bandpass::new(700.0, 900.0)));
    registry.register_mode(Mode::analog("sam", "SAM", Bandpass::new(-4000.0, 4000.0)));
    registry.register_mode(
        Mode::analog("dmr", "DMR", Bandpass::new(-6250.0, 6250.0))
            .with_requirements(&["digital_voice"])
            .with_squelch(false),
    );
    registry.register_mode(
        Mode {
            bandpass: None,
            if_rate: Some(2_048_000),
            ..Mode::digital("dab", "DAB", &[])
        }
        .with_requirements(&["dab"]),
    );
    registry.register_mode(Mode::digital("bpsk31", "BPSK31", &["usb"]));
    registry.register_mode(Mode::digital("ft8", "FT8", &["usb"]).with_requirements(&["ft8"]));
    registry.register_mode(
        Mode::digital("wspr", "WSPR", &["usb"])
            .with_requirements(&["wspr"])
            .as_service(),
    );
    registry.register_mode(
        Mode::digital("ais", "AIS", &["nfm"])
            .with_requirements(&["ais"])
            .as_service()
            .without_secondary_fft(),
    );
    registry.register_mode(
        Mode::digital("packet", "Packet/APRS", &["nfm"])
            .with_requirements(&["packet"])
            .as_service(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lookup_is_case_insensitive() {
        let mut registry = ModeRegistry::new();
        register_builtin_modes(&mut registry);
        assert!(registry.mode("NFM").is_some());
        assert!(registry.mode("nfm").is_some());
    }

    #[test]
    fn unknown_token_has_no_mode() {
        let registry = ModeRegistry::new();
        assert!(registry.mode("bogus").is_none());
    }

    #[test]
    fn bandwidth_is_twice_the_widest_edge() {
        let bp = Bandpass::new(-4000.0, 4000.0);
        assert_eq!(bp.bandwidth(0), 8000);
    }
}
