// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wires demodulator constructors to the mode tokens `dsp_core::mode`
//! already catalogued. Kept in this crate (not `dsp-core`) because it
//! depends on the concrete demodulator types; `dsp-core` stays free of
//! any knowledge of how a given mode is actually implemented.

use dsp_core::capability::Demodulator;
use dsp_core::mode::ModeRegistry;

use crate::demod::analog::{AmDemodulator, NfmDemodulator, SsbDemodulator, WfmDemodulator};
use crate::demod::chopper::ChoppedExternalDemodulator;
use crate::demod::external::{ExternalProcessDemodulator, ExternalProcessSpec};
use crate::demod::packet::PacketDemodulator;
use dsp_core::capability::Capabilities;
use dsp_core::format::SampleFormat;

fn build_nfm() -> Box<dyn Demodulator> {
    Box::new(NfmDemodulator::new())
}

fn build_wfm() -> Box<dyn Demodulator> {
    Box::new(WfmDemodulator::new(250_000))
}

fn build_am() -> Box<dyn Demodulator> {
    Box::new(AmDemodulator::new(false))
}

fn build_sam() -> Box<dyn Demodulator> {
    Box::new(AmDemodulator::new(true))
}

fn build_ssb() -> Box<dyn Demodulator> {
    Box::new(SsbDemodulator::new())
}

/// Audio sample rate `jt9`/`wsprd` expect on stdin, independent of
/// whatever output rate the client's primary demodulator is running at.
const DIGIMODE_AUDIO_RATE: u32 = 12_000;
const FT8_CYCLE_SECONDS: u32 = 15;
const WSPR_CYCLE_SECONDS: u32 = 120;

fn build_ft8() -> Box<dyn Demodulator> {
    let inner = ExternalProcessDemodulator::new(
        ExternalProcessSpec::new("jt9", vec!["--ft8".to_string(), "-".to_string()]),
        SampleFormat::Float,
        SampleFormat::Char,
        Capabilities::none().with_fixed_audio_rate(DIGIMODE_AUDIO_RATE),
    );
    Box::new(ChoppedExternalDemodulator::new(
        DIGIMODE_AUDIO_RATE,
        FT8_CYCLE_SECONDS,
        inner,
    ))
}

fn build_wspr() -> Box<dyn Demodulator> {
    let inner = ExternalProcessDemodulator::new(
        ExternalProcessSpec::new("wsprd", vec!["-".to_string()]),
        SampleFormat::Float,
        SampleFormat::Char,
        Capabilities::none().with_fixed_audio_rate(DIGIMODE_AUDIO_RATE),
    );
    Box::new(ChoppedExternalDemodulator::new(
        DIGIMODE_AUDIO_RATE,
        WSPR_CYCLE_SECONDS,
        inner,
    ))
}

fn build_packet() -> Box<dyn Demodulator> {
    Box::new(PacketDemodulator::new(48_000, 1200))
}

fn build_ais() -> Box<dyn Demodulator> {
    Box::new(PacketDemodulator::new(48_000, 9600))
}

/// Registers a demodulator constructor for every mode token this crate
/// can actually build. `dmr`/`bpsk31`/`dab` are cataloged (in
/// `dsp_core::mode`) but have no demodulator here yet; requesting them
/// surfaces as `UnknownMode`, same as any other unregistered token.
pub fn register_builtin_demodulators(registry: &mut ModeRegistry) {
    registry.register_factory("nfm", build_nfm);
    registry.register_factory("wfm", build_wfm);
    registry.register_factory("am", build_am);
    registry.register_factory("sam", build_sam);
    registry.register_factory("usb", build_ssb);
    registry.register_factory("lsb", build_ssb);
    registry.register_factory("cw", build_ssb);
    registry.register_factory("ft8", build_ft8);
    registry.register_factory("wspr", build_wspr);
    registry.register_factory("packet", build_packet);
    registry.register_factory("ais", build_ais);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::mode::register_builtin_modes;

    #[test]
    fn registered_tokens_are_buildable() {
        let mut registry = ModeRegistry::new();
        register_builtin_modes(&mut registry);
        register_builtin_demodulators(&mut registry);
        for token in ["nfm", "wfm", "am", "sam", "usb", "lsb", "cw", "packet", "ais"] {
            assert!(registry.build(token).is_ok(), "{token} should build");
        }
    }

    #[test]
    fn unregistered_token_is_unknown_mode() {
        let mut registry = ModeRegistry::new();
        register_builtin_modes(&mut registry);
        register_builtin_demodulators(&mut registry);
        assert!(registry.build("dmr").is_err());
    }
}
