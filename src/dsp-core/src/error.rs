// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

use crate::format::SampleFormat;

pub type DspResult<T> = Result<T, DspError>;

/// Structural errors the demodulator graph can raise while reconfiguring.
#[derive(Debug, Error)]
pub enum DspError {
    /// Two stages were connected, or a replacement installed, whose
    /// input/output formats don't match. Expected transiently during
    /// reconfiguration; the orchestrator either re-issues the mutation in
    /// the correct order or rewires the affected output channel.
    #[error("format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        expected: SampleFormat,
        actual: SampleFormat,
    },

    /// A primary/secondary demodulator pair demanded mutually incompatible
    /// fixed rates. Fatal for that transition.
    #[error("incompatible rates: primary demands {primary_hz} Hz, secondary demands {secondary_hz} Hz")]
    IncompatibleRates { primary_hz: u32, secondary_hz: u32 },

    /// A `mod`/`secondary_mod` property named a mode not present in the
    /// registry. The session stays on its previous mode.
    #[error("unknown mode: {0}")]
    UnknownMode(String),

    /// An external decoder subprocess exited or its pipe closed.
    #[error("external process failure: {0}")]
    ExternalProcessFailure(String),

    /// The DSP manager was asked to start before the SDR source reported
    /// itself running.
    #[error("source unavailable")]
    SourceUnavailable,
}
