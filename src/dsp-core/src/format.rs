// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sample formats carried by every `Buffer`, `Reader`, `Writer` and `Worker`
//! port. A connection between two stages is only valid when their formats
//! match exactly.

use serde::{Deserialize, Serialize};

/// The closed set of sample formats a DSP stage can produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Complex baseband IQ, interleaved `f32` real/imag pairs.
    ComplexFloat,
    /// Real-valued samples, `f32`.
    Float,
    /// Real-valued samples, `i16` (PCM audio rate).
    Short,
    /// Byte stream (compressed audio, ADPCM spectrum frames, decoder text).
    Char,
}

impl SampleFormat {
    /// Size in bytes of one sample unit in this format.
    pub fn unit_size(self) -> usize {
        match self {
            SampleFormat::ComplexFloat => 8,
            SampleFormat::Float => 4,
            SampleFormat::Short => 2,
            SampleFormat::Char => 1,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SampleFormat::ComplexFloat => "complex_float",
            SampleFormat::Float => "float",
            SampleFormat::Short => "short",
            SampleFormat::Char => "char",
        };
        f.write_str(s)
    }
}
