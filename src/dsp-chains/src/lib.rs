// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod audio_chain;
pub mod demod;
pub mod fft_chain;
pub mod primitives;
pub mod registry;
pub mod selector;

pub use audio_chain::ClientAudioChain;
pub use fft_chain::{FftChain, FftCompression};
pub use registry::register_builtin_demodulators;
pub use selector::Selector;
