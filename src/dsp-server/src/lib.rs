// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The per-client DSP server: binds the `dsp-chains` backbone
//! (`orchestrator`) to a property store and a set of output channels
//! (`manager`), with its own config and logging setup.

pub mod config;
pub mod logging;
pub mod manager;
pub mod orchestrator;
