// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod buffer;
pub mod capability;
pub mod chain;
pub mod decode;
pub mod error;
pub mod format;
pub mod mode;
pub mod property;
pub mod worker;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use capability::{Capabilities, Demodulator};
pub use chain::Chain;
pub use error::{DspError, DspResult};
pub use format::SampleFormat;
pub use worker::{DummyWorker, Worker, WorkerThread};
