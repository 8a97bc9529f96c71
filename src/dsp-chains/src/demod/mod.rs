// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Concrete demodulators: analog (NFM/WFM/AM/SAM/SSB), the external-process
//! framework for shelling out to a decoder binary, and the secondary
//! (chopper/packet) demodulators that turn demodulated audio into
//! `DecodedMessage` records.

pub mod analog;
pub mod chopper;
pub mod external;
pub mod packet;
pub mod rds;
