// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! A real (if simplified) RDS bit-sync decoder: 57 kHz subcarrier mix,
//! biphase symbol clock recovery, block sync on the CRC-10 offset words,
//! and PS/RadioText group parsing. Dropped relative to a full decoder:
//! alternative-frequency lists and the long PTY name groups — PS and
//! RadioText cover the common client-visible case.

use std::f32::consts::TAU;

use dsp_core::decode::RdsMeta;

const RDS_SUBCARRIER_HZ: f32 = 57_000.0;
const RDS_SYMBOL_RATE: f32 = 1_187.5;
const RDS_POLY: u16 = 0x1B9;
const SEARCH_REG_MASK: u32 = (1 << 26) - 1;
const BASEBAND_LP_HZ: f32 = 3_000.0;

const OFFSET_A: u16 = 0x0FC;
const OFFSET_B: u16 = 0x198;
const OFFSET_C: u16 = 0x168;
const OFFSET_CP: u16 = 0x350;
const OFFSET_D: u16 = 0x1B4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    A,
    B,
    C,
    CPrime,
    D,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Expect {
    B,
    C,
    D,
}

struct OnePole {
    alpha: f32,
    y: f32,
}

impl OnePole {
    fn new(sample_rate: f32, cutoff_hz: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let dt = 1.0 / sr;
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz.clamp(1.0, sr * 0.49));
        Self {
            alpha: dt / (rc + dt),
            y: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        self.y += self.alpha * (x - self.y);
        self.y
    }
}

fn crc10(data: u16) -> u16 {
    let mut reg = u32::from(data) << 10;
    let poly = u32::from(RDS_POLY);
    for shift in (10..=25).rev() {
        if (reg & (1 << shift)) != 0 {
            reg ^= poly << (shift - 10);
        }
    }
    (reg & 0x03ff) as u16
}

fn decode_block(word: u32) -> Option<(u16, BlockKind)> {
    let data = (word >> 10) as u16;
    let check = (word & 0x03ff) as u16;
    let syndrome = crc10(data) ^ check;
    let kind = match syndrome {
        OFFSET_A => BlockKind::A,
        OFFSET_B => BlockKind::B,
        OFFSET_C => BlockKind::C,
        OFFSET_CP => BlockKind::CPrime,
        OFFSET_D => BlockKind::D,
        _ => return None,
    };
    Some((data, kind))
}

fn sanitize(byte: u8) -> u8 {
    if (0x20..=0x7e).contains(&byte) {
        byte
    } else {
        b' '
    }
}

pub struct RdsDecoder {
    carrier_phase: f32,
    carrier_inc: f32,
    i_lp: OnePole,
    clock_phase: f32,
    clock_inc: f32,
    prev_symbol: Option<f32>,
    prev_bit: bool,
    locked: bool,
    expect: Expect,
    search_reg: u32,
    search_bits: u8,
    block_reg: u32,
    block_bits: u8,
    block_a: u16,
    block_b: u16,
    block_c: u16,
    block_c_kind: BlockKind,
    state: RdsMeta,
    ps_bytes: [u8; 8],
    ps_seen: [bool; 4],
    rt_bytes: [u8; 64],
    rt_seen: [bool; 16],
}

impl RdsDecoder {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;
        Self {
            carrier_phase: 0.0,
            carrier_inc: TAU * RDS_SUBCARRIER_HZ / sr,
            i_lp: OnePole::new(sr, BASEBAND_LP_HZ),
            clock_phase: 0.0,
            clock_inc: RDS_SYMBOL_RATE * 2.0 / sr,
            prev_symbol: None,
            prev_bit: false,
            locked: false,
            expect: Expect::B,
            search_reg: 0,
            search_bits: 0,
            block_reg: 0,
            block_bits: 0,
            block_a: 0,
            block_b: 0,
            block_c: 0,
            block_c_kind: BlockKind::C,
            state: RdsMeta::default(),
            ps_bytes: [b' '; 8],
            ps_seen: [false; 4],
            rt_bytes: [b' '; 64],
            rt_seen: [false; 16],
        }
    }

    /// Feed one discriminator-output (audio-rate) sample; returns a fresh
    /// snapshot of the decoded metadata whenever a group completes.
    pub fn process_sample(&mut self, sample: f32) -> Option<RdsMeta> {
        let mixed = self.i_lp.process(sample * self.carrier_phase.cos() * 2.0);
        self.carrier_phase = (self.carrier_phase + self.carrier_inc).rem_euclid(TAU);

        self.clock_phase += self.clock_inc;
        if self.clock_phase < 1.0 {
            return None;
        }
        self.clock_phase -= 1.0;

        let update = if let Some(prev) = self.prev_symbol {
            let biphase = (mixed - prev) * 0.5;
            let bit = biphase >= 0.0;
            let out_bit = (bit != self.prev_bit) as u8;
            self.prev_bit = bit;
            self.push_bit(out_bit)
        } else {
            None
        };
        self.prev_symbol = Some(mixed);
        update
    }

    fn push_bit(&mut self, bit: u8) -> Option<RdsMeta> {
        if self.locked {
            self.block_reg = ((self.block_reg << 1) | u32::from(bit)) & SEARCH_REG_MASK;
            self.block_bits = self.block_bits.saturating_add(1);
            if self.block_bits < 26 {
                return None;
            }
            let word = self.block_reg;
            self.block_reg = 0;
            self.block_bits = 0;
            return self.consume_locked(word);
        }

        self.search_reg = ((self.search_reg << 1) | u32::from(bit)) & SEARCH_REG_MASK;
        self.search_bits = self.search_bits.saturating_add(1).min(26);
        if self.search_bits < 26 {
            return None;
        }
        let (data, kind) = decode_block(self.search_reg)?;
        if kind != BlockKind::A {
            return None;
        }
        self.locked = true;
        self.expect = Expect::B;
        self.block_a = data;
        self.state.pi = Some(data);
        None
    }

    fn consume_locked(&mut self, word: u32) -> Option<RdsMeta> {
        let expected = self.expect;
        let Some((data, kind)) = decode_block(word) else {
            self.locked = false;
            return None;
        };
        match (expected, kind) {
            (Expect::B, BlockKind::B) => {
                self.block_b = data;
                self.expect = Expect::C;
                None
            }
            (Expect::C, BlockKind::C | BlockKind::CPrime) => {
                self.block_c = data;
                self.block_c_kind = kind;
                self.expect = Expect::D;
                None
            }
            (Expect::D, BlockKind::D) => {
                self.locked = false;
                self.process_group(self.block_a, self.block_b, self.block_c, self.block_c_kind, data)
            }
            (_, BlockKind::A) => {
                self.expect = Expect::B;
                self.block_a = data;
                self.state.pi = Some(data);
                None
            }
            _ => {
                self.locked = false;
                None
            }
        }
    }

    fn process_group(
        &mut self,
        block_a: u16,
        block_b: u16,
        block_c: u16,
        block_c_kind: BlockKind,
        block_d: u16,
    ) -> Option<RdsMeta> {
        let mut changed = false;
        if self.state.pi != Some(block_a) {
            self.state.pi = Some(block_a);
            changed = true;
        }
        let group_type = (block_b >> 12) & 0x0f;
        let version_b = ((block_b >> 11) & 0x1) != 0;

        if group_type == 0 {
            let segment = usize::from(block_b & 0x0003);
            let [b0, b1] = block_d.to_be_bytes();
            self.ps_bytes[segment * 2] = sanitize(b0);
            self.ps_bytes[segment * 2 + 1] = sanitize(b1);
            self.ps_seen[segment] = true;
            if self.ps_seen.iter().all(|s| *s) {
                let ps = String::from_utf8_lossy(&self.ps_bytes).trim_end().to_string();
                if !ps.is_empty() && self.state.program_service.as_deref() != Some(ps.as_str()) {
                    self.state.program_service = Some(ps);
                    changed = true;
                }
            }
        } else if group_type == 2 {
            let segment = usize::from(block_b & 0x000f);
            if version_b {
                let [b0, b1] = block_d.to_be_bytes();
                let base = segment * 2;
                self.rt_bytes[base] = sanitize(b0);
                self.rt_bytes[base + 1] = sanitize(b1);
            } else if block_c_kind == BlockKind::C {
                let [c0, c1] = block_c.to_be_bytes();
                let [d0, d1] = block_d.to_be_bytes();
                let base = segment * 4;
                if base + 3 < self.rt_bytes.len() {
                    self.rt_bytes[base] = sanitize(c0);
                    self.rt_bytes[base + 1] = sanitize(c1);
                    self.rt_bytes[base + 2] = sanitize(d0);
                    self.rt_bytes[base + 3] = sanitize(d1);
                }
            }
            self.rt_seen[segment] = true;
            if self.rt_seen.iter().all(|s| *s) {
                let rt = String::from_utf8_lossy(&self.rt_bytes).trim_end().to_string();
                if !rt.is_empty() && self.state.radio_text.as_deref() != Some(rt.as_str()) {
                    self.state.radio_text = Some(rt);
                    changed = true;
                }
            }
        }

        changed.then(|| self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_block(data: u16, offset: u16) -> u32 {
        (u32::from(data) << 10) | u32::from(crc10(data) ^ offset)
    }

    #[test]
    fn decode_block_recognizes_offset_a() {
        let block = encode_block(0x1234, OFFSET_A);
        let (data, kind) = decode_block(block).unwrap();
        assert_eq!(data, 0x1234);
        assert!(matches!(kind, BlockKind::A));
    }

    #[test]
    fn group_0a_updates_program_service() {
        let mut decoder = RdsDecoder::new(48_000);
        let pi = 0x5ab2;
        let filler = encode_block(0, OFFSET_C);

        let push_word = |decoder: &mut RdsDecoder, word: u32| -> Option<RdsMeta> {
            let mut last = None;
            for bit_idx in (0..26).rev() {
                let bit = ((word >> bit_idx) & 1) as u8;
                last = decoder.push_bit(bit);
            }
            last
        };

        let ps_segments: [[u8; 2]; 4] = [*b"AB", *b"CD", *b"EF", *b"GH"];
        let mut last_result = None;
        for (segment, text) in ps_segments.iter().enumerate() {
            let block_a = encode_block(pi, OFFSET_A);
            let block_b = encode_block(segment as u16, OFFSET_B);
            let block_d = encode_block(u16::from_be_bytes(*text), OFFSET_D);

            push_word(&mut decoder, block_a);
            push_word(&mut decoder, block_b);
            push_word(&mut decoder, filler);
            last_result = push_word(&mut decoder, block_d);
        }

        let meta = last_result.expect("final PS segment should complete the decode");
        assert_eq!(meta.pi, Some(pi));
        assert_eq!(meta.program_service.as_deref(), Some("ABCDEFGH"));
    }
}
