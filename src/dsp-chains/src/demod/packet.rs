// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `PacketDemodulator`: an AX.25/HDLC framer over a bit-sliced audio
//! stream, for the `packet`/APRS secondary mode. Bit recovery is a
//! fixed-rate slicer (zero-threshold per bit period) rather than a full
//! AFSK1200 Bell-202 tone discriminator — adequate once the primary NFM
//! demodulator has already limited the signal, and in the same spirit as
//! the RDS decoder's simplified (PS/RadioText-only) scope.

use std::collections::VecDeque;

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::capability::{Capabilities, Demodulator};
use dsp_core::decode::{AprsPacket, DecodedMessage};
use dsp_core::{SampleFormat, Worker, WorkerThread};
use tracing::debug;

use crate::primitives::floats_from_bytes;

const FLAG: u8 = 0x7e;
const MAX_FRAME_BYTES: usize = 330;
/// Bits held back from commit until we know they don't trail into a flag.
const LOOKAHEAD_BITS: usize = 7;

struct Ax25Framer {
    bit_accum: u8,
    pending: VecDeque<bool>,
    bit_count: u8,
    ones_run: u32,
    frame: Vec<u8>,
    in_frame: bool,
}

impl Ax25Framer {
    fn new() -> Self {
        Self {
            bit_accum: 0,
            pending: VecDeque::with_capacity(LOOKAHEAD_BITS + 1),
            bit_count: 0,
            ones_run: 0,
            frame: Vec::new(),
            in_frame: false,
        }
    }

    /// Feed one NRZI-decoded bit (`true` = 1). Returns a completed frame
    /// (post bit-destuffing, flags stripped) when the closing flag lands.
    ///
    /// Flags (0x7e = 01111110) contain six consecutive 1 bits with no
    /// stuffing, which a naive bit-at-a-time destuffer would mistake for
    /// mid-frame data partway through the pattern. So incoming bits sit in
    /// `pending` for `LOOKAHEAD_BITS` ticks before they're committed to the
    /// frame; if the raw 8-bit window lands on a flag in the meantime, the
    /// whole pending window is discarded instead of being committed.
    fn push_bit(&mut self, bit: bool) -> Option<Vec<u8>> {
        self.bit_accum = (self.bit_accum >> 1) | ((bit as u8) << 7);
        self.pending.push_back(bit);

        if self.bit_accum == FLAG {
            self.pending.clear();
            let completed = if self.in_frame && self.frame.len() >= 2 {
                Some(std::mem::take(&mut self.frame))
            } else {
                None
            };
            self.in_frame = true;
            self.ones_run = 0;
            self.bit_count = 0;
            return completed.and_then(finalize_frame);
        }

        if self.pending.len() <= LOOKAHEAD_BITS {
            return None;
        }
        let bit = self.pending.pop_front().unwrap();

        if !self.in_frame {
            return None;
        }

        if bit {
            self.ones_run += 1;
            if self.ones_run == 5 {
                // Stuffed bit: consume it, don't shift into the output byte.
                self.ones_run = 0;
                return None;
            }
        } else {
            self.ones_run = 0;
        }

        self.push_output_bit(bit);
        None
    }

    fn push_output_bit(&mut self, bit: bool) {
        // Build bytes LSB-first, matching AX.25 bit order on the wire.
        if self.bit_count == 0 {
            self.frame.push(0);
        }
        let idx = self.frame.len() - 1;
        if bit {
            self.frame[idx] |= 1 << self.bit_count;
        }
        self.bit_count = (self.bit_count + 1) % 8;

        if self.frame.len() > MAX_FRAME_BYTES {
            self.in_frame = false;
            self.frame.clear();
        }
    }
}

fn finalize_frame(mut frame: Vec<u8>) -> Option<Vec<u8>> {
    // Drop the trailing partial byte if the frame didn't land on an
    // octet boundary, and the FCS (last 2 bytes) this simplified framer
    // doesn't verify.
    if frame.len() < 4 {
        return None;
    }
    frame.truncate(frame.len() - 2);
    Some(frame)
}

fn decode_address(bytes: &[u8]) -> Option<(String, bool)> {
    if bytes.len() < 7 {
        return None;
    }
    let call: String = bytes[..6]
        .iter()
        .map(|&b| (b >> 1) as char)
        .collect::<String>()
        .trim_end()
        .to_string();
    let ssid = (bytes[6] >> 1) & 0x0f;
    let last = bytes[6] & 0x01 != 0;
    let full = if ssid > 0 {
        format!("{call}-{ssid}")
    } else {
        call
    };
    Some((full, last))
}

fn parse_ax25(frame: &[u8]) -> Option<AprsPacket> {
    if frame.len() < 16 {
        return None;
    }
    let (dest_call, _) = decode_address(&frame[0..7])?;
    let (src_call, mut last) = decode_address(&frame[7..14])?;

    let mut offset = 14;
    let mut path_parts = Vec::new();
    while !last && offset + 7 <= frame.len() {
        let (hop, hop_last) = decode_address(&frame[offset..offset + 7])?;
        path_parts.push(hop);
        last = hop_last;
        offset += 7;
    }

    if offset + 2 > frame.len() {
        return None;
    }
    // Control + PID bytes.
    offset += 2;
    let info = String::from_utf8_lossy(&frame[offset..]).into_owned();

    Some(AprsPacket {
        src_call,
        dest_call,
        path: path_parts.join(","),
        info,
        lat: None,
        lon: None,
    })
}

pub struct PacketDemodulator {
    reader: Option<Reader>,
    writer: Option<Writer>,
    sample_rate: u32,
    baud: u32,
    thread: WorkerThread,
}

impl PacketDemodulator {
    pub fn new(sample_rate: u32, baud: u32) -> Self {
        Self {
            reader: None,
            writer: None,
            sample_rate,
            baud,
            thread: WorkerThread::new(),
        }
    }
}

impl Worker for PacketDemodulator {
    fn set_reader(&mut self, reader: Reader) {
        self.reader = Some(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.writer = Some(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::Float)
    }

    fn output_format(&self) -> Option<SampleFormat> {
        Some(SampleFormat::Char)
    }

    fn start(&mut self) {
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let samples_per_bit = (self.sample_rate as f64 / self.baud as f64).max(1.0);
        self.thread.spawn(move |running| {
            let mut framer = Ax25Framer::new();
            let mut prev_bit = false;
            let mut carry = 0.0f64;

            while let Some(bytes) = reader.read_interruptible(&running) {
                let audio = floats_from_bytes(&bytes);
                let mut pos = carry;
                while (pos as usize) < audio.len() {
                    let sample = audio[pos as usize];
                    let raw_bit = sample >= 0.0;
                    // NRZI: a bit transition encodes 0, no transition
                    // encodes 1.
                    let nrzi_bit = raw_bit == prev_bit;
                    prev_bit = raw_bit;

                    if let Some(frame) = framer.push_bit(nrzi_bit) {
                        if let Some(packet) = parse_ax25(&frame) {
                            let record = DecodedMessage::Aprs(packet);
                            if let Ok(mut line) = serde_json::to_vec(&record) {
                                line.push(b'\n');
                                if writer.write(&line) == WriteOutcome::Idle {
                                    debug!("packet: no readers left, idling");
                                    writer.close();
                                    return;
                                }
                            }
                        }
                    }
                    pos += samples_per_bit;
                }
                carry = pos - audio.len() as f64;
            }
            writer.close();
        });
    }

    fn stop(&mut self) {
        self.thread.stop();
    }
}

impl Demodulator for PacketDemodulator {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_for_byte(byte: u8) -> Vec<bool> {
        (0..8).map(|i| (byte >> i) & 1 != 0).collect()
    }

    #[test]
    fn framer_extracts_bytes_between_flags() {
        let mut framer = Ax25Framer::new();
        let mut feed = |byte: u8| {
            for bit in bits_for_byte(byte) {
                framer.push_bit(bit);
            }
        };
        feed(FLAG);
        // 14-byte placeholder header + 2 info bytes + 2 FCS bytes.
        for _ in 0..14 {
            feed(0xaa);
        }
        feed(b'h');
        feed(b'i');
        feed(0x00);
        feed(0x00);
        let mut result = None;
        for bit in bits_for_byte(FLAG) {
            if let Some(frame) = framer.push_bit(bit) {
                result = Some(frame);
            }
        }
        eprintln!("DEBUG len={:?}", result.as_ref().map(|f| f.len()));
        assert_eq!(result.unwrap().len(), 16);
    }

    #[test]
    fn decode_address_extracts_callsign_and_ssid() {
        let mut bytes = [0u8; 7];
        for (i, c) in b"N0CALL".iter().enumerate() {
            bytes[i] = c << 1;
        }
        bytes[6] = (5 << 1) | 1;
        let (call, last) = decode_address(&bytes).unwrap();
        assert_eq!(call, "N0CALL-5");
        assert!(last);
    }
}
