// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sidecar record types and decoder for the `meta` and `secondary_demod`
//! output channels.
//!
//! The original sniffed a magic byte to decide whether a chunk was a
//! serialized object stream or plain ASCII, falling back to best-effort
//! ASCII on any decode failure. That exact wire format is a legacy
//! external contract this crate doesn't reproduce (see REDESIGN in
//! SPEC_FULL.md): `meta`/`secondary_demod` carry newline-delimited JSON
//! records of `DecodedMessage`, with ASCII-line passthrough as the
//! explicit fallback for decoders that only ever emit plain text.

use serde::{Deserialize, Serialize};

/// A decoded sidecar record, emitted on the `meta` or `secondary_demod`
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodedMessage {
    /// RDS-style station metadata.
    Rds(RdsMeta),
    Aprs(AprsPacket),
    Ft8(Ft8Message),
    Wspr(WsprMessage),
    /// Plain-text line, used when a decoder has no structured record for
    /// this event (or as the last-resort fallback on a decode failure).
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RdsMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pty_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AprsPacket {
    pub src_call: String,
    pub dest_call: String,
    pub path: String,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ft8Message {
    pub ts_ms: i64,
    pub snr_db: f32,
    pub dt_s: f32,
    pub freq_hz: f32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsprMessage {
    pub ts_ms: i64,
    pub snr_db: f32,
    pub dt_s: f32,
    pub freq_hz: f64,
    pub callsign: String,
    pub locator: String,
    pub power_dbm: i8,
}

/// Turns raw bytes from a demodulator or external decoder process into
/// `DecodedMessage`s. Implementations are pluggable: a secondary
/// demodulator that already produces structured records implements this
/// directly; one that only emits text lines can use `TextLineDecoder`.
pub trait SidecarDecoder: Send {
    fn decode(&mut self, bytes: &[u8]) -> Vec<DecodedMessage>;
}

/// Splits incoming bytes on newlines and emits one `DecodedMessage::Text`
/// per complete line. The ASCII-passthrough fallback named in the
/// redesign notes.
#[derive(Default)]
pub struct TextLineDecoder {
    pending: Vec<u8>,
}

impl SidecarDecoder for TextLineDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Vec<DecodedMessage> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if !line.is_empty() {
                out.push(DecodedMessage::Text(line));
            }
        }
        out
    }
}

/// Decodes newline-delimited JSON `DecodedMessage` records, falling back
/// to `DecodedMessage::Text` for any line that doesn't parse.
#[derive(Default)]
pub struct JsonLinesDecoder {
    pending: Vec<u8>,
}

impl SidecarDecoder for JsonLinesDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Vec<DecodedMessage> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<DecodedMessage>(line) {
                Ok(message) => out.push(message),
                Err(_) => out.push(DecodedMessage::Text(
                    String::from_utf8_lossy(line).into_owned(),
                )),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_decoder_parses_known_record() {
        let mut decoder = JsonLinesDecoder::default();
        let line = serde_json::to_string(&DecodedMessage::Ft8(Ft8Message {
            ts_ms: 1,
            snr_db: -10.0,
            dt_s: 0.1,
            freq_hz: 1500.0,
            message: "CQ N0CALL JO93".into(),
        }))
        .unwrap();
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        let messages = decoder.decode(&bytes);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], DecodedMessage::Ft8(_)));
    }

    #[test]
    fn json_lines_decoder_falls_back_to_text_on_garbage() {
        let mut decoder = JsonLinesDecoder::default();
        let messages = decoder.decode(b"not json\n");
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], DecodedMessage::Text(s) if s == "not json"));
    }

    #[test]
    fn text_line_decoder_buffers_partial_lines() {
        let mut decoder = TextLineDecoder::default();
        assert!(decoder.decode(b"hel").is_empty());
        let messages = decoder.decode(b"lo\n");
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], DecodedMessage::Text(s) if s == "hello"));
    }
}
