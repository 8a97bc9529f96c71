// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `DspManager`: binds a client's `PropertyStack` to its
//! `ClientDemodulatorChain`, and pumps the chain's output buffers (audio,
//! HD audio, S-meter, secondary spectrum, secondary demod, metadata) to a
//! `ClientSink`. Also owns the deferred start/stop around SDR-source
//! availability: a chain is only fed samples once its source confirms it
//! is running, and is stopped (without being torn down) when the source
//! goes away.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use dsp_chains::audio_chain::AudioCompression;
use dsp_chains::fft_chain::FftCompression;
use dsp_core::buffer::{Buffer, Reader, Writer};
use dsp_core::decode::{DecodedMessage, JsonLinesDecoder, SidecarDecoder, TextLineDecoder};
use dsp_core::error::DspResult;
use dsp_core::format::SampleFormat;
use dsp_core::mode::{register_builtin_modes, ModeRegistry};
use dsp_core::property::{Layer, PropertyStack};
use serde_json::Value;
use tracing::warn;

use crate::orchestrator::{ClientDemodulatorChain, SecondaryDspConfig};

/// Build the mode catalog and demodulator factory table shared by every
/// client's `DspManager`.
pub fn build_mode_registry() -> Arc<ModeRegistry> {
    let mut registry = ModeRegistry::new();
    register_builtin_modes(&mut registry);
    dsp_chains::register_builtin_demodulators(&mut registry);
    Arc::new(registry)
}

/// Sidecar decoding strategy for the `meta` and `secondary_demod` channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarFormat {
    JsonLines,
    TextLines,
}

fn make_decoder(format: SidecarFormat) -> Box<dyn SidecarDecoder + Send> {
    match format {
        SidecarFormat::JsonLines => Box::new(JsonLinesDecoder::default()),
        SidecarFormat::TextLines => Box::new(TextLineDecoder::default()),
    }
}

pub enum ClientMessage {
    Audio(Vec<u8>),
    HdAudio(Vec<u8>),
    Smeter(f32),
    SecondaryFft(Vec<u8>),
    SecondaryFftFormat(SampleFormat),
    SecondaryDemod(DecodedMessage),
    Meta(DecodedMessage),
    SecondaryConfig(SecondaryDspConfig),
    DemodulatorError(String),
}

/// Where a client's DSP output is delivered. Implemented by the transport
/// layer (e.g. a per-connection WebSocket writer); `DspManager` never
/// assumes anything about delivery beyond `Send`.
pub trait ClientSink: Send + 'static {
    fn send(&mut self, message: ClientMessage);
}

type SharedSink = Arc<Mutex<dyn ClientSink>>;
type SharedChain = Arc<Mutex<ClientDemodulatorChain>>;

fn as_u32(v: Option<&Value>) -> Option<u32> {
    v.and_then(|v| v.as_u64()).map(|v| v as u32)
}

fn as_f64(v: Option<&Value>) -> Option<f64> {
    v.and_then(|v| v.as_f64())
}

fn as_f32(v: Option<&Value>) -> Option<f32> {
    v.and_then(|v| v.as_f64()).map(|v| v as f32)
}

fn as_bool(v: Option<&Value>) -> Option<bool> {
    v.and_then(|v| v.as_bool())
}

fn as_i32(v: Option<&Value>) -> Option<i32> {
    v.and_then(|v| v.as_i64()).map(|v| v as i32)
}

fn as_str(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn report_error(sink: &SharedSink, err: impl std::fmt::Display) {
    sink.lock().unwrap().send(ClientMessage::DemodulatorError(err.to_string()));
}

/// Picks whichever of `audio`/`hd_audio` the active primary wants and
/// (re)installs it as `ClientAudioChain`'s output.
fn reconcile_audio_writer(chain: &SharedChain, audio_writer: &Writer, hd_audio_writer: &Writer) {
    let mut guard = chain.lock().unwrap();
    let writer = if guard.is_hd_audio_active() {
        hd_audio_writer
    } else {
        audio_writer
    };
    guard.set_audio_writer(writer.clone());
}

pub struct DspManager {
    chain: SharedChain,
    props: PropertyStack,
    registry: Arc<ModeRegistry>,
    sink: SharedSink,
    audio_writer: Writer,
    hd_audio_writer: Writer,
    pump_threads: Vec<JoinHandle<()>>,
}

impl DspManager {
    pub fn new(
        chain: ClientDemodulatorChain,
        props: PropertyStack,
        registry: Arc<ModeRegistry>,
        sink: Arc<Mutex<dyn ClientSink>>,
    ) -> DspResult<Self> {
        let chain = Arc::new(Mutex::new(chain));

        let audio_buffer = Buffer::new(SampleFormat::Char);
        let hd_audio_buffer = Buffer::new(SampleFormat::Char);
        let smeter_buffer = Buffer::new(SampleFormat::Float);
        let secondary_fft_buffer = Buffer::new(SampleFormat::Char);
        let secondary_demod_buffer = Buffer::new(SampleFormat::Char);
        let meta_buffer = Buffer::new(SampleFormat::Char);

        let pump_threads = vec![
            spawn_byte_pump(audio_buffer.reader(), sink.clone(), ClientMessage::Audio),
            spawn_byte_pump(hd_audio_buffer.reader(), sink.clone(), ClientMessage::HdAudio),
            spawn_smeter_pump(smeter_buffer.reader(), sink.clone()),
            spawn_byte_pump(secondary_fft_buffer.reader(), sink.clone(), ClientMessage::SecondaryFft),
            spawn_decode_pump(
                secondary_demod_buffer.reader(),
                sink.clone(),
                SidecarFormat::JsonLines,
                ClientMessage::SecondaryDemod,
            ),
            spawn_decode_pump(
                meta_buffer.reader(),
                sink.clone(),
                SidecarFormat::JsonLines,
                ClientMessage::Meta,
            ),
        ];

        let audio_writer = audio_buffer.writer();
        let hd_audio_writer = hd_audio_buffer.writer();
        {
            let mut guard = chain.lock().unwrap();
            guard.set_power_writer(Some(smeter_buffer.writer()));
            guard.set_secondary_fft_writer(Some(secondary_fft_buffer.writer()));
            guard.set_secondary_demod_writer(Some(secondary_demod_buffer.writer()));
            guard.set_meta_writer(Some(meta_buffer.writer()));
        }
        reconcile_audio_writer(&chain, &audio_writer, &hd_audio_writer);

        let manager = Self {
            chain,
            props,
            registry,
            sink,
            audio_writer,
            hd_audio_writer,
            pump_threads,
        };
        manager.bind_properties();
        Ok(manager)
    }

    /// Feed samples once the client's SDR source confirms it is running.
    pub fn on_source_started(&self, reader: Reader) {
        self.chain.lock().unwrap().set_source_reader(reader);
    }

    /// Stop processing (without tearing down config) when the source is
    /// no longer available; `on_source_started` resumes it later.
    pub fn on_source_stopped(&self) {
        self.chain.lock().unwrap().stop();
    }

    fn bind_properties(&self) {
        self.bind_mode();
        self.bind_secondary_mode();
        self.bind_rates();
        self.bind_tuning();
        self.bind_audio();
        self.bind_secondary_fft();
        self.bind_digital_extras();
    }

    fn bind_mode(&self) {
        let chain = Arc::clone(&self.chain);
        let registry = Arc::clone(&self.registry);
        let sink = Arc::clone(&self.sink);
        let audio_writer = self.audio_writer.clone();
        let hd_audio_writer = self.hd_audio_writer.clone();
        self.props.wire("mod", move |v| {
            let Some(token) = as_str(v) else {
                return;
            };
            match registry.build(&token) {
                Ok(demod) => {
                    let result = chain.lock().unwrap().set_demodulator(demod);
                    match result {
                        Ok(()) => reconcile_audio_writer(&chain, &audio_writer, &hd_audio_writer),
                        Err(e) => report_error(&sink, e),
                    }
                }
                Err(e) => report_error(&sink, e),
            }
        });
    }

    fn bind_secondary_mode(&self) {
        let chain = Arc::clone(&self.chain);
        let registry = Arc::clone(&self.registry);
        let sink = Arc::clone(&self.sink);
        self.props.wire("secondary_mod", move |v| {
            let token = as_str(v).filter(|s| !s.is_empty() && s != "none");
            let demod = match token {
                Some(t) => match registry.build(&t) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        report_error(&sink, e);
                        return;
                    }
                },
                None => None,
            };
            if let Err(e) = chain.lock().unwrap().set_secondary_demodulator(demod) {
                report_error(&sink, e);
            }
        });
    }

    fn bind_rates(&self) {
        {
            let chain = Arc::clone(&self.chain);
            let sink = Arc::clone(&self.sink);
            self.props.wire("samp_rate", move |v| {
                if let Some(rate) = as_u32(v) {
                    chain.lock().unwrap().set_sample_rate(rate);
                }
                let _ = &sink;
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            let sink = Arc::clone(&self.sink);
            self.props.wire("output_rate", move |v| {
                if let Some(rate) = as_u32(v) {
                    if let Err(e) = chain.lock().unwrap().set_output_rate(rate) {
                        report_error(&sink, e);
                    }
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            let sink = Arc::clone(&self.sink);
            self.props.wire("hd_output_rate", move |v| {
                if let Some(rate) = as_u32(v) {
                    if let Err(e) = chain.lock().unwrap().set_hd_output_rate(rate) {
                        report_error(&sink, e);
                    }
                }
            });
        }
    }

    fn bind_tuning(&self) {
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("center_freq", move |v| {
                if let Some(hz) = as_f64(v) {
                    chain.lock().unwrap().set_center_frequency(hz);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("offset_freq", move |v| {
                if let Some(hz) = as_f64(v) {
                    chain.lock().unwrap().set_frequency_offset(hz);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("secondary_offset_freq", move |v| {
                if let Some(hz) = as_f64(v) {
                    chain.lock().unwrap().set_secondary_frequency_offset(hz);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("squelch_level", move |v| {
                if let Some(dbfs) = as_f32(v) {
                    chain.lock().unwrap().set_squelch_level(dbfs);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("low_cut", move |v| {
                chain.lock().unwrap().set_low_cut(as_f64(v));
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("high_cut", move |v| {
                chain.lock().unwrap().set_high_cut(as_f64(v));
            });
        }
    }

    fn bind_audio(&self) {
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("audio_compression", move |v| {
                let Some(token) = as_str(v) else {
                    return;
                };
                if let Some(compression) = AudioCompression::from_token(&token) {
                    chain.lock().unwrap().set_audio_compression(compression);
                } else {
                    warn!(token, "unknown audio compression token");
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("nr_enabled", move |v| {
                if let Some(enabled) = as_bool(v) {
                    chain.lock().unwrap().set_nr_enabled(enabled);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("nr_threshold", move |v| {
                if let Some(dbfs) = as_f32(v) {
                    chain.lock().unwrap().set_nr_threshold(dbfs);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("wfm_deemphasis_tau", move |v| {
                if let Some(tau) = as_f64(v) {
                    chain.lock().unwrap().set_wfm_deemphasis_tau(tau);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("wfm_rds_rbds", move |v| {
                if let Some(enabled) = as_bool(v) {
                    chain.lock().unwrap().set_rds_rbds(enabled);
                }
            });
        }
    }

    fn bind_secondary_fft(&self) {
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("digimodes_fft_size", move |v| {
                if let Some(size) = as_u32(v) {
                    chain.lock().unwrap().set_secondary_fft_size(size as usize);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("fft_fps", move |v| {
                if let Some(fps) = as_f32(v) {
                    chain.lock().unwrap().set_secondary_fft_fps(fps);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("fft_voverlap_factor", move |v| {
                if let Some(overlap) = as_f32(v) {
                    chain.lock().unwrap().set_secondary_fft_overlap(overlap);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            let sink = Arc::clone(&self.sink);
            self.props.wire("fft_compression", move |v| {
                let Some(token) = as_str(v) else {
                    return;
                };
                let compression = match token.as_str() {
                    "adpcm" => FftCompression::Adpcm,
                    "none" => FftCompression::None,
                    other => {
                        warn!(token = other, "unknown fft compression token");
                        return;
                    }
                };
                let mut guard = chain.lock().unwrap();
                let format_changed = guard.set_secondary_fft_compression(compression);
                let format = guard.secondary_fft_output_format();
                drop(guard);
                if format_changed {
                    sink.lock().unwrap().send(ClientMessage::SecondaryFftFormat(format));
                }
            });
        }
    }

    fn bind_digital_extras(&self) {
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("dmr_filter", move |v| {
                if let Some(slot) = as_i32(v) {
                    chain.lock().unwrap().set_slot_filter(slot);
                }
            });
        }
        {
            let chain = Arc::clone(&self.chain);
            self.props.wire("audio_service_id", move |v| {
                if let Some(id) = as_i32(v) {
                    chain.lock().unwrap().set_audio_service_id(id);
                }
            });
        }
    }

    /// Seed the default layer from server config, before any client
    /// override arrives. Must run before the manager is constructed so
    /// `wire`'s immediate callback picks these up as the starting state.
    pub fn seed_defaults(props: &PropertyStack, dsp: &crate::config::DspSection) {
        props.set(Layer::Default, "samp_rate", Value::from(dsp.source_sample_rate));
        props.set(Layer::Default, "output_rate", Value::from(dsp.output_rate));
        props.set(Layer::Default, "hd_output_rate", Value::from(dsp.hd_output_rate));
        props.set(Layer::Default, "mod", Value::from(dsp.default_mode.clone()));
        props.set(Layer::Default, "digimodes_fft_size", Value::from(dsp.fft_size as u64));
        props.set(Layer::Default, "fft_voverlap_factor", Value::from(dsp.fft_overlap as f64));
        props.set(Layer::Default, "fft_fps", Value::from(dsp.fft_fps as f64));
        props.set(Layer::Default, "audio_compression", Value::from("adpcm"));
        props.set(Layer::Default, "nr_enabled", Value::from(false));
        props.set(Layer::Default, "squelch_level", Value::from(-150.0));
    }
}

impl Drop for DspManager {
    fn drop(&mut self) {
        self.chain.lock().unwrap().stop();
        // Pump threads exit on their own once every writer closes; we
        // don't block shutdown waiting on them.
        self.pump_threads.clear();
    }
}

fn spawn_byte_pump(
    reader: Reader,
    sink: SharedSink,
    wrap: fn(Vec<u8>) -> ClientMessage,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Some(bytes) = reader.read() {
            if bytes.is_empty() {
                continue;
            }
            sink.lock().unwrap().send(wrap(bytes));
        }
    })
}

fn spawn_smeter_pump(reader: Reader, sink: SharedSink) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Some(bytes) = reader.read() {
            for chunk in bytes.chunks_exact(4) {
                let dbfs = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                sink.lock().unwrap().send(ClientMessage::Smeter(dbfs));
            }
        }
    })
}

fn spawn_decode_pump(
    reader: Reader,
    sink: SharedSink,
    format: SidecarFormat,
    wrap: fn(DecodedMessage) -> ClientMessage,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut decoder = make_decoder(format);
        while let Some(bytes) = reader.read() {
            for message in decoder.decode(&bytes) {
                sink.lock().unwrap().send(wrap(message));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DspSection;
    use dsp_chains::demod::analog::NfmDemodulator;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ChannelSink(mpsc::Sender<ClientMessage>);

    impl ClientSink for ChannelSink {
        fn send(&mut self, message: ClientMessage) {
            let _ = self.0.send(message);
        }
    }

    fn new_chain() -> ClientDemodulatorChain {
        ClientDemodulatorChain::new(250_000, 12_000, 48_000, Box::new(NfmDemodulator::new())).unwrap()
    }

    #[test]
    fn mode_property_switches_the_demodulator_without_panicking() {
        let (tx, rx) = mpsc::channel();
        let sink: Arc<Mutex<dyn ClientSink>> = Arc::new(Mutex::new(ChannelSink(tx)));
        let props = PropertyStack::new();
        let dsp = DspSection::default();
        DspManager::seed_defaults(&props, &dsp);
        let registry = build_mode_registry();
        let manager = DspManager::new(new_chain(), props.clone(), registry, sink).unwrap();

        props.set(Layer::Local, "mod", Value::from("wfm"));
        std::thread::sleep(Duration::from_millis(20));
        drop(manager);

        let mut saw_error = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ClientMessage::DemodulatorError(_)) {
                saw_error = true;
            }
        }
        assert!(!saw_error);
    }

    #[test]
    fn unknown_mode_reports_an_error_instead_of_panicking() {
        let (tx, rx) = mpsc::channel();
        let sink: Arc<Mutex<dyn ClientSink>> = Arc::new(Mutex::new(ChannelSink(tx)));
        let props = PropertyStack::new();
        let dsp = DspSection::default();
        DspManager::seed_defaults(&props, &dsp);
        let registry = build_mode_registry();
        let manager = DspManager::new(new_chain(), props.clone(), registry, sink).unwrap();

        props.set(Layer::Local, "mod", Value::from("not-a-real-mode"));
        std::thread::sleep(Duration::from_millis(20));
        drop(manager);

        let mut saw_error = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ClientMessage::DemodulatorError(_)) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
