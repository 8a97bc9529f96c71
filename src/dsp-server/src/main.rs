// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use dsp_chains::primitives::complex_to_bytes;
use dsp_core::buffer::Buffer;
use dsp_core::format::SampleFormat;
use dsp_core::property::{Layer, PropertyStack};
use num_complex::Complex32;
use tracing::info;

use dsp_server::config::{ConfigFile, ServerConfig};
use dsp_server::logging::init_logging;
use dsp_server::manager::{build_mode_registry, ClientMessage, ClientSink, DspManager};
use dsp_server::orchestrator::ClientDemodulatorChain;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - per-client DSP engine");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Demodulator mode to start with (overrides config)
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,
}

/// Logs each client message at debug level; a real transport would
/// forward `ClientMessage` over a WebSocket/TCP connection instead.
struct LoggingSink {
    audio_bytes: u64,
}

impl ClientSink for LoggingSink {
    fn send(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Audio(bytes) | ClientMessage::HdAudio(bytes) => {
                self.audio_bytes += bytes.len() as u64;
            }
            ClientMessage::Smeter(dbfs) => {
                tracing::debug!(dbfs, "smeter update");
            }
            ClientMessage::DemodulatorError(err) => {
                tracing::warn!(%err, "demodulator error");
            }
            ClientMessage::Meta(msg) | ClientMessage::SecondaryDemod(msg) => {
                tracing::debug!(?msg, "decoded message");
            }
            ClientMessage::SecondaryFft(_)
            | ClientMessage::SecondaryFftFormat(_)
            | ClientMessage::SecondaryConfig(_) => {}
        }
    }
}

/// Feeds a free-running complex tone into `writer` at `sample_rate`,
/// standing in for a real SDR source while exercising the full chain.
fn spawn_synthetic_source(
    sample_rate: u32,
    tone_hz: f64,
    writer: dsp_core::buffer::Writer,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        const CHUNK: usize = 2048;
        let mut phase = 0.0f64;
        let step = 2.0 * std::f64::consts::PI * tone_hz / sample_rate as f64;
        let chunk_duration = Duration::from_secs_f64(CHUNK as f64 / sample_rate as f64);
        while running.load(Ordering::Relaxed) {
            let samples: Vec<Complex32> = (0..CHUNK)
                .map(|_| {
                    let s = Complex32::new(phase.cos() as f32, phase.sin() as f32) * 0.2;
                    phase += step;
                    s
                })
                .collect();
            if writer.write(&complex_to_bytes(&samples)) == dsp_core::buffer::WriteOutcome::Idle {
                break;
            }
            std::thread::sleep(chunk_duration);
        }
        writer.close();
    })
}

#[tokio::main]
async fn main() -> dsp_core::DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    cfg.validate().map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let registry = build_mode_registry();
    let mode = cli.mode.unwrap_or_else(|| cfg.dsp.default_mode.clone());
    let initial_demod = registry.build(&mode)?;

    info!(
        mode = %mode,
        source_rate = cfg.dsp.source_sample_rate,
        output_rate = cfg.dsp.output_rate,
        "starting dsp-server client chain",
    );

    let chain = ClientDemodulatorChain::new(
        cfg.dsp.source_sample_rate,
        cfg.dsp.output_rate,
        cfg.dsp.hd_output_rate,
        initial_demod,
    )?;

    let props = PropertyStack::new();
    DspManager::seed_defaults(&props, &cfg.dsp);
    props.set(Layer::Default, "mod", serde_json::Value::from(mode));

    let sink: Arc<Mutex<dyn ClientSink>> = Arc::new(Mutex::new(LoggingSink { audio_bytes: 0 }));
    let manager = DspManager::new(chain, props, registry, sink)?;

    let source_buffer = Buffer::new(SampleFormat::ComplexFloat);
    let source_running = Arc::new(AtomicBool::new(true));
    let source_handle = spawn_synthetic_source(
        cfg.dsp.source_sample_rate,
        1_000.0,
        source_buffer.writer(),
        Arc::clone(&source_running),
    );
    manager.on_source_started(source_buffer.reader());

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");

    source_running.store(false, Ordering::Relaxed);
    manager.on_source_stopped();
    drop(manager);
    let _ = source_handle.join();

    Ok(())
}
