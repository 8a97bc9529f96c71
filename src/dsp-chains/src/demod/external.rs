// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! A `Worker` that pipes its input through an external decoder binary's
//! stdin and reads decoded bytes back off its stdout, the way the
//! original shells out to `jt9`/`wsprd`-style tools instead of
//! reimplementing their DSP. Grounded on the existing `wsprd` subprocess
//! wrapper's shape (binary name, arguments, `is_available` check), made
//! streaming: a feeder thread writes to the child's stdin, a drainer
//! thread reads its stdout, and `stop` closes stdin and waits for the
//! child to exit before declaring the stage stopped.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use dsp_core::buffer::{Reader, Writer, WriteOutcome};
use dsp_core::capability::{Capabilities, Demodulator};
use dsp_core::error::DspError;
use dsp_core::{SampleFormat, Worker};
use tracing::{error, warn};

/// How long `stop` waits for the child to exit after closing its stdin
/// before it's killed outright.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ExternalProcessSpec {
    pub binary: String,
    pub args: Vec<String>,
}

impl ExternalProcessSpec {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary).arg("--help").output().is_ok()
    }
}

/// Wraps a streaming external decoder process as a `Worker`. Input/output
/// formats are fixed at construction since they're properties of the
/// wrapped binary, not something the graph renegotiates at runtime.
pub struct ExternalProcessDemodulator {
    spec: ExternalProcessSpec,
    input_format: SampleFormat,
    output_format: SampleFormat,
    capabilities: Capabilities,
    reader: Option<Reader>,
    writer: Option<Writer>,
    running: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    feeder: Option<JoinHandle<()>>,
    drainer: Option<JoinHandle<()>>,
}

impl ExternalProcessDemodulator {
    pub fn new(
        spec: ExternalProcessSpec,
        input_format: SampleFormat,
        output_format: SampleFormat,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            spec,
            input_format,
            output_format,
            capabilities,
            reader: None,
            writer: None,
            running: Arc::new(AtomicBool::new(false)),
            child: Arc::new(Mutex::new(None)),
            feeder: None,
            drainer: None,
        }
    }
}

impl Worker for ExternalProcessDemodulator {
    fn set_reader(&mut self, reader: Reader) {
        self.reader = Some(reader);
    }

    fn set_writer(&mut self, writer: Writer) {
        self.writer = Some(writer);
    }

    fn input_format(&self) -> Option<SampleFormat> {
        Some(self.input_format)
    }

    fn output_format(&self) -> Option<SampleFormat> {
        Some(self.output_format)
    }

    fn start(&mut self) {
        if self.running.load(Ordering::Relaxed) {
            return;
        }
        let (Some(reader), Some(writer)) = (self.reader.take(), self.writer.take()) else {
            return;
        };
        let mut command = Command::new(&self.spec.binary);
        command
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(
                    "external demodulator {}: failed to spawn: {}",
                    self.spec.binary,
                    DspError::ExternalProcessFailure(err.to_string())
                );
                writer.close();
                return;
            }
        };

        self.running.store(true, Ordering::Relaxed);
        let child = Arc::new(Mutex::new(Some(child)));
        self.child = Arc::clone(&child);

        let feeder_child = Arc::clone(&child);
        let feeder_running = Arc::clone(&self.running);
        self.feeder = Some(std::thread::spawn(move || {
            while let Some(bytes) = reader.read_interruptible(&feeder_running) {
                let mut guard = feeder_child.lock().unwrap();
                if let Some(child) = guard.as_mut() {
                    if let Some(stdin) = child.stdin.as_mut() {
                        if stdin.write_all(&bytes).is_err() {
                            warn!("external demodulator: child stdin closed early");
                            break;
                        }
                    }
                }
            }
            let mut guard = feeder_child.lock().unwrap();
            if let Some(child) = guard.as_mut() {
                child.stdin.take();
            }
        }));

        let drainer_child = Arc::clone(&child);
        let drainer_running = Arc::clone(&self.running);
        self.drainer = Some(std::thread::spawn(move || {
            let mut stdout = {
                let mut guard = drainer_child.lock().unwrap();
                guard.as_mut().and_then(|c| c.stdout.take())
            };
            let mut buf = [0u8; 4096];
            if let Some(stdout) = stdout.as_mut() {
                while drainer_running.load(Ordering::Relaxed) {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if writer.write(&buf[..n]) == WriteOutcome::Idle {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
            writer.close();
        }));
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        {
            let mut guard = self.child.lock().unwrap();
            if let Some(child) = guard.as_mut() {
                child.stdin.take();
            }
        }
        if let Some(handle) = self.feeder.take() {
            let _ = handle.join();
        }
        std::thread::sleep(SHUTDOWN_GRACE.min(Duration::from_millis(50)));
        {
            let mut guard = self.child.lock().unwrap();
            if let Some(mut child) = guard.take() {
                match child.try_wait() {
                    Ok(Some(_)) => {}
                    _ => {
                        let _ = child.kill();
                        let _ = child.wait();
                    }
                }
            }
        }
        if let Some(handle) = self.drainer.take() {
            let _ = handle.join();
        }
    }
}

impl Demodulator for ExternalProcessDemodulator {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::buffer::Buffer;

    #[test]
    fn unavailable_binary_closes_writer_immediately() {
        let spec = ExternalProcessSpec::new("definitely-not-a-real-binary-xyz", vec![]);
        let mut worker = ExternalProcessDemodulator::new(
            spec,
            SampleFormat::Float,
            SampleFormat::Char,
            Capabilities::none(),
        );
        let input = Buffer::new(SampleFormat::Float);
        let output = Buffer::new(SampleFormat::Char);
        worker.set_reader(input.reader());
        worker.set_writer(output.writer());
        worker.start();
        let reader = output.reader();
        assert_eq!(reader.read(), None);
    }

    #[test]
    fn cat_echoes_input_to_output() {
        let spec = ExternalProcessSpec::new("cat", vec![]);
        if !spec.is_available() {
            return;
        }
        let mut worker = ExternalProcessDemodulator::new(
            spec,
            SampleFormat::Char,
            SampleFormat::Char,
            Capabilities::none(),
        );
        let input = Buffer::new(SampleFormat::Char);
        let output = Buffer::new(SampleFormat::Char);
        worker.set_reader(input.reader());
        worker.set_writer(output.writer());
        let reader = output.reader();
        let writer = input.writer();
        worker.start();
        writer.write(b"hello");
        std::thread::sleep(Duration::from_millis(100));
        worker.stop();
        let mut collected = Vec::new();
        while let Some(bytes) = reader.read() {
            collected.extend(bytes);
        }
        assert_eq!(collected, b"hello");
    }
}
