use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use pulse::error::{Code, PAErr};
use pulse::sample::{Format, Spec};
use pulse::stream::Direction;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::analyser::Analyser;
use super::{AnalyserConfig, DeviceManager, InputDevice, SampleSource};
use crate::error::VisualizerError;

/// Frames pulled from PulseAudio per read (~12ms at 44100Hz).
const CHUNK_FRAMES: usize = 512;

/// Consecutive read errors after which the stream is considered gone.
const MAX_READ_FAILURES: u32 = 25;

/// How long `close` waits for the capture thread before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// List available PulseAudio/PipeWire sources, monitors included.
pub fn list_sources() -> Result<Vec<InputDevice>, VisualizerError> {
    let output = std::process::Command::new("pactl")
        .args(["list", "sources"])
        .output()
        .map_err(|e| VisualizerError::unavailable("pactl", format!("failed to run pactl: {}", e)))?;

    if !output.status.success() {
        return Err(VisualizerError::unavailable("pactl", "pactl list sources failed"));
    }

    Ok(parse_source_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Pull `Name:`/`Description:` pairs out of `pactl list sources` output.
fn parse_source_list(text: &str) -> Vec<InputDevice> {
    let mut devices: Vec<InputDevice> = Vec::new();
    for line in text.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Name:") {
            let name = name.trim().to_string();
            devices.push(InputDevice {
                label: name.clone(),
                id: name,
            });
        } else if let Some(description) = line.strip_prefix("Description:") {
            if let Some(last) = devices.last_mut() {
                last.label = description.trim().to_string();
            }
        }
    }
    devices
}

fn map_pulse_error(device: &str, err: PAErr) -> VisualizerError {
    if err.0.abs() == Code::Access as i32 {
        VisualizerError::PermissionDenied {
            device: device.to_string(),
        }
    } else {
        VisualizerError::unavailable(device, format!("PulseAudio error {:?}", err))
    }
}

/// PulseAudio-backed device manager.
pub struct PulseDevices {
    sample_rate: u32,
}

impl PulseDevices {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl DeviceManager for PulseDevices {
    type Session = PulseSession;

    fn list_input_devices(&self) -> Result<Vec<InputDevice>, VisualizerError> {
        list_sources()
    }

    fn open_session(
        &mut self,
        device_id: &str,
        analyser: &AnalyserConfig,
    ) -> Result<PulseSession, VisualizerError> {
        PulseSession::open(device_id, self.sample_rate, analyser)
    }
}

/// An open record stream plus the analyser reading from it.
pub struct PulseSession {
    device: String,
    capture_thread: Option<thread::JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    window: watch::Receiver<Arc<Vec<f32>>>,
    analyser: Analyser,
}

impl PulseSession {
    pub fn open(
        device_id: &str,
        sample_rate: u32,
        analyser: &AnalyserConfig,
    ) -> Result<Self, VisualizerError> {
        analyser.validate()?;

        let spec = Spec {
            format: Format::F32le,
            channels: 2,
            rate: sample_rate,
        };

        if !spec.is_valid() {
            return Err(VisualizerError::config(format!(
                "invalid PulseAudio sample spec (rate {})",
                sample_rate
            )));
        }

        let pulse = psimple::Simple::new(
            None,                // Use default server
            "scopeviz",          // Application name
            Direction::Record,   // Recording stream
            Some(device_id),     // Source name
            "audio-visualizer",  // Stream description
            &spec,               // Sample format
            None,                // Default channel map
            None,                // Default buffering attributes
        )
        .map_err(|e| map_pulse_error(device_id, e))?;

        info!(
            "Opened capture session on {} (fft size {})",
            device_id, analyser.fft_size
        );

        let (tx, rx) = watch::channel(Arc::new(Vec::new()));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let fft_size = analyser.fft_size;
        let thread_stop = stop_flag.clone();
        let thread_failed = failed.clone();
        let capture_thread = thread::Builder::new()
            .name("scopeviz-capture".into())
            .spawn(move || capture_loop(pulse, fft_size, tx, thread_stop, thread_failed))
            .map_err(|e| VisualizerError::unavailable(device_id, e))?;

        Ok(Self {
            device: device_id.to_string(),
            capture_thread: Some(capture_thread),
            stop_flag,
            failed,
            window: rx,
            analyser: Analyser::new(analyser),
        })
    }
}

impl SampleSource for PulseSession {
    fn buffer_len(&self) -> usize {
        self.analyser.bin_count()
    }

    fn read_waveform(&mut self, out: &mut [u8]) {
        let window = self.window.borrow().clone();
        self.analyser.byte_time_domain(&window, out);
    }

    fn read_spectrum(&mut self, out: &mut [u8]) {
        let window = self.window.borrow().clone();
        self.analyser.byte_frequency(&window, out);
    }

    fn close(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.capture_thread.take() {
            match join_within(handle, JOIN_TIMEOUT) {
                Some(Ok(())) => info!("Closed capture session on {}", self.device),
                Some(Err(_)) => warn!("Capture thread for {} panicked", self.device),
                // The thread exits on its own once the blocked read returns
                None => warn!(
                    "Capture thread for {} did not stop within {:?}, detaching it",
                    self.device, JOIN_TIMEOUT
                ),
            }
        }
    }

    fn ensure_alive(&self) -> Result<(), VisualizerError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(VisualizerError::unavailable(
                &self.device,
                "capture stream stopped delivering audio",
            ));
        }
        Ok(())
    }
}

impl Drop for PulseSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Join `handle` unless it is still running after `timeout`.
fn join_within(handle: thread::JoinHandle<()>, timeout: Duration) -> Option<thread::Result<()>> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(2));
    }
    Some(handle.join())
}

fn capture_loop(
    pulse: psimple::Simple,
    fft_size: usize,
    sender: watch::Sender<Arc<Vec<f32>>>,
    stop_flag: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) {
    // Interleaved stereo f32le
    let mut bytes = vec![0u8; CHUNK_FRAMES * 2 * 4];
    let mut window: VecDeque<f32> = VecDeque::with_capacity(fft_size + CHUNK_FRAMES);
    let mut failures = 0;

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            debug!("Stop flag set, ending capture loop");
            break;
        }

        if let Err(e) = pulse.read(&mut bytes) {
            failures += 1;
            warn!("PulseAudio read error: {:?}", e);
            if failures >= MAX_READ_FAILURES {
                failed.store(true, Ordering::Relaxed);
                break;
            }
            continue;
        }
        failures = 0;

        // Convert stereo to mono
        window.extend(bytes.chunks_exact(8).map(|frame| {
            let left = f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
            let right = f32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
            (left + right) / 2.0
        }));
        let excess = window.len().saturating_sub(fft_size);
        window.drain(..excess);

        if sender.send(Arc::new(window.iter().copied().collect())).is_err() {
            debug!("Session dropped, stopping capture");
            break;
        }
    }
}
