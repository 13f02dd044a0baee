//! In-memory stand-ins for the host capabilities.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crate::audio::{AnalyserConfig, DeviceManager, InputDevice, SampleSource};
use crate::controller::{FrameHandle, FrameScheduler};
use crate::error::VisualizerError;
use crate::renderer::{DrawCommand, Paint, Point, Rect, Stroke, Surface, SurfaceGeometry};

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: usize,
    pub closes: usize,
    pub open_now: usize,
    pub max_open: usize,
    pub waveform_reads: usize,
    pub spectrum_reads: usize,
    /// Makes every open session report a dead stream.
    pub kill_stream: bool,
}

pub struct MockDevices {
    devices: Vec<InputDevice>,
    counters: Rc<RefCell<Counters>>,
    deny: bool,
    fail_listing: bool,
    spectrum: Vec<u8>,
    waveform: Vec<u8>,
}

impl MockDevices {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            devices: ids
                .iter()
                .map(|id| InputDevice {
                    id: id.to_string(),
                    label: format!("Mock {}", id),
                })
                .collect(),
            counters: Rc::default(),
            deny: false,
            fail_listing: false,
            spectrum: Vec::new(),
            waveform: vec![128],
        }
    }

    pub fn counters(&self) -> Rc<RefCell<Counters>> {
        self.counters.clone()
    }

    pub fn deny_access(mut self) -> Self {
        self.deny = true;
        self
    }

    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Constant spectrum returned by every read, repeated to fill the buffer.
    pub fn with_spectrum(mut self, spectrum: Vec<u8>) -> Self {
        self.spectrum = spectrum;
        self
    }

    pub fn with_waveform(mut self, waveform: Vec<u8>) -> Self {
        self.waveform = waveform;
        self
    }
}

impl DeviceManager for MockDevices {
    type Session = MockSession;

    fn list_input_devices(&self) -> Result<Vec<InputDevice>, VisualizerError> {
        if self.fail_listing {
            return Err(VisualizerError::unavailable("mock", "enumeration failed"));
        }
        Ok(self.devices.clone())
    }

    fn open_session(
        &mut self,
        device_id: &str,
        analyser: &AnalyserConfig,
    ) -> Result<MockSession, VisualizerError> {
        if self.deny {
            return Err(VisualizerError::PermissionDenied {
                device: device_id.to_string(),
            });
        }
        let mut c = self.counters.borrow_mut();
        c.opens += 1;
        c.open_now += 1;
        c.max_open = c.max_open.max(c.open_now);
        Ok(MockSession {
            device: device_id.to_string(),
            len: analyser.bin_count(),
            counters: self.counters.clone(),
            spectrum: self.spectrum.clone(),
            waveform: self.waveform.clone(),
            closed: false,
        })
    }
}

pub struct MockSession {
    device: String,
    len: usize,
    counters: Rc<RefCell<Counters>>,
    spectrum: Vec<u8>,
    waveform: Vec<u8>,
    closed: bool,
}

fn fill(out: &mut [u8], pattern: &[u8]) {
    out.fill(0);
    for (byte, &value) in out.iter_mut().zip(pattern.iter().cycle()) {
        *byte = value;
    }
}

impl SampleSource for MockSession {
    fn buffer_len(&self) -> usize {
        self.len
    }

    fn read_waveform(&mut self, out: &mut [u8]) {
        self.counters.borrow_mut().waveform_reads += 1;
        fill(out, &self.waveform);
    }

    fn read_spectrum(&mut self, out: &mut [u8]) {
        self.counters.borrow_mut().spectrum_reads += 1;
        fill(out, &self.spectrum);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut c = self.counters.borrow_mut();
            c.closes += 1;
            c.open_now -= 1;
        }
    }

    fn ensure_alive(&self) -> Result<(), VisualizerError> {
        if self.counters.borrow().kill_stream {
            return Err(VisualizerError::unavailable(&self.device, "stream vanished"));
        }
        Ok(())
    }
}

/// Surface that records every primitive instead of drawing it.
pub struct RecordingSurface {
    pub commands: Vec<DrawCommand>,
    pub ready: bool,
    geometry: SurfaceGeometry,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            commands: Vec::new(),
            ready: true,
            geometry: SurfaceGeometry::new(width, height),
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.geometry = SurfaceGeometry::new(width, height);
    }
}

impl Surface for RecordingSurface {
    fn geometry(&self) -> Option<SurfaceGeometry> {
        self.ready.then_some(self.geometry)
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        self.commands.push(DrawCommand::FillRect { rect, paint: *paint });
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: &Stroke) {
        self.commands.push(DrawCommand::Path {
            points: points.to_vec(),
            closed,
            stroke: *stroke,
        });
    }

    fn stroke_arc(&mut self, center: Point, radius: f32, start: f32, end: f32, stroke: &Stroke) {
        self.commands.push(DrawCommand::Arc {
            center,
            radius,
            start,
            end,
            stroke: *stroke,
        });
    }
}

/// Scheduler whose frames fire only when a test says so.
#[derive(Default)]
pub struct ManualScheduler {
    next: u64,
    outstanding: Vec<FrameHandle>,
    pub cancelled: Vec<FrameHandle>,
}

impl ManualScheduler {
    pub fn outstanding(&self) -> &[FrameHandle] {
        &self.outstanding
    }

    /// Mark `handle` as fired; the caller then delivers it to the loop.
    pub fn fire(&mut self, handle: FrameHandle) {
        let index = self
            .outstanding
            .iter()
            .position(|h| *h == handle)
            .expect("fired a frame that was never requested");
        self.outstanding.remove(index);
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next);
        self.next += 1;
        self.outstanding.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.outstanding.retain(|h| *h != handle);
        self.cancelled.push(handle);
    }
}

/// In-memory log sink for asserting on `tracing` output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Debug-level subscriber writing into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
