//! Render loop lifecycle.
//!
//! The loop is an explicit state machine rather than a self-rescheduling
//! callback: every frame the host hands back the [`FrameHandle`] it was given,
//! the controller paints one frame and, only while still active, requests the
//! next one. Stopping cancels the single pending request, so no callback can
//! outlive the session it would read from.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::audio::{AnalyserConfig, DeviceManager, SampleSource};
use crate::config::{DisplayConfig, VisualizerConfig};
use crate::error::VisualizerError;
use crate::renderer::{DrawCommand, Paint, Rect, Surface};
use crate::visualizer::{SampleDomain, VisualStyle};

/// Identifies one pending frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Host facility that fires a callback once per display refresh.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// What the presentation shell binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    /// Transient while a session is being opened.
    Starting,
    Active,
}

pub struct RenderLoop<D: DeviceManager, S: Surface, F: FrameScheduler> {
    devices: D,
    surface: S,
    scheduler: F,
    analyser: AnalyserConfig,
    visualizer: VisualizerConfig,
    display: DisplayConfig,
    state: LoopState,
    session: Option<D::Session>,
    samples: Vec<u8>,
    device_id: Option<String>,
    pending: Option<FrameHandle>,
    diagnostic: Option<String>,
    frames: u64,
}

impl<D: DeviceManager, S: Surface, F: FrameScheduler> RenderLoop<D, S, F> {
    pub fn new(
        devices: D,
        surface: S,
        scheduler: F,
        analyser: AnalyserConfig,
        visualizer: VisualizerConfig,
        display: DisplayConfig,
    ) -> Self {
        Self {
            devices,
            surface,
            scheduler,
            analyser,
            visualizer,
            display,
            state: LoopState::Idle,
            session: None,
            samples: Vec::new(),
            device_id: None,
            pending: None,
            diagnostic: None,
            frames: 0,
        }
    }

    /// Open a session on `device_id` and begin drawing with `style`.
    ///
    /// Any session already open is closed first. On failure the loop stays
    /// idle and the error is also kept as the current diagnostic.
    pub fn start(&mut self, device_id: &str, style: VisualStyle) -> Result<(), VisualizerError> {
        let was_running = self.session.is_some();
        self.shutdown();
        self.state = LoopState::Starting;
        self.visualizer.style = style;

        match self.open(device_id) {
            Ok(session) => {
                self.samples = vec![0; session.buffer_len()];
                self.session = Some(session);
                self.device_id = Some(device_id.to_string());
                self.state = LoopState::Active;
                self.diagnostic = None;
                self.frames = 0;
                self.pending = Some(self.scheduler.request_frame());
                info!("Visualizer started on {} ({})", device_id, style);
                Ok(())
            }
            Err(e) => {
                self.state = LoopState::Idle;
                if was_running {
                    self.paint_background(Paint::Solid(self.display.background));
                }
                warn!("Failed to start visualizer: {}", e);
                self.diagnostic = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn open(&mut self, device_id: &str) -> Result<D::Session, VisualizerError> {
        if device_id.trim().is_empty() {
            return Err(VisualizerError::config("no capture device selected"));
        }

        let devices = self.devices.list_input_devices()?;
        if !devices.iter().any(|d| d.id == device_id) {
            return Err(VisualizerError::unavailable(device_id, "device is not available"));
        }

        let session = self.devices.open_session(device_id, &self.analyser)?;
        if session.buffer_len() != self.analyser.bin_count() {
            let mut session = session;
            session.close();
            return Err(VisualizerError::unavailable(
                device_id,
                "sample source reported an unexpected buffer length",
            ));
        }
        Ok(session)
    }

    /// Stop drawing and release the session. Does nothing when already idle.
    pub fn stop(&mut self) {
        if self.state == LoopState::Idle && self.session.is_none() && self.pending.is_none() {
            return;
        }
        self.shutdown();
        self.paint_background(Paint::Solid(self.display.background));
        info!("Visualizer stopped after {} frames", self.frames);
    }

    /// Cancel the pending frame and close the session, leaving the loop idle.
    fn shutdown(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel_frame(handle);
        }
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.state = LoopState::Idle;
    }

    /// Takes effect from the next frame on.
    pub fn set_style(&mut self, style: VisualStyle) {
        if style != self.visualizer.style {
            debug!("Style changed to {}", style);
        }
        self.visualizer.style = style;
    }

    pub fn set_visualizer_config(&mut self, config: VisualizerConfig) {
        self.visualizer = config;
    }

    /// Host callback for a fired frame request.
    ///
    /// Handles that do not match the pending request are ignored.
    pub fn on_frame(&mut self, handle: FrameHandle) {
        if self.state != LoopState::Active || self.pending != Some(handle) {
            debug!("Ignoring stale frame {:?}", handle);
            return;
        }
        self.pending = None;

        match self.render_frame() {
            Ok(()) => {}
            Err(VisualizerError::SurfaceUnavailable) => {
                debug!("Surface not ready, skipping frame");
            }
            Err(e) => {
                warn!("Stopping visualizer: {}", e);
                self.stop();
                self.diagnostic = Some(e.to_string());
                return;
            }
        }

        if self.state == LoopState::Active {
            self.pending = Some(self.scheduler.request_frame());
        }
    }

    fn render_frame(&mut self) -> Result<(), VisualizerError> {
        let style = self.visualizer.style;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| VisualizerError::config("render loop active without a session"))?;
        session.ensure_alive()?;

        match style.domain() {
            SampleDomain::Spectrum => session.read_spectrum(&mut self.samples),
            SampleDomain::Waveform => session.read_waveform(&mut self.samples),
        }

        let geometry = self.surface.geometry().ok_or(VisualizerError::SurfaceUnavailable)?;

        let samples = &self.samples;
        let config = &self.visualizer;
        let commands = catch_unwind(AssertUnwindSafe(|| {
            style.visualizer().transform(samples, geometry, config)
        }))
        .map_err(|panic| VisualizerError::TransformFault {
            style: style.name(),
            reason: panic_message(panic.as_ref()),
        })?;

        if commands.iter().any(|c| !c.is_finite()) {
            return Err(VisualizerError::TransformFault {
                style: style.name(),
                reason: format!("non-finite coordinates for {}x{} surface", geometry.width, geometry.height),
            });
        }

        self.surface.draw(&DrawCommand::FillRect {
            rect: Rect::new(0.0, 0.0, geometry.width, geometry.height),
            paint: Paint::Solid(self.display.wash()),
        });
        for command in &commands {
            self.surface.draw(command);
        }

        self.frames += 1;
        if self.display.telemetry && self.frames % u64::from(self.display.fps.max(1)) == 0 {
            let peak = self.samples.iter().copied().max().unwrap_or(0);
            debug!(
                frames = self.frames,
                style = style.name(),
                peak,
                commands = commands.len(),
                "frame telemetry"
            );
        }
        Ok(())
    }

    fn paint_background(&mut self, paint: Paint) {
        if let Some(geometry) = self.surface.geometry() {
            self.surface.fill_rect(Rect::new(0.0, 0.0, geometry.width, geometry.height), &paint);
        }
    }

    pub fn recording_state(&self) -> RecordingState {
        match self.state {
            LoopState::Active => RecordingState::Active,
            LoopState::Idle | LoopState::Starting => RecordingState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.recording_state() == RecordingState::Active
    }

    pub fn style(&self) -> VisualStyle {
        self.visualizer.style
    }

    pub fn visualizer_config(&self) -> &VisualizerConfig {
        &self.visualizer
    }

    /// Device of the running session, if any.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|_| self.session.is_some())
    }

    /// Last error surfaced to the user, cleared by a successful start.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    #[cfg(test)]
    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn scheduler(&self) -> &F {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut F {
        &mut self.scheduler
    }
}

impl<D: DeviceManager, S: Surface, F: FrameScheduler> Drop for RenderLoop<D, S, F> {
    fn drop(&mut self) {
        if self.state != LoopState::Idle || self.session.is_some() {
            self.shutdown();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic inside renderer".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Point;
    use crate::testing::{LogCapture, ManualScheduler, MockDevices, RecordingSurface};

    type TestLoop = RenderLoop<MockDevices, RecordingSurface, ManualScheduler>;

    fn test_loop(devices: MockDevices) -> TestLoop {
        test_loop_with_display(
            devices,
            DisplayConfig {
                trail: 0.0,
                ..Default::default()
            },
        )
    }

    fn test_loop_with_display(devices: MockDevices, display: DisplayConfig) -> TestLoop {
        let analyser = AnalyserConfig {
            fft_size: 8,
            ..Default::default()
        };
        let visualizer = VisualizerConfig {
            guides: false,
            ..Default::default()
        };
        RenderLoop::new(
            devices,
            RecordingSurface::new(400.0, 200.0),
            ManualScheduler::default(),
            analyser,
            visualizer,
            display,
        )
    }

    fn fire(rl: &mut TestLoop) {
        let handle = rl.pending_frame().expect("a frame should be pending");
        rl.scheduler_mut().fire(handle);
        rl.on_frame(handle);
    }

    /// Commands painted by the most recent frame, wash excluded.
    fn last_frame(rl: &TestLoop) -> Vec<DrawCommand> {
        let commands = &rl.surface().commands;
        let start = commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::FillRect { rect, .. } if rect.width == 400.0 && rect.height == 200.0))
            .expect("no frame painted");
        commands[start + 1..].to_vec()
    }

    #[test]
    fn start_opens_session_and_schedules_a_frame() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);

        rl.start("mic-1", VisualStyle::Waveform).unwrap();
        assert_eq!(rl.recording_state(), RecordingState::Active);
        assert_eq!(rl.device_id(), Some("mic-1"));
        assert!(rl.pending_frame().is_some());
        assert_eq!(counters.borrow().opens, 1);

        fire(&mut rl);
        assert_eq!(rl.frames_rendered(), 1);
        assert!(rl.pending_frame().is_some(), "frame should reschedule itself");
    }

    #[test]
    fn empty_or_unknown_device_stays_idle() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);

        let err = rl.start("", VisualStyle::Bars).unwrap_err();
        assert!(matches!(err, VisualizerError::Config(_)));
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.diagnostic().is_some());

        let err = rl.start("mic-9", VisualStyle::Bars).unwrap_err();
        assert!(matches!(err, VisualizerError::DeviceUnavailable { .. }));
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.pending_frame().is_none());
        assert_eq!(counters.borrow().opens, 0);
    }

    #[test]
    fn permission_denied_is_surfaced_not_fatal() {
        let devices = MockDevices::new(&["mic-1"]).deny_access();
        let mut rl = test_loop(devices);

        let err = rl.start("mic-1", VisualStyle::Waveform).unwrap_err();
        assert!(matches!(err, VisualizerError::PermissionDenied { .. }));
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.diagnostic().unwrap().contains("denied"));
        assert!(rl.scheduler().outstanding().is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);
        rl.start("mic-1", VisualStyle::Radial).unwrap();

        rl.stop();
        let painted = rl.surface().commands.len();
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.pending_frame().is_none());
        assert!(rl.scheduler().outstanding().is_empty());
        assert_eq!(counters.borrow().opens, counters.borrow().closes);

        rl.stop();
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.pending_frame().is_none());
        assert_eq!(counters.borrow().closes, 1);
        assert_eq!(rl.surface().commands.len(), painted);
    }

    #[test]
    fn stop_from_idle_is_a_no_op() {
        let mut rl = test_loop(MockDevices::new(&["mic-1"]));
        rl.stop();
        assert!(rl.surface().commands.is_empty());
        assert_eq!(rl.recording_state(), RecordingState::Idle);
    }

    #[test]
    fn restarting_closes_the_previous_session_first() {
        let devices = MockDevices::new(&["mic-1", "mic-2"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);

        rl.start("mic-1", VisualStyle::Waveform).unwrap();
        fire(&mut rl);
        rl.start("mic-2", VisualStyle::Waveform).unwrap();
        {
            let c = counters.borrow();
            assert_eq!(c.opens, 2);
            assert_eq!(c.opens, c.closes + 1);
            assert_eq!(c.max_open, 1, "two sessions were open at once");
        }
        assert_eq!(rl.scheduler().outstanding().len(), 1);

        rl.stop();
        let c = counters.borrow();
        assert_eq!(c.opens, c.closes);
    }

    #[test]
    fn failed_restart_clears_the_last_frame() {
        let mut rl = test_loop(MockDevices::new(&["mic-1"]));
        rl.start("mic-1", VisualStyle::Waveform).unwrap();
        fire(&mut rl);
        assert!(matches!(rl.surface().commands.last(), Some(DrawCommand::Path { .. })));

        assert!(rl.start("missing", VisualStyle::Waveform).is_err());
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        match rl.surface().commands.last() {
            Some(DrawCommand::FillRect { rect, paint: Paint::Solid(color) }) => {
                assert_eq!((rect.width, rect.height), (400.0, 200.0));
                assert_eq!(*color, DisplayConfig::default().background);
            }
            other => panic!("expected a background fill, got {:?}", other),
        }
    }

    #[test]
    fn telemetry_reports_frame_count_and_peak() {
        let devices = MockDevices::new(&["mic-1"]).with_waveform(vec![128, 200, 90, 128]);
        let display = DisplayConfig {
            telemetry: true,
            fps: 1,
            ..Default::default()
        };
        let mut rl = test_loop_with_display(devices, display);
        rl.start("mic-1", VisualStyle::Waveform).unwrap();

        let logs = LogCapture::default();
        tracing::subscriber::with_default(logs.subscriber(), || fire(&mut rl));
        let text = logs.contents();
        assert!(text.contains("frame telemetry"), "{}", text);
        assert!(text.contains("frames=1"), "{}", text);
        assert!(text.contains("peak=200"), "{}", text);
    }

    #[test]
    fn telemetry_is_silent_when_disabled() {
        let mut rl = test_loop(MockDevices::new(&["mic-1"]));
        rl.start("mic-1", VisualStyle::Waveform).unwrap();

        let logs = LogCapture::default();
        tracing::subscriber::with_default(logs.subscriber(), || fire(&mut rl));
        assert_eq!(rl.frames_rendered(), 1);
        assert!(!logs.contents().contains("frame telemetry"));
    }

    #[test]
    fn frames_after_stop_are_ignored() {
        let mut rl = test_loop(MockDevices::new(&["mic-1"]));
        rl.start("mic-1", VisualStyle::Waveform).unwrap();
        let stale = rl.pending_frame().unwrap();
        rl.stop();
        assert!(rl.scheduler().cancelled.contains(&stale));

        let before = rl.surface().commands.len();
        rl.on_frame(stale);
        assert_eq!(rl.surface().commands.len(), before);
        assert!(rl.pending_frame().is_none());
    }

    #[test]
    fn style_change_applies_to_next_frame() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);
        rl.start("mic-1", VisualStyle::Waveform).unwrap();

        fire(&mut rl);
        assert!(matches!(last_frame(&rl)[..], [DrawCommand::Path { closed: false, .. }]));
        assert_eq!(counters.borrow().waveform_reads, 1);

        let in_flight = rl.pending_frame();
        rl.set_style(VisualStyle::Bars);
        assert_eq!(rl.pending_frame(), in_flight, "style change must not restart the loop");
        assert_eq!(rl.recording_state(), RecordingState::Active);

        fire(&mut rl);
        assert!(last_frame(&rl).iter().all(|c| matches!(c, DrawCommand::FillRect { .. })));
        assert_eq!(counters.borrow().spectrum_reads, 1);
        assert_eq!(counters.borrow().opens, 1);
    }

    #[test]
    fn alternating_spectrum_paints_alternating_bars() {
        let devices = MockDevices::new(&["mic-1"]).with_spectrum(vec![255, 0, 255, 0]);
        let mut rl = test_loop(devices);
        rl.start("mic-1", VisualStyle::Bars).unwrap();
        fire(&mut rl);

        let bars: Vec<Rect> = last_frame(&rl)
            .into_iter()
            .map(|c| match c {
                DrawCommand::FillRect { rect, .. } => rect,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars.iter().map(|r| r.height).collect::<Vec<_>>(), vec![200.0, 0.0, 200.0, 0.0]);
        assert!(bars.windows(2).all(|w| w[0].x < w[1].x));
        assert!(bars.iter().map(|r| r.width).sum::<f32>() <= 400.0);
    }

    #[test]
    fn transform_fault_stops_the_loop() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);
        rl.start("mic-1", VisualStyle::Radial).unwrap();

        // A NaN radius scale poisons every radial coordinate
        let mut config = rl.visualizer_config().clone();
        config.radial_scale = f32::NAN;
        rl.set_visualizer_config(config);
        fire(&mut rl);

        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.pending_frame().is_none());
        assert!(rl.diagnostic().unwrap().contains("Radial"));
        assert_eq!(counters.borrow().closes, 1);
        let painted_nan = rl.surface().commands.iter().any(|c| !c.is_finite());
        assert!(!painted_nan);
    }

    #[test]
    fn dead_stream_stops_the_loop() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);
        rl.start("mic-1", VisualStyle::Waveform).unwrap();

        counters.borrow_mut().kill_stream = true;
        fire(&mut rl);

        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert!(rl.diagnostic().unwrap().contains("unavailable"));
        assert_eq!(counters.borrow().closes, 1);
    }

    #[test]
    fn unready_surface_skips_but_keeps_running() {
        let mut rl = test_loop(MockDevices::new(&["mic-1"]));
        rl.start("mic-1", VisualStyle::Waveform).unwrap();
        rl.surface_mut().ready = false;
        fire(&mut rl);

        assert_eq!(rl.recording_state(), RecordingState::Active);
        assert_eq!(rl.frames_rendered(), 0);
        assert!(rl.pending_frame().is_some());

        rl.surface_mut().ready = true;
        fire(&mut rl);
        assert_eq!(rl.frames_rendered(), 1);
    }

    #[test]
    fn geometry_is_read_every_frame() {
        let mut rl = test_loop(MockDevices::new(&["mic-1"]).with_waveform(vec![128; 4]));
        rl.start("mic-1", VisualStyle::Waveform).unwrap();
        fire(&mut rl);
        rl.surface_mut().resize(800.0, 100.0);
        fire(&mut rl);

        match rl.surface().commands.last() {
            Some(DrawCommand::Path { points, .. }) => {
                assert_eq!(points[1], Point::new(200.0, 50.0));
            }
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn dropping_an_active_loop_releases_everything() {
        let devices = MockDevices::new(&["mic-1"]);
        let counters = devices.counters();
        let mut rl = test_loop(devices);
        rl.start("mic-1", VisualStyle::Bars).unwrap();
        drop(rl);

        let c = counters.borrow();
        assert_eq!(c.opens, 1);
        assert_eq!(c.closes, 1);
    }

    #[test]
    fn enumeration_failure_aborts_start() {
        let devices = MockDevices::new(&["mic-1"]).fail_listing();
        let counters = devices.counters();
        let mut rl = test_loop(devices);

        let err = rl.start("mic-1", VisualStyle::Bars).unwrap_err();
        assert!(matches!(err, VisualizerError::DeviceUnavailable { .. }));
        assert_eq!(rl.recording_state(), RecordingState::Idle);
        assert_eq!(counters.borrow().opens, 0);
    }
}
