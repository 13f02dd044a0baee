//! User-facing actions on top of the render loop.
//!
//! Both the terminal key bindings and IPC commands go through [`App`], so the
//! two control paths always agree on device selection and error reporting.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::audio::{DeviceManager, InputDevice};
use crate::color::ColorScheme;
use crate::config::{save_state, Config};
use crate::controller::{FrameScheduler, RecordingState, RenderLoop};
use crate::error::VisualizerError;
use crate::renderer::Surface;
use crate::visualizer::VisualStyle;

pub struct App<D: DeviceManager, S: Surface, F: FrameScheduler> {
    controller: RenderLoop<D, S, F>,
    /// Device used by the next plain `start`
    device: Option<String>,
    config_path: Option<PathBuf>,
    /// Errors raised before the controller got involved
    notice: Option<String>,
}

impl<D: DeviceManager, S: Surface, F: FrameScheduler> App<D, S, F> {
    pub fn new(
        controller: RenderLoop<D, S, F>,
        device: Option<String>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            controller,
            device,
            config_path,
            notice: None,
        }
    }

    pub fn controller(&self) -> &RenderLoop<D, S, F> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut RenderLoop<D, S, F> {
        &mut self.controller
    }

    pub fn devices(&self) -> Result<Vec<InputDevice>, VisualizerError> {
        self.controller.devices().list_input_devices()
    }

    /// The configured device, or the first one the host reports.
    fn resolve_device(&self) -> Result<String, VisualizerError> {
        if let Some(ref device) = self.device {
            return Ok(device.clone());
        }
        self.devices()?
            .into_iter()
            .next()
            .map(|d| d.id)
            .ok_or_else(|| VisualizerError::unavailable("default", "no capture devices found"))
    }

    /// Start on `device`, or on the current selection when `None`.
    pub fn start(&mut self, device: Option<&str>) -> Result<String, VisualizerError> {
        let result = match device {
            Some(id) => Ok(id.to_string()),
            None => self.resolve_device(),
        }
        .and_then(|id| {
            let style = self.controller.style();
            self.controller.start(&id, style).map(|()| id)
        });

        match result {
            Ok(id) => {
                self.device = Some(id.clone());
                self.notice = None;
                Ok(id)
            }
            Err(e) => {
                self.notice = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    pub fn toggle(&mut self) {
        if self.controller.is_active() {
            self.stop();
        } else if let Err(e) = self.start(None) {
            warn!("Start failed: {}", e);
        }
    }

    pub fn set_style(&mut self, style: VisualStyle) {
        self.controller.set_style(style);
    }

    pub fn next_style(&mut self) -> VisualStyle {
        let style = self.controller.style().next();
        self.set_style(style);
        style
    }

    pub fn next_color(&mut self) -> ColorScheme {
        let mut config = self.controller.visualizer_config().clone();
        config.color_scheme = config.color_scheme.next();
        let scheme = config.color_scheme;
        self.controller.set_visualizer_config(config);
        scheme
    }

    /// Select the device after the current one, restarting if active.
    pub fn next_device(&mut self) -> Result<String, VisualizerError> {
        let devices = self.devices().inspect_err(|e| self.notice = Some(e.to_string()))?;
        if devices.is_empty() {
            let e = VisualizerError::unavailable("default", "no capture devices found");
            self.notice = Some(e.to_string());
            return Err(e);
        }

        let current = self.device.as_deref();
        let next = match devices.iter().position(|d| Some(d.id.as_str()) == current) {
            Some(i) => &devices[(i + 1) % devices.len()],
            None => &devices[0],
        };
        let id = next.id.clone();
        info!("Switching to device {} ({})", id, next.label);

        if self.controller.is_active() {
            self.start(Some(&id))
        } else {
            self.device = Some(id.clone());
            Ok(id)
        }
    }

    /// Persist style, colour scheme and device into the config file.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self
            .config_path
            .clone()
            .or_else(Config::default_path)
            .context("Could not determine config path")?;
        let config = self.controller.visualizer_config();
        save_state(&path, config.style, config.color_scheme, self.device.as_deref())?;
        info!("Saved state to {}", path.display());
        Ok(path)
    }

    /// The open session's device, else the selection for the next start.
    pub fn current_device(&self) -> Option<&str> {
        self.controller.device_id().or(self.device.as_deref())
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.controller.diagnostic().or(self.notice.as_deref())
    }

    /// Machine-readable summary used by the `status` IPC command.
    pub fn status(&self) -> String {
        let state = match self.controller.recording_state() {
            RecordingState::Active => "active",
            RecordingState::Idle => "idle",
        };
        let config = self.controller.visualizer_config();
        format!(
            "state={} style={} color={} device={} frames={}",
            state,
            config.style.key(),
            config.color_scheme.name(),
            self.current_device().unwrap_or("-"),
            self.controller.frames_rendered(),
        )
    }

    /// One-line summary for the terminal status bar.
    pub fn status_line(&self) -> String {
        let config = self.controller.visualizer_config();
        let state = if self.controller.is_active() { "recording" } else { "stopped" };
        let mut line = format!(
            " {} | [s]tyle: {} | [c]olor: {} | [d]evice: {} | [space] start/stop | [q]uit ",
            state,
            config.style,
            config.color_scheme.name(),
            self.current_device().unwrap_or("auto"),
        );
        if let Some(diagnostic) = self.diagnostic() {
            line.push_str("| ");
            line.push_str(diagnostic);
        }
        line
    }
}
