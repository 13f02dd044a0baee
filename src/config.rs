use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::audio::AnalyserConfig;
use crate::color::{ColorScheme, Rgba};
use crate::error::VisualizerError;
use crate::visualizer::VisualStyle;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub analyser: AnalyserConfig,
    pub visualizer: VisualizerConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture source picked at startup (None = first enumerated)
    pub device: Option<String>,
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 44100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualizerConfig {
    pub style: VisualStyle,
    pub color_scheme: ColorScheme,
    /// Stroke width of the waveform and radial traces
    pub line_width: f32,
    /// Draw the center line and the radial reference circle
    pub guides: bool,
    /// Share of each bar slot that is filled (the rest is gap)
    pub bar_fill: f32,
    pub bar_gradient: bool,
    /// Silent radius as a fraction of the largest circle that fits
    pub radial_base: f32,
    /// How far a full-scale sample pushes the radial outline outward
    pub radial_scale: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            style: VisualStyle::Waveform,
            color_scheme: ColorScheme::Spectrum,
            line_width: 2.0,
            guides: true,
            bar_fill: 0.8,
            bar_gradient: true,
            radial_base: 0.6,
            radial_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub fps: u32,
    /// 0.0 clears every frame; higher values leave fading trails
    pub trail: f32,
    pub background: Rgba,
    /// Periodic frame statistics at debug level
    pub telemetry: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            trail: 0.25,
            background: Rgba::rgb(10, 10, 18),
            telemetry: false,
        }
    }
}

impl DisplayConfig {
    /// Colour painted under every frame: opaque for a hard clear, translucent for trails.
    pub fn wash(&self) -> Rgba {
        self.background.with_alpha(1.0 - self.trail)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default XDG config path (~/.config/scopeviz/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scopeviz").join("config.toml"))
    }

    /// Load config from the default XDG path if it exists.
    /// Returns None if the file doesn't exist, logs a warning on parse errors.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return None;
        }
        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{:#}; using defaults", e);
                None
            }
        }
    }

    pub fn validate(&self) -> Result<(), VisualizerError> {
        self.analyser.validate()?;

        let v = &self.visualizer;
        if !(v.line_width > 0.0 && v.line_width <= 32.0) {
            return Err(VisualizerError::config(format!("line_width must be within (0, 32], got {}", v.line_width)));
        }
        if !(v.bar_fill > 0.0 && v.bar_fill <= 1.0) {
            return Err(VisualizerError::config(format!("bar_fill must be within (0, 1], got {}", v.bar_fill)));
        }
        if !(v.radial_base > 0.0 && v.radial_base <= 1.0) {
            return Err(VisualizerError::config(format!("radial_base must be within (0, 1], got {}", v.radial_base)));
        }
        if !(v.radial_scale >= 0.0 && v.radial_scale.is_finite()) {
            return Err(VisualizerError::config(format!("radial_scale must be non-negative, got {}", v.radial_scale)));
        }

        let d = &self.display;
        if !(1..=240).contains(&d.fps) {
            return Err(VisualizerError::config(format!("fps must be within 1..=240, got {}", d.fps)));
        }
        if !(0.0..=0.95).contains(&d.trail) {
            return Err(VisualizerError::config(format!("trail must be within 0.0..=0.95, got {}", d.trail)));
        }
        if self.audio.sample_rate == 0 {
            return Err(VisualizerError::config("sample_rate must be positive"));
        }
        Ok(())
    }

    /// Initialize default config file at XDG path, returns the path
    pub fn init_default_config() -> Result<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, Self::generate_config_template())?;

        Ok(path)
    }

    /// Generate a commented TOML config template
    pub fn generate_config_template() -> String {
        r##"# scopeviz configuration

[audio]
# Capture source to open at startup (see `scopeviz devices`).
# Omit to use the first source PulseAudio reports.
# device = "alsa_input.usb-mic"
# Sample rate in Hz
sample_rate = 44100

[analyser]
# Analysis window; sample buffers hold half of it. Power of two, 32-32768
fft_size = 2048
# Decibel range mapped onto the 0-255 spectrum scale
min_decibels = -100.0
max_decibels = -30.0
# Spectrum averaging between frames (0.0-1.0, higher = smoother)
smoothing = 0.8

[visualizer]
# Style: "waveform", "radial" or "bars"
style = "waveform"
# Color scheme: "spectrum", "rainbow", "fire", "ocean", "mono"
color_scheme = "spectrum"
# Stroke width of the waveform and radial traces
line_width = 2.0
# Center line and radial reference circle
guides = true
# Share of each bar slot filled by the bar (rest is gap)
bar_fill = 0.8
# Vertical gradient on bars instead of a flat colour
bar_gradient = true
# Silent radius as a fraction of the largest circle that fits
radial_base = 0.6
# How far a full-scale sample pushes the outline outward
radial_scale = 0.5

[display]
# Target frames per second
fps = 60
# Fade trail (0.0 = hard clear each frame, up to 0.95)
trail = 0.25
# Background colour
background = "#0a0a12"
# Log frame statistics at debug level
telemetry = false
"##
        .to_string()
    }

    /// Merge CLI arguments into config (CLI takes priority)
    pub fn merge_args(&mut self, args: &crate::Args) {
        if let Some(ref device) = args.device {
            self.audio.device = Some(device.clone());
        }
        if let Some(rate) = args.sample_rate {
            self.audio.sample_rate = rate;
        }
        if let Some(size) = args.fft_size {
            self.analyser.fft_size = size;
        }
        if let Some(smoothing) = args.smoothing {
            self.analyser.smoothing = smoothing;
        }
        if let Some(db) = args.min_decibels {
            self.analyser.min_decibels = db;
        }
        if let Some(db) = args.max_decibels {
            self.analyser.max_decibels = db;
        }
        if let Some(style) = args.style {
            self.visualizer.style = style;
        }
        if let Some(ref colors) = args.colors {
            match colors.parse() {
                Ok(scheme) => self.visualizer.color_scheme = scheme,
                Err(e) => warn!("{}", e),
            }
        }
        if args.no_guides {
            self.visualizer.guides = false;
        }
        if let Some(fps) = args.fps {
            self.display.fps = fps;
        }
        if let Some(trail) = args.trail {
            self.display.trail = trail;
        }
        if args.telemetry {
            self.display.telemetry = true;
        }
    }
}

/// Write the live style, colour scheme and device back into the config file,
/// keeping its comments. Creates the file from the template if missing.
pub fn save_state(
    path: &Path,
    style: VisualStyle,
    color_scheme: ColorScheme,
    device: Option<&str>,
) -> Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Config::generate_config_template())
            .with_context(|| format!("Failed to create config file at {}", path.display()))?;
        info!("Created config file at {}", path.display());
    }

    let content = std::fs::read_to_string(path)?;
    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .context("Failed to parse config for save")?;

    if !doc.contains_key("visualizer") {
        doc["visualizer"] = toml_edit::table();
    }
    doc["visualizer"]["style"] = toml_edit::value(style.key());
    doc["visualizer"]["color_scheme"] = toml_edit::value(color_scheme.name());

    if let Some(device) = device {
        if !doc.contains_key("audio") {
            doc["audio"] = toml_edit::table();
        }
        doc["audio"]["device"] = toml_edit::value(device);
    }

    std::fs::write(path, doc.to_string())?;
    Ok(())
}
