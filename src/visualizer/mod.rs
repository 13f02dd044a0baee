mod bars;
mod radial;
mod waveform;

pub use bars::Bars;
pub use radial::Radial;
pub use waveform::WaveformLine;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::VisualizerConfig;
use crate::renderer::{DrawCommand, SurfaceGeometry};

/// Which representation a style consumes from the sample source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDomain {
    /// Time-domain amplitudes centered on 128.
    Waveform,
    /// Frequency-bin magnitudes, 0 = silence.
    Spectrum,
}

/// Maps one sample buffer onto a display list.
///
/// Implementations are pure: the same buffer, geometry and config always yield
/// the same commands, and a degenerate geometry yields none.
pub trait Visualizer {
    fn name(&self) -> &'static str;

    fn domain(&self) -> SampleDomain;

    fn transform(
        &self,
        samples: &[u8],
        geometry: SurfaceGeometry,
        config: &VisualizerConfig,
    ) -> Vec<DrawCommand>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VisualStyle {
    #[default]
    Waveform,
    Radial,
    Bars,
}

impl VisualStyle {
    pub fn all() -> &'static [VisualStyle] {
        &[VisualStyle::Waveform, VisualStyle::Radial, VisualStyle::Bars]
    }

    pub fn next(&self) -> Self {
        let all = Self::all();
        let current = all.iter().position(|s| s == self).unwrap_or(0);
        all[(current + 1) % all.len()]
    }

    pub fn visualizer(&self) -> &'static dyn Visualizer {
        match self {
            VisualStyle::Waveform => &WaveformLine,
            VisualStyle::Radial => &Radial,
            VisualStyle::Bars => &Bars,
        }
    }

    pub fn name(&self) -> &'static str {
        self.visualizer().name()
    }

    pub fn domain(&self) -> SampleDomain {
        self.visualizer().domain()
    }

    /// Lowercase identifier used in config files and IPC.
    pub fn key(&self) -> &'static str {
        match self {
            VisualStyle::Waveform => "waveform",
            VisualStyle::Radial => "radial",
            VisualStyle::Bars => "bars",
        }
    }
}

impl fmt::Display for VisualStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisualStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "waveform" | "wave" | "line" => Ok(VisualStyle::Waveform),
            "radial" | "circle" => Ok(VisualStyle::Radial),
            "bars" | "spectrum" => Ok(VisualStyle::Bars),
            _ => Err(format!("Unknown style: {}", s)),
        }
    }
}

/// Sample value normalized to 0.0..=1.0.
#[inline]
pub(crate) fn level(sample: u8) -> f32 {
    sample as f32 / 255.0
}
