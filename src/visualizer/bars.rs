use crate::config::VisualizerConfig;
use crate::renderer::{DrawCommand, Paint, Rect, SurfaceGeometry};

use super::{level, SampleDomain, Visualizer};

/// One bottom-anchored bar per frequency bin.
pub struct Bars;

impl Visualizer for Bars {
    fn name(&self) -> &'static str {
        "Bars"
    }

    fn domain(&self) -> SampleDomain {
        SampleDomain::Spectrum
    }

    fn transform(
        &self,
        samples: &[u8],
        geometry: SurfaceGeometry,
        config: &VisualizerConfig,
    ) -> Vec<DrawCommand> {
        if geometry.is_degenerate() || samples.is_empty() {
            return Vec::new();
        }

        let count = samples.len();
        let slot_width = geometry.width / count as f32;
        let bar_width = slot_width * config.bar_fill.clamp(0.05, 1.0);

        let mut commands = Vec::with_capacity(count);
        for (i, &sample) in samples.iter().enumerate() {
            let x = i as f32 * slot_width;
            if x >= geometry.width {
                break;
            }
            // Rounding can push a full-width last bar a hair past the edge
            let width = bar_width.min(geometry.width - x);

            let bar_height = level(sample) * geometry.height;
            let position = i as f32 / count as f32;
            let paint = if config.bar_gradient {
                Paint::VerticalGradient {
                    bottom: config.color_scheme.get_color(position, 0.0),
                    top: config.color_scheme.get_color(position, 1.0),
                }
            } else {
                Paint::Solid(config.color_scheme.get_color(position, 0.5))
            };

            commands.push(DrawCommand::FillRect {
                rect: Rect::new(x, geometry.height - bar_height, width, bar_height),
                paint,
            });
        }

        commands
    }
}
