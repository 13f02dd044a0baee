use std::f32::consts::TAU;

use crate::config::VisualizerConfig;
use crate::renderer::{DrawCommand, Point, Stroke, SurfaceGeometry};

use super::{level, SampleDomain, Visualizer};

/// Closed loop around the center; louder samples push the outline outward.
pub struct Radial;

/// Convert polar coordinates around (`cx`, `cy`) to surface coordinates.
#[inline]
pub fn polar_to_grid(cx: f32, cy: f32, angle: f32, radius: f32) -> (f32, f32) {
    (cx + angle.cos() * radius, cy + angle.sin() * radius)
}

/// Radius of the silent circle: `radial_base` of the largest circle that fits.
pub fn base_radius(geometry: SurfaceGeometry, config: &VisualizerConfig) -> f32 {
    geometry.width.min(geometry.height) / 2.0 * config.radial_base
}

impl Visualizer for Radial {
    fn name(&self) -> &'static str {
        "Radial"
    }

    fn domain(&self) -> SampleDomain {
        SampleDomain::Waveform
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

        let center = geometry.center();
        let base = base_radius(geometry, config);
        let mut commands = Vec::with_capacity(2);

        if config.guides {
            commands.push(DrawCommand::Arc {
                center,
                radius: base,
                start: 0.0,
                end: TAU,
                stroke: Stroke::new(config.color_scheme.get_color(0.2, 0.1).with_alpha(0.5), 1.0),
            });
        }

        let count = samples.len() as f32;
        let points = samples
            .iter()
            .enumerate()
            .map(|(i, &sample)| {
                let angle = i as f32 / count * TAU;
                let radius = base * (1.0 + level(sample) * config.radial_scale);
                let (x, y) = polar_to_grid(center.x, center.y, angle, radius);
                Point::new(x, y)
            })
            .collect();

        commands.push(DrawCommand::Path {
            points,
            closed: true,
            stroke: Stroke::new(config.color_scheme.get_color(0.8, 0.7), config.line_width),
        });

        commands
    }
}
