use crate::config::VisualizerConfig;
use crate::renderer::{DrawCommand, Point, Stroke, SurfaceGeometry};

use super::{SampleDomain, Visualizer};

/// Oscilloscope trace across the full width.
pub struct WaveformLine;

/// Vertical position of a time-domain sample.
///
/// 128 lands exactly on the center line, 0 on the bottom edge and 255 on the
/// top edge. The two halves use slightly different slopes (128 steps below the
/// center, 127 above) so both extremes are reached exactly.
pub fn sample_to_y(sample: u8, height: f32) -> f32 {
    let centered = sample as f32 - 128.0;
    let offset = if centered >= 0.0 {
        centered / 127.0
    } else {
        centered / 128.0
    };
    height / 2.0 - offset * height / 2.0
}

impl Visualizer for WaveformLine {
    fn name(&self) -> &'static str {
        "Waveform"
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

        let mut commands = Vec::with_capacity(2);
        let center_y = geometry.height / 2.0;

        if config.guides {
            let guide = config.color_scheme.get_color(0.5, 0.0).with_alpha(0.35);
            commands.push(DrawCommand::Path {
                points: vec![Point::new(0.0, center_y), Point::new(geometry.width, center_y)],
                closed: false,
                stroke: Stroke::new(guide, 1.0),
            });
        }

        let step = geometry.width / samples.len() as f32;
        let points = samples
            .iter()
            .enumerate()
            .map(|(i, &sample)| Point::new(i as f32 * step, sample_to_y(sample, geometry.height)))
            .collect();

        commands.push(DrawCommand::Path {
            points,
            closed: false,
            stroke: Stroke::new(config.color_scheme.get_color(0.6, 0.8), config.line_width),
        });

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(commands: &[DrawCommand]) -> &[Point] {
        match commands.last() {
            Some(DrawCommand::Path { points, .. }) => points,
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn silence_is_a_flat_center_line() {
        let config = VisualizerConfig::default();
        let geometry = SurfaceGeometry::new(400.0, 200.0);
        let commands = WaveformLine.transform(&[128; 64], geometry, &config);
        let points = trace(&commands);

        assert_eq!(points.len(), 64);
        assert!(points.iter().all(|p| p.y == 100.0));
        assert_eq!(points[0].x, 0.0);
        assert_eq!(points[32].x, 200.0);
    }

    #[test]
    fn extremes_map_to_edges_monotonically() {
        assert_eq!(sample_to_y(0, 200.0), 200.0);
        assert_eq!(sample_to_y(128, 200.0), 100.0);
        assert_eq!(sample_to_y(255, 200.0), 0.0);

        let ys: Vec<f32> = (0..=255u8).map(|s| sample_to_y(s, 200.0)).collect();
        assert!(ys.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn guide_line_is_optional() {
        let mut config = VisualizerConfig::default();
        let geometry = SurfaceGeometry::new(100.0, 50.0);

        config.guides = true;
        assert_eq!(WaveformLine.transform(&[128; 4], geometry, &config).len(), 2);

        config.guides = false;
        assert_eq!(WaveformLine.transform(&[128; 4], geometry, &config).len(), 1);
    }
}
