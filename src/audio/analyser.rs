use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::AnalyserConfig;

/// Turns a window of mono samples into byte-scaled waveform and spectrum buffers.
pub struct Analyser {
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
    smoothing: f32,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    previous_magnitudes: Vec<f32>,
}

impl Analyser {
    pub fn new(config: &AnalyserConfig) -> Self {
        let fft_size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        // Hann window for smoother frequency response
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();

        Self {
            fft_size,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            smoothing: config.smoothing,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            window,
            previous_magnitudes: vec![0.0; fft_size / 2],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Write the most recent `out.len()` samples as bytes centered on 128.
    /// Missing history reads as silence.
    pub fn byte_time_domain(&self, samples: &[f32], out: &mut [u8]) {
        let skip = samples.len().saturating_sub(out.len());
        let recent = &samples[skip..];
        let pad = out.len() - recent.len();
        out[..pad].fill(128);
        for (byte, &sample) in out[pad..].iter_mut().zip(recent) {
            *byte = (128.0 + sample * 128.0).clamp(0.0, 255.0) as u8;
        }
    }

    /// Write smoothed magnitudes of the most recent `fft_size` samples, scaled so
    /// `min_decibels` maps to 0 and `max_decibels` to 255.
    pub fn byte_frequency(&mut self, samples: &[f32], out: &mut [u8]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        let recent = &samples[skip..];
        let pad = self.fft_size - recent.len();

        // Zero-pad in front so the newest sample always lands at the end of the window
        self.buffer[..pad].fill(Complex::new(0.0, 0.0));
        for (i, &sample) in recent.iter().enumerate() {
            self.buffer[pad + i] = Complex::new(sample * self.window[pad + i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for (bin, previous) in self.previous_magnitudes.iter_mut().enumerate() {
            let magnitude = self.buffer[bin].norm() * scale;
            let smoothed = self.smoothing * *previous + (1.0 - self.smoothing) * magnitude;
            // Keep the averaging state finite even if the input was not
            *previous = if smoothed.is_finite() { smoothed } else { 0.0 };

            if let Some(byte) = out.get_mut(bin) {
                let db = 20.0 * previous.log10();
                *byte = if db.is_finite() {
                    (255.0 * (db - self.min_decibels) / range).clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser(smoothing: f32) -> Analyser {
        Analyser::new(&AnalyserConfig {
            fft_size: 256,
            smoothing,
            ..Default::default()
        })
    }

    #[test]
    fn time_domain_is_centered_on_128() {
        let a = analyser(0.0);
        let mut out = [0u8; 4];
        a.byte_time_domain(&[9.0, 0.0, 1.0, -1.0, 0.5], &mut out);
        assert_eq!(out, [128, 255, 0, 192]);
    }

    #[test]
    fn short_history_pads_with_silence() {
        let a = analyser(0.0);
        let mut out = [0u8; 4];
        a.byte_time_domain(&[-1.0], &mut out);
        assert_eq!(out, [128, 128, 128, 0]);
    }

    #[test]
    fn silence_has_empty_spectrum() {
        let mut a = analyser(0.0);
        let mut out = vec![7u8; a.bin_count()];
        a.byte_frequency(&vec![0.0; 256], &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut a = Analyser::new(&AnalyserConfig {
            fft_size: 256,
            smoothing: 0.0,
            max_decibels: 0.0,
            ..Default::default()
        });
        let bin = 16;
        let samples: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / 256.0).sin())
            .collect();
        let mut out = vec![0u8; a.bin_count()];
        a.byte_frequency(&samples, &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|&(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
        assert!(out[bin] > out[bin - 1] && out[bin] > out[bin + 1]);
    }

    #[test]
    fn smoothing_carries_history() {
        let mut a = analyser(0.9);
        let samples: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / 256.0).sin())
            .collect();
        let mut out = vec![0u8; a.bin_count()];
        a.byte_frequency(&samples, &mut out);
        a.byte_frequency(&vec![0.0; 256], &mut out);
        assert!(out[8] > 0, "history should decay, not vanish");

        let mut fresh = analyser(0.9);
        fresh.byte_frequency(&vec![0.0; 256], &mut out);
        assert_eq!(out[8], 0);
    }
}
