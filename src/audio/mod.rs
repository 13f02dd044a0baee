pub mod analyser;
mod capture;

pub use capture::{list_sources, PulseDevices};

use serde::{Deserialize, Serialize};

use crate::error::VisualizerError;

/// A capture source the user can pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub label: String,
}

/// Analyser tuning fixed when a session opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyserConfig {
    /// Analysis window size; sample buffers hold half of it.
    pub fft_size: usize,
    /// Magnitude mapped to byte 0.
    pub min_decibels: f32,
    /// Magnitude mapped to byte 255.
    pub max_decibels: f32,
    /// Weight of the previous spectrum when averaging (0.0 = none).
    pub smoothing: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

impl AnalyserConfig {
    pub const MIN_FFT_SIZE: usize = 32;
    pub const MAX_FFT_SIZE: usize = 32768;

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<(), VisualizerError> {
        if !self.fft_size.is_power_of_two()
            || !(Self::MIN_FFT_SIZE..=Self::MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(VisualizerError::config(format!(
                "fft_size must be a power of two between {} and {}, got {}",
                Self::MIN_FFT_SIZE,
                Self::MAX_FFT_SIZE,
                self.fft_size
            )));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(VisualizerError::config(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(VisualizerError::config(format!(
                "smoothing must be within 0.0..=1.0, got {}",
                self.smoothing
            )));
        }
        Ok(())
    }
}

/// Live binding between an open capture stream and the samples derived from it.
///
/// Buffers written by the read methods always hold [`SampleSource::buffer_len`]
/// bytes for the lifetime of the session.
pub trait SampleSource {
    fn buffer_len(&self) -> usize;

    /// Centered amplitudes, 128 = zero crossing.
    fn read_waveform(&mut self, out: &mut [u8]);

    /// Magnitudes by ascending frequency bin, 0 = silence.
    fn read_spectrum(&mut self, out: &mut [u8]);

    /// Release the capture stream. Safe to call more than once.
    fn close(&mut self);

    /// Reports a stream that died underneath an open session.
    fn ensure_alive(&self) -> Result<(), VisualizerError> {
        Ok(())
    }
}

/// Enumerates capture devices and opens sessions on them.
pub trait DeviceManager {
    type Session: SampleSource;

    fn list_input_devices(&self) -> Result<Vec<InputDevice>, VisualizerError>;

    fn open_session(
        &mut self,
        device_id: &str,
        analyser: &AnalyserConfig,
    ) -> Result<Self::Session, VisualizerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_analyser_is_valid() {
        let config = AnalyserConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bin_count(), 1024);
    }

    #[test]
    fn rejects_bad_analyser_tuning() {
        let bad_size = AnalyserConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(matches!(bad_size.validate(), Err(VisualizerError::Config(_))));

        let inverted = AnalyserConfig {
            min_decibels: -10.0,
            max_decibels: -20.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let smoothing = AnalyserConfig {
            smoothing: 1.5,
            ..Default::default()
        };
        assert!(smoothing.validate().is_err());
    }
}
