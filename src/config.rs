//! Configuration parameters for spectrogram analysis

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::features::FeatureLayout;

/// Analysis configuration parameters
///
/// Carries the system-wide constants two analyses must share to be
/// comparable (bin count, frame rate, lag window, tempo range) plus the
/// tuning knobs of the individual stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of frequency bins per frame (default: 48)
    pub bin_count: usize,

    /// Time resolution of incoming spectrograms in frames per second
    /// (default: 100.0)
    pub frame_rate: f64,

    /// Normalizer tuning
    pub normalizer: NormalizerConfig,

    /// Temporal feature tuning
    pub temporal: TemporalConfig,
}

/// Perceptual volume normalization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// dB assigned to a full amplitude sine wave (default: 90.0)
    pub db_of_max: f64,

    /// Amplitude treated as full scale (default: 32767.0, i16 peak)
    pub reference_peak: f64,

    /// Target perceived volume in loudness units (default: 256.0, 80 phons)
    pub target_volume: f64,

    /// Convergence tolerance around the target volume (default: 1e-3)
    pub error_bound: f64,

    /// Overshoot factor on the rescale step (default: 2.0)
    ///
    /// The loudness response to an amplitude multiplier is sublinear, so
    /// the raw target/current ratio under-corrects; this factor
    /// compensates.
    pub ratio_multiplier: f64,

    /// Frames per parallel leaf for volume measurement and rescaling
    /// (default: 256; performance knob only)
    pub frame_leaf: usize,
}

/// Correlation and peak-rate extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Correlation look-ahead window in seconds (default: 1.0)
    pub correlation_seconds: f64,

    /// Lowest candidate tempo in beats per minute (default: 15)
    pub rate_min: u32,

    /// Highest candidate tempo in beats per minute (default: 300)
    ///
    /// Must stay below `60 * frame_rate / 3` so the peak-detection
    /// window keeps at least four samples.
    pub rate_max: u32,

    /// Bins per parallel leaf for correlation and peak-rate extraction
    /// (default: 1; performance knob only)
    pub bin_leaf: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bin_count: 48,
            frame_rate: 100.0,
            normalizer: NormalizerConfig::default(),
            temporal: TemporalConfig::default(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            db_of_max: 90.0,
            reference_peak: 32767.0,
            target_volume: 256.0,
            error_bound: 1e-3,
            ratio_multiplier: 2.0,
            frame_leaf: 256,
        }
    }
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            correlation_seconds: 1.0,
            rate_min: 15,
            rate_max: 300,
            bin_leaf: 1,
        }
    }
}

impl AnalysisConfig {
    /// Number of correlation lags implied by the frame rate and window.
    pub fn lag_count(&self) -> usize {
        (self.frame_rate * self.temporal.correlation_seconds).round() as usize
    }

    /// The fixed constants baked into feature sets produced under this
    /// configuration.
    pub fn feature_layout(&self) -> FeatureLayout {
        FeatureLayout {
            bin_count: self.bin_count,
            lag_count: self.lag_count(),
            rate_min: self.temporal.rate_min,
            rate_max: self.temporal.rate_max,
        }
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first offending parameter.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.bin_count == 0 {
            return Err(AnalysisError::InvalidInput(
                "bin count must be positive".to_string(),
            ));
        }
        if self.frame_rate <= 0.0 || !self.frame_rate.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "invalid frame rate: {}",
                self.frame_rate
            )));
        }
        if self.normalizer.target_volume <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "target volume must be positive, got {}",
                self.normalizer.target_volume
            )));
        }
        if self.normalizer.error_bound <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "error bound must be positive, got {}",
                self.normalizer.error_bound
            )));
        }
        if self.normalizer.ratio_multiplier <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "ratio multiplier must be positive, got {}",
                self.normalizer.ratio_multiplier
            )));
        }
        if self.normalizer.reference_peak <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "reference peak must be positive, got {}",
                self.normalizer.reference_peak
            )));
        }
        if self.temporal.correlation_seconds <= 0.0 || self.lag_count() == 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "correlation window of {} s yields no lags",
                self.temporal.correlation_seconds
            )));
        }
        if self.temporal.rate_min == 0 || self.temporal.rate_min > self.temporal.rate_max {
            return Err(AnalysisError::InvalidInput(format!(
                "invalid tempo range: [{}, {}]",
                self.temporal.rate_min, self.temporal.rate_max
            )));
        }
        if self.temporal.rate_max as f64 >= 60.0 * self.frame_rate / 3.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "rate_max {} too high for frame rate {} (needs < {})",
                self.temporal.rate_max,
                self.frame_rate,
                60.0 * self.frame_rate / 3.0
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lag_count(), 100);
        assert_eq!(config.feature_layout().rate_span(), 286);
    }

    #[test]
    fn test_validate_rejects_tempo_range() {
        let mut config = AnalysisConfig::default();
        config.temporal.rate_min = 200;
        config.temporal.rate_max = 100;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.frame_rate = 10.0;
        // 300 BPM needs a frame rate above 15 fps.
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_normalizer() {
        let mut config = AnalysisConfig::default();
        config.normalizer.error_bound = 0.0;
        assert!(config.validate().is_err());
    }
}
