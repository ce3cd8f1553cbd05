//! Perceptual volume normalization
//!
//! Rescales a raw spectrogram until its average perceived loudness hits a
//! target volume, then converts every cell to perceived-loudness units.
//! Two recordings of the same song at different levels (or lengths) come
//! out of this stage nearly identical, which is what makes downstream
//! features comparable across songs.
//!
//! The rescale is a fixed-point iteration, not a closed-form solve: the
//! amplitude → loudness mapping is logarithmic and runs through a
//! frequency-dependent contour lookup, so the right multiplier cannot be
//! computed directly.
//!
//! # Example
//!
//! ```no_run
//! use resona::config::NormalizerConfig;
//! use resona::perception::FlatResponse;
//! use resona::preprocessing::normalize::Normalizer;
//! use resona::spectrogram::Spectrogram;
//!
//! let raw = Spectrogram::new(vec![100.0; 4800], 48)?;
//! let frequencies: Vec<f64> = (0..48).map(|i| 50.0 * (i as f64 + 1.0)).collect();
//! let normalizer = Normalizer::new(FlatResponse, frequencies, NormalizerConfig::default());
//! let normalized = normalizer.normalize_channel(&raw)?;
//! # Ok::<(), resona::AnalysisError>(())
//! ```

use crate::config::NormalizerConfig;
use crate::error::AnalysisError;
use crate::parallel;
use crate::perception::{amplitude_to_db, phons_to_loudness, PerceptionModel};
use crate::spectrogram::{NormalizedSpectrogram, Spectrogram};

/// Iteration cap for the fixed-point rescale. Convergence normally takes
/// well under ten steps; hitting the cap means the perception model broke
/// its monotonicity contract.
const MAX_ITERATIONS: usize = 1000;

/// Sets a spectrogram to a target perceived volume and converts it to
/// perceived-loudness units.
pub struct Normalizer<M: PerceptionModel> {
    model: M,
    /// Center frequency of each bin in Hz.
    frequencies: Vec<f64>,
    config: NormalizerConfig,
}

impl<M: PerceptionModel> Normalizer<M> {
    /// Build a normalizer for spectrograms with the given bin
    /// frequencies.
    pub fn new(model: M, frequencies: Vec<f64>, config: NormalizerConfig) -> Self {
        Self {
            model,
            frequencies,
            config,
        }
    }

    /// Normalize one optional channel. `None` in, `None` out — mono
    /// sources pass their missing right channel straight through.
    ///
    /// # Errors
    ///
    /// Same conditions as [`normalize_channel`](Self::normalize_channel).
    pub fn normalize(
        &self,
        channel: Option<&Spectrogram>,
    ) -> Result<Option<NormalizedSpectrogram>, AnalysisError> {
        match channel {
            Some(raw) => Ok(Some(self.normalize_channel(raw)?)),
            None => Ok(None),
        }
    }

    /// Normalize one channel to the target perceived volume and convert
    /// it to perceived-loudness units.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on a bin-count mismatch with the configured
    /// frequencies, or `Numerical` if the rescale fails to converge.
    pub fn normalize_channel(
        &self,
        raw: &Spectrogram,
    ) -> Result<NormalizedSpectrogram, AnalysisError> {
        if raw.bin_count() != self.frequencies.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "spectrogram has {} bins but normalizer was built for {}",
                raw.bin_count(),
                self.frequencies.len()
            )));
        }

        log::debug!(
            "normalizing {} frames x {} bins to volume {}",
            raw.frame_count(),
            raw.bin_count(),
            self.config.target_volume
        );

        // Work on a copy; the caller's buffer is never touched.
        let mut work = raw.data().to_vec();
        let bin_count = raw.bin_count();

        let mut current = self.overall_volume(&work, bin_count)?;

        // Silence normalizes to silence; entering the loop would divide
        // by zero and never converge.
        if current == 0.0 {
            log::debug!("spectrogram is silent, skipping rescale");
            return Ok(NormalizedSpectrogram::from_loudness(work, bin_count));
        }

        let target = self.config.target_volume;
        let mut iterations = 0usize;
        while (current - target).abs() > self.config.error_bound {
            if iterations >= MAX_ITERATIONS {
                return Err(AnalysisError::Numerical(format!(
                    "volume normalization did not converge after {} iterations \
                     (current {:.6}, target {})",
                    MAX_ITERATIONS, current, target
                )));
            }
            iterations += 1;

            let multiplier =
                (1.0 + ((target / current) - 1.0) * self.config.ratio_multiplier) as f32;
            parallel::for_each_frame_mut(
                &mut work,
                bin_count,
                self.config.frame_leaf,
                &|chunk| {
                    for value in chunk.iter_mut() {
                        *value *= multiplier;
                    }
                },
            );
            current = self.overall_volume(&work, bin_count)?;
        }

        log::debug!(
            "volume converged to {:.4} after {} iterations",
            current,
            iterations
        );

        // The output is entirely in perceived-loudness units, converted
        // with the same transform that measured convergence.
        let frame_count = work.len() / bin_count;
        let mut loudness = vec![0.0f32; work.len()];
        for frame in 0..frame_count {
            for bin in 0..bin_count {
                let index = frame * bin_count + bin;
                loudness[index] = self.perceived(work[index], bin) as f32;
            }
        }

        Ok(NormalizedSpectrogram::from_loudness(loudness, bin_count))
    }

    /// Average perceived loudness over all frames and bins.
    fn overall_volume(&self, data: &[f32], bin_count: usize) -> Result<f64, AnalysisError> {
        let frame_count = data.len() / bin_count;
        let sum = parallel::reduce(
            0..frame_count,
            self.config.frame_leaf,
            &|range| {
                let mut sum = 0.0f64;
                for frame in range {
                    let cells = &data[frame * bin_count..(frame + 1) * bin_count];
                    for (bin, &amplitude) in cells.iter().enumerate() {
                        sum += self.perceived(amplitude, bin);
                    }
                }
                Ok(sum)
            },
            &|a, b| a + b,
        )?;

        Ok(sum / (frame_count * bin_count) as f64)
    }

    /// Perceived loudness of a single cell. Exact zero stays zero without
    /// touching the logarithm.
    fn perceived(&self, amplitude: f32, bin: usize) -> f64 {
        if amplitude == 0.0 {
            return 0.0;
        }
        let db = amplitude_to_db(
            amplitude as f64,
            self.config.db_of_max,
            self.config.reference_peak,
        );
        let phons = self.model.to_phons(db, self.frequencies[bin]);
        phons_to_loudness(phons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::FlatResponse;

    const ERROR_BOUND: f64 = 0.1;

    fn flat_normalizer(bin_count: usize) -> Normalizer<FlatResponse> {
        let frequencies = (0..bin_count).map(|i| 100.0 * (i as f64 + 1.0)).collect();
        Normalizer::new(FlatResponse, frequencies, NormalizerConfig::default())
    }

    fn normalized_flat(frame_count: usize, bin_count: usize, volume: f32) -> NormalizedSpectrogram {
        let raw = Spectrogram::new(vec![volume; frame_count * bin_count], bin_count).unwrap();
        flat_normalizer(bin_count)
            .normalize(Some(&raw))
            .unwrap()
            .unwrap()
    }

    fn assert_frames_equal(a: &NormalizedSpectrogram, b: &NormalizedSpectrogram) {
        for frame in 0..a.frame_count().min(b.frame_count()) {
            for (x, y) in a.frame(frame).iter().zip(b.frame(frame).iter()) {
                assert!(
                    ((x - y) as f64).abs() < ERROR_BOUND,
                    "cells differ: {} vs {}",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_volume_invariance() {
        // Flat responses of very different volumes normalize the same.
        let quiet = normalized_flat(10, 16, 0.1);
        let loud = normalized_flat(10, 16, 10000.0);
        assert_frames_equal(&quiet, &loud);
    }

    #[test]
    fn test_duration_invariance() {
        let brief = normalized_flat(10, 16, 100.0);
        let lengthy = normalized_flat(100, 16, 100.0);
        assert_frames_equal(&brief, &lengthy);
    }

    #[test]
    fn test_converges_to_target_volume() {
        let normalized = normalized_flat(20, 8, 500.0);
        // Flat input: every cell carries the average volume.
        let cell = normalized.frame(0)[0] as f64;
        assert!(
            (cell - 256.0).abs() < ERROR_BOUND,
            "expected ~256 loudness, got {}",
            cell
        );
    }

    #[test]
    fn test_silence_passes_through() {
        let raw = Spectrogram::new(vec![0.0; 64], 8).unwrap();
        let normalized = flat_normalizer(8).normalize(Some(&raw)).unwrap().unwrap();
        assert!(normalized.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_missing_channel_passes_through() {
        let result = flat_normalizer(8).normalize(None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_does_not_mutate_input() {
        let raw = Spectrogram::new(vec![123.0; 64], 8).unwrap();
        let _ = flat_normalizer(8).normalize(Some(&raw)).unwrap();
        assert!(raw.data().iter().all(|&v| v == 123.0));
    }

    #[test]
    fn test_bin_count_mismatch_is_rejected() {
        let raw = Spectrogram::new(vec![1.0; 64], 8).unwrap();
        assert!(flat_normalizer(4).normalize(Some(&raw)).is_err());
    }

    #[test]
    fn test_leaf_threshold_does_not_change_result() {
        let raw = Spectrogram::new(vec![250.0; 30 * 8], 8).unwrap();
        let frequencies: Vec<f64> = (0..8).map(|i| 100.0 * (i as f64 + 1.0)).collect();

        let mut reference: Option<NormalizedSpectrogram> = None;
        for frame_leaf in [1, 7, 1024] {
            let config = NormalizerConfig {
                frame_leaf,
                ..NormalizerConfig::default()
            };
            let normalizer = Normalizer::new(FlatResponse, frequencies.clone(), config);
            let normalized = normalizer.normalize(Some(&raw)).unwrap().unwrap();
            if let Some(reference) = &reference {
                assert_frames_equal(reference, &normalized);
            } else {
                reference = Some(normalized);
            }
        }
    }
}
