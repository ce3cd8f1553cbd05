//! Spectrogram value types and the spectrogram source seam
//!
//! Computing a spectrogram from an audio file (decoding + transform) is a
//! collaborator's job; this crate consumes one through
//! [`SpectrogramSource`]. Storage is frame-major and flat: frame `i`
//! occupies `data[i * bin_count .. (i + 1) * bin_count]`.

use crate::error::AnalysisError;

/// Audio channel selector for stereo sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Left channel (also the only channel of a mono source).
    Left,
    /// Right channel (absent for mono sources).
    Right,
}

/// A raw amplitude spectrogram: time-ordered frames of non-negative
/// amplitudes, one per frequency bin. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    data: Vec<f32>,
    frame_count: usize,
    bin_count: usize,
}

impl Spectrogram {
    /// Build a spectrogram from frame-major amplitudes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `bin_count` is zero, `data` is empty or
    /// not a whole number of frames, or any cell is negative or not
    /// finite.
    pub fn new(data: Vec<f32>, bin_count: usize) -> Result<Self, AnalysisError> {
        if bin_count == 0 {
            return Err(AnalysisError::InvalidInput(
                "bin count must be positive".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "empty spectrogram".to_string(),
            ));
        }
        if data.len() % bin_count != 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "{} amplitudes do not divide into frames of {} bins",
                data.len(),
                bin_count
            )));
        }
        if data.iter().any(|&v| !v.is_finite() || v < 0.0) {
            return Err(AnalysisError::InvalidInput(
                "amplitudes must be finite and non-negative".to_string(),
            ));
        }

        let frame_count = data.len() / bin_count;
        Ok(Self {
            data,
            frame_count,
            bin_count,
        })
    }

    /// Number of time frames.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of frequency bins per frame.
    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Amplitudes of frame `index`.
    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.bin_count..(index + 1) * self.bin_count]
    }

    /// The whole frame-major buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// A spectrogram whose cells are perceived-loudness values
/// (256 loudness ≈ 80 phons; 0.0 is exact silence).
///
/// Only the normalizer produces these.
#[derive(Debug, Clone)]
pub struct NormalizedSpectrogram {
    data: Vec<f32>,
    frame_count: usize,
    bin_count: usize,
}

impl NormalizedSpectrogram {
    pub(crate) fn from_loudness(data: Vec<f32>, bin_count: usize) -> Self {
        debug_assert!(bin_count > 0 && !data.is_empty() && data.len() % bin_count == 0);
        let frame_count = data.len() / bin_count;
        Self {
            data,
            frame_count,
            bin_count,
        }
    }

    /// Number of time frames.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of frequency bins per frame.
    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Loudness values of frame `index`.
    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.bin_count..(index + 1) * self.bin_count]
    }

    /// Loudness of one bin over time, gathered into a contiguous vector.
    pub fn bin_track(&self, bin: usize) -> Vec<f32> {
        (0..self.frame_count)
            .map(|frame| self.data[frame * self.bin_count + bin])
            .collect()
    }

    /// The whole frame-major buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Where spectrograms come from.
///
/// A source owns the transform of one song: per-channel amplitudes plus
/// the fixed constants (frame rate, bin count, bin center frequencies)
/// the analysis needs.
pub trait SpectrogramSource {
    /// Amplitudes of one channel; `None` means the source has no such
    /// channel (mono sources have no right channel).
    fn amplitudes(&self, channel: Channel) -> Option<&Spectrogram>;

    /// Center frequency of bin `bin` in Hz.
    fn frequency_at_bin(&self, bin: usize) -> f64;

    /// Time resolution in frames per second.
    fn frame_rate(&self) -> f64;

    /// Number of frequency bins per frame.
    fn bin_count(&self) -> usize;
}

/// An in-memory [`SpectrogramSource`] over already-computed transforms.
#[derive(Debug, Clone)]
pub struct BufferedSource {
    left: Spectrogram,
    right: Option<Spectrogram>,
    frequencies: Vec<f64>,
    frame_rate: f64,
}

impl BufferedSource {
    /// Wrap precomputed per-channel spectrograms.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the channels disagree on bin count, the
    /// frequency list does not cover every bin, or the frame rate is not
    /// positive.
    pub fn new(
        left: Spectrogram,
        right: Option<Spectrogram>,
        frequencies: Vec<f64>,
        frame_rate: f64,
    ) -> Result<Self, AnalysisError> {
        if frequencies.len() != left.bin_count() {
            return Err(AnalysisError::InvalidInput(format!(
                "{} bin frequencies for {} bins",
                frequencies.len(),
                left.bin_count()
            )));
        }
        if let Some(right) = &right {
            if right.bin_count() != left.bin_count() {
                return Err(AnalysisError::InvalidInput(format!(
                    "left has {} bins but right has {}",
                    left.bin_count(),
                    right.bin_count()
                )));
            }
        }
        if frame_rate <= 0.0 || !frame_rate.is_finite() {
            return Err(AnalysisError::InvalidInput(format!(
                "invalid frame rate: {}",
                frame_rate
            )));
        }

        Ok(Self {
            left,
            right,
            frequencies,
            frame_rate,
        })
    }
}

impl SpectrogramSource for BufferedSource {
    fn amplitudes(&self, channel: Channel) -> Option<&Spectrogram> {
        match channel {
            Channel::Left => Some(&self.left),
            Channel::Right => self.right.as_ref(),
        }
    }

    fn frequency_at_bin(&self, bin: usize) -> f64 {
        self.frequencies[bin]
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn bin_count(&self) -> usize {
        self.left.bin_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrogram_shape() {
        let s = Spectrogram::new(vec![1.0; 12], 4).unwrap();
        assert_eq!(s.frame_count(), 3);
        assert_eq!(s.bin_count(), 4);
        assert_eq!(s.frame(2), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_spectrogram_rejects_bad_input() {
        assert!(Spectrogram::new(vec![1.0; 12], 0).is_err());
        assert!(Spectrogram::new(vec![], 4).is_err());
        assert!(Spectrogram::new(vec![1.0; 13], 4).is_err());
        assert!(Spectrogram::new(vec![1.0, -0.5, 1.0, 1.0], 4).is_err());
        assert!(Spectrogram::new(vec![1.0, f32::NAN, 1.0, 1.0], 4).is_err());
    }

    #[test]
    fn test_bin_track_gathers_across_frames() {
        let data = vec![
            0.0, 1.0, //
            2.0, 3.0, //
            4.0, 5.0,
        ];
        let n = NormalizedSpectrogram::from_loudness(data, 2);
        assert_eq!(n.bin_track(0), vec![0.0, 2.0, 4.0]);
        assert_eq!(n.bin_track(1), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_buffered_source_channels() {
        let left = Spectrogram::new(vec![1.0; 8], 2).unwrap();
        let source = BufferedSource::new(left, None, vec![100.0, 200.0], 50.0).unwrap();
        assert!(source.amplitudes(Channel::Left).is_some());
        assert!(source.amplitudes(Channel::Right).is_none());
        assert_eq!(source.bin_count(), 2);
        assert_eq!(source.frequency_at_bin(1), 200.0);
    }

    #[test]
    fn test_buffered_source_rejects_mismatched_channels() {
        let left = Spectrogram::new(vec![1.0; 8], 2).unwrap();
        let right = Spectrogram::new(vec![1.0; 9], 3).unwrap();
        assert!(BufferedSource::new(left, Some(right), vec![100.0, 200.0], 50.0).is_err());
    }
}
