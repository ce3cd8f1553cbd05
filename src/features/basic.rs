//! Basic channel features: frequency balance and dynamics
//!
//! For each bin of a normalized spectrogram, measures the average
//! loudness and how much the loudness rises and falls between consecutive
//! frames. Squaring the deltas weighs sharp transients over slow swells.

use crate::error::AnalysisError;
use crate::features::ChannelFeatures;
use crate::spectrogram::NormalizedSpectrogram;

/// Exponent applied to each frame-to-frame loudness delta.
const VOLUME_CHANGE_EXPONENT: f64 = 2.0;
/// Scale factor keeping dynamics values in the same ballpark as volume.
const VOLUME_CHANGE_WEIGHT: f64 = 0.002;

/// Extract volume and rise/fall dynamics for every bin.
///
/// The returned [`ChannelFeatures`] has no temporal block; see
/// [`crate::features::temporal`] for that.
///
/// # Errors
///
/// Returns `InvalidInput` for a spectrogram with no frames.
pub fn extract(normalized: &NormalizedSpectrogram) -> Result<ChannelFeatures, AnalysisError> {
    let frame_count = normalized.frame_count();
    let bin_count = normalized.bin_count();
    if frame_count == 0 {
        return Err(AnalysisError::InvalidInput(
            "cannot extract features from an empty spectrogram".to_string(),
        ));
    }

    log::debug!(
        "extracting basic features over {} frames x {} bins",
        frame_count,
        bin_count
    );

    let mut volume = vec![0.0f64; bin_count];
    let mut rise = vec![0.0f64; bin_count];
    let mut fall = vec![0.0f64; bin_count];

    for frame in 0..frame_count {
        let cells = normalized.frame(frame);
        for (bin, &value) in cells.iter().enumerate() {
            volume[bin] += value as f64;
        }
        if frame > 0 {
            let previous = normalized.frame(frame - 1);
            for bin in 0..bin_count {
                let delta = cells[bin] as f64 - previous[bin] as f64;
                if delta > 0.0 {
                    rise[bin] += delta.powf(VOLUME_CHANGE_EXPONENT);
                } else if delta < 0.0 {
                    fall[bin] += (-delta).powf(VOLUME_CHANGE_EXPONENT);
                }
            }
        }
    }

    let frames = frame_count as f64;
    for bin in 0..bin_count {
        volume[bin] /= frames;
        rise[bin] *= VOLUME_CHANGE_WEIGHT / frames;
        fall[bin] *= VOLUME_CHANGE_WEIGHT / frames;
    }

    let rise_plus_fall: Vec<f64> = (0..bin_count).map(|bin| rise[bin] + fall[bin]).collect();
    // Exact equality short-circuits to zero so a perfectly symmetric
    // signal cannot pick up floating-point residue.
    let rise_minus_fall: Vec<f64> = (0..bin_count)
        .map(|bin| {
            if rise[bin] == fall[bin] {
                0.0
            } else {
                rise[bin] - fall[bin]
            }
        })
        .collect();

    Ok(ChannelFeatures {
        volume,
        rise_plus_fall,
        rise_minus_fall,
        temporal: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::NormalizedSpectrogram;

    fn spectrogram_from_tracks(tracks: &[Vec<f32>]) -> NormalizedSpectrogram {
        let bin_count = tracks.len();
        let frame_count = tracks[0].len();
        let mut data = vec![0.0f32; frame_count * bin_count];
        for (bin, track) in tracks.iter().enumerate() {
            for (frame, &value) in track.iter().enumerate() {
                data[frame * bin_count + bin] = value;
            }
        }
        NormalizedSpectrogram::from_loudness(data, bin_count)
    }

    #[test]
    fn test_volume_is_time_average() {
        let features =
            extract(&spectrogram_from_tracks(&[vec![10.0, 20.0, 30.0]])).unwrap();
        assert!((features.volume[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_signal_has_no_dynamics() {
        let features = extract(&spectrogram_from_tracks(&[vec![50.0; 8]])).unwrap();
        assert_eq!(features.rise_plus_fall[0], 0.0);
        assert_eq!(features.rise_minus_fall[0], 0.0);
    }

    #[test]
    fn test_rise_and_fall_accumulate_squared_deltas() {
        // One rise of 3 and one fall of 1 over 3 frames.
        let features =
            extract(&spectrogram_from_tracks(&[vec![5.0, 8.0, 7.0]])).unwrap();
        let scale = 0.002 / 3.0;
        let rise = 9.0 * scale;
        let fall = 1.0 * scale;
        assert!((features.rise_plus_fall[0] - (rise + fall)).abs() < 1e-12);
        assert!((features.rise_minus_fall[0] - (rise - fall)).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_signal_has_exact_zero_asymmetry() {
        // Mirror-image rise and fall: every up-step has a matching
        // down-step, so rise == fall exactly.
        let features = extract(&spectrogram_from_tracks(&[vec![
            0.0, 4.0, 9.0, 4.0, 0.0, 4.0, 9.0, 4.0, 0.0,
        ]]))
        .unwrap();
        assert_eq!(features.rise_minus_fall[0], 0.0);
        assert!(features.rise_plus_fall[0] > 0.0);
    }

    #[test]
    fn test_bins_are_independent() {
        let features = extract(&spectrogram_from_tracks(&[
            vec![1.0, 1.0, 1.0],
            vec![0.0, 6.0, 0.0],
        ]))
        .unwrap();
        assert_eq!(features.rise_plus_fall[0], 0.0);
        assert!(features.rise_plus_fall[1] > 0.0);
    }
}
