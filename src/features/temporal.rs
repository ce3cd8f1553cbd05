//! Temporal channel features: cross-bin correlation and tempo matching
//!
//! Two measurements over a normalized spectrogram:
//!
//! - **Correlation tensor**: for every ordered bin pair and every
//!   look-ahead lag, the Pearson correlation of frame-to-frame loudness
//!   deltas. Captures which parts of the spectrum move together, and at
//!   what delay.
//! - **Peak-rate table**: for every bin and every candidate tempo, how
//!   strongly the bin's loudness peaks repeat at that tempo. A
//!   peak-detection window is convolved along the bin, then the peakness
//!   sequence is sampled at beat spacing for every phase offset; the best
//!   offset wins.
//!
//! The correlation tensor is O(bins² · lags · frames) and dominates the
//! cost of the whole pipeline. Both measurements split the bin range
//! recursively and concatenate leaf output in absolute bin order.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::{CorrelationTensor, PeakRateTable, TemporalFeatures};
use crate::parallel;
use crate::spectrogram::NormalizedSpectrogram;

/// Extract the correlation tensor and peak-rate table.
///
/// `volume` is the per-bin average loudness from
/// [`basic::extract`](crate::features::basic::extract); the peak-rate
/// normalization divides by it.
///
/// # Errors
///
/// Returns `InvalidInput` if the spectrogram's bin count disagrees with
/// the configuration or the volume slice.
pub fn extract(
    normalized: &NormalizedSpectrogram,
    volume: &[f64],
    config: &AnalysisConfig,
) -> Result<TemporalFeatures, AnalysisError> {
    let bin_count = normalized.bin_count();
    if bin_count != config.bin_count {
        return Err(AnalysisError::InvalidInput(format!(
            "spectrogram has {} bins but configuration expects {}",
            bin_count, config.bin_count
        )));
    }
    if volume.len() != bin_count {
        return Err(AnalysisError::InvalidInput(format!(
            "{} volume entries for {} bins",
            volume.len(),
            bin_count
        )));
    }
    // The fastest tempo must leave a usable detection window.
    if config.temporal.rate_max as f64 >= 60.0 * config.frame_rate / 3.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "rate_max {} too high for frame rate {}",
            config.temporal.rate_max, config.frame_rate
        )));
    }

    log::debug!(
        "extracting temporal features: {} bins, {} lags, tempos {}..={}",
        bin_count,
        config.lag_count(),
        config.temporal.rate_min,
        config.temporal.rate_max
    );

    let correlation = correlation_tensor(normalized, config)?;
    let peak_rates = peak_rate_table(normalized, volume, config)?;

    Ok(TemporalFeatures {
        correlation,
        peak_rates,
    })
}

/// Pearson correlation of loudness deltas for every (bin, bin, lag).
fn correlation_tensor(
    normalized: &NormalizedSpectrogram,
    config: &AnalysisConfig,
) -> Result<CorrelationTensor, AnalysisError> {
    let bin_count = normalized.bin_count();
    let frame_count = normalized.frame_count();
    let lag_count = config.lag_count();

    // Frame-to-frame deltas per bin, shared read-only by every leaf.
    let deltas: Vec<Vec<f32>> = (0..bin_count)
        .map(|bin| {
            let track = normalized.bin_track(bin);
            track.windows(2).map(|pair| pair[1] - pair[0]).collect()
        })
        .collect();

    let values = parallel::reduce(
        0..bin_count,
        config.temporal.bin_leaf,
        &|range| {
            let mut out = Vec::with_capacity(range.len() * bin_count * lag_count);
            for bin_a in range {
                for bin_b in 0..bin_count {
                    for lag in 0..lag_count {
                        out.push(correlation(
                            &deltas[bin_a],
                            &deltas[bin_b],
                            bin_a,
                            bin_b,
                            lag,
                            frame_count,
                        ));
                    }
                }
            }
            Ok(out)
        },
        &parallel::concat,
    )?;

    Ok(CorrelationTensor::from_values(values, bin_count, lag_count))
}

/// Correlation of one bin pair at one lag.
fn correlation(
    deltas_a: &[f32],
    deltas_b: &[f32],
    bin_a: usize,
    bin_b: usize,
    lag: usize,
    frame_count: usize,
) -> f32 {
    // Diagonal identity: a bin always correlates perfectly with itself
    // at zero lag. Skipping the arithmetic keeps it exact.
    if bin_a == bin_b && lag == 0 {
        return 1.0;
    }

    // Overlap of the two delta sequences at this lag.
    if frame_count < lag + 2 {
        return 0.0;
    }
    let overlap = frame_count - 1 - lag;

    let mut sum_aa = 0.0f64;
    let mut sum_bb = 0.0f64;
    let mut sum_ab = 0.0f64;
    for i in 0..overlap {
        let a = deltas_a[i] as f64;
        let b = deltas_b[i + lag] as f64;
        sum_aa += a * a;
        sum_bb += b * b;
        sum_ab += a * b;
    }

    // A flat bin has no variance to correlate; defined as zero, not NaN.
    let denominator = (sum_aa * sum_bb).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    (sum_ab / denominator) as f32
}

/// Tempo match strength for every (bin, candidate rate).
fn peak_rate_table(
    normalized: &NormalizedSpectrogram,
    volume: &[f64],
    config: &AnalysisConfig,
) -> Result<PeakRateTable, AnalysisError> {
    let bin_count = normalized.bin_count();
    let rate_min = config.temporal.rate_min;
    let rate_max = config.temporal.rate_max;

    // Windows and beat spacings depend only on the rate; build them once.
    let rates: Vec<u32> = (rate_min..=rate_max).collect();
    let windows: Vec<Vec<f64>> = rates
        .iter()
        .map(|&rate| detection_window(config.frame_rate, rate))
        .collect();
    let spacings: Vec<f64> = rates
        .iter()
        .map(|&rate| config.frame_rate / (rate as f64 / 60.0))
        .collect();

    let values = parallel::reduce(
        0..bin_count,
        config.temporal.bin_leaf,
        &|range| {
            let mut out = Vec::with_capacity(range.len() * rates.len());
            for bin in range {
                let track = normalized.bin_track(bin);
                for (index, window) in windows.iter().enumerate() {
                    out.push(peak_rate_match(&track, window, spacings[index], volume[bin]));
                }
            }
            Ok(out)
        },
        &parallel::concat,
    )?;

    Ok(PeakRateTable::from_values(
        values, bin_count, rate_min, rate_max,
    ))
}

/// Peak-detection window for one candidate tempo.
///
/// Even length of roughly one beat, negative flanks summing to −2 and a
/// twin +1 center, so a lone peak scores +2 and a flat region scores 0.
/// The smallest window (at the highest legal rate) is `{-1, 1, 1, -1}`.
fn detection_window(frame_rate: f64, rate: u32) -> Vec<f64> {
    let mut length = (frame_rate / (rate as f64 / 60.0)).ceil() as usize;
    if length % 2 == 1 {
        length += 1;
    }
    debug_assert!(length >= 4);

    let flank = -2.0 / (length as f64 - 2.0);
    let mut window = vec![flank; length];
    window[(length - 1) / 2] = 1.0;
    window[length / 2] = 1.0;
    window
}

/// How well one bin's peaks repeat at one candidate tempo.
fn peak_rate_match(track: &[f32], window: &[f64], samples_per_beat: f64, volume: f64) -> f64 {
    // A silent bin has no peaks to match.
    if volume == 0.0 {
        return 0.0;
    }

    let peaks = convolve_peaks(track, window);
    let last = (track.len() - 1) as f64;

    // Best beat-spaced sum of peakness over all phase offsets within one
    // window length.
    let mut best = f64::NEG_INFINITY;
    for offset in 0..window.len() {
        let mut sum = 0.0f64;
        let mut position = offset as f64;
        while position <= last {
            sum += interpolate(&peaks, position);
            position += samples_per_beat;
        }
        if sum > best {
            best = sum;
        }
    }

    best * samples_per_beat / (track.len() as f64 * volume)
}

/// Slide the window along the track; edge samples where the window would
/// overhang stay zero.
fn convolve_peaks(track: &[f32], window: &[f64]) -> Vec<f64> {
    let half = window.len() / 2;
    let mut peaks = vec![0.0f64; track.len()];
    for center in half..track.len().saturating_sub(half) {
        let mut sum = 0.0f64;
        for (offset, &weight) in window.iter().enumerate() {
            sum += weight * track[center + offset - half] as f64;
        }
        peaks[center] = sum;
    }
    peaks
}

/// Linear interpolation at a fractional index.
fn interpolate(values: &[f64], index: f64) -> f64 {
    let floor = index.floor() as usize;
    let ceiling = (index.ceil() as usize).min(values.len() - 1);
    let fraction = index - floor as f64;
    values[floor] + (values[ceiling] - values[floor]) * fraction
}
