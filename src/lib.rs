//! # Resona
//!
//! A perceptual audio-similarity engine. Takes the spectrogram of a song
//! (amplitude per frequency bin per time frame, per channel), normalizes
//! it to a target perceived loudness, extracts a compact feature set —
//! frequency balance, dynamics, cross-bin correlation, tempo matches —
//! and scores feature sets pairwise so a collection of songs can be
//! ranked by similarity.
//!
//! ## Quick Start
//!
//! ```no_run
//! use resona::{analyze, AnalysisConfig, Spectrogram, BufferedSource};
//! use resona::perception::FlatResponse;
//! use resona::analysis::compare::{ScoringConfig, SimilarityEngine};
//! use resona::analysis::SoundAnalysis;
//! use resona::analysis::ranking::compare_all;
//!
//! let config = AnalysisConfig::default();
//!
//! // Spectrograms come from an external transform.
//! let left = Spectrogram::new(vec![0.0f32; 48 * 1000], 48)?;
//! let frequencies: Vec<f64> = (0..48).map(|i| 50.0 * (i + 1) as f64).collect();
//! let source = BufferedSource::new(left, None, frequencies, 100.0)?;
//!
//! let features = analyze(&source, &FlatResponse, &config)?;
//! let song = SoundAnalysis::Full { name: "song".to_string(), features };
//!
//! let engine = SimilarityEngine::new(ScoringConfig::default());
//! let ranked = compare_all(&engine, &[song.clone(), song])?;
//! println!("best score: {:.4}", ranked[0].score);
//! # Ok::<(), resona::AnalysisError>(())
//! ```
//!
//! ## Architecture
//!
//! The analysis pipeline follows this flow:
//!
//! ```text
//! Spectrogram → Normalizer → Basic features → Temporal features → FeatureSet
//! FeatureSet × FeatureSet → SimilarityEngine → ranked CompareResults
//! ```
//!
//! Every expensive stage fans out over a recursive divide-and-conquer
//! split (see [`parallel`]); results are identical to the serial
//! computation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod parallel;
pub mod perception;
pub mod preprocessing;
pub mod spectrogram;

// Re-export main types
pub use analysis::{CompareResult, SoundAnalysis};
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use features::FeatureSet;
pub use spectrogram::{BufferedSource, Channel, Spectrogram, SpectrogramSource};

use perception::PerceptionModel;
use preprocessing::normalize::Normalizer;
use spectrogram::NormalizedSpectrogram;

/// Analyze one song's spectrogram into a complete feature set.
///
/// Runs the full pipeline per channel: perceptual normalization, basic
/// volume/dynamics extraction, then the correlation tensor and peak-rate
/// table. Mono sources produce a single-channel set.
///
/// # Arguments
///
/// * `source` - The song's spectrogram and its fixed constants
/// * `model` - Perceived-loudness model (dB at a frequency → phons)
/// * `config` - Analysis configuration; must agree with the source's
///   bin count and frame rate
///
/// # Errors
///
/// Returns `AnalysisError` if the configuration is inconsistent, the
/// source disagrees with it, or any stage fails.
pub fn analyze<S, M>(
    source: &S,
    model: &M,
    config: &AnalysisConfig,
) -> Result<FeatureSet, AnalysisError>
where
    S: SpectrogramSource,
    M: PerceptionModel,
{
    config.validate()?;

    if source.bin_count() != config.bin_count {
        return Err(AnalysisError::InvalidInput(format!(
            "source has {} bins but configuration expects {}",
            source.bin_count(),
            config.bin_count
        )));
    }
    if source.frame_rate() != config.frame_rate {
        return Err(AnalysisError::InvalidInput(format!(
            "source frame rate {} disagrees with configured {}",
            source.frame_rate(),
            config.frame_rate
        )));
    }

    let left = source.amplitudes(Channel::Left).ok_or_else(|| {
        AnalysisError::InvalidInput("source has no left channel".to_string())
    })?;

    log::debug!(
        "analyzing {} frames x {} bins ({})",
        left.frame_count(),
        left.bin_count(),
        if source.amplitudes(Channel::Right).is_some() {
            "stereo"
        } else {
            "mono"
        }
    );

    let frequencies: Vec<f64> = (0..config.bin_count)
        .map(|bin| source.frequency_at_bin(bin))
        .collect();
    let normalizer = Normalizer::new(model, frequencies, config.normalizer.clone());

    let left = normalizer.normalize_channel(left)?;
    let right = normalizer.normalize(source.amplitudes(Channel::Right))?;

    let left = extract_channel(&left, config)?;
    let right = match &right {
        Some(right) => Some(extract_channel(right, config)?),
        None => None,
    };

    Ok(FeatureSet {
        layout: config.feature_layout(),
        left,
        right,
    })
}

/// Analyze a song and wrap the result as a named [`SoundAnalysis`],
/// ready for the ranking façade.
///
/// # Errors
///
/// Same conditions as [`analyze`].
pub fn analyze_named<S, M>(
    name: &str,
    source: &S,
    model: &M,
    config: &AnalysisConfig,
) -> Result<SoundAnalysis, AnalysisError>
where
    S: SpectrogramSource,
    M: PerceptionModel,
{
    Ok(SoundAnalysis::Full {
        name: name.to_string(),
        features: analyze(source, model, config)?,
    })
}

fn extract_channel(
    normalized: &NormalizedSpectrogram,
    config: &AnalysisConfig,
) -> Result<features::ChannelFeatures, AnalysisError> {
    let mut channel = features::basic::extract(normalized)?;
    channel.temporal = Some(features::temporal::extract(
        normalized,
        &channel.volume,
        config,
    )?);
    Ok(channel)
}
