//! Analysis kinds, similarity scoring and ranking
//!
//! - [`SoundAnalysis`]: the comparable unit — a named feature set of one
//!   song, either produced by this crate's pipeline or supplied by an
//!   external service
//! - [`compare`]: the similarity engine and its scoring configuration
//! - [`ranking`]: batch comparison and best/worst filtering

pub mod compare;
pub mod ranking;

use crate::features::FeatureSet;

/// The sound analysis of one song.
///
/// Kinds never mix: comparing a [`Full`](SoundAnalysis::Full) analysis to
/// an [`External`](SoundAnalysis::External) one is a usage error, not a
/// low score.
#[derive(Debug, Clone)]
pub enum SoundAnalysis {
    /// Feature set computed by this crate's pipeline (or loaded back from
    /// disk).
    Full {
        /// Display name, typically the song's file stem
        name: String,
        /// The extracted features
        features: FeatureSet,
    },
    /// Feature vector supplied by an external music service.
    External {
        /// Display name
        name: String,
        /// Service-defined feature values; both sides of a comparison
        /// must use the same vector layout
        features: Vec<f64>,
    },
}

impl SoundAnalysis {
    /// Display name of the analyzed song.
    pub fn name(&self) -> &str {
        match self {
            SoundAnalysis::Full { name, .. } => name,
            SoundAnalysis::External { name, .. } => name,
        }
    }
}

/// One scored pair. `a` and `b` index the analysis slice the result was
/// produced from (for cross-list comparisons, `a` indexes the first list
/// and `b` the second). Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareResult {
    /// Index of the first analysis
    pub a: usize,
    /// Index of the second analysis
    pub b: usize,
    /// Similarity in `[0, 1)`: 1.0 is identical, values near 0 are
    /// maximally different
    pub score: f64,
}
