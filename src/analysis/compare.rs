//! Pairwise similarity scoring
//!
//! Scores two analyses by combining a correlation-tensor distance with a
//! peak-rate (tempo) distance and squashing the sum into `[0, 1)`:
//! `score = 1 − (2/π)·atan(distance)`. Identical feature sets have
//! distance 0 and score 1.0.
//!
//! The weights, exponents and the tempo distance metric were hand-tuned
//! over the project's history and exist in several incompatible presets,
//! so they live in an explicit, versioned [`ScoringConfig`] instead of
//! constants; see [`PeakRatePolicy`] for the two surviving tempo metrics.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::analysis::SoundAnalysis;
use crate::error::AnalysisError;
use crate::features::{ChannelFeatures, FeatureSet, PeakRateTable, TemporalFeatures};

/// How many top tempo candidates the harmonic tempo metric keeps per side.
const TOP_TEMPO_COUNT: usize = 5;

/// How the peak-rate tables of two songs are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakRatePolicy {
    /// Mean `|Δ|^exponent` over the whole table.
    Elementwise,
    /// Compare the five strongest tempo candidates of each side, weighted
    /// by rank proximity, scoring each pair by how close its ratio is to
    /// 1, 2 or ½ (tempo doubling and halving count as near-matches).
    TopTempoHarmonics,
}

/// Similarity scoring weights and exponents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Preset version, bumped whenever the tuning changes
    pub version: u32,
    /// Weight of the correlation-tensor distance
    pub correlation_weight: f64,
    /// Exponent on elementwise correlation differences
    pub correlation_exponent: f64,
    /// Weight of the peak-rate distance
    pub peak_rate_weight: f64,
    /// Exponent on peak-rate differences
    pub peak_rate_exponent: f64,
    /// Tempo distance metric
    pub peak_rate_policy: PeakRatePolicy,
}

impl Default for ScoringConfig {
    /// The current tuning: harmonic tempo matching.
    fn default() -> Self {
        Self {
            version: 2,
            correlation_weight: 0.1,
            correlation_exponent: 1.0,
            peak_rate_weight: 0.2,
            peak_rate_exponent: 2.0,
            peak_rate_policy: PeakRatePolicy::TopTempoHarmonics,
        }
    }
}

impl ScoringConfig {
    /// The earlier tuning: plain elementwise peak-rate distance.
    pub fn elementwise() -> Self {
        Self {
            version: 1,
            peak_rate_policy: PeakRatePolicy::Elementwise,
            ..Self::default()
        }
    }
}

/// Scores pairs of analyses under one [`ScoringConfig`].
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    scoring: ScoringConfig,
}

impl SimilarityEngine {
    /// Build an engine with the given scoring configuration.
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    /// The scoring configuration in use.
    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Score two analyses.
    ///
    /// Mono pairs score one comparison; a stereo pair averages the
    /// left/left and right/right comparisons; a stereo-to-mono pair
    /// averages left-to-mono and right-to-mono. Channels are never
    /// cross-compared.
    ///
    /// # Errors
    ///
    /// Returns `Incompatible` when the analyses differ in kind, were
    /// extracted under different layouts, or lack temporal features.
    pub fn compare(&self, a: &SoundAnalysis, b: &SoundAnalysis) -> Result<f64, AnalysisError> {
        match (a, b) {
            (
                SoundAnalysis::Full { features: fa, .. },
                SoundAnalysis::Full { features: fb, .. },
            ) => self.compare_full(fa, fb),
            (
                SoundAnalysis::External { features: va, .. },
                SoundAnalysis::External { features: vb, .. },
            ) => self.compare_external(va, vb),
            _ => Err(AnalysisError::Incompatible(format!(
                "cannot compare {} to {}: different analysis kinds",
                a.name(),
                b.name()
            ))),
        }
    }

    fn compare_full(&self, a: &FeatureSet, b: &FeatureSet) -> Result<f64, AnalysisError> {
        if a.layout != b.layout {
            return Err(AnalysisError::Incompatible(format!(
                "feature layouts differ: {:?} vs {:?}",
                a.layout, b.layout
            )));
        }

        match (&a.right, &b.right) {
            (Some(a_right), Some(b_right)) => {
                let left = self.mono_compare(&a.left, &b.left)?;
                let right = self.mono_compare(a_right, b_right)?;
                Ok(0.5 * left + 0.5 * right)
            }
            (Some(a_right), None) => {
                let left = self.mono_compare(&a.left, &b.left)?;
                let right = self.mono_compare(a_right, &b.left)?;
                Ok(0.5 * left + 0.5 * right)
            }
            (None, Some(b_right)) => {
                let left = self.mono_compare(&a.left, &b.left)?;
                let right = self.mono_compare(&a.left, b_right)?;
                Ok(0.5 * left + 0.5 * right)
            }
            (None, None) => self.mono_compare(&a.left, &b.left),
        }
    }

    fn mono_compare(
        &self,
        a: &ChannelFeatures,
        b: &ChannelFeatures,
    ) -> Result<f64, AnalysisError> {
        let (a, b) = match (&a.temporal, &b.temporal) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(AnalysisError::Incompatible(
                    "similarity scoring requires temporal features on both sides".to_string(),
                ))
            }
        };

        let correlation = self.correlation_difference(a, b) * self.scoring.correlation_weight;
        let peak_rate = self.peak_rate_difference(a, b) * self.scoring.peak_rate_weight;
        log::debug!(
            "correlation difference = {:.6}, peak rate difference = {:.6}",
            correlation,
            peak_rate
        );

        Ok(1.0 - (2.0 / PI) * (correlation + peak_rate).atan())
    }

    /// Mean lag-decayed elementwise distance between correlation tensors.
    /// Short lags weigh fully; a difference at lag `k` counts `1/(k+1)`.
    fn correlation_difference(&self, a: &TemporalFeatures, b: &TemporalFeatures) -> f64 {
        let lag_count = a.correlation.lag_count();
        let exponent = self.scoring.correlation_exponent;

        let mut sum = 0.0f64;
        for (index, (&x, &y)) in a
            .correlation
            .values()
            .iter()
            .zip(b.correlation.values().iter())
            .enumerate()
        {
            let lag = index % lag_count;
            sum += ((x - y).abs() as f64).powf(exponent) / (lag + 1) as f64;
        }

        sum / a.correlation.values().len() as f64
    }

    fn peak_rate_difference(&self, a: &TemporalFeatures, b: &TemporalFeatures) -> f64 {
        match self.scoring.peak_rate_policy {
            PeakRatePolicy::Elementwise => {
                elementwise_difference(&a.peak_rates, &b.peak_rates, self.scoring.peak_rate_exponent)
            }
            PeakRatePolicy::TopTempoHarmonics => {
                harmonic_difference(&a.peak_rates, &b.peak_rates, self.scoring.peak_rate_exponent)
            }
        }
    }

    /// External feature vectors: mean absolute difference, squashed the
    /// same way as full comparisons.
    fn compare_external(&self, a: &[f64], b: &[f64]) -> Result<f64, AnalysisError> {
        if a.len() != b.len() {
            return Err(AnalysisError::Incompatible(format!(
                "external feature vectors differ in length: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        if a.is_empty() {
            return Err(AnalysisError::Incompatible(
                "external feature vectors are empty".to_string(),
            ));
        }

        let distance: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - y).abs())
            .sum::<f64>()
            / a.len() as f64;
        Ok(1.0 - (2.0 / PI) * distance.atan())
    }
}

fn elementwise_difference(a: &PeakRateTable, b: &PeakRateTable, exponent: f64) -> f64 {
    let sum: f64 = a
        .values()
        .iter()
        .zip(b.values().iter())
        .map(|(&x, &y)| (x - y).abs().powf(exponent))
        .sum();
    sum / a.values().len() as f64
}

/// Compare the strongest tempo candidates of each side.
///
/// Every cross pair of the two top-five lists contributes its harmonic
/// ratio distance, weighted down as the ranks grow: the two #1 tempos
/// count fully, the pair of #5s barely at all.
fn harmonic_difference(a: &PeakRateTable, b: &PeakRateTable, exponent: f64) -> f64 {
    let top_a = strongest_tempos(a, TOP_TEMPO_COUNT);
    let top_b = strongest_tempos(b, TOP_TEMPO_COUNT);

    let mut sum = 0.0f64;
    for (rank_a, &tempo_a) in top_a.iter().enumerate() {
        for (rank_b, &tempo_b) in top_b.iter().enumerate() {
            let rank_weight = 1.0 - (rank_a + rank_b) as f64 / 9.0;
            sum += rank_weight * harmonic_ratio_distance(tempo_a, tempo_b).powf(exponent);
        }
    }
    sum
}

/// Candidate tempos ranked by total strength across all bins, strongest
/// first.
fn strongest_tempos(table: &PeakRateTable, count: usize) -> Vec<u32> {
    let rate_span = table.rate_span();
    let mut strength = vec![0.0f64; rate_span];
    for bin in 0..table.values().len() / rate_span {
        for (rate_index, total) in strength.iter_mut().enumerate() {
            *total += table.get(bin, rate_index);
        }
    }

    let mut order: Vec<usize> = (0..rate_span).collect();
    order.sort_by(|&x, &y| {
        strength[y]
            .partial_cmp(&strength[x])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(count);
    order
        .into_iter()
        .map(|rate_index| table.rate_min() + rate_index as u32)
        .collect()
}

/// How far the ratio of two tempos is from the nearest of 1x, 2x and ½x.
/// Zero at an exact match, double or half tempo.
fn harmonic_ratio_distance(a: u32, b: u32) -> f64 {
    let ratio = |x: f64, y: f64| if x >= y { x / y } else { y / x };
    let a = a as f64;
    let b = b as f64;
    ratio(a, b).min(ratio(2.0 * a, b)).min(ratio(0.5 * a, b)) - 1.0
}
