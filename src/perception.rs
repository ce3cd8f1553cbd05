//! Perceived-loudness model
//!
//! Converts sound pressure (dB) at a given frequency into phons, the unit
//! of perceived loudness. The contour data itself comes from the caller —
//! this crate only defines the seam and the phon/loudness arithmetic used
//! by the normalizer.
//!
//! Loudness units are scaled so that 256 loudness ≈ 80 phons
//! (`loudness = 2^(phons / 10)`).

use crate::error::AnalysisError;

/// Maps sound pressure level to perceived loudness at a given frequency.
///
/// Implementations must be monotonic in `db` for a fixed frequency; the
/// normalizer's fixed-point iteration relies on it.
pub trait PerceptionModel: Sync {
    /// Convert a sound pressure level in dB at `frequency_hz` to phons.
    fn to_phons(&self, db: f64, frequency_hz: f64) -> f64;
}

impl<M: PerceptionModel + ?Sized> PerceptionModel for &M {
    fn to_phons(&self, db: f64, frequency_hz: f64) -> f64 {
        (**self).to_phons(db, frequency_hz)
    }
}

/// Convert phons to loudness units (256 loudness ≈ 80 phons).
pub fn phons_to_loudness(phons: f64) -> f64 {
    (phons / 10.0).exp2()
}

/// Convert a raw spectrogram amplitude to dB.
///
/// `reference_peak` is the amplitude treated as `db_of_max` dB (a full
/// amplitude sine wave); amplitudes below it map to lower levels on a
/// 20·log10 scale. The caller must not pass an amplitude of zero — exact
/// silence is short-circuited before the logarithm.
pub fn amplitude_to_db(amplitude: f64, db_of_max: f64, reference_peak: f64) -> f64 {
    db_of_max + 20.0 * (amplitude / reference_peak).log10()
}

/// Frequency-independent model: phons == dB everywhere.
///
/// Useful when no contour data is available, and as the reference model in
/// tests (it makes expected loudness values computable by hand).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatResponse;

impl PerceptionModel for FlatResponse {
    fn to_phons(&self, db: f64, _frequency_hz: f64) -> f64 {
        db
    }
}

/// Equal-loudness contour lookup over a caller-supplied grid.
///
/// The grid holds phon values for every (dB level, frequency) knot;
/// queries bilinearly interpolate between knots and clamp outside the
/// grid. Rows are dB levels, columns are frequencies, both strictly
/// ascending.
#[derive(Debug, Clone)]
pub struct ContourTable {
    frequencies: Vec<f64>,
    db_levels: Vec<f64>,
    /// Row-major: `phons[level_index * frequencies.len() + freq_index]`.
    phons: Vec<f64>,
}

impl ContourTable {
    /// Build a contour table from grid data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if either axis is empty or not strictly
    /// ascending, or if `phons` does not have `db_levels.len() ×
    /// frequencies.len()` entries.
    pub fn new(
        frequencies: Vec<f64>,
        db_levels: Vec<f64>,
        phons: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        if frequencies.is_empty() || db_levels.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "contour table axes must be non-empty".to_string(),
            ));
        }
        if !strictly_ascending(&frequencies) || !strictly_ascending(&db_levels) {
            return Err(AnalysisError::InvalidInput(
                "contour table axes must be strictly ascending".to_string(),
            ));
        }
        if phons.len() != frequencies.len() * db_levels.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "contour table needs {} phon values, got {}",
                frequencies.len() * db_levels.len(),
                phons.len()
            )));
        }

        Ok(Self {
            frequencies,
            db_levels,
            phons,
        })
    }

    fn at(&self, level_index: usize, freq_index: usize) -> f64 {
        self.phons[level_index * self.frequencies.len() + freq_index]
    }
}

impl PerceptionModel for ContourTable {
    fn to_phons(&self, db: f64, frequency_hz: f64) -> f64 {
        let (f0, f1, ft) = bracket(&self.frequencies, frequency_hz);
        let (l0, l1, lt) = bracket(&self.db_levels, db);

        let low = lerp(self.at(l0, f0), self.at(l0, f1), ft);
        let high = lerp(self.at(l1, f0), self.at(l1, f1), ft);
        lerp(low, high, lt)
    }
}

fn strictly_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] < pair[1])
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Find the two knot indices bracketing `value` and the interpolation
/// fraction between them, clamping outside the axis range.
fn bracket(axis: &[f64], value: f64) -> (usize, usize, f64) {
    if value <= axis[0] {
        return (0, 0, 0.0);
    }
    let last = axis.len() - 1;
    if value >= axis[last] {
        return (last, last, 0.0);
    }

    let upper = axis.partition_point(|&knot| knot <= value);
    let lower = upper - 1;
    let t = (value - axis[lower]) / (axis[upper] - axis[lower]);
    (lower, upper, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table() -> ContourTable {
        // 2 levels x 3 frequencies
        ContourTable::new(
            vec![100.0, 1000.0, 10000.0],
            vec![40.0, 80.0],
            vec![
                30.0, 40.0, 35.0, // 40 dB row
                70.0, 80.0, 75.0, // 80 dB row
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_loudness_scale_convention() {
        // 80 phons is 256 loudness by convention.
        assert!((phons_to_loudness(80.0) - 256.0).abs() < 1e-9);
        assert!((phons_to_loudness(0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_response_passthrough() {
        let model = FlatResponse;
        assert_eq!(model.to_phons(63.0, 50.0), 63.0);
        assert_eq!(model.to_phons(63.0, 15000.0), 63.0);
    }

    #[test]
    fn test_contour_hits_knots_exactly() {
        let table = small_table();
        assert_eq!(table.to_phons(40.0, 100.0), 30.0);
        assert_eq!(table.to_phons(40.0, 1000.0), 40.0);
        assert_eq!(table.to_phons(80.0, 10000.0), 75.0);
    }

    #[test]
    fn test_contour_interpolates_between_knots() {
        let table = small_table();
        // Halfway between 40 dB and 80 dB at 1000 Hz: (40 + 80) / 2.
        assert!((table.to_phons(60.0, 1000.0) - 60.0).abs() < 1e-9);
        // Frequency midpoint of the 40 dB row between 100 and 1000 Hz.
        assert!((table.to_phons(40.0, 550.0) - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_contour_clamps_outside_grid() {
        let table = small_table();
        assert_eq!(table.to_phons(40.0, 1.0), 30.0);
        assert_eq!(table.to_phons(40.0, 96000.0), 35.0);
        assert_eq!(table.to_phons(-20.0, 100.0), 30.0);
        assert_eq!(table.to_phons(120.0, 100.0), 70.0);
    }

    #[test]
    fn test_contour_rejects_bad_grids() {
        assert!(ContourTable::new(vec![], vec![40.0], vec![]).is_err());
        assert!(ContourTable::new(vec![100.0, 100.0], vec![40.0], vec![1.0, 2.0]).is_err());
        assert!(ContourTable::new(vec![100.0, 200.0], vec![40.0], vec![1.0]).is_err());
    }
}
