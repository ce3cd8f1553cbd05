//! Batch comparison and ranking
//!
//! Scores collections of analyses pairwise and filters the result down to
//! something a person can read. All outputs are sorted by score,
//! descending. Pairwise scoring fans out over the index range with the
//! same recursive split as every other expensive operation; a failed
//! comparison in any leaf fails the whole call.

use std::collections::{BTreeSet, HashSet};

use crate::analysis::compare::SimilarityEngine;
use crate::analysis::{CompareResult, SoundAnalysis};
use crate::error::AnalysisError;
use crate::parallel;

/// Analyses per parallel leaf. Performance knob only.
const COMPARE_LEAF: usize = 10;

/// Score every unordered pair of `analyses`, sorted descending.
///
/// Each leaf takes a slice of first indices `i` and scores them against
/// every `j > i`, so no pair is scored twice.
///
/// # Errors
///
/// Returns the first comparison error; no partial result is produced.
pub fn compare_all(
    engine: &SimilarityEngine,
    analyses: &[SoundAnalysis],
) -> Result<Vec<CompareResult>, AnalysisError> {
    log::debug!(
        "comparing all pairs of {} analyses ({} comparisons)",
        analyses.len(),
        analyses.len() * analyses.len().saturating_sub(1) / 2
    );

    let mut results = parallel::reduce(
        0..analyses.len(),
        COMPARE_LEAF,
        &|range| {
            let mut out = Vec::new();
            for i in range {
                for j in (i + 1)..analyses.len() {
                    out.push(CompareResult {
                        a: i,
                        b: j,
                        score: engine.compare(&analyses[i], &analyses[j])?,
                    });
                }
            }
            Ok(out)
        },
        &parallel::concat,
    )?;

    sort_descending(&mut results);
    Ok(results)
}

/// Score the full cross product of `these` against `those`, sorted
/// descending. In every result, `a` indexes `these` and `b` indexes
/// `those`. The split runs over `those`, by convention the larger side.
///
/// # Errors
///
/// Returns the first comparison error; no partial result is produced.
pub fn compare_these_to_those(
    engine: &SimilarityEngine,
    these: &[SoundAnalysis],
    those: &[SoundAnalysis],
) -> Result<Vec<CompareResult>, AnalysisError> {
    log::debug!(
        "comparing {} analyses to {} ({} comparisons)",
        these.len(),
        those.len(),
        these.len() * those.len()
    );

    let mut results = parallel::reduce(
        0..those.len(),
        COMPARE_LEAF,
        &|range| {
            let mut out = Vec::new();
            for j in range {
                for (i, this) in these.iter().enumerate() {
                    out.push(CompareResult {
                        a: i,
                        b: j,
                        score: engine.compare(this, &those[j])?,
                    });
                }
            }
            Ok(out)
        },
        &parallel::concat,
    )?;

    sort_descending(&mut results);
    Ok(results)
}

/// Keep only each analysis' most and least similar match.
///
/// `sorted_results` must be a descending-sorted [`compare_all`] output
/// (both sides of every result index the same list). For every distinct
/// index, the first occurrence from the top is its best match and the
/// first from the bottom its worst; a pair serving two roles appears
/// once. Shrinks the O(n²) full list to at most 2n results, descending.
pub fn most_and_least_similar(sorted_results: &[CompareResult]) -> Vec<CompareResult> {
    let mut items: BTreeSet<usize> = BTreeSet::new();
    for result in sorted_results {
        items.insert(result.a);
        items.insert(result.b);
    }

    let mut picked: HashSet<(usize, usize)> = HashSet::new();
    let mut filtered = Vec::new();
    for &item in &items {
        let involves = |result: &&CompareResult| result.a == item || result.b == item;
        if let Some(best) = sorted_results.iter().find(involves) {
            if picked.insert((best.a, best.b)) {
                filtered.push(*best);
            }
        }
        if let Some(worst) = sorted_results.iter().rev().find(involves) {
            if picked.insert((worst.a, worst.b)) {
                filtered.push(*worst);
            }
        }
    }

    sort_descending(&mut filtered);
    filtered
}

fn sort_descending(results: &mut [CompareResult]) {
    results.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
