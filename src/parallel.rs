//! Recursive divide-and-conquer primitives
//!
//! Every expensive operation in this crate fans out over an index range:
//! volume measurement and rescaling over frames, correlation and peak-rate
//! extraction over frequency bins, pairwise scoring over analysis lists.
//! They all share one shape — split the range in half down to a leaf
//! threshold, compute leaves sequentially, combine on the way back up —
//! so they all go through the two entry points here instead of carrying
//! their own fork/join scaffolding.
//!
//! Leaves are pure (read-only access to already-published buffers) except
//! for [`for_each_frame_mut`], which hands each task a disjoint sub-slice.
//! An `Err` from any leaf fails the whole operation; there are no partial
//! results. The leaf threshold is a performance knob only — results are
//! identical for every threshold value.

use std::ops::Range;

use crate::error::AnalysisError;

/// Recursively split `range`, run `leaf` on sub-ranges of at most
/// `leaf_len` elements, and fold the results with `combine`.
///
/// `combine` is applied left-to-right, so ordered combines (for example
/// concatenating per-bin output in absolute bin order) are safe.
///
/// # Errors
///
/// Returns the first `Err` produced by any leaf; sibling results are
/// discarded.
pub fn reduce<T, L, C>(
    range: Range<usize>,
    leaf_len: usize,
    leaf: &L,
    combine: &C,
) -> Result<T, AnalysisError>
where
    T: Send,
    L: Fn(Range<usize>) -> Result<T, AnalysisError> + Sync,
    C: Fn(T, T) -> T + Sync,
{
    let len = range.end.saturating_sub(range.start);
    if len <= leaf_len.max(1) {
        return leaf(range);
    }

    let mid = range.start + len / 2;
    let (first, second) = rayon::join(
        || reduce(range.start..mid, leaf_len, leaf, combine),
        || reduce(mid..range.end, leaf_len, leaf, combine),
    );

    Ok(combine(first?, second?))
}

/// Apply `f` to disjoint frame-aligned chunks of a flat frame-major
/// buffer, recursively splitting down to `leaf_frames` frames per task.
///
/// This is the in-place sibling of [`reduce`], used for bulk updates that
/// touch every cell (the normalizer's rescale step). Chunks never overlap,
/// so no synchronization is needed.
pub fn for_each_frame_mut<F>(data: &mut [f32], bin_count: usize, leaf_frames: usize, f: &F)
where
    F: Fn(&mut [f32]) + Sync,
{
    debug_assert!(bin_count > 0 && data.len() % bin_count == 0);

    let frames = data.len() / bin_count;
    if frames <= leaf_frames.max(1) {
        f(data);
        return;
    }

    let (first, second) = data.split_at_mut((frames / 2) * bin_count);
    rayon::join(
        || for_each_frame_mut(first, bin_count, leaf_frames, f),
        || for_each_frame_mut(second, bin_count, leaf_frames, f),
    );
}

/// Ordered concatenation combine for leaves that emit vectors.
pub fn concat<T>(mut first: Vec<T>, second: Vec<T>) -> Vec<T> {
    first.extend(second);
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_matches_serial_sum() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64 * 0.25).collect();
        let serial: f64 = values.iter().sum();

        for leaf_len in [1, 3, 16, 100, usize::MAX] {
            let parallel = reduce(
                0..values.len(),
                leaf_len,
                &|range| Ok(values[range].iter().sum::<f64>()),
                &|a, b| a + b,
            )
            .unwrap();
            assert!(
                (parallel - serial).abs() < 1e-6,
                "leaf_len={} gave {} instead of {}",
                leaf_len,
                parallel,
                serial
            );
        }
    }

    #[test]
    fn test_reduce_preserves_order() {
        let collected = reduce(
            0..257,
            4,
            &|range| Ok(range.collect::<Vec<usize>>()),
            &concat,
        )
        .unwrap();
        let expected: Vec<usize> = (0..257).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_reduce_empty_range() {
        let sum = reduce(5..5, 8, &|range| Ok(range.len() as f64), &|a, b| a + b).unwrap();
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn test_reduce_propagates_leaf_error() {
        let result = reduce(
            0..64,
            1,
            &|range| {
                if range.contains(&40) {
                    Err(AnalysisError::InvalidInput("bad leaf".to_string()))
                } else {
                    Ok(range.len())
                }
            },
            &|a, b| a + b,
        );
        assert!(result.is_err(), "leaf error must fail the whole reduce");
    }

    #[test]
    fn test_for_each_frame_mut_touches_every_cell() {
        let bin_count = 7;
        for leaf_frames in [1, 2, 13, 1000] {
            let mut data = vec![1.0f32; 53 * bin_count];
            for_each_frame_mut(&mut data, bin_count, leaf_frames, &|chunk| {
                for value in chunk.iter_mut() {
                    *value *= 3.0;
                }
            });
            assert!(data.iter().all(|&v| v == 3.0));
        }
    }
}
