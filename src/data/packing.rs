// ============================================================
// Layer 4 — Sequence Packer
// ============================================================
// Removes padding from a batch of variable-length captions so
// loss and accuracy only ever see real tokens.
//
// Rows arrive sorted by length, longest first. At timestep t the
// rows still "alive" are therefore a prefix of the batch:
//
//   decode lengths [4, 3, 1]
//
//          t=0  t=1  t=2  t=3
//   row 0   x    x    x    x
//   row 1   x    x    x
//   row 2   x
//
//   batch sizes per step = [3, 2, 2, 1]
//   packed order         = (0,0)(1,0)(2,0) (0,1)(1,1) (0,2)(1,2) (0,3)
//
// The packed order is timestep-major: every live row's t=0 entry
// comes before any t=1 entry. Scores and targets are packed with
// the same view, so row k of packed scores always lines up with
// entry k of packed targets.
//
// A decode length is the declared caption length minus one: the
// <start> token is only ever an input, never a target.

use crate::domain::error::{CaptionError, Result};

/// Decode lengths for captions of the given declared lengths
/// (start + words + end), clipped at `max_decode`.
pub fn decode_lengths(declared: &[usize], max_decode: usize) -> Vec<usize> {
    declared
        .iter()
        .map(|&len| len.saturating_sub(1).min(max_decode))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedView {
    lengths:     Vec<usize>,
    batch_sizes: Vec<usize>,
}

impl PackedView {
    /// Build a view over `rows` caption rows with the given decode
    /// lengths. Lengths must match the row count and be sorted
    /// longest first.
    pub fn new(decode_lengths: &[usize], rows: usize) -> Result<Self> {
        if decode_lengths.len() != rows {
            return Err(CaptionError::LengthMismatch {
                captions: rows,
                lengths:  decode_lengths.len(),
            });
        }
        for (row, pair) in decode_lengths.windows(2).enumerate() {
            if pair[1] > pair[0] {
                return Err(CaptionError::UnsortedLengths {
                    row:      row + 1,
                    previous: pair[0],
                    next:     pair[1],
                });
            }
        }

        let steps = decode_lengths.first().copied().unwrap_or(0);
        let batch_sizes = (0..steps)
            .map(|t| decode_lengths.iter().take_while(|&&len| len > t).count())
            .collect();

        Ok(Self { lengths: decode_lengths.to_vec(), batch_sizes })
    }

    /// Total number of packed positions (sum of decode lengths).
    pub fn len(&self) -> usize {
        self.batch_sizes.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live rows at each timestep.
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    /// Longest decode length, i.e. the number of timesteps.
    pub fn steps(&self) -> usize {
        self.batch_sizes.len()
    }

    /// `(row, timestep)` pairs in packed order.
    pub fn positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.batch_sizes
            .iter()
            .enumerate()
            .flat_map(|(t, &live)| (0..live).map(move |row| (row, t)))
    }

    /// Row indices into a `[rows * stride, vocab]` reshaped score
    /// matrix, in packed order. `stride` is the time dimension of the
    /// score tensor and must cover every decode length.
    pub fn flat_rows(&self, stride: usize) -> Vec<i64> {
        debug_assert!(stride >= self.steps());
        self.positions()
            .map(|(row, t)| (row * stride + t) as i64)
            .collect()
    }

    /// Packed targets: caption shifted left by one, so the entry for
    /// `(row, t)` is `captions[row][t + 1]`.
    pub fn targets(&self, captions: &[Vec<usize>]) -> Result<Vec<usize>> {
        if captions.len() != self.lengths.len() {
            return Err(CaptionError::LengthMismatch {
                captions: captions.len(),
                lengths:  self.lengths.len(),
            });
        }
        for (row, (caption, &len)) in captions.iter().zip(&self.lengths).enumerate() {
            if caption.len() < len + 1 {
                return Err(CaptionError::ShortCaptionRow {
                    row,
                    len: caption.len(),
                    needed: len + 1,
                });
            }
        }
        Ok(self.positions().map(|(row, t)| captions[row][t + 1]).collect())
    }
}

/// Fraction of positions whose prediction equals the target, ignoring
/// positions whose target is `pad`. `None` when nothing was counted,
/// so callers never divide by zero.
pub fn masked_accuracy(predictions: &[usize], targets: &[usize], pad: usize) -> Option<f64> {
    let (correct, counted) = predictions
        .iter()
        .zip(targets)
        .filter(|&(_, &target)| target != pad)
        .fold((0usize, 0usize), |(correct, counted), (pred, target)| {
            (correct + usize::from(pred == target), counted + 1)
        });

    (counted > 0).then(|| correct as f64 / counted as f64)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_batch_sizes_shrink_over_time() {
        let view = PackedView::new(&[4, 3, 1], 3).unwrap();
        assert_eq!(view.batch_sizes(), &[3, 2, 2, 1]);
        assert_eq!(view.len(), 8);
    }

    #[test]
    fn test_positions_are_timestep_major() {
        let view = PackedView::new(&[2, 1], 2).unwrap();
        let pos: Vec<_> = view.positions().collect();
        assert_eq!(pos, vec![(0, 0), (1, 0), (0, 1)]);
    }

    #[test]
    fn test_flat_rows_index_into_reshaped_scores() {
        let view = PackedView::new(&[2, 1], 2).unwrap();
        // scores [2 rows, 3 steps, V] -> [6, V]
        assert_eq!(view.flat_rows(3), vec![0, 3, 1]);
    }

    #[test]
    fn test_three_equal_captions_pack_to_twelve_targets() {
        // declared length 5 = <start> a dog runs <end>
        let caption = vec![1, 4, 5, 6, 2];
        let captions = vec![caption.clone(), caption.clone(), caption];
        let view = PackedView::new(&decode_lengths(&[5, 5, 5], 40), 3).unwrap();

        let targets = view.targets(&captions).unwrap();
        assert_eq!(targets.len(), 12);
        assert!(targets.iter().all(|&t| t != 0));
        assert_eq!(&targets[..3], &[4, 4, 4]);
        assert_eq!(&targets[9..], &[2, 2, 2]);
    }

    #[test]
    fn test_targets_skip_padding_of_shorter_rows() {
        let captions = vec![vec![1, 4, 5, 2], vec![1, 6, 2, 0]];
        let view = PackedView::new(&decode_lengths(&[4, 3], 40), 2).unwrap();
        assert_eq!(view.targets(&captions).unwrap(), vec![4, 6, 5, 2, 2]);
    }

    #[test]
    fn test_length_count_mismatch_is_fatal() {
        assert_eq!(
            PackedView::new(&[3, 2], 3),
            Err(CaptionError::LengthMismatch { captions: 3, lengths: 2 })
        );
    }

    #[test]
    fn test_unsorted_lengths_are_rejected() {
        assert!(matches!(
            PackedView::new(&[2, 3], 2),
            Err(CaptionError::UnsortedLengths { row: 1, previous: 2, next: 3 })
        ));
    }

    #[test]
    fn test_short_caption_row_is_rejected() {
        let view = PackedView::new(&[3], 1).unwrap();
        assert!(matches!(
            view.targets(&[vec![1, 4, 2]]),
            Err(CaptionError::ShortCaptionRow { row: 0, len: 3, needed: 4 })
        ));
    }

    #[test]
    fn test_degenerate_captions_pack_to_nothing() {
        // declared length 1: only <start>
        let view = PackedView::new(&decode_lengths(&[1, 1], 40), 2).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.targets(&[vec![1], vec![1]]).unwrap(), Vec::<usize>::new());
        assert_eq!(masked_accuracy(&[], &[], 0), None);
    }

    #[test]
    fn test_decode_lengths_clip_at_max() {
        assert_eq!(decode_lengths(&[10, 5, 1, 0], 6), vec![6, 4, 0, 0]);
    }

    #[test]
    fn test_masked_accuracy_ignores_pad_targets() {
        let acc = masked_accuracy(&[4, 5, 9, 9], &[4, 6, 0, 0], 0).unwrap();
        assert!((acc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_masked_accuracy_is_permutation_invariant() {
        use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

        let mut pairs: Vec<(usize, usize)> = (0..40).map(|i| (i % 7, i % 5)).collect();
        let (p, t): (Vec<_>, Vec<_>) = pairs.iter().copied().unzip();
        let expected = masked_accuracy(&p, &t, 0).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5 {
            pairs.shuffle(&mut rng);
            let (p, t): (Vec<_>, Vec<_>) = pairs.iter().copied().unzip();
            assert!((masked_accuracy(&p, &t, 0).unwrap() - expected).abs() < 1e-12);
        }
    }

    proptest! {
        #[test]
        fn prop_packed_len_is_sum_of_declared_minus_one(
            mut declared in prop::collection::vec(1usize..12, 1..16)
        ) {
            declared.sort_unstable_by(|a, b| b.cmp(a));
            let view = PackedView::new(&decode_lengths(&declared, 64), declared.len()).unwrap();
            let expected: usize = declared.iter().map(|l| l - 1).sum();
            prop_assert_eq!(view.len(), expected);
            prop_assert_eq!(view.flat_rows(64).len(), expected);
        }

        #[test]
        fn prop_packed_targets_never_contain_pad(
            mut declared in prop::collection::vec(2usize..12, 1..16)
        ) {
            declared.sort_unstable_by(|a, b| b.cmp(a));
            let width = declared[0];
            // <start> 4 4 ... <end> then pad up to the batch width
            let captions: Vec<Vec<usize>> = declared
                .iter()
                .map(|&len| {
                    let mut row = vec![1];
                    row.extend(std::iter::repeat(4).take(len - 2));
                    row.push(2);
                    row.resize(width, 0);
                    row
                })
                .collect();
            let view = PackedView::new(&decode_lengths(&declared, 64), declared.len()).unwrap();
            let targets = view.targets(&captions).unwrap();
            prop_assert!(targets.iter().all(|&t| t != 0));
            prop_assert_eq!(targets.iter().filter(|&&t| t == 2).count(), declared.len());
        }
    }
}
