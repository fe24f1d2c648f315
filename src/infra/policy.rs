// ============================================================
// Layer 6 — Checkpoint Policy
// ============================================================
// Decides, once per epoch, which snapshots to write:
//
//   latest      always
//   best_train  mean train loss <  best loss so far
//   best_val    val BLEU-4      >  best BLEU-4 so far
//
// Comparisons are strict, so a tie never rewrites a best
// snapshot. The bests live in RunState, which is created once
// before the epoch loop and restored from the latest snapshot
// on resume.

use serde::{Deserialize, Serialize};

/// Best values seen so far in a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    /// `None` until a finite loss is seen; compares as +infinity
    pub best_train_loss: Option<f64>,
    pub best_val_bleu4:  f64,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Snapshots to write for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPlan {
    pub latest:     bool,
    pub best_train: bool,
    pub best_val:   bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointPolicy;

impl CheckpointPolicy {
    /// Compare this epoch against the bests, update them, and say
    /// which snapshots to write.
    pub fn plan(&self, state: &mut RunState, train_loss: f64, val_bleu4: f64) -> SnapshotPlan {
        let best_train = train_loss.is_finite()
            && state.best_train_loss.map_or(true, |best| train_loss < best);
        if best_train {
            state.best_train_loss = Some(train_loss);
        }

        let best_val = val_bleu4 > state.best_val_bleu4;
        if best_val {
            state.best_val_bleu4 = val_bleu4;
        }

        SnapshotPlan { latest: true, best_train, best_val }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_epoch_sets_both_bests() {
        let mut state = RunState::new();
        let plan = CheckpointPolicy.plan(&mut state, 3.2, 0.05);
        assert_eq!(plan, SnapshotPlan { latest: true, best_train: true, best_val: true });
        assert_eq!(state.best_train_loss, Some(3.2));
        assert_eq!(state.best_val_bleu4, 0.05);
    }

    #[test]
    fn test_loss_improves_then_worsens() {
        let mut state = RunState::new();
        let policy = CheckpointPolicy;

        let best_train_epochs: Vec<usize> = [2.0, 1.5, 1.8]
            .into_iter()
            .enumerate()
            .filter(|&(_, loss)| policy.plan(&mut state, loss, 0.0).best_train)
            .map(|(i, _)| i + 1)
            .collect();

        assert_eq!(best_train_epochs, vec![1, 2]);
        assert_eq!(state.best_train_loss, Some(1.5));
    }

    #[test]
    fn test_ties_do_not_trigger_snapshots() {
        let mut state = RunState::new();
        let policy = CheckpointPolicy;
        policy.plan(&mut state, 1.25, 0.3);
        let before = state;

        let plan = policy.plan(&mut state, 1.25, 0.3);
        assert!(plan.latest);
        assert!(!plan.best_train);
        assert!(!plan.best_val);
        assert_eq!(state, before);
    }

    #[test]
    fn test_zero_bleu_never_counts_as_best() {
        let mut state = RunState::new();
        assert!(!CheckpointPolicy.plan(&mut state, 1.0, 0.0).best_val);
    }

    #[test]
    fn test_nan_loss_is_never_best() {
        let mut state = RunState::new();
        assert!(!CheckpointPolicy.plan(&mut state, f64::NAN, 0.1).best_train);
        assert_eq!(state.best_train_loss, None);
        assert!(CheckpointPolicy.plan(&mut state, 9.0, 0.1).best_train);
    }

    #[test]
    fn test_bests_are_independent() {
        let mut state = RunState::new();
        let policy = CheckpointPolicy;
        policy.plan(&mut state, 2.0, 0.2);

        let plan = policy.plan(&mut state, 2.5, 0.4);
        assert!(!plan.best_train);
        assert!(plan.best_val);
    }
}
