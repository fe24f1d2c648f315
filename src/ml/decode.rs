// ============================================================
// Layer 5 — Greedy Decoding
// ============================================================
// Generates captions by always feeding back the arg-max word:
//
//   prev = <start>
//   loop:
//     scores, state = model.step(state, prev)
//     prev = argmax(scores)
//   until every row has emitted <end> or max_steps is reached
//
// GreedyDecode is a lazy iterator over timesteps. Each item is
// the word chosen for every row at that step. It is bounded by
// max_steps so a model that never emits <end> still terminates.

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::ml::model::Captioner;

/// Copy an index tensor to the host.
pub fn to_indices<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow!("cannot read index tensor: {e:?}"))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

pub struct GreedyDecode<'m, B: Backend, M: Captioner<B>> {
    model:     &'m M,
    state:     Option<M::State>,
    previous:  Tensor<B, 1, Int>,
    finished:  Vec<bool>,
    end:       usize,
    remaining: usize,
}

impl<'m, B: Backend, M: Captioner<B>> GreedyDecode<'m, B, M> {
    pub fn new(model: &'m M, features: Tensor<B, 3>, start: usize, end: usize, max_steps: usize) -> Self {
        let [n, _, _] = features.dims();
        let device    = features.device();
        let starts    = vec![start as i32; n];
        Self {
            model,
            previous:  Tensor::<B, 1, Int>::from_ints(starts.as_slice(), &device),
            state:     Some(model.begin(features)),
            finished:  vec![false; n],
            end,
            remaining: max_steps,
        }
    }
}

impl<B: Backend, M: Captioner<B>> Iterator for GreedyDecode<'_, B, M> {
    type Item = Result<Vec<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.finished.iter().all(|&done| done) {
            return None;
        }
        let state = self.state.take()?;
        self.remaining -= 1;

        let (scores, next_state) = self.model.step(state, self.previous.clone());
        let [n, _] = scores.dims();
        let chosen = scores.argmax(1).reshape([n]);

        let words = match to_indices(chosen.clone()) {
            Ok(words) => words,
            Err(e) => {
                self.remaining = 0;
                return Some(Err(e));
            }
        };
        for (done, &word) in self.finished.iter_mut().zip(&words) {
            *done |= word == self.end;
        }

        self.previous = chosen;
        self.state    = Some(next_state);
        Some(Ok(words))
    }
}

/// Greedy captions for a batch of feature grids. Every sequence
/// starts with `start`; words after a row's first `end` are dropped.
pub fn sample<B: Backend, M: Captioner<B>>(
    model:     &M,
    features:  Tensor<B, 3>,
    start:     usize,
    end:       usize,
    max_steps: usize,
) -> Result<Vec<Vec<usize>>> {
    let [n, _, _] = features.dims();
    let mut sequences = vec![vec![start]; n];
    let mut open      = vec![true; n];

    for words in GreedyDecode::new(model, features, start, end, max_steps) {
        for ((seq, open), word) in sequences.iter_mut().zip(open.iter_mut()).zip(words?) {
            if *open {
                seq.push(word);
                *open = word != end;
            }
        }
    }
    Ok(sequences)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::CaptionerOutput;

    type TestBackend = burn::backend::NdArray;

    /// Emits `script[t]` for every row at step t, regardless of input.
    struct Scripted {
        vocab:  usize,
        script: Vec<usize>,
    }

    impl Captioner<TestBackend> for Scripted {
        type State = (usize, usize);

        fn forward(
            &self,
            _features:       Tensor<TestBackend, 3>,
            _captions:       Tensor<TestBackend, 2, Int>,
            _decode_lengths: &[usize],
        ) -> CaptionerOutput<TestBackend> {
            unimplemented!("decoding never calls forward")
        }

        fn begin(&self, features: Tensor<TestBackend, 3>) -> (usize, usize) {
            (features.dims()[0], 0)
        }

        fn step(&self, (n, t): (usize, usize), _prev: Tensor<TestBackend, 1, Int>) -> (Tensor<TestBackend, 2>, (usize, usize)) {
            let word = self.script.get(t).copied().unwrap_or(0);
            let mut scores = vec![0.0f32; n * self.vocab];
            for row in 0..n {
                scores[row * self.vocab + word] = 1.0;
            }
            let tensor = Tensor::<TestBackend, 1>::from_floats(scores.as_slice(), &Default::default())
                .reshape([n, self.vocab]);
            (tensor, (n, t + 1))
        }
    }

    fn features(n: usize) -> Tensor<TestBackend, 3> {
        Tensor::zeros([n, 1, 1], &Default::default())
    }

    #[test]
    fn test_stops_at_end_token() {
        let model = Scripted { vocab: 7, script: vec![4, 5, 2, 6, 6] };
        let steps: Vec<_> = GreedyDecode::new(&model, features(2), 1, 2, 10)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(steps.len(), 3);

        let seqs = sample(&model, features(2), 1, 2, 10).unwrap();
        assert_eq!(seqs, vec![vec![1, 4, 5, 2], vec![1, 4, 5, 2]]);
    }

    #[test]
    fn test_is_bounded_without_end_token() {
        let model = Scripted { vocab: 7, script: vec![4; 50] };
        let seqs = sample(&model, features(1), 1, 2, 6).unwrap();
        assert_eq!(seqs[0].len(), 7);
        assert!(!seqs[0].contains(&2));
    }

    #[test]
    fn test_zero_steps_yields_only_start() {
        let model = Scripted { vocab: 7, script: vec![2] };
        assert_eq!(sample(&model, features(1), 1, 2, 0).unwrap(), vec![vec![1]]);
    }

    #[test]
    fn test_real_model_decodes_within_bound() {
        use crate::ml::model::AttentionCaptionerConfig;

        let device = Default::default();
        let model = AttentionCaptionerConfig::new(8, 3)
            .with_embed_dim(4)
            .with_attention_dim(4)
            .with_decoder_dim(4)
            .init::<TestBackend>(&device);
        let grids = Tensor::<TestBackend, 3>::ones([2, 2, 3], &device);

        let seqs = sample(&model, grids, 1, 2, 5).unwrap();
        assert_eq!(seqs.len(), 2);
        for seq in seqs {
            assert_eq!(seq[0], 1);
            assert!(seq.len() <= 6);
            assert!(seq.iter().all(|&w| w < 8));
        }
    }
}
