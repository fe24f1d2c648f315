// ============================================================
// Layer 5 — BLEU Evaluation
// ============================================================
// Greedy-decodes every image of a split and scores the result
// against all of its reference captions.
//
// Each batch yields corpus BLEU-1..4 over the images in that
// batch. The epoch score is the mean of those batch scores:
//
//   epoch_bleu[n] = Σ_batches bleu_n(batch) / batches
//
// Candidates and references both go through
// Vocabulary::words_from_indices, which drops <start> and cuts
// at the first <end>.

use std::ops::{AddAssign, Index};

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::batcher::EvalBatch;
use crate::domain::vocabulary::Vocabulary;
use crate::ml::bleu::{bleu_scores, MAX_ORDER};
use crate::ml::decode::sample;
use crate::ml::model::Captioner;

/// BLEU-n at index n (index 0 unused).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreVector(pub [f64; MAX_ORDER + 1]);

impl ScoreVector {
    pub fn bleu(&self, n: usize) -> f64 {
        self.0.get(n).copied().unwrap_or(0.0)
    }
}

impl Index<usize> for ScoreVector {
    type Output = f64;

    fn index(&self, n: usize) -> &f64 {
        &self.0[n]
    }
}

impl AddAssign for ScoreVector {
    fn add_assign(&mut self, rhs: Self) {
        for (total, delta) in self.0.iter_mut().zip(rhs.0) {
            *total += delta;
        }
    }
}

/// Running sum of per-batch score vectors.
#[derive(Debug, Clone, Default)]
pub struct BleuAccumulator {
    sum:     ScoreVector,
    batches: usize,
}

impl BleuAccumulator {
    pub fn add(&mut self, delta: ScoreVector) {
        self.sum += delta;
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Mean over batches; all zeros when nothing was evaluated.
    pub fn mean(&self) -> ScoreVector {
        if self.batches == 0 {
            return ScoreVector::default();
        }
        let mut mean = self.sum;
        for score in mean.0.iter_mut() {
            *score /= self.batches as f64;
        }
        mean
    }
}

/// Decode one batch greedily and score it.
pub fn evaluate_batch<B: Backend, M: Captioner<B>>(
    model:     &M,
    batch:     EvalBatch<B>,
    vocab:     &Vocabulary,
    max_steps: usize,
) -> Result<ScoreVector> {
    let generated = sample(model, batch.features, vocab.start_idx(), vocab.end_idx(), max_steps)?;

    let candidates = generated
        .iter()
        .map(|seq| vocab.words_from_indices(seq))
        .collect::<Result<Vec<_>, _>>()?;

    let references = batch
        .references
        .iter()
        .map(|refs| {
            refs.iter()
                .map(|seq| vocab.words_from_indices(seq))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let (Some(id), Some(words)) = (batch.sample_ids.first(), candidates.first()) {
        tracing::debug!("sample {}: {}", id, words.join(" "));
    }

    Ok(ScoreVector(bleu_scores(&references, &candidates)))
}

/// Score a whole split, logging progress every `log_interval` batches.
pub fn evaluate_epoch<B: Backend, M: Captioner<B>>(
    model:        &M,
    batches:      impl IntoIterator<Item = EvalBatch<B>>,
    vocab:        &Vocabulary,
    max_steps:    usize,
    desc:         &str,
    log_interval: usize,
) -> Result<ScoreVector> {
    let mut acc = BleuAccumulator::default();

    for batch in batches {
        acc.add(evaluate_batch(model, batch, vocab, max_steps)?);

        if log_interval > 0 && acc.batches() % log_interval == 0 {
            let running = acc.mean();
            tracing::info!(
                "{} batch {} bleu1={:.4} bleu4={:.4}",
                desc, acc.batches(), running[1], running[4],
            );
        }
    }

    Ok(acc.mean())
}
