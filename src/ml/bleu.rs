// ============================================================
// Layer 5 — Corpus BLEU
// ============================================================
// Cumulative BLEU-n (uniform weights over orders 1..=n) computed
// at corpus level:
//
//   p_k  = Σ_images clipped k-gram matches / Σ_images candidate k-grams
//   BP   = 1                 if c >= r
//        = exp(1 − r / c)    if c <  r
//   BLEU = BP · exp( (1/n) Σ_{k=1..n} ln p_k )
//
// where c is the total candidate length and r the sum, over
// images, of the reference length closest to that image's
// candidate (ties resolve to the shorter reference).
//
// A candidate k-gram's clipped count is its count in the candidate
// capped by the largest count of that k-gram in any single
// reference of the same image.
//
// Orders with zero candidate k-grams, or zero matches, give 0.
//
// Reference: Papineni et al. (2002) BLEU: a Method for Automatic
//            Evaluation of Machine Translation

use std::{collections::HashMap, hash::Hash};

/// Highest n-gram order tracked by the evaluation loop
pub const MAX_ORDER: usize = 4;

fn ngram_counts<T: Eq + Hash>(tokens: &[T], n: usize) -> HashMap<&[T], usize> {
    let mut counts = HashMap::new();
    if n > 0 && tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

/// Sufficient statistics for corpus BLEU up to `MAX_ORDER`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStats {
    /// Index k holds clipped matches of order k (index 0 unused)
    clipped:          [usize; MAX_ORDER + 1],
    totals:           [usize; MAX_ORDER + 1],
    candidate_len:    usize,
    effective_ref_len: usize,
}

impl CorpusStats {
    /// Accumulate statistics over aligned reference sets and candidates.
    pub fn from_corpus<T: Eq + Hash>(references: &[Vec<Vec<T>>], candidates: &[Vec<T>]) -> Self {
        debug_assert_eq!(references.len(), candidates.len());
        let mut stats = Self::default();
        for (refs, candidate) in references.iter().zip(candidates) {
            stats.add_sentence(refs, candidate);
        }
        stats
    }

    pub fn add_sentence<T: Eq + Hash>(&mut self, references: &[Vec<T>], candidate: &[T]) {
        let cand_len = candidate.len();
        self.candidate_len += cand_len;
        self.effective_ref_len += references
            .iter()
            .map(Vec::len)
            .min_by_key(|&len| (len.abs_diff(cand_len), len))
            .unwrap_or(0);

        for n in 1..=MAX_ORDER {
            let cand_counts = ngram_counts(candidate, n);
            let ref_counts: Vec<HashMap<&[T], usize>> =
                references.iter().map(|r| ngram_counts(r, n)).collect();

            for (gram, &count) in &cand_counts {
                let max_ref = ref_counts
                    .iter()
                    .map(|counts| counts.get(gram).copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0);
                self.clipped[n] += count.min(max_ref);
            }
            self.totals[n] += cand_counts.values().sum::<usize>();
        }
    }

    pub fn brevity_penalty(&self) -> f64 {
        if self.candidate_len == 0 {
            0.0
        } else if self.candidate_len < self.effective_ref_len {
            (1.0 - self.effective_ref_len as f64 / self.candidate_len as f64).exp()
        } else {
            1.0
        }
    }

    /// Modified precision of one order, `None` when the corpus has no
    /// candidate n-grams of that order.
    pub fn precision(&self, n: usize) -> Option<f64> {
        (self.totals[n] > 0).then(|| self.clipped[n] as f64 / self.totals[n] as f64)
    }

    /// Cumulative BLEU-n. Orders outside `1..=MAX_ORDER` score 0.
    pub fn bleu(&self, n: usize) -> f64 {
        if n == 0 || n > MAX_ORDER {
            return 0.0;
        }
        let mut log_sum = 0.0;
        for k in 1..=n {
            match self.precision(k) {
                Some(p) if p > 0.0 => log_sum += p.ln(),
                _ => return 0.0,
            }
        }
        self.brevity_penalty() * (log_sum / n as f64).exp()
    }
}

/// BLEU-1..=4 in one pass; slot 0 is unused and always 0.
pub fn bleu_scores<T: Eq + Hash>(references: &[Vec<Vec<T>>], candidates: &[Vec<T>]) -> [f64; MAX_ORDER + 1] {
    let stats = CorpusStats::from_corpus(references, candidates);
    let mut scores = [0.0; MAX_ORDER + 1];
    for (n, slot) in scores.iter_mut().enumerate().skip(1) {
        *slot = stats.bleu(n);
    }
    scores
}
