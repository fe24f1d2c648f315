// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model, training and evaluation code.
//
//   model.rs     — Soft-attention LSTM caption decoder
//                  • additive attention over image regions
//                  • gated context vector
//                  • LSTM cell built from two linear layers
//                  • projection to vocabulary scores
//
//   decode.rs    — Greedy arg-max generation as a bounded
//                  lazy iterator over timesteps
//
//   bleu.rs      — Corpus BLEU-1..4 with clipped counts and
//                  closest-reference brevity penalty
//
//   trainer.rs   — Packed cross-entropy training step, the
//                  epoch loop, checkpoints per epoch
//
//   evaluator.rs — Greedy decoding + BLEU per batch, averaged
//                  over an epoch
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Xu et al. (2015) Show, Attend and Tell
//            Papineni et al. (2002) BLEU

/// Attention captioner architecture
pub mod model;

/// Greedy caption generation
pub mod decode;

/// Corpus BLEU scoring
pub mod bleu;

/// Training step and epoch loop with checkpointing
pub mod trainer;

/// BLEU evaluation over a split
pub mod evaluator;
