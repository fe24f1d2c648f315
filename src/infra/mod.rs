// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs  — Snapshot saving and loading
//                    Model and optimizer records through Burn's
//                    CompactRecorder, epoch records and configs
//                    as JSON.
//
//   policy.rs      — Which snapshots to write each epoch
//                    (latest, best train loss, best val BLEU-4)
//
//   vocab_store.rs — Vocabulary persistence (vocab.json), so
//                    training, resume and evaluation share one
//                    word index.
//
//   metrics.rs     — Per-epoch loss, accuracy and BLEU appended
//                    to metrics.csv
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Snapshot saving and loading
pub mod checkpoint;

/// Per-epoch snapshot decisions
pub mod policy;

/// Vocabulary saving and loading
pub mod vocab_store;

/// Training metrics CSV logger
pub mod metrics;
