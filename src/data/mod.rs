// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from JSON-lines corpus files to device-ready
// tensor batches.
//
// The pipeline flows in this order:
//
//   {split}.jsonl
//       │
//       ▼
//   JsonlCorpus       → reads and validates image records
//       │
//       ▼
//   Preprocessor      → lowercases and splits captions into words
//       │
//       ▼
//   Vocabulary        → words to indices, <start> ... <end>
//       │
//       ▼
//   Train/EvalDataset → implements Burn's Dataset trait
//       │
//       ▼
//   Train/EvalBatcher → sorts, pads and stacks into tensors
//       │
//       ▼
//   PackedView        → strips padding for loss and accuracy
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Reads `{split}.jsonl` corpus files
pub mod loader;

/// Caption normalisation and word splitting
pub mod preprocessor;

/// Implements Burn's Dataset trait for training and evaluation samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Timestep-major packing of variable-length captions
pub mod packing;
