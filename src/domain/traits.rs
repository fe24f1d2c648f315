// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to its data source through this
// trait, so a JSON-lines corpus today and e.g. a feature store
// tomorrow look the same to the training workflow.

use anyhow::Result;

use crate::domain::caption::{CaptionedImage, Split};

// ─── CaptionSource ────────────────────────────────────────────────────────────
/// Anything that can hand out the captioned images of one split.
///
/// Implementations:
///   - JsonlCorpus → `{dir}/{split}.jsonl`
pub trait CaptionSource {
    /// Load every record of the split, validated and with a
    /// consistent feature grid shape.
    fn load_split(&self, split: Split) -> Result<Vec<CaptionedImage>>;
}
