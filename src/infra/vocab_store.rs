// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Persists the vocabulary next to the checkpoints as vocab.json
// so training, resume and evaluation all index words the same
// way. The vocabulary is built once, from the training split,
// and only loaded afterwards.

use anyhow::{bail, Context, Result};
use std::{fs, path::PathBuf};

use crate::domain::vocabulary::{Vocabulary, END_TOKEN, PAD_TOKEN, START_TOKEN, UNK_TOKEN};

pub struct VocabStore {
    dir: PathBuf,
}

impl VocabStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("vocab.json")
    }

    /// Load the saved vocabulary, or call `build` and save its result.
    pub fn load_or_build(&self, build: impl FnOnce() -> Vocabulary) -> Result<Vocabulary> {
        if self.path().exists() {
            tracing::info!("Loading existing vocabulary from '{}'", self.path().display());
            self.load()
        } else {
            let vocab = build();
            tracing::info!("Built new vocabulary with {} tokens", vocab.len());
            self.save(&vocab)?;
            Ok(vocab)
        }
    }

    pub fn load(&self) -> Result<Vocabulary> {
        let path = self.path();
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read vocabulary from '{}'. Have you run 'train' first?", path.display()))?;
        let vocab = serde_json::from_str::<Vocabulary>(&json)
            .with_context(|| format!("Malformed vocabulary file '{}'", path.display()))?
            .reindex();

        for (index, token) in [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN].into_iter().enumerate() {
            if vocab.decode(index).ok() != Some(token) {
                bail!("Vocabulary '{}' does not reserve index {} for {}", path.display(), index, token);
            }
        }
        Ok(vocab)
    }

    pub fn save(&self, vocab: &Vocabulary) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        fs::write(&path, serde_json::to_string_pretty(vocab)?)
            .with_context(|| format!("Cannot write vocabulary to '{}'", path.display()))?;
        tracing::debug!("Saved vocabulary to '{}'", path.display());
        Ok(())
    }
}
