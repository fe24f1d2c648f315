// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load train / val splits        (Layer 4 - data)
//   Step 2: Build or load the vocabulary   (Layer 6 - infra)
//   Step 3: Build Burn datasets            (Layer 4 - data)
//   Step 4: Save config for evaluation     (Layer 6 - infra)
//   Step 5: Run the epoch loop             (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{EvalDataset, TrainDataset},
    loader::JsonlCorpus,
    preprocessor::Preprocessor,
};
use crate::domain::{
    caption::{CaptionedImage, Split},
    traits::CaptionSource,
    vocabulary::Vocabulary,
};
use crate::infra::{checkpoint::CheckpointManager, vocab_store::VocabStore};
use crate::ml::trainer::{run_training, TrainingData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    RmsProp,
    Adam,
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved next to the checkpoints so evaluation rebuilds the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:        String,
    pub checkpoint_dir:  String,
    /// Prefix of every snapshot file, e.g. `{model_name}_best_val`
    pub model_name:      String,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub lr:              f64,
    pub optimizer:       OptimizerKind,
    pub embed_dim:       usize,
    pub attention_dim:   usize,
    pub decoder_dim:     usize,
    pub dropout:         f64,
    /// Cap on predicted words per caption; defaults to the vocabulary's
    /// longest caption
    pub max_decode_len:  Option<usize>,
    pub min_word_freq:   usize,
    pub log_interval:    usize,
    pub num_workers:     usize,
    pub seed:            u64,
    pub resume:          bool,
    pub skip_train_bleu: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:        "data/captions".to_string(),
            checkpoint_dir:  "checkpoints".to_string(),
            model_name:      "attention_b128_emd300".to_string(),
            batch_size:      128,
            epochs:          2,
            lr:              1e-3,
            optimizer:       OptimizerKind::RmsProp,
            embed_dim:       300,
            attention_dim:   256,
            decoder_dim:     256,
            dropout:         0.5,
            max_decode_len:  None,
            min_word_freq:   1,
            log_interval:    50,
            num_workers:     1,
            seed:            42,
            resume:          false,
            skip_train_bleu: false,
        }
    }
}

impl TrainConfig {
    /// Number of words predicted after `<start>`: the longest caption
    /// plus its `<end>` unless capped explicitly.
    pub fn max_decode(&self, vocab: &Vocabulary) -> usize {
        self.max_decode_len
            .unwrap_or_else(|| vocab.max_len().saturating_sub(1))
            .max(1)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Load splits ───────────────────────────────────────────────
        let corpus        = JsonlCorpus::new(&cfg.data_dir);
        let train_records = corpus.load_split(Split::Train)?;
        let val_records   = corpus.load_split(Split::Val)?;

        let (regions, feature_dim) = train_records[0].feature_shape();
        check_shape(&val_records, (regions, feature_dim), Split::Val)?;

        // ── Step 2: Vocabulary from the training captions only ────────────────
        let prep  = Preprocessor::new();
        let store = VocabStore::new(&cfg.checkpoint_dir);
        let vocab = store.load_or_build(|| {
            let tokenized = tokenize_all(&train_records, &prep);
            Vocabulary::from_captions(tokenized.iter().map(Vec::as_slice), cfg.min_word_freq)
        })?;
        tracing::info!("Vocabulary: {} tokens, max caption length {}", vocab.len(), vocab.max_len());

        // ── Step 3: Datasets ──────────────────────────────────────────────────
        let train      = TrainDataset::from_records(&train_records, &vocab, &prep);
        let train_eval = EvalDataset::from_records(&train_records, &vocab, &prep);
        let val        = EvalDataset::from_records(&val_records, &vocab, &prep);
        tracing::info!(
            "Datasets: {} training captions, {} training images, {} validation images",
            train_records.iter().map(|r| r.captions.len()).sum::<usize>(),
            train_records.len(),
            val_records.len(),
        );

        // ── Step 4: Save config for evaluation ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir, &cfg.model_name)?;
        ckpt_manager.save_config(cfg)?;

        // ── Step 5: Epoch loop (Layer 5) ──────────────────────────────────────
        let data = TrainingData { train, train_eval, val, regions, feature_dim };
        run_training(cfg, &vocab, data, ckpt_manager)
    }
}

pub(crate) fn tokenize_all(records: &[CaptionedImage], prep: &Preprocessor) -> Vec<Vec<String>> {
    records
        .iter()
        .flat_map(|r| r.captions.iter().map(|c| prep.tokens(c)))
        .collect()
}

pub(crate) fn check_shape(records: &[CaptionedImage], expected: (usize, usize), split: Split) -> Result<()> {
    if let Some(first) = records.first() {
        if first.feature_shape() != expected {
            bail!(
                "Split '{}' has feature grids {:?} but the training split uses {:?}",
                split, first.feature_shape(), expected
            );
        }
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(image: &str, regions: usize, feature_dim: usize, caption: &str) -> CaptionedImage {
        CaptionedImage {
            image:    image.to_string(),
            regions,
            feature_dim,
            features: vec![0.0; regions * feature_dim],
            captions: vec![caption.to_string()],
        }
    }

    #[test]
    fn test_max_decode_defaults_to_vocabulary_length() {
        let vocab = Vocabulary::new(["a", "dog"], 7);
        let mut cfg = TrainConfig::default();
        assert_eq!(cfg.max_decode(&vocab), 6);

        cfg.max_decode_len = Some(3);
        assert_eq!(cfg.max_decode(&vocab), 3);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg  = TrainConfig { optimizer: OptimizerKind::Adam, ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"optimizer\":\"adam\""));

        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.optimizer, OptimizerKind::Adam);
        assert_eq!(back.model_name, cfg.model_name);
    }

    #[test]
    fn test_tokenize_all_flattens_every_caption() {
        let records = vec![record("a", 1, 1, "A dog."), record("b", 1, 1, "Two cats")];
        let tokens  = tokenize_all(&records, &Preprocessor::new());
        assert_eq!(tokens, vec![vec!["a", "dog"], vec!["two", "cats"]]);
    }

    #[test]
    fn test_mismatched_split_shape_is_fatal() {
        let val = vec![record("v", 2, 3, "a dog")];
        assert!(check_shape(&val, (2, 3), Split::Val).is_ok());
        assert!(check_shape(&val, (4, 3), Split::Val).is_err());
    }
}
