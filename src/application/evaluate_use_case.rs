// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores a saved snapshot on one split:
//
//   1. Load train_config.json, model_config.json and vocab.json
//   2. Rebuild the decoder and load the chosen snapshot's weights
//   3. Greedy-decode every image of the split
//   4. Report corpus BLEU-1..4 (mean over batches)

use anyhow::{bail, Result};
use burn::data::dataloader::DataLoaderBuilder;

use crate::data::{batcher::EvalBatcher, dataset::EvalDataset, loader::JsonlCorpus, preprocessor::Preprocessor};
use crate::domain::{caption::Split, traits::CaptionSource};
use crate::infra::{
    checkpoint::{CheckpointManager, Snapshot},
    vocab_store::VocabStore,
};
use crate::ml::evaluator::{evaluate_epoch, ScoreVector};
use crate::ml::model::{AttentionCaptioner, AttentionCaptionerConfig};

type InferBackend = burn::backend::Wgpu;

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    /// Overrides the data directory recorded at training time
    data_dir:       Option<String>,
    split:          Split,
    snapshot:       Snapshot,
    batch_size:     Option<usize>,
}

impl EvaluateUseCase {
    pub fn new(
        checkpoint_dir: String,
        data_dir:       Option<String>,
        split:          Split,
        snapshot:       Snapshot,
        batch_size:     Option<usize>,
    ) -> Self {
        Self { checkpoint_dir, data_dir, split, snapshot, batch_size }
    }

    pub fn execute(&self) -> Result<ScoreVector> {
        let vocab = VocabStore::new(&self.checkpoint_dir).load()?;

        // Model name comes from the saved config, so read it first
        let cfg  = CheckpointManager::new(&self.checkpoint_dir, "")?.load_config()?;
        let ckpt = CheckpointManager::new(&self.checkpoint_dir, &cfg.model_name)?;
        let meta = ckpt.load_meta(self.snapshot)?;
        tracing::info!("Evaluating {} snapshot from epoch {} on '{}'", self.snapshot, meta.epoch, self.split);

        let data_dir = self.data_dir.clone().unwrap_or_else(|| cfg.data_dir.clone());
        let records  = JsonlCorpus::new(&data_dir).load_split(self.split)?;
        let (regions, feature_dim) = records[0].feature_shape();

        let device = burn::backend::wgpu::WgpuDevice::default();
        let model_cfg = ckpt.load_model_config()?.with_dropout(0.0);
        check_encoder_width(&model_cfg, feature_dim, self.split)?;
        let model: AttentionCaptioner<InferBackend> = model_cfg.init(&device);
        let model = ckpt.load_model::<InferBackend, _>(self.snapshot, model, &device)?;

        let dataset = EvalDataset::from_records(&records, &vocab, &Preprocessor::new());
        let loader  = DataLoaderBuilder::new(EvalBatcher::<InferBackend>::new(device, regions, feature_dim))
            .batch_size(self.batch_size.unwrap_or(cfg.batch_size))
            .num_workers(cfg.num_workers)
            .build(dataset);

        let desc = format!("{} Bleu Score", self.split);
        evaluate_epoch(&model, loader.iter(), &vocab, cfg.max_decode(&vocab), &desc, cfg.log_interval)
    }
}

/// The decoder's attention layers are sized for one feature width.
fn check_encoder_width(model_cfg: &AttentionCaptionerConfig, feature_dim: usize, split: Split) -> Result<()> {
    if feature_dim != model_cfg.encoder_dim {
        bail!(
            "Split '{}' has {}-wide feature grids but the model was trained on width {}",
            split, feature_dim, model_cfg.encoder_dim
        );
    }
    Ok(())
}
