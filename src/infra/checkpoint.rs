// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores snapshots using Burn's CompactRecorder.
//
// What gets saved per snapshot:
//   1. Model weights      {name}_{kind}.mpk.gz
//   2. Optimizer state    {name}_{kind}_optim.mpk.gz
//   3. Epoch record       {name}_{kind}.json
//        epoch, latest loss / accuracy / BLEU-4,
//        best loss / BLEU-4 so far, BLEU-1..4 on train and val
//
// Snapshot kinds:
//   latest        overwritten every epoch
//   best_train    lowest mean training loss so far
//   best_val      highest validation BLEU-4 so far
//   epNN_weights  written once when the run finishes
//
// Shared files:
//   train_config.json   run hyperparameters
//   model_config.json   decoder architecture, to rebuild the model
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::PathBuf};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::infra::policy::RunState;
use crate::ml::model::AttentionCaptionerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Latest,
    BestTrain,
    BestVal,
    /// Final weights after the given number of epochs
    Final(usize),
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Latest     => f.write_str("latest"),
            Snapshot::BestTrain  => f.write_str("best_train"),
            Snapshot::BestVal    => f.write_str("best_val"),
            Snapshot::Final(eps) => write!(f, "ep{eps:02}_weights"),
        }
    }
}

/// Everything besides tensors that a snapshot records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch:             usize,
    /// `None` when the epoch trained no batches
    pub train_loss_latest: Option<f64>,
    pub train_acc_latest:  f64,
    pub val_bleu4_latest:  f64,
    pub train_loss_min:    Option<f64>,
    pub val_bleu4_max:     f64,
    /// BLEU-n at index n, index 0 unused
    pub train_bleus:       [f64; 5],
    pub val_bleus:         [f64; 5],
}

impl CheckpointMeta {
    pub fn run_state(&self) -> RunState {
        RunState {
            best_train_loss: self.train_loss_min,
            best_val_bleu4:  self.val_bleu4_max,
        }
    }
}

/// Manages snapshot files for one model name in one directory.
pub struct CheckpointManager {
    dir:        PathBuf,
    model_name: String,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir, model_name: model_name.into() })
    }

    /// Path without extension; the recorder appends `.mpk.gz`.
    fn stem(&self, snapshot: Snapshot) -> PathBuf {
        self.dir.join(format!("{}_{}", self.model_name, snapshot))
    }

    fn optim_stem(&self, snapshot: Snapshot) -> PathBuf {
        self.dir.join(format!("{}_{}_optim", self.model_name, snapshot))
    }

    fn meta_path(&self, snapshot: Snapshot) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.model_name, snapshot))
    }

    pub fn exists(&self, snapshot: Snapshot) -> bool {
        self.meta_path(snapshot).exists()
    }

    /// Write model weights, optimizer state and the epoch record.
    pub fn save<B, M, O>(&self, snapshot: Snapshot, model: &M, optim: &O, meta: &CheckpointMeta) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let recorder = CompactRecorder::new();

        let path = self.stem(snapshot);
        Recorder::<B>::record(&recorder, model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;

        let path = self.optim_stem(snapshot);
        Recorder::<B>::record(&recorder, optim.to_record(), path.clone())
            .with_context(|| format!("Failed to save optimizer state to '{}'", path.display()))?;

        // Written last: its presence marks the snapshot as complete
        let path = self.meta_path(snapshot);
        fs::write(&path, serde_json::to_string_pretty(meta)?)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;

        tracing::debug!("Saved {} snapshot for epoch {}", snapshot, meta.epoch);
        Ok(())
    }

    pub fn load_meta(&self, snapshot: Snapshot) -> Result<CheckpointMeta> {
        let path = self.meta_path(snapshot);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed checkpoint record '{}'", path.display()))
    }

    /// Restore weights into `model`, which must have the saved architecture.
    pub fn load_model<B: Backend, M: Module<B>>(&self, snapshot: Snapshot, model: M, device: &B::Device) -> Result<M> {
        let path = self.stem(snapshot);
        let record = Recorder::<B>::load(&CompactRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        tracing::info!("Loaded {} weights from '{}'", snapshot, path.display());
        Ok(model.load_record(record))
    }

    pub fn load_optimizer<B, M, O>(&self, snapshot: Snapshot, optim: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let path = self.optim_stem(snapshot);
        let record = Recorder::<B>::load(&CompactRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load optimizer state '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    // ── Configs ──────────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'evaluate'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_model_config(&self, cfg: &AttentionCaptionerConfig) -> Result<()> {
        let path = self.dir.join("model_config.json");
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))
    }

    pub fn load_model_config(&self) -> Result<AttentionCaptionerConfig> {
        let path = self.dir.join("model_config.json");
        AttentionCaptionerConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load model config '{}': {e}", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::AttentionCaptioner;
    use burn::optim::AdamConfig;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    fn meta(epoch: usize) -> CheckpointMeta {
        CheckpointMeta {
            epoch,
            train_loss_latest: Some(1.5),
            train_acc_latest:  0.25,
            val_bleu4_latest:  0.1,
            train_loss_min:    Some(1.5),
            val_bleu4_max:     0.12,
            train_bleus:       [0.0, 0.5, 0.3, 0.2, 0.1],
            val_bleus:         [0.0, 0.4, 0.2, 0.15, 0.1],
        }
    }

    #[test]
    fn test_snapshot_names() {
        assert_eq!(Snapshot::Latest.to_string(), "latest");
        assert_eq!(Snapshot::BestTrain.to_string(), "best_train");
        assert_eq!(Snapshot::BestVal.to_string(), "best_val");
        assert_eq!(Snapshot::Final(2).to_string(), "ep02_weights");
    }

    #[test]
    fn test_missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        CheckpointManager::new(&nested, "m").unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_save_then_restore_snapshot() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path(), "cap").unwrap();
        let device = Default::default();

        let cfg = AttentionCaptionerConfig::new(7, 3)
            .with_embed_dim(4)
            .with_attention_dim(4)
            .with_decoder_dim(4);
        let model: AttentionCaptioner<TestBackend> = cfg.init(&device);
        let optim = AdamConfig::new().init::<TestBackend, AttentionCaptioner<TestBackend>>();

        assert!(!ckpt.exists(Snapshot::BestVal));
        ckpt.save(Snapshot::BestVal, &model, &optim, &meta(3)).unwrap();
        assert!(ckpt.exists(Snapshot::BestVal));
        assert!(dir.path().join("cap_best_val.json").exists());

        let restored = meta(3);
        assert_eq!(ckpt.load_meta(Snapshot::BestVal).unwrap(), restored);
        assert_eq!(restored.run_state().best_train_loss, Some(1.5));

        let fresh: AttentionCaptioner<TestBackend> = cfg.init(&device);
        let loaded = ckpt.load_model(Snapshot::BestVal, fresh, &device).unwrap();
        let expected: Vec<f32> = model.fc.weight.val().into_data().to_vec().unwrap();
        let actual:   Vec<f32> = loaded.fc.weight.val().into_data().to_vec().unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            // compact recorder stores half precision
            assert!((a - e).abs() < 1e-2);
        }

        let optim = AdamConfig::new().init::<TestBackend, AttentionCaptioner<TestBackend>>();
        assert!(ckpt
            .load_optimizer::<TestBackend, AttentionCaptioner<TestBackend>, _>(Snapshot::BestVal, optim, &device)
            .is_ok());
    }

    #[test]
    fn test_configs_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path(), "cap").unwrap();

        ckpt.save_config(&TrainConfig::default()).unwrap();
        assert_eq!(ckpt.load_config().unwrap().epochs, TrainConfig::default().epochs);

        ckpt.save_model_config(&AttentionCaptionerConfig::new(10, 6)).unwrap();
        let cfg = ckpt.load_model_config().unwrap();
        assert_eq!((cfg.vocab_size, cfg.encoder_dim, cfg.decoder_dim), (10, 6, 256));
    }

    #[test]
    fn test_loading_absent_snapshot_fails() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path(), "cap").unwrap();
        assert!(ckpt.load_meta(Snapshot::Latest).is_err());
    }
}
