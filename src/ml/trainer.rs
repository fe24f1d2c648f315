// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Teacher-forced training with packed cross-entropy, followed
// each epoch by greedy BLEU evaluation and checkpointing.
//
// One training step:
//   1. Pack the batch: timestep-major positions of real tokens
//   2. Forward pass, scores [N, T, V]
//   3. Gather packed score rows and packed targets
//   4. Cross-entropy (pad excluded) and masked accuracy
//   5. Backward pass + optimiser update
//
// Key Burn insight:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() returns the model on the inner backend (Wgpu)
//   - Evaluation batchers must use B::InnerBackend too
//   - argmax(1) returns [rows, 1] so we reshape before reading
//
// Reference: Burn Book §5, Hinton (2012) RMSProp lecture notes

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer, RmsPropConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::{OptimizerKind, TrainConfig};
use crate::data::{
    batcher::{EvalBatcher, TrainBatch, TrainBatcher},
    dataset::{EvalDataset, TrainDataset},
    packing::{masked_accuracy, PackedView},
};
use crate::domain::{error::CaptionError, vocabulary::Vocabulary};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta, Snapshot},
    metrics::{EpochMetrics, MetricsLogger},
    policy::{CheckpointPolicy, RunState},
};
use crate::ml::decode::to_indices;
use crate::ml::evaluator::{evaluate_epoch, ScoreVector};
use crate::ml::model::{AttentionCaptioner, AttentionCaptionerConfig, Captioner};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Result of one optimiser step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub loss:      f64,
    pub accuracy:  f64,
    /// Packed target positions that contributed
    pub positions: usize,
}

/// Run one teacher-forced update. Returns `None` instead of an outcome
/// when the batch has no target positions; the model is returned
/// unchanged in that case.
pub fn train_step<B, M, O>(
    model:   M,
    batch:   TrainBatch<B>,
    loss_fn: &CrossEntropyLoss<B>,
    optim:   &mut O,
    lr:      f64,
    pad:     usize,
) -> Result<(M, Option<StepOutcome>)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Captioner<B>,
    O: Optimizer<M, B>,
{
    let TrainBatch { features, captions, layout } = batch;

    let [caption_rows, _] = captions.dims();
    if caption_rows != layout.decode_lengths.len() {
        return Err(CaptionError::LengthMismatch {
            captions: caption_rows,
            lengths:  layout.decode_lengths.len(),
        }
        .into());
    }

    let view    = PackedView::new(&layout.decode_lengths, layout.captions.len())?;
    let packed  = view.targets(&layout.captions)?;
    let kept    = non_pad_positions(&packed, pad);
    if kept.is_empty() {
        tracing::warn!(
            "Skipping batch of {} captions with no target positions (samples {:?})",
            layout.captions.len(), layout.sample_ids,
        );
        return Ok((model, None));
    }

    let output = model.forward(features, captions, &layout.decode_lengths);
    let [rows, steps, vocab] = output.scores.dims();
    if steps < view.steps() {
        bail!("model produced {steps} timesteps but the batch needs {}", view.steps());
    }
    let device = output.scores.device();

    // [rows, steps, V] -> [rows * steps, V] -> packed [positions, V]
    let flat_rows = view.flat_rows(steps);
    let row_ids: Vec<i64> = kept.iter().map(|&i| flat_rows[i]).collect();
    let packed_scores = output
        .scores
        .reshape([rows * steps, vocab])
        .select(0, Tensor::<B, 1, Int>::from_ints(row_ids.as_slice(), &device));

    let targets: Vec<usize> = kept.iter().map(|&i| packed[i]).collect();
    let target_ids: Vec<i64> = targets.iter().map(|&t| t as i64).collect();
    let target_tensor = Tensor::<B, 1, Int>::from_ints(target_ids.as_slice(), &device);

    let loss = loss_fn.forward(packed_scores.clone(), target_tensor);
    let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();

    let predictions = to_indices(packed_scores.argmax(1).reshape([targets.len()]))?;
    let accuracy = masked_accuracy(&predictions, &targets, pad).unwrap_or(0.0);

    // Backward pass + optimiser update
    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optim.step(lr, model, grads);

    Ok((model, Some(StepOutcome { loss: loss_value, accuracy, positions: targets.len() })))
}

/// Packed positions whose target is a real token.
///
/// Burn's pad mask zeroes the masked terms but still divides by every
/// row, so pad rows are removed before the loss instead.
fn non_pad_positions(targets: &[usize], pad: usize) -> Vec<usize> {
    targets
        .iter()
        .enumerate()
        .filter(|&(_, &t)| t != pad)
        .map(|(i, _)| i)
        .collect()
}

/// Per-epoch mean of per-batch loss and accuracy.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    loss_sum:     f64,
    accuracy_sum: f64,
    batches:      usize,
    skipped:      usize,
}

impl RunningStats {
    pub fn record(&mut self, outcome: &StepOutcome) {
        self.loss_sum += outcome.loss;
        self.accuracy_sum += outcome.accuracy;
        self.batches += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// NaN when no batch was trained.
    pub fn mean_loss(&self) -> f64 {
        if self.batches == 0 { f64::NAN } else { self.loss_sum / self.batches as f64 }
    }

    pub fn mean_accuracy(&self) -> f64 {
        if self.batches == 0 { 0.0 } else { self.accuracy_sum / self.batches as f64 }
    }
}

/// Train over every batch once, logging every `log_interval` batches.
pub fn train_epoch<B, M, O>(
    mut model:    M,
    batches:      impl IntoIterator<Item = TrainBatch<B>>,
    loss_fn:      &CrossEntropyLoss<B>,
    optim:        &mut O,
    lr:           f64,
    pad:          usize,
    log_interval: usize,
    desc:         &str,
) -> Result<(M, RunningStats)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Captioner<B>,
    O: Optimizer<M, B>,
{
    let mut stats = RunningStats::default();

    for (batch_idx, batch) in batches.into_iter().enumerate() {
        let (next, outcome) = train_step(model, batch, loss_fn, optim, lr, pad)?;
        model = next;
        match outcome {
            Some(outcome) => stats.record(&outcome),
            None => stats.skip(),
        }

        if log_interval > 0 && (batch_idx + 1) % log_interval == 0 {
            tracing::info!(
                "{} batch {} train_loss={:.4} train_acc={:.4}",
                desc, batch_idx + 1, stats.mean_loss(), stats.mean_accuracy(),
            );
        }
    }

    if stats.skipped() > 0 {
        tracing::warn!("{}: {} degenerate batches skipped", desc, stats.skipped());
    }
    Ok((model, stats))
}

/// Datasets and feature grid shape for one training run.
pub struct TrainingData {
    pub train:       TrainDataset,
    pub train_eval:  EvalDataset,
    pub val:         EvalDataset,
    pub regions:     usize,
    pub feature_dim: usize,
}

pub fn run_training(
    cfg:          &TrainConfig,
    vocab:        &Vocabulary,
    data:         TrainingData,
    ckpt_manager: CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    // RMSProp: v = α v + (1-α) g²,  θ = θ - lr · g / (√v + ε)
    match cfg.optimizer {
        OptimizerKind::RmsProp => {
            let optim = RmsPropConfig::new().init::<MyBackend, AttentionCaptioner<MyBackend>>();
            train_loop::<MyBackend, _>(cfg, vocab, data, ckpt_manager, device, optim)
        }
        OptimizerKind::Adam => {
            let optim = AdamConfig::new()
                .with_epsilon(1e-8)
                .init::<MyBackend, AttentionCaptioner<MyBackend>>();
            train_loop::<MyBackend, _>(cfg, vocab, data, ckpt_manager, device, optim)
        }
    }
}

pub(crate) fn train_loop<B, O>(
    cfg:          &TrainConfig,
    vocab:        &Vocabulary,
    data:         TrainingData,
    ckpt_manager: CheckpointManager,
    device:       B::Device,
    mut optim:    O,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<AttentionCaptioner<B>, B>,
{
    let max_decode = cfg.max_decode(vocab);
    let pad        = vocab.pad_idx();

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = AttentionCaptionerConfig::new(vocab.len(), data.feature_dim)
        .with_embed_dim(cfg.embed_dim)
        .with_attention_dim(cfg.attention_dim)
        .with_decoder_dim(cfg.decoder_dim)
        .with_dropout(cfg.dropout);
    ckpt_manager.save_model_config(&model_cfg)?;
    let mut model: AttentionCaptioner<B> = model_cfg.init(&device);

    // ── Resume from the latest snapshot ───────────────────────────────────────
    let mut run_state   = RunState::new();
    let mut first_epoch = 1;
    if cfg.resume {
        if ckpt_manager.exists(Snapshot::Latest) {
            let meta = ckpt_manager.load_meta(Snapshot::Latest)?;
            model = ckpt_manager.load_model::<B, _>(Snapshot::Latest, model, &device)?;
            optim = ckpt_manager.load_optimizer::<B, AttentionCaptioner<B>, O>(Snapshot::Latest, optim, &device)?;
            run_state   = meta.run_state();
            first_epoch = meta.epoch + 1;
            tracing::info!("Resuming after epoch {} (bests: {:?})", meta.epoch, run_state);
        } else {
            tracing::warn!("--resume given but no latest snapshot exists; starting fresh");
        }
    }
    tracing::info!(
        "Model ready: vocab={}, embed={}, attention={}, decoder={}",
        vocab.len(), cfg.embed_dim, cfg.attention_dim, cfg.decoder_dim,
    );

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_batcher = TrainBatcher::<B>::new(device.clone(), data.regions, data.feature_dim, pad, max_decode);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(data.train);

    // Evaluation runs on the inner backend, no autodiff overhead
    let eval_batcher = EvalBatcher::<B::InnerBackend>::new(device.clone(), data.regions, data.feature_dim);
    let train_eval_loader = DataLoaderBuilder::new(eval_batcher.clone())
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(data.train_eval);
    let val_loader = DataLoaderBuilder::new(eval_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(data.val);

    let loss_fn = CrossEntropyLossConfig::new()
        .with_pad_tokens(Some(vec![pad]))
        .init(&device);
    let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
    let mut last_meta: Option<CheckpointMeta> = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in first_epoch..=cfg.epochs {
        let desc = format!("Epoch {}/{}", epoch, cfg.epochs);

        let (trained, stats) = train_epoch(
            model, train_loader.iter(), &loss_fn, &mut optim,
            cfg.lr, pad, cfg.log_interval, &desc,
        )?;
        model = trained;

        // model.valid() → AttentionCaptioner<B::InnerBackend>, dropout off
        let model_valid = model.valid();
        let train_bleu = if cfg.skip_train_bleu {
            ScoreVector::default()
        } else {
            evaluate_epoch(
                &model_valid, train_eval_loader.iter(), vocab, max_decode,
                "\tTrain Bleu Score", cfg.log_interval,
            )?
        };
        let val_bleu = evaluate_epoch(
            &model_valid, val_loader.iter(), vocab, max_decode,
            "\tValidation Bleu Score", cfg.log_interval,
        )?;

        let train_loss = stats.mean_loss();
        let train_acc  = stats.mean_accuracy();
        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | train_bleu1={:.4} train_bleu4={:.4} | val_bleu1={:.4} val_bleu4={:.4}",
            epoch, cfg.epochs, train_loss, train_acc * 100.0,
            train_bleu.bleu(1), train_bleu.bleu(4), val_bleu.bleu(1), val_bleu.bleu(4),
        );

        let summary = EpochMetrics {
            epoch,
            train_loss,
            train_acc,
            train_bleu: train_bleu.0,
            val_bleu:   val_bleu.0,
        };
        metrics.log(&summary)?;
        last_meta = Some(snapshot_epoch(&ckpt_manager, &mut run_state, &summary, &model, &optim)?);
    }

    match last_meta {
        Some(meta) => {
            ckpt_manager.save(Snapshot::Final(cfg.epochs), &model, &optim, &meta)?;
            tracing::info!("Training complete! Final weights saved as {}", Snapshot::Final(cfg.epochs));
        }
        None => tracing::info!("Nothing to train: already at epoch {}", cfg.epochs),
    }
    Ok(())
}

/// Apply the checkpoint policy to a finished epoch and write the
/// snapshots it asks for. Returns the record saved with them.
fn snapshot_epoch<B, O>(
    ckpt_manager: &CheckpointManager,
    run_state:    &mut RunState,
    summary:      &EpochMetrics,
    model:        &AttentionCaptioner<B>,
    optim:        &O,
) -> Result<CheckpointMeta>
where
    B: AutodiffBackend,
    O: Optimizer<AttentionCaptioner<B>, B>,
{
    let val_bleu4 = ScoreVector(summary.val_bleu).bleu(4);
    let plan = CheckpointPolicy.plan(run_state, summary.train_loss, val_bleu4);
    let meta = CheckpointMeta {
        epoch:             summary.epoch,
        train_loss_latest: summary.train_loss.is_finite().then_some(summary.train_loss),
        train_acc_latest:  summary.train_acc,
        val_bleu4_latest:  val_bleu4,
        train_loss_min:    run_state.best_train_loss,
        val_bleu4_max:     run_state.best_val_bleu4,
        train_bleus:       summary.train_bleu,
        val_bleus:         summary.val_bleu,
    };

    if plan.latest {
        ckpt_manager.save::<B, _, _>(Snapshot::Latest, model, optim, &meta)?;
    }
    if plan.best_train {
        ckpt_manager.save::<B, _, _>(Snapshot::BestTrain, model, optim, &meta)?;
        tracing::info!("New best train loss {:.4} at epoch {}", summary.train_loss, summary.epoch);
    }
    if plan.best_val {
        ckpt_manager.save::<B, _, _>(Snapshot::BestVal, model, optim, &meta)?;
        tracing::info!("New best val BLEU-4 {:.4} at epoch {}", val_bleu4, summary.epoch);
    }
    Ok(meta)
}
