// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::{OptimizerKind, TrainConfig};
use crate::domain::caption::Split;
use crate::infra::checkpoint::Snapshot;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the attention captioner on pre-extracted image features
    Train(TrainArgs),

    /// Score a saved snapshot with corpus BLEU-1..4
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OptimizerArg {
    Rmsprop,
    Adam,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(a: OptimizerArg) -> Self {
        match a {
            OptimizerArg::Rmsprop => OptimizerKind::RmsProp,
            OptimizerArg::Adam    => OptimizerKind::Adam,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding train.jsonl and val.jsonl
    #[arg(long, default_value = "data/captions")]
    pub data_dir: String,

    /// Directory for snapshots, vocabulary, configs and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Prefix of every snapshot file
    #[arg(long, default_value = "attention_b128_emd300")]
    pub model_name: String,

    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 2)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, value_enum, default_value_t = OptimizerArg::Rmsprop)]
    pub optimizer: OptimizerArg,

    /// Word embedding size
    #[arg(long, default_value_t = 300)]
    pub embed_dim: usize,

    /// Hidden size of the additive attention
    #[arg(long, default_value_t = 256)]
    pub attention_dim: usize,

    /// LSTM hidden size
    #[arg(long, default_value_t = 256)]
    pub decoder_dim: usize,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Maximum words generated or trained on per caption
    /// (default: longest training caption)
    #[arg(long)]
    pub max_decode_len: Option<usize>,

    /// Words seen fewer times in the training captions become <unk>
    #[arg(long, default_value_t = 1)]
    pub min_word_freq: usize,

    /// Log progress every N batches
    #[arg(long, default_value_t = 50)]
    pub log_interval: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Seed for shuffling training batches
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Continue from the latest snapshot in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,

    /// Skip BLEU on the training images each epoch
    #[arg(long)]
    pub skip_train_bleu: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:        a.data_dir,
            checkpoint_dir:  a.checkpoint_dir,
            model_name:      a.model_name,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            lr:              a.lr,
            optimizer:       a.optimizer.into(),
            embed_dim:       a.embed_dim,
            attention_dim:   a.attention_dim,
            decoder_dim:     a.decoder_dim,
            dropout:         a.dropout,
            max_decode_len:  a.max_decode_len,
            min_word_freq:   a.min_word_freq,
            log_interval:    a.log_interval,
            num_workers:     a.num_workers,
            seed:            a.seed,
            resume:          a.resume,
            skip_train_bleu: a.skip_train_bleu,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SnapshotArg {
    Latest,
    BestTrain,
    BestVal,
}

impl From<SnapshotArg> for Snapshot {
    fn from(a: SnapshotArg) -> Self {
        match a {
            SnapshotArg::Latest    => Snapshot::Latest,
            SnapshotArg::BestTrain => Snapshot::BestTrain,
            SnapshotArg::BestVal   => Snapshot::BestVal,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SplitArg {
    Train,
    Val,
    Test,
}

impl From<SplitArg> for Split {
    fn from(a: SplitArg) -> Self {
        match a {
            SplitArg::Train => Split::Train,
            SplitArg::Val   => Split::Val,
            SplitArg::Test  => Split::Test,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where training saved its snapshots
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Override the data directory recorded in train_config.json
    #[arg(long)]
    pub data_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = SplitArg::Test)]
    pub split: SplitArg,

    #[arg(long, value_enum, default_value_t = SnapshotArg::BestVal)]
    pub snapshot: SnapshotArg,

    /// Defaults to the training batch size
    #[arg(long)]
    pub batch_size: Option<usize>,
}
