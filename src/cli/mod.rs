// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and delegates everything else to Layer 2.
//
// Two commands are supported:
//   1. `train`    — trains the captioner, snapshotting each epoch
//   2. `evaluate` — scores a saved snapshot on one split
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "caption-trainer",
    version,
    about = "Train a soft-attention image captioner and score it with corpus BLEU."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on captions in: {}", args.data_dir);
    let checkpoint_dir = args.checkpoint_dir.clone();

    TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Snapshots saved in '{checkpoint_dir}'.");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(
        args.checkpoint_dir,
        args.data_dir,
        args.split.into(),
        args.snapshot.into(),
        args.batch_size,
    );
    let scores = use_case.execute()?;

    println!(
        "\nBLEU-1: {:.4}  BLEU-2: {:.4}  BLEU-3: {:.4}  BLEU-4: {:.4}",
        scores[1], scores[2], scores[3], scores[4],
    );
    Ok(())
}
