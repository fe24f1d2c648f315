// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:        the epoch number (1, 2, 3, ...)
//   - train_loss:   mean of per-batch packed cross-entropy
//   - train_acc:    mean of per-batch packed accuracy
//   - train_bleuN:  BLEU-1..4 on the training images
//   - val_bleuN:    BLEU-1..4 on the validation images
//
// Output file: checkpoints/metrics.csv
//
// Example CSV output:
//   epoch,train_loss,train_acc,train_bleu1,...,val_bleu4
//   1,4.812300,0.231000,0.512000,...,0.071000
//
// A resumed run appends to the same file.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "epoch,train_loss,train_acc,\
train_bleu1,train_bleu2,train_bleu3,train_bleu4,\
val_bleu1,val_bleu2,val_bleu3,val_bleu4";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    /// NaN when the epoch trained no batches
    pub train_loss: f64,
    pub train_acc:  f64,
    /// BLEU-n at index n, index 0 unused
    pub train_bleu: [f64; 5],
    pub val_bleu:   [f64; 5],
}

impl EpochMetrics {
    fn csv_row(&self) -> String {
        let mut row = format!("{},{:.6},{:.6}", self.epoch, self.train_loss, self.train_acc);
        for score in self.train_bleu[1..].iter().chain(&self.val_bleu[1..]) {
            row.push_str(&format!(",{score:.6}"));
        }
        row
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_bleu4={:.4}",
            m.epoch, m.train_loss, m.val_bleu[4],
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 2.5,
            train_acc:  0.125,
            train_bleu: [0.0, 0.5, 0.25, 0.125, 0.0625],
            val_bleu:   [0.0, 0.4, 0.2, 0.1, 0.05],
        }
    }

    #[test]
    fn test_header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();

        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(1)).unwrap();

        // a resumed run must not rewrite the header
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(2)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[2].starts_with("2,2.500000,0.125000,0.500000"));
        assert_eq!(lines[1].split(',').count(), HEADER.split(',').count());
    }

    #[test]
    fn test_nan_loss_is_written_verbatim() {
        let m = EpochMetrics { train_loss: f64::NAN, ..metrics(1) };
        assert!(m.csv_row().starts_with("1,NaN,"));
    }
}
