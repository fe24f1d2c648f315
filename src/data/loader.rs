// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads one JSON object per line from `{dir}/{split}.jsonl`:
//
//   {"image": "1000268201", "regions": 196, "feature_dim": 2048,
//    "features": [...], "captions": ["A child in a pink dress ...", ...]}
//
// Feature grids come from an external image encoder; this loader
// only checks they are complete and share one shape, because the
// batcher stacks them into a single [N, regions, feature_dim]
// tensor.
//
// A missing split, a malformed line or a mismatched grid is fatal.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};

use crate::domain::caption::{CaptionedImage, Split};
use crate::domain::traits::CaptionSource;

pub struct JsonlCorpus {
    dir: PathBuf,
}

impl JsonlCorpus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn split_path(&self, split: Split) -> PathBuf {
        self.dir.join(format!("{}.jsonl", split.file_stem()))
    }
}

impl CaptionSource for JsonlCorpus {
    fn load_split(&self, split: Split) -> Result<Vec<CaptionedImage>> {
        let path = self.split_path(split);
        let records = read_jsonl(&path)?;

        if records.is_empty() {
            bail!("Split '{}' at '{}' contains no records", split, path.display());
        }

        let shape = records[0].feature_shape();
        for record in &records {
            record.validate()?;
            if record.feature_shape() != shape {
                bail!(
                    "Image '{}' has feature grid {:?}, expected {:?} like the rest of '{}'",
                    record.image, record.feature_shape(), shape, path.display()
                );
            }
        }

        tracing::info!(
            "Loaded {} images ({} captions) from '{}'",
            records.len(),
            records.iter().map(|r| r.captions.len()).sum::<usize>(),
            path.display()
        );
        Ok(records)
    }
}

fn read_jsonl(path: &Path) -> Result<Vec<CaptionedImage>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open corpus split '{}'", path.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: CaptionedImage = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed record", path.display(), line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn line(image: &str, regions: usize, dim: usize, captions: &[&str]) -> String {
        serde_json::json!({
            "image": image,
            "regions": regions,
            "feature_dim": dim,
            "features": vec![0.1f32; regions * dim],
            "captions": captions,
        })
        .to_string()
    }

    #[test]
    fn test_loads_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n\n{}\n",
            line("a", 2, 3, &["a dog runs"]),
            line("b", 2, 3, &["a cat", "a cat sits"])
        );
        fs::write(dir.path().join("train.jsonl"), body).unwrap();

        let corpus = JsonlCorpus::new(dir.path());
        let records = corpus.load_split(Split::Train).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].captions.len(), 2);
    }

    #[test]
    fn test_missing_split_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = JsonlCorpus::new(dir.path());
        assert!(corpus.load_split(Split::Val).is_err());
    }

    #[test]
    fn test_inconsistent_feature_shape_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("{}\n{}\n", line("a", 2, 3, &["x"]), line("b", 4, 3, &["y"]));
        fs::write(dir.path().join("test.jsonl"), body).unwrap();

        let corpus = JsonlCorpus::new(dir.path());
        assert!(corpus.load_split(Split::Test).is_err());
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("train.jsonl"), "{not json}\n").unwrap();

        let corpus = JsonlCorpus::new(dir.path());
        let err = corpus.load_split(Split::Train).unwrap_err();
        assert!(format!("{err:#}").contains(":1: malformed record"));
    }
}
