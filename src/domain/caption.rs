// ============================================================
// Layer 3 — Captioned Image Domain Type
// ============================================================
// One image of the corpus: its spatial feature grid and every
// human-written caption describing it.
//
// The feature grid is whatever the (external) image encoder
// produced: `regions` spatial cells, each a vector of
// `feature_dim` floats, stored row-major in `features`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{CaptionError, Result};

/// Which partition of the corpus a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn file_stem(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val   => "val",
            Split::Test  => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionedImage {
    /// Image identifier, kept for error messages and tracing
    pub image: String,

    pub regions: usize,

    pub feature_dim: usize,

    /// Row-major `[regions, feature_dim]` grid
    pub features: Vec<f32>,

    /// Raw caption strings (normalised later by the preprocessor)
    pub captions: Vec<String>,
}

impl CaptionedImage {
    /// Check the record is usable for batching.
    pub fn validate(&self) -> Result<()> {
        let expected = self.regions * self.feature_dim;
        if self.regions == 0 || self.feature_dim == 0 {
            return Err(self.invalid("feature grid has a zero dimension".to_string()));
        }
        if self.features.len() != expected {
            return Err(self.invalid(format!(
                "expected {} feature values ({} x {}), found {}",
                expected, self.regions, self.feature_dim, self.features.len()
            )));
        }
        if self.captions.is_empty() {
            return Err(self.invalid("no captions".to_string()));
        }
        Ok(())
    }

    pub fn feature_shape(&self) -> (usize, usize) {
        (self.regions, self.feature_dim)
    }

    fn invalid(&self, reason: String) -> CaptionError {
        CaptionError::InvalidSample { image: self.image.clone(), reason }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(features: usize, captions: Vec<&str>) -> CaptionedImage {
        CaptionedImage {
            image:       "img_0".to_string(),
            regions:     2,
            feature_dim: 3,
            features:    vec![0.5; features],
            captions:    captions.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn test_valid_record() {
        assert!(record(6, vec!["a dog"]).validate().is_ok());
    }

    #[test]
    fn test_wrong_feature_count_is_rejected() {
        let err = record(5, vec!["a dog"]).validate().unwrap_err();
        assert!(matches!(err, CaptionError::InvalidSample { .. }));
    }

    #[test]
    fn test_record_without_captions_is_rejected() {
        assert!(record(6, vec![]).validate().is_err());
    }

    #[test]
    fn test_split_parses_lowercase() {
        let s: Split = serde_json::from_str("\"val\"").unwrap();
        assert_eq!(s, Split::Val);
        assert_eq!(Split::Test.to_string(), "test");
    }
}
