use std::sync::Arc;

use burn::data::dataset::Dataset;

use crate::data::preprocessor::Preprocessor;
use crate::domain::caption::CaptionedImage;
use crate::domain::vocabulary::Vocabulary;

/// One (image, caption) pair for teacher-forced training.
/// The feature grid is shared between all captions of an image.
#[derive(Debug, Clone)]
pub struct TrainSample {
    /// Position of the sample in the dataset; survives batch sorting
    pub sample_id: usize,
    pub features:  Arc<[f32]>,
    /// `<start> ... <end>` indices, unpadded
    pub caption:   Vec<usize>,
}

impl TrainSample {
    /// Declared length: start + words + end.
    pub fn declared_len(&self) -> usize {
        self.caption.len()
    }
}

/// One image with every reference caption, for BLEU evaluation.
#[derive(Debug, Clone)]
pub struct EvalSample {
    pub sample_id:  usize,
    pub features:   Arc<[f32]>,
    pub references: Vec<Vec<usize>>,
}

fn encode_all(record: &CaptionedImage, vocab: &Vocabulary, prep: &Preprocessor) -> Vec<Vec<usize>> {
    record
        .captions
        .iter()
        .map(|c| vocab.encode_caption(&prep.tokens(c)))
        .collect()
}

pub struct TrainDataset {
    samples: Vec<TrainSample>,
}

impl TrainDataset {
    pub fn from_records(records: &[CaptionedImage], vocab: &Vocabulary, prep: &Preprocessor) -> Self {
        let mut samples = Vec::new();
        for record in records {
            let features: Arc<[f32]> = Arc::from(record.features.as_slice());
            for caption in encode_all(record, vocab, prep) {
                samples.push(TrainSample {
                    sample_id: samples.len(),
                    features:  Arc::clone(&features),
                    caption,
                });
            }
        }
        Self { samples }
    }
}

impl Dataset<TrainSample> for TrainDataset {
    fn get(&self, index: usize) -> Option<TrainSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

pub struct EvalDataset {
    samples: Vec<EvalSample>,
}

impl EvalDataset {
    pub fn from_records(records: &[CaptionedImage], vocab: &Vocabulary, prep: &Preprocessor) -> Self {
        let samples = records
            .iter()
            .enumerate()
            .map(|(sample_id, record)| EvalSample {
                sample_id,
                features:   Arc::from(record.features.as_slice()),
                references: encode_all(record, vocab, prep),
            })
            .collect();
        Self { samples }
    }
}

impl Dataset<EvalSample> for EvalDataset {
    fn get(&self, index: usize) -> Option<EvalSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
