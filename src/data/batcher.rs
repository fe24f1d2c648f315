// ============================================================
// Layer 4 — Caption Batchers
// ============================================================
// Implement Burn's Batcher trait to turn a Vec of samples into
// device tensors.
//
// Training batches:
//   1. Sort samples by caption length, longest first (stable)
//   2. Pad every caption with <pad> to the longest one
//   3. Record decode lengths (length − 1, clipped) for packing
//   4. Record each row's original sample id
//
// The batcher owns the sort. The model receives captions that are
// already in packing order and never reorders them, so the decode
// lengths here are the ones the packer uses for both scores and
// targets.
//
// Evaluation batches keep dataset order and carry every reference
// caption of each image on the host; only the features go to the
// device.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::{EvalSample, TrainSample};
use crate::data::packing::decode_lengths;

/// Host-side caption layout of a training batch, in packing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLayout {
    /// Original dataset position of each row
    pub sample_ids:     Vec<usize>,
    /// Captions padded with <pad> to the batch's longest caption
    pub captions:       Vec<Vec<usize>>,
    pub decode_lengths: Vec<usize>,
}

impl CaptionLayout {
    pub fn width(&self) -> usize {
        self.captions.first().map_or(0, Vec::len)
    }
}

/// Sort `items` longest caption first and lay their captions out for
/// packing. `items` is reordered in place so features can be stacked
/// in the same order.
pub fn layout_captions(items: &mut [TrainSample], pad: usize, max_decode: usize) -> CaptionLayout {
    items.sort_by(|a, b| b.declared_len().cmp(&a.declared_len()));

    let width = items.first().map_or(0, TrainSample::declared_len);
    let declared: Vec<usize> = items.iter().map(TrainSample::declared_len).collect();

    let captions = items
        .iter()
        .map(|s| {
            let mut row = s.caption.clone();
            row.resize(width, pad);
            row
        })
        .collect();

    CaptionLayout {
        sample_ids:     items.iter().map(|s| s.sample_id).collect(),
        captions,
        decode_lengths: decode_lengths(&declared, max_decode),
    }
}

fn stack_features<B: Backend>(
    grids:       impl Iterator<Item = impl AsRef<[f32]>>,
    regions:     usize,
    feature_dim: usize,
    device:      &B::Device,
) -> Tensor<B, 3> {
    let flat: Vec<f32> = grids.flat_map(|g| g.as_ref().to_vec()).collect();
    let batch_size = flat.len() / (regions * feature_dim).max(1);
    Tensor::<B, 3>::from_data(
        TensorData::new(flat, [batch_size, regions, feature_dim]),
        device,
    )
}

// ─── TrainBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainBatch<B: Backend> {
    /// Feature grids — shape: [batch_size, regions, feature_dim]
    pub features: Tensor<B, 3>,

    /// Padded captions — shape: [batch_size, width]
    pub captions: Tensor<B, 2, Int>,

    /// Same captions on the host, plus lengths and sample ids
    pub layout: CaptionLayout,
}

#[derive(Clone, Debug)]
pub struct TrainBatcher<B: Backend> {
    pub device:      B::Device,
    pub regions:     usize,
    pub feature_dim: usize,
    pub pad:         usize,
    pub max_decode:  usize,
}

impl<B: Backend> TrainBatcher<B> {
    pub fn new(device: B::Device, regions: usize, feature_dim: usize, pad: usize, max_decode: usize) -> Self {
        Self { device, regions, feature_dim, pad, max_decode }
    }
}

impl<B: Backend> Batcher<TrainSample, TrainBatch<B>> for TrainBatcher<B> {
    fn batch(&self, mut items: Vec<TrainSample>) -> TrainBatch<B> {
        let layout = layout_captions(&mut items, self.pad, self.max_decode);
        let (batch_size, width) = (layout.captions.len(), layout.width());

        let caption_flat: Vec<i32> = layout
            .captions
            .iter()
            .flat_map(|row| row.iter().map(|&x| x as i32))
            .collect();

        let captions = Tensor::<B, 1, Int>::from_ints(
            caption_flat.as_slice(), &self.device
        ).reshape([batch_size, width]);

        let features = stack_features::<B>(
            items.iter().map(|s| s.features.clone()),
            self.regions,
            self.feature_dim,
            &self.device,
        );

        TrainBatch { features, captions, layout }
    }
}

// ─── EvalBatch ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct EvalBatch<B: Backend> {
    /// Feature grids — shape: [batch_size, regions, feature_dim]
    pub features:   Tensor<B, 3>,
    /// All reference captions per image, `<start> ... <end>`
    pub references: Vec<Vec<Vec<usize>>>,
    pub sample_ids: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct EvalBatcher<B: Backend> {
    pub device:      B::Device,
    pub regions:     usize,
    pub feature_dim: usize,
}

impl<B: Backend> EvalBatcher<B> {
    pub fn new(device: B::Device, regions: usize, feature_dim: usize) -> Self {
        Self { device, regions, feature_dim }
    }
}

impl<B: Backend> Batcher<EvalSample, EvalBatch<B>> for EvalBatcher<B> {
    fn batch(&self, items: Vec<EvalSample>) -> EvalBatch<B> {
        let features = stack_features::<B>(
            items.iter().map(|s| s.features.clone()),
            self.regions,
            self.feature_dim,
            &self.device,
        );

        let sample_ids = items.iter().map(|s| s.sample_id).collect();
        let references = items.into_iter().map(|s| s.references).collect();

        EvalBatch { features, references, sample_ids }
    }
}
