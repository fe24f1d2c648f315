// ============================================================
// Layer 5 — Soft-Attention Caption Decoder
// ============================================================
// Image features arrive pre-encoded as a grid of P regions, each
// an E-dimensional vector. Every decoding step:
//
//   att    = full_att( relu( W_enc · features + W_dec · h ) )   [N, P]
//   alpha  = softmax(att over regions)                          [N, P]
//   ctx    = σ(f_beta · h) ⊙ Σ_p alpha_p · features_p           [N, E]
//   h, c   = LSTMCell([embed(prev_word); ctx], (h, c))
//   scores = fc( dropout(h) )                                   [N, V]
//
// h and c start from linear projections of the mean feature.
//
// Training is teacher-forced: step t consumes the ground-truth
// word at position t. Rows arrive sorted longest first and the
// loop only runs for the longest decode length; padded steps of
// shorter rows are computed but never packed into the loss.
//
// Reference: Xu et al. (2015) Show, Attend and Tell
//            Hochreiter & Schmidhuber (1997) Long Short-Term Memory

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{relu, sigmoid, softmax, tanh},
};

/// What the training and decoding drivers need from a caption model.
pub trait Captioner<B: Backend> {
    /// Recurrent state carried between greedy decoding steps
    type State;

    /// Teacher-forced pass. `decode_lengths` is sorted longest first;
    /// scores come back as `[N, T, V]` and attention weights as
    /// `[N, T, P]` where `T` is the longest decode length.
    fn forward(
        &self,
        features:       Tensor<B, 3>,
        captions:       Tensor<B, 2, Int>,
        decode_lengths: &[usize],
    ) -> CaptionerOutput<B>;

    /// Initial state for a batch of feature grids.
    fn begin(&self, features: Tensor<B, 3>) -> Self::State;

    /// Feed one previous word per row; returns `[N, V]` scores.
    fn step(&self, state: Self::State, previous: Tensor<B, 1, Int>) -> (Tensor<B, 2>, Self::State);
}

pub struct CaptionerOutput<B: Backend> {
    pub scores: Tensor<B, 3>,
    pub alphas: Tensor<B, 3>,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct AttentionCaptionerConfig {
    pub vocab_size:  usize,
    /// Feature size of one image region (E)
    pub encoder_dim: usize,
    #[config(default = 300)]
    pub embed_dim:     usize,
    #[config(default = 256)]
    pub attention_dim: usize,
    #[config(default = 256)]
    pub decoder_dim:   usize,
    #[config(default = 0.5)]
    pub dropout:       f64,
}

impl AttentionCaptionerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionCaptioner<B> {
        let (e, a, d) = (self.encoder_dim, self.attention_dim, self.decoder_dim);
        AttentionCaptioner {
            embedding:    EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device),
            encoder_att:  LinearConfig::new(e, a).init(device),
            decoder_att:  LinearConfig::new(d, a).init(device),
            full_att:     LinearConfig::new(a, 1).init(device),
            init_h:       LinearConfig::new(e, d).init(device),
            init_c:       LinearConfig::new(e, d).init(device),
            f_beta:       LinearConfig::new(d, e).init(device),
            input_gates:  LinearConfig::new(self.embed_dim + e, 4 * d).init(device),
            hidden_gates: LinearConfig::new(d, 4 * d).init(device),
            fc:           LinearConfig::new(d, self.vocab_size).init(device),
            dropout:      DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionCaptioner<B: Backend> {
    pub embedding:    Embedding<B>,
    pub encoder_att:  Linear<B>,
    pub decoder_att:  Linear<B>,
    pub full_att:     Linear<B>,
    pub init_h:       Linear<B>,
    pub init_c:       Linear<B>,
    pub f_beta:       Linear<B>,
    /// LSTM cell weights, gates packed as [input, forget, cell, output]
    pub input_gates:  Linear<B>,
    pub hidden_gates: Linear<B>,
    pub fc:           Linear<B>,
    pub dropout:      Dropout,
}

#[derive(Debug, Clone)]
pub struct DecoderState<B: Backend> {
    features:     Tensor<B, 3>,
    /// encoder_att(features), constant for the whole sequence
    att_features: Tensor<B, 3>,
    h:            Tensor<B, 2>,
    c:            Tensor<B, 2>,
}

impl<B: Backend> AttentionCaptioner<B> {
    pub fn vocab_size(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }

    fn init_state(&self, features: Tensor<B, 3>) -> DecoderState<B> {
        let [n, _, e] = features.dims();
        let mean = features.clone().mean_dim(1).reshape([n, e]);
        DecoderState {
            att_features: self.encoder_att.forward(features.clone()),
            h:            self.init_h.forward(mean.clone()),
            c:            self.init_c.forward(mean),
            features,
        }
    }

    /// Gated attention context `[N, E]` and weights `[N, P]`.
    fn attend(&self, state: &DecoderState<B>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [n, p, e] = state.features.dims();

        let att_h  = self.decoder_att.forward(state.h.clone()).unsqueeze_dim::<3>(1);
        let energy = self
            .full_att
            .forward(relu(state.att_features.clone() + att_h))
            .reshape([n, p]);
        let alpha = softmax(energy, 1);

        let context = (state.features.clone() * alpha.clone().unsqueeze_dim::<3>(2))
            .sum_dim(1)
            .reshape([n, e]);
        let gate = sigmoid(self.f_beta.forward(state.h.clone()));

        (gate * context, alpha)
    }

    /// One decoder step from an embedded previous word `[N, embed_dim]`.
    fn advance(
        &self,
        state:    DecoderState<B>,
        embedded: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>, DecoderState<B>) {
        let (context, alpha) = self.attend(&state);

        let x     = Tensor::cat(vec![embedded, context], 1);
        let gates = self.input_gates.forward(x) + self.hidden_gates.forward(state.h);
        let gates = gates.chunk(4, 1);

        let i = sigmoid(gates[0].clone());
        let f = sigmoid(gates[1].clone());
        let g = tanh(gates[2].clone());
        let o = sigmoid(gates[3].clone());

        let c = f * state.c + i * g;
        let h = o * tanh(c.clone());

        let scores = self.fc.forward(self.dropout.forward(h.clone()));
        let next = DecoderState {
            features:     state.features,
            att_features: state.att_features,
            h,
            c,
        };
        (scores, alpha, next)
    }
}

impl<B: Backend> Captioner<B> for AttentionCaptioner<B> {
    type State = DecoderState<B>;

    fn forward(
        &self,
        features:       Tensor<B, 3>,
        captions:       Tensor<B, 2, Int>,
        decode_lengths: &[usize],
    ) -> CaptionerOutput<B> {
        let [n, width] = captions.dims();
        let [_, p, _]  = features.dims();
        let steps = decode_lengths
            .first()
            .copied()
            .unwrap_or(0)
            .min(width.saturating_sub(1));

        if steps == 0 {
            let device = features.device();
            return CaptionerOutput {
                scores: Tensor::zeros([n, 0, self.vocab_size()], &device),
                alphas: Tensor::zeros([n, 0, p], &device),
            };
        }

        let embedded = self.embedding.forward(captions);
        let [_, _, d] = embedded.dims();

        let mut state  = self.init_state(features);
        let mut scores = Vec::with_capacity(steps);
        let mut alphas = Vec::with_capacity(steps);

        for t in 0..steps {
            let word = embedded.clone().slice([0..n, t..t + 1, 0..d]).reshape([n, d]);
            let (step_scores, alpha, next) = self.advance(state, word);
            scores.push(step_scores);
            alphas.push(alpha);
            state = next;
        }

        CaptionerOutput {
            scores: Tensor::stack(scores, 1),
            alphas: Tensor::stack(alphas, 1),
        }
    }

    fn begin(&self, features: Tensor<B, 3>) -> DecoderState<B> {
        self.init_state(features)
    }

    fn step(&self, state: DecoderState<B>, previous: Tensor<B, 1, Int>) -> (Tensor<B, 2>, DecoderState<B>) {
        let [n] = previous.dims();
        let embedded = self.embedding.forward(previous.unsqueeze_dim::<2>(1));
        let [_, _, d] = embedded.dims();
        let (scores, _, next) = self.advance(state, embedded.reshape([n, d]));
        (scores, next)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn tiny_config() -> AttentionCaptionerConfig {
        AttentionCaptionerConfig::new(9, 4)
            .with_embed_dim(6)
            .with_attention_dim(5)
            .with_decoder_dim(7)
            .with_dropout(0.0)
    }

    #[test]
    fn test_forward_shapes_follow_longest_decode_length() {
        let device = Default::default();
        let model: AttentionCaptioner<TestBackend> = tiny_config().init(&device);

        let features = Tensor::<TestBackend, 3>::ones([2, 3, 4], &device);
        let captions = Tensor::<TestBackend, 1, Int>::from_ints(
            [1, 4, 5, 2, 1, 6, 2, 0].as_slice(), &device,
        ).reshape([2, 4]);

        let out = model.forward(features, captions, &[3, 2]);
        assert_eq!(out.scores.dims(), [2, 3, 9]);
        assert_eq!(out.alphas.dims(), [2, 3, 3]);
    }

    #[test]
    fn test_attention_weights_sum_to_one_over_regions() {
        let device = Default::default();
        let model: AttentionCaptioner<TestBackend> = tiny_config().init(&device);

        let features = Tensor::<TestBackend, 3>::random(
            [2, 3, 4], burn::tensor::Distribution::Default, &device,
        );
        let captions = Tensor::<TestBackend, 1, Int>::from_ints(
            [1, 4, 2, 1, 5, 2].as_slice(), &device,
        ).reshape([2, 3]);

        let out = model.forward(features, captions, &[2, 2]);
        let sums: Vec<f32> = out.alphas.sum_dim(2).into_data().to_vec::<f32>().unwrap();
        assert_eq!(sums.len(), 4);
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4, "attention sums to {s}");
        }
    }

    #[test]
    fn test_step_produces_vocab_scores_per_row() {
        let device = Default::default();
        let model: AttentionCaptioner<TestBackend> = tiny_config().init(&device);

        let features = Tensor::<TestBackend, 3>::ones([3, 2, 4], &device);
        let state    = model.begin(features);
        let previous = Tensor::<TestBackend, 1, Int>::from_ints([1, 1, 1].as_slice(), &device);

        let (scores, state) = model.step(state, previous.clone());
        assert_eq!(scores.dims(), [3, 9]);
        let (scores, _) = model.step(state, previous);
        assert_eq!(scores.dims(), [3, 9]);
        assert_eq!(model.vocab_size(), 9);
    }

    #[test]
    fn test_zero_decode_length_yields_empty_scores() {
        let device = Default::default();
        let model: AttentionCaptioner<TestBackend> = tiny_config().init(&device);

        let features = Tensor::<TestBackend, 3>::ones([1, 2, 4], &device);
        let captions = Tensor::<TestBackend, 1, Int>::from_ints([1].as_slice(), &device).reshape([1, 1]);

        let out = model.forward(features, captions, &[0]);
        assert_eq!(out.scores.dims(), [1, 0, 9]);
    }
}
