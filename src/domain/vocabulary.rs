// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Bidirectional word <-> index mapping shared (read-only) by
// the training, validation, test and self-evaluation subsets.
//
// Reserved tokens always occupy the first four indices:
//
//   0 <pad>    1 <start>    2 <end>    3 <unk>
//
// Pad sitting at 0 matches the zero-filled rows the batcher
// produces, so padding never needs a lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{CaptionError, Result};

pub const PAD_TOKEN: &str = "<pad>";
pub const START_TOKEN: &str = "<start>";
pub const END_TOKEN: &str = "<end>";
pub const UNK_TOKEN: &str = "<unk>";

const RESERVED: [&str; 4] = [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN];

/// Persisted vocabulary bundle: the token list (which doubles as the
/// index → token map), the derived token → index map, and the longest
/// encoded caption length seen when the vocabulary was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    idx_to_word: Vec<String>,
    #[serde(skip)]
    word_to_idx: HashMap<String, usize>,
    max_len:     usize,
}

impl Vocabulary {
    /// Build from content words in the given order. Duplicates and
    /// reserved tokens in `words` are ignored.
    pub fn new<I, S>(words: I, max_len: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut idx_to_word: Vec<String> = RESERVED.iter().map(|t| t.to_string()).collect();
        let mut word_to_idx: HashMap<String, usize> = idx_to_word
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();

        for word in words {
            let word = word.as_ref();
            if !word_to_idx.contains_key(word) {
                word_to_idx.insert(word.to_string(), idx_to_word.len());
                idx_to_word.push(word.to_string());
            }
        }

        Self { idx_to_word, word_to_idx, max_len }
    }

    /// Build from already-tokenised training captions.
    ///
    /// Words seen fewer than `min_freq` times are left out (they will
    /// encode as `<unk>`). Remaining words are ordered by frequency,
    /// then alphabetically, so two builds over the same corpus agree.
    pub fn from_captions<'a, I>(captions: I, min_freq: usize) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        let mut longest = 0usize;

        for caption in captions {
            longest = longest.max(caption.len());
            for word in caption {
                *freq.entry(word.as_str()).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(&str, usize)> = freq
            .into_iter()
            .filter(|(_, count)| *count >= min_freq.max(1))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        // +2 for the <start>/<end> wrapping every encoded caption
        Self::new(words.into_iter().map(|(w, _)| w), longest + 2)
    }

    /// Rebuild the token → index map after deserialisation.
    pub fn reindex(mut self) -> Self {
        self.word_to_idx = self
            .idx_to_word
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        self
    }

    pub fn len(&self) -> usize {
        self.idx_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx_to_word.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn pad_idx(&self) -> usize { 0 }
    pub fn start_idx(&self) -> usize { 1 }
    pub fn end_idx(&self) -> usize { 2 }
    pub fn unk_idx(&self) -> usize { 3 }

    /// Look up a token. With `unk_fallback` set, out-of-vocabulary
    /// tokens resolve to `<unk>` instead of failing.
    pub fn encode(&self, token: &str, unk_fallback: bool) -> Result<usize> {
        match self.word_to_idx.get(token) {
            Some(&idx) => Ok(idx),
            None if unk_fallback => Ok(self.unk_idx()),
            None => Err(CaptionError::UnknownToken(token.to_string())),
        }
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.idx_to_word
            .get(index)
            .map(String::as_str)
            .ok_or(CaptionError::IndexOutOfRange { index, size: self.len() })
    }

    /// `<start> words... <end>`, unknown words mapped to `<unk>`.
    pub fn encode_caption(&self, words: &[String]) -> Vec<usize> {
        let mut ids = Vec::with_capacity(words.len() + 2);
        ids.push(self.start_idx());
        ids.extend(words.iter().map(|w| {
            self.word_to_idx.get(w.as_str()).copied().unwrap_or(self.unk_idx())
        }));
        ids.push(self.end_idx());
        ids
    }

    /// Turn an index sequence back into words for scoring.
    ///
    /// The leading `<start>` is dropped and everything from the first
    /// `<end>` onward is cut. A sequence that never emits `<end>` is
    /// kept whole. Generated and reference captions both go through
    /// here so BLEU always compares like with like.
    pub fn words_from_indices(&self, indices: &[usize]) -> Result<Vec<String>> {
        let end = self.end_idx();
        indices
            .iter()
            .take_while(|&&idx| idx != end)
            .skip(1)
            .map(|&idx| self.decode(idx).map(str::to_string))
            .collect()
    }
}
