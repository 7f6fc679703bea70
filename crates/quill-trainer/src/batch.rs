//! Minibatching for padded sequence training.
//!
//! A [`Minibatcher`] makes lazy, restartable passes over an encoded example
//! list. Exhausting a pass yields `None`, the expected, recoverable signal
//! to reshuffle and continue, never an error. Each batch pads to its own
//! maximum length and keeps the original corpus index of every row so the
//! prior buffer can be addressed.

use candle_core::{Device, Result as CandleResult, Tensor};
use oorandom::Rand64;

use quill_core::corpus::Example;
use quill_core::vocab::{PAD_IDX, Vocab};

/// One example encoded against the training vocabulary.
#[derive(Debug, Clone)]
struct EncodedExample {
    ids: Vec<u32>,
    labels: Vec<u32>,
    labeled: bool,
}

/// A padded batch of sequences.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Original corpus index of each row.
    pub indices: Vec<usize>,
    /// Token indices, padded with [`PAD_IDX`] to `max_len`.
    pub token_ids: Vec<Vec<u32>>,
    /// Label indices, padded with the Outside tag; pad positions are masked.
    pub labels: Vec<Vec<u32>>,
    /// True (unpadded) length of each row.
    pub lengths: Vec<usize>,
    /// Whether each row carries trusted labels.
    pub labeled: Vec<bool>,
    /// Padded sequence length of this batch.
    pub max_len: usize,
}

/// Label index used to pad label rows. Always masked out of the loss.
const LABEL_PAD: u32 = quill_core::tags::MentionTag::Outside as u32;

impl Batch {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Token-index tensor of shape `(batch, max_len)`, dtype u32.
    pub fn input_tensor(&self, device: &Device) -> CandleResult<Tensor> {
        let flat: Vec<u32> = self.token_ids.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (self.len(), self.max_len), device)
    }

    /// Label tensor of shape `(batch, max_len)`, dtype u32.
    pub fn label_tensor(&self, device: &Device) -> CandleResult<Tensor> {
        let flat: Vec<u32> = self.labels.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (self.len(), self.max_len), device)
    }

    /// Padding mask of shape `(batch, max_len)`: 1.0 inside the true length,
    /// 0.0 on pad positions.
    pub fn mask_tensor(&self, device: &Device) -> CandleResult<Tensor> {
        let mut flat = Vec::with_capacity(self.len() * self.max_len);
        for &len in &self.lengths {
            for t in 0..self.max_len {
                flat.push(if t < len { 1.0f32 } else { 0.0 });
            }
        }
        Tensor::from_vec(flat, (self.len(), self.max_len), device)
    }

    /// Like [`Batch::mask_tensor`], but rows without trusted labels are
    /// zeroed entirely: unlabeled examples contribute no supervised loss.
    pub fn supervision_mask_tensor(&self, device: &Device) -> CandleResult<Tensor> {
        let mut flat = Vec::with_capacity(self.len() * self.max_len);
        for (row, &len) in self.lengths.iter().enumerate() {
            let keep = self.labeled[row];
            for t in 0..self.max_len {
                flat.push(if keep && t < len { 1.0f32 } else { 0.0 });
            }
        }
        Tensor::from_vec(flat, (self.len(), self.max_len), device)
    }
}

/// Shuffled, restartable batch source over an encoded corpus.
pub struct Minibatcher {
    examples: Vec<EncodedExample>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    rng: Rand64,
}

impl Minibatcher {
    /// Encode `examples` against `vocab` and set up an unshuffled pass.
    pub fn new(examples: &[Example], vocab: &Vocab, batch_size: usize, seed: u64) -> Self {
        let encoded = examples
            .iter()
            .map(|example| EncodedExample {
                ids: vocab.encode(&example.tokens),
                labels: example.labels.iter().map(|t| t.index() as u32).collect(),
                labeled: example.labeled,
            })
            .collect();

        Self {
            examples: encoded,
            order: (0..examples.len()).collect(),
            cursor: 0,
            batch_size: batch_size.max(1),
            rng: Rand64::new(seed as u128),
        }
    }

    /// Number of examples in the corpus.
    pub fn num_examples(&self) -> usize {
        self.examples.len()
    }

    /// Number of batches per full pass.
    pub fn num_batches(&self) -> usize {
        self.examples.len().div_ceil(self.batch_size)
    }

    /// Draw the next batch of the current pass, or `None` when the pass is
    /// exhausted. Callers treat `None` as "reshuffle and continue".
    pub fn next_batch(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let slice = &self.order[self.cursor..end];
        self.cursor = end;

        let max_len = slice
            .iter()
            .map(|&i| self.examples[i].ids.len())
            .max()
            .unwrap_or(0);

        let mut batch = Batch {
            indices: Vec::with_capacity(slice.len()),
            token_ids: Vec::with_capacity(slice.len()),
            labels: Vec::with_capacity(slice.len()),
            lengths: Vec::with_capacity(slice.len()),
            labeled: Vec::with_capacity(slice.len()),
            max_len,
        };

        for &i in slice {
            let example = &self.examples[i];
            let mut ids = example.ids.clone();
            let mut labels = example.labels.clone();
            ids.resize(max_len, PAD_IDX);
            labels.resize(max_len, LABEL_PAD);

            batch.indices.push(i);
            batch.lengths.push(example.ids.len());
            batch.labeled.push(example.labeled);
            batch.token_ids.push(ids);
            batch.labels.push(labels);
        }

        Some(batch)
    }

    /// Permute the pass order and restart.
    pub fn reshuffle(&mut self) {
        // Fisher-Yates
        for i in (1..self.order.len()).rev() {
            let j = self.rng.rand_range(0..(i as u64 + 1)) as usize;
            self.order.swap(i, j);
        }
        self.cursor = 0;
    }

    /// Restart the pass without permuting (evaluation order).
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}
