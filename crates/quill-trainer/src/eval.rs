//! Development/test-set evaluation: inference-mode pass, argmax decode,
//! confusion-matrix and span aggregation.

use anyhow::Result;
use candle_core::{D, Device, Tensor};
use tracing::info;

use quill_core::metrics::{ClassScores, ConfusionMatrix, SpanScorer};
use quill_core::tags::MentionTag;

use crate::batch::{Batch, Minibatcher};
use crate::model::{BiLstmTagger, VariationalTagger, masked_nll};

/// Full evaluation result for one dataset split.
#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Average masked loss over the split.
    pub avg_loss: f64,
    /// Per-class precision/recall/F1.
    pub per_class: Vec<ClassScores>,
    /// Unweighted mean F1 over tag classes.
    pub macro_f1: f64,
    /// Token accuracy (masked positions excluded).
    pub accuracy: f64,
    /// Span-level mention scores (exact-match spans).
    pub mention_precision: f64,
    pub mention_recall: f64,
    pub mention_f1: f64,
}

impl EvalReport {
    /// Log the full breakdown at info level.
    pub fn log(&self, split: &str) {
        info!(
            "{}: loss {:.4}, acc {:.4}, macro-F1 {:.4}, mention P/R/F1 {:.4}/{:.4}/{:.4}",
            split,
            self.avg_loss,
            self.accuracy,
            self.macro_f1,
            self.mention_precision,
            self.mention_recall,
            self.mention_f1
        );
        for class in &self.per_class {
            info!(
                "  {:<10} P {:.4} R {:.4} F1 {:.4} (n={})",
                class.label, class.precision, class.recall, class.f1, class.support
            );
        }
    }
}

/// Accumulates batch results into an [`EvalReport`].
struct Accumulator {
    confusion: ConfusionMatrix,
    spans: SpanScorer,
    loss_sum: f64,
    batches: usize,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            confusion: ConfusionMatrix::new(MentionTag::NUM_TAGS),
            spans: SpanScorer::new(),
            loss_sum: 0.0,
            batches: 0,
        }
    }

    fn add(&mut self, log_probs: &Tensor, batch: &Batch, loss: f64) -> Result<()> {
        self.loss_sum += loss;
        self.batches += 1;

        let preds: Vec<Vec<u32>> = log_probs.argmax(D::Minus1)?.to_vec2()?;
        for (row, pred_row) in preds.iter().enumerate() {
            let len = batch.lengths[row];
            let gold: Vec<usize> = batch.labels[row].iter().map(|&l| l as usize).collect();
            let pred: Vec<usize> = pred_row.iter().map(|&p| p as usize).collect();
            self.confusion.add_sequence(&gold, &pred, len);

            let gold_tags = to_tags(&gold[..len]);
            let pred_tags = to_tags(&pred[..len]);
            self.spans.add_sequence(&gold_tags, &pred_tags);
        }
        Ok(())
    }

    fn finish(self) -> EvalReport {
        EvalReport {
            avg_loss: if self.batches > 0 {
                self.loss_sum / self.batches as f64
            } else {
                0.0
            },
            per_class: self.confusion.class_scores(),
            macro_f1: self.confusion.macro_f1(),
            accuracy: self.confusion.accuracy(),
            mention_precision: self.spans.precision(),
            mention_recall: self.spans.recall(),
            mention_f1: self.spans.f1(),
        }
    }
}

fn to_tags(indices: &[usize]) -> Vec<MentionTag> {
    indices
        .iter()
        .map(|&i| MentionTag::from_index(i).unwrap_or(MentionTag::Outside))
        .collect()
}

/// Evaluate the plain tagger over a full split.
pub fn evaluate_tagger(
    model: &BiLstmTagger,
    batcher: &mut Minibatcher,
    device: &Device,
) -> Result<EvalReport> {
    let mut acc = Accumulator::new();
    batcher.reset();
    while let Some(batch) = batcher.next_batch() {
        let ids = batch.input_tensor(device)?;
        let labels = batch.label_tensor(device)?;
        let mask = batch.mask_tensor(device)?;

        let log_probs = model.forward(&ids, &batch.lengths, false)?;
        let loss = masked_nll(&log_probs, &labels, &mask)?.to_scalar::<f32>()? as f64;
        acc.add(&log_probs, &batch, loss)?;
    }
    Ok(acc.finish())
}

/// Evaluate the variational tagger over a full split, decoding from the
/// posterior mean.
pub fn evaluate_latent(
    model: &VariationalTagger,
    batcher: &mut Minibatcher,
    device: &Device,
) -> Result<EvalReport> {
    let mut acc = Accumulator::new();
    batcher.reset();
    while let Some(batch) = batcher.next_batch() {
        let ids = batch.input_tensor(device)?;
        let labels = batch.label_tensor(device)?;
        let mask = batch.mask_tensor(device)?;

        let output = model.forward(&ids, &mask, &batch.lengths, false)?;
        let loss = masked_nll(&output.log_probs, &labels, &mask)?.to_scalar::<f32>()? as f64;
        acc.add(&output.log_probs, &batch, loss)?;
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::{VarBuilder, VarMap};
    use quill_core::corpus::Example;
    use quill_core::vocab::Vocab;

    fn split() -> (Vec<Example>, Vocab) {
        let examples = vec![
            Example::new(
                0,
                vec!["the".into(), "ADNI".into(), "study".into()],
                vec![MentionTag::Outside, MentionTag::Begin, MentionTag::Outside],
            )
            .unwrap(),
            Example::new(
                1,
                vec!["plain".into(), "text".into()],
                vec![MentionTag::Outside, MentionTag::Outside],
            )
            .unwrap(),
        ];
        let vocab = Vocab::build(&examples);
        (examples, vocab)
    }

    #[test]
    fn test_evaluate_tagger_produces_finite_report() {
        let (examples, vocab) = split();
        let mut batcher = Minibatcher::new(&examples, &vocab, 2, 0);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let weights = Tensor::randn(0f32, 1f32, (vocab.len(), 4), &Device::Cpu).unwrap();
        let model = BiLstmTagger::new(weights, 3, 0.0, 0.0, vb).unwrap();

        let report = evaluate_tagger(&model, &mut batcher, &Device::Cpu).unwrap();
        assert!(report.avg_loss.is_finite());
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!((0.0..=1.0).contains(&report.macro_f1));
        assert_eq!(report.per_class.len(), MentionTag::NUM_TAGS);
    }

    #[test]
    fn test_evaluate_latent_produces_finite_report() {
        let (examples, vocab) = split();
        let mut batcher = Minibatcher::new(&examples, &vocab, 1, 0);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let weights = Tensor::randn(0f32, 1f32, (vocab.len(), 4), &Device::Cpu).unwrap();
        let model = VariationalTagger::new(weights, 3, 2, 0.0, 0.0, vb).unwrap();

        let report = evaluate_latent(&model, &mut batcher, &Device::Cpu).unwrap();
        assert!(report.avg_loss.is_finite());
        assert!((0.0..=1.0).contains(&report.mention_f1));
    }
}
