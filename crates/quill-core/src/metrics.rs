//! Evaluation metrics: token-level confusion matrix and span-level
//! mention precision/recall/F1.

use crate::tags::{MentionTag, mention_spans};

/// Token-level confusion matrix over the tag set.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    // counts[gold][pred]
    counts: Vec<Vec<usize>>,
    num_classes: usize,
}

/// Precision/recall/F1 for one label class.
#[derive(Debug, Clone)]
pub struct ClassScores {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of gold tokens with this label.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Create an empty matrix over `num_classes` labels.
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; num_classes]; num_classes],
            num_classes,
        }
    }

    /// Record one (gold, predicted) pair. Out-of-range indices are ignored;
    /// callers are expected to have masked padding out already.
    pub fn add(&mut self, gold: usize, pred: usize) {
        if gold < self.num_classes && pred < self.num_classes {
            self.counts[gold][pred] += 1;
        }
    }

    /// Record aligned gold/predicted sequences, truncated to `len`.
    pub fn add_sequence(&mut self, gold: &[usize], pred: &[usize], len: usize) {
        let len = len.min(gold.len()).min(pred.len());
        for i in 0..len {
            self.add(gold[i], pred[i]);
        }
    }

    fn gold_total(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    fn pred_total(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Precision for one class; 0.0 when the class was never predicted.
    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.counts[class][class], self.pred_total(class))
    }

    /// Recall for one class; 0.0 when the class never occurs in gold.
    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.counts[class][class], self.gold_total(class))
    }

    /// F1 for one class.
    pub fn f1(&self, class: usize) -> f64 {
        f1(self.precision(class), self.recall(class))
    }

    /// Unweighted mean F1 over all classes.
    pub fn macro_f1(&self) -> f64 {
        if self.num_classes == 0 {
            return 0.0;
        }
        let sum: f64 = (0..self.num_classes).map(|c| self.f1(c)).sum();
        sum / self.num_classes as f64
    }

    /// Token accuracy over all recorded pairs.
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.num_classes).map(|c| self.counts[c][c]).sum();
        let total: usize = self.counts.iter().flatten().sum();
        ratio(correct, total)
    }

    /// Per-class score breakdown using the mention tag names.
    pub fn class_scores(&self) -> Vec<ClassScores> {
        (0..self.num_classes)
            .map(|c| ClassScores {
                label: MentionTag::from_index(c)
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| format!("class-{}", c)),
                precision: self.precision(c),
                recall: self.recall(c),
                f1: self.f1(c),
                support: self.gold_total(c),
            })
            .collect()
    }
}

/// Span-level mention scorer: exact-match (start, end) spans.
#[derive(Debug, Clone, Default)]
pub struct SpanScorer {
    matched: usize,
    predicted: usize,
    gold: usize,
}

impl SpanScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one sentence's gold and predicted tag sequences.
    pub fn add_sequence(&mut self, gold: &[MentionTag], pred: &[MentionTag]) {
        let gold_spans = mention_spans(gold);
        let pred_spans = mention_spans(pred);

        self.gold += gold_spans.len();
        self.predicted += pred_spans.len();
        self.matched += pred_spans
            .iter()
            .filter(|span| gold_spans.contains(span))
            .count();
    }

    pub fn precision(&self) -> f64 {
        ratio(self.matched, self.predicted)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.matched, self.gold)
    }

    pub fn f1(&self) -> f64 {
        f1(self.precision(), self.recall())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(p: f64, r: f64) -> f64 {
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MentionTag::*;

    #[test]
    fn test_confusion_perfect() {
        let mut cm = ConfusionMatrix::new(3);
        cm.add_sequence(&[0, 1, 2, 2], &[0, 1, 2, 2], 4);
        assert_eq!(cm.accuracy(), 1.0);
        assert_eq!(cm.macro_f1(), 1.0);
        for c in 0..3 {
            assert_eq!(cm.precision(c), 1.0);
            assert_eq!(cm.recall(c), 1.0);
        }
    }

    #[test]
    fn test_confusion_known_values() {
        let mut cm = ConfusionMatrix::new(2);
        // gold: 0 0 1 1, pred: 0 1 1 1
        cm.add_sequence(&[0, 0, 1, 1], &[0, 1, 1, 1], 4);
        assert_eq!(cm.precision(0), 1.0);
        assert_eq!(cm.recall(0), 0.5);
        assert_eq!(cm.precision(1), 2.0 / 3.0);
        assert_eq!(cm.recall(1), 1.0);
    }

    #[test]
    fn test_confusion_absent_class() {
        let mut cm = ConfusionMatrix::new(3);
        cm.add_sequence(&[2, 2], &[2, 2], 2);
        // Class 0 never occurs: scores degrade to zero, not NaN.
        assert_eq!(cm.precision(0), 0.0);
        assert_eq!(cm.recall(0), 0.0);
        assert_eq!(cm.f1(0), 0.0);
    }

    #[test]
    fn test_truncation_masks_padding() {
        let mut cm = ConfusionMatrix::new(3);
        // Positions past the true length must not be counted.
        cm.add_sequence(&[0, 1, 2, 2, 2], &[0, 1, 0, 0, 0], 2);
        assert_eq!(cm.accuracy(), 1.0);
    }

    #[test]
    fn test_span_scorer_exact_match() {
        let mut scorer = SpanScorer::new();
        scorer.add_sequence(
            &[Outside, Begin, Inside, Outside],
            &[Outside, Begin, Inside, Outside],
        );
        assert_eq!(scorer.precision(), 1.0);
        assert_eq!(scorer.recall(), 1.0);
        assert_eq!(scorer.f1(), 1.0);
    }

    #[test]
    fn test_span_scorer_boundary_miss() {
        let mut scorer = SpanScorer::new();
        // Predicted span is one token short: no exact match.
        scorer.add_sequence(
            &[Begin, Inside, Inside, Outside],
            &[Begin, Inside, Outside, Outside],
        );
        assert_eq!(scorer.precision(), 0.0);
        assert_eq!(scorer.recall(), 0.0);
    }

    #[test]
    fn test_span_scorer_partial() {
        let mut scorer = SpanScorer::new();
        scorer.add_sequence(
            &[Begin, Outside, Begin, Inside],
            &[Begin, Outside, Outside, Outside],
        );
        assert_eq!(scorer.precision(), 1.0);
        assert_eq!(scorer.recall(), 0.5);
    }
}
