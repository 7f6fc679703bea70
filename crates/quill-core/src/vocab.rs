//! Word vocabulary with reserved padding and unknown indices.

use std::collections::HashMap;

use crate::corpus::Example;

/// Reserved index for the padding token.
pub const PAD_IDX: u32 = 0;
/// Reserved index for out-of-vocabulary tokens.
pub const UNK_IDX: u32 = 1;

/// Padding token string.
pub const PAD_TOKEN: &str = "<pad>";
/// Unknown token string.
pub const UNK_TOKEN: &str = "<unk>";

/// Bidirectional word <-> index mapping built from the training corpus.
///
/// Immutable once built: development and test tokens never extend it, they
/// map to [`UNK_IDX`].
#[derive(Debug, Clone)]
pub struct Vocab {
    word_to_idx: HashMap<String, u32>,
    idx_to_word: Vec<String>,
}

impl Vocab {
    /// Build a vocabulary from training examples.
    ///
    /// Words are indexed in first-occurrence order, after the reserved
    /// entries, so repeated builds over the same corpus are identical.
    pub fn build(examples: &[Example]) -> Self {
        let mut word_to_idx = HashMap::new();
        let mut idx_to_word = vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string()];
        word_to_idx.insert(PAD_TOKEN.to_string(), PAD_IDX);
        word_to_idx.insert(UNK_TOKEN.to_string(), UNK_IDX);

        for example in examples {
            for token in &example.tokens {
                if !word_to_idx.contains_key(token) {
                    word_to_idx.insert(token.clone(), idx_to_word.len() as u32);
                    idx_to_word.push(token.clone());
                }
            }
        }

        Self {
            word_to_idx,
            idx_to_word,
        }
    }

    /// Index of a word, falling back to [`UNK_IDX`].
    pub fn index(&self, word: &str) -> u32 {
        self.word_to_idx.get(word).copied().unwrap_or(UNK_IDX)
    }

    /// Word at an index, if any.
    pub fn word(&self, idx: u32) -> Option<&str> {
        self.idx_to_word.get(idx as usize).map(String::as_str)
    }

    /// Encode a token sequence to indices.
    pub fn encode(&self, tokens: &[String]) -> Vec<u32> {
        tokens.iter().map(|t| self.index(t)).collect()
    }

    /// Number of entries, reserved tokens included.
    pub fn len(&self) -> usize {
        self.idx_to_word.len()
    }

    /// Whether only the reserved entries exist.
    pub fn is_empty(&self) -> bool {
        self.idx_to_word.len() <= 2
    }

    /// Iterate over `(word, index)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.idx_to_word
            .iter()
            .enumerate()
            .map(|(i, w)| (w.as_str(), i as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::MentionTag;

    fn example(tokens: &[&str]) -> Example {
        Example::new(
            0,
            tokens.iter().map(|s| s.to_string()).collect(),
            vec![MentionTag::Outside; tokens.len()],
        )
        .unwrap()
    }

    #[test]
    fn test_reserved_indices() {
        let vocab = Vocab::build(&[]);
        assert_eq!(vocab.index(PAD_TOKEN), PAD_IDX);
        assert_eq!(vocab.index(UNK_TOKEN), UNK_IDX);
        assert_eq!(vocab.len(), 2);
        assert!(vocab.is_empty());
    }

    #[test]
    fn test_build_and_lookup() {
        let examples = vec![example(&["data", "from", "the"]), example(&["the", "survey"])];
        let vocab = Vocab::build(&examples);

        assert_eq!(vocab.len(), 6); // 2 reserved + 4 distinct
        assert_eq!(vocab.index("data"), 2);
        assert_eq!(vocab.index("survey"), 5);
        assert_eq!(vocab.word(2), Some("data"));
        // OOV falls back to UNK
        assert_eq!(vocab.index("unseen"), UNK_IDX);
    }

    #[test]
    fn test_build_is_deterministic() {
        let examples = vec![example(&["b", "a", "c"]), example(&["a", "d"])];
        let v1 = Vocab::build(&examples);
        let v2 = Vocab::build(&examples);
        for (w, i) in v1.iter() {
            assert_eq!(v2.index(w), i);
        }
    }

    #[test]
    fn test_encode() {
        let examples = vec![example(&["alpha", "beta"])];
        let vocab = Vocab::build(&examples);
        let encoded = vocab.encode(&["alpha".into(), "gamma".into(), "beta".into()]);
        assert_eq!(encoded, vec![2, UNK_IDX, 3]);
    }
}
