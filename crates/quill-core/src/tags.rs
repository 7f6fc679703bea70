//! # BIO Tags for Dataset-Mention Labeling
//!
//! Defines the tag set for sequence labeling of dataset citations inside
//! publication sentences. Uses the BIO (Begin-Inside-Outside) scheme.

use std::fmt;

use crate::error::{QuillError, Result};

/// BIO tags for labeling tokens in publication sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MentionTag {
    /// First token of a dataset mention.
    Begin,
    /// Continuation token of a dataset mention.
    Inside,
    /// Token outside any mention.
    Outside,
}

impl MentionTag {
    /// Total number of distinct tags.
    pub const NUM_TAGS: usize = 3;

    /// Get all possible tags in index order.
    pub fn all_tags() -> &'static [MentionTag] {
        &[MentionTag::Begin, MentionTag::Inside, MentionTag::Outside]
    }

    /// Get the tag index for tensor operations.
    pub fn index(&self) -> usize {
        match self {
            MentionTag::Begin => 0,
            MentionTag::Inside => 1,
            MentionTag::Outside => 2,
        }
    }

    /// Get tag from index.
    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(MentionTag::Begin),
            1 => Some(MentionTag::Inside),
            2 => Some(MentionTag::Outside),
            _ => None,
        }
    }

    /// Parse a label string as written in corpus files.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "B-DATASET" => Ok(MentionTag::Begin),
            "I-DATASET" => Ok(MentionTag::Inside),
            "O" => Ok(MentionTag::Outside),
            other => Err(QuillError::UnknownLabel(other.to_string())),
        }
    }

    /// Check if this tag is part of a mention.
    pub fn is_mention(&self) -> bool {
        !matches!(self, MentionTag::Outside)
    }
}

impl fmt::Display for MentionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MentionTag::Begin => write!(f, "B-DATASET"),
            MentionTag::Inside => write!(f, "I-DATASET"),
            MentionTag::Outside => write!(f, "O"),
        }
    }
}

/// Extract mention spans as `(start, end)` token ranges (end exclusive).
///
/// A span opens at a `Begin` tag and extends over following `Inside` tags.
/// An `Inside` without a preceding `Begin` opens a span of its own, so that
/// slightly malformed model output still yields usable spans.
pub fn mention_spans(tags: &[MentionTag]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut i = 0;

    while i < tags.len() {
        if tags[i].is_mention() {
            let start = i;
            i += 1;
            while i < tags.len() && tags[i] == MentionTag::Inside {
                i += 1;
            }
            spans.push((start, i));
        } else {
            i += 1;
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_index_roundtrip() {
        for tag in MentionTag::all_tags() {
            let idx = tag.index();
            let recovered = MentionTag::from_index(idx).unwrap();
            assert_eq!(*tag, recovered);
        }
        assert!(MentionTag::from_index(MentionTag::NUM_TAGS).is_none());
    }

    #[test]
    fn test_parse_roundtrip() {
        for tag in MentionTag::all_tags() {
            let s = tag.to_string();
            assert_eq!(MentionTag::parse(&s).unwrap(), *tag);
        }
    }

    #[test]
    fn test_parse_unknown() {
        assert!(MentionTag::parse("B-TITLE").is_err());
        assert!(MentionTag::parse("").is_err());
    }

    #[test]
    fn test_mention_spans_basic() {
        use MentionTag::*;
        let tags = [Outside, Begin, Inside, Inside, Outside, Begin, Outside];
        assert_eq!(mention_spans(&tags), vec![(1, 4), (5, 6)]);
    }

    #[test]
    fn test_mention_spans_dangling_inside() {
        use MentionTag::*;
        // An Inside with no Begin still opens a span.
        let tags = [Inside, Inside, Outside];
        assert_eq!(mention_spans(&tags), vec![(0, 2)]);
    }

    #[test]
    fn test_mention_spans_empty() {
        assert!(mention_spans(&[]).is_empty());
        assert!(mention_spans(&[MentionTag::Outside; 4]).is_empty());
    }
}
