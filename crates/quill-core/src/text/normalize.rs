//! Text normalization and regex-based sentence splitting.
//!
//! Publication text arrives as extracted PDF text with broken lines and
//! non-ASCII noise. Normalization strips the noise; the splitter cuts the
//! normalized stream into sentences, honoring the explicit boundary marker
//! that ingestion inserts after short lines (section headers, captions).

use regex::Regex;

use crate::error::Result;

/// Explicit sentence-boundary marker inserted during ingestion.
pub const STOP_MARKER: &str = "<stop>";

/// Internal placeholder protecting periods that do not end a sentence.
const PRD: &str = "<prd>";

/// Normalize a raw text fragment: keep printable ASCII, collapse runs of
/// whitespace to single spaces, trim.
pub fn normalize_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;

    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else if c.is_ascii() && !c.is_control() {
            out.push(c);
            last_space = false;
        }
        // non-ASCII dropped
    }

    out.trim_end().to_string()
}

/// Sentence splitter with pre-compiled regex patterns.
pub struct SentenceSplitter {
    re_abbrev: Regex,
    re_initial: Regex,
    re_decimal: Regex,
    re_terminal: Regex,
}

impl SentenceSplitter {
    /// Constructs a new `SentenceSplitter` with pre-compiled patterns.
    ///
    /// # Errors
    ///
    /// Returns `QuillError::RegexError` if any pattern fails to compile
    /// (should never happen with the static patterns defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_abbrev: Regex::new(
                r"(?i)\b(mr|mrs|ms|dr|prof|fig|figs|eq|eqs|no|vol|sec|cf|vs|etc|et al|e\.g|i\.e|approx)\.",
            )?,
            re_initial: Regex::new(r"\b([A-Z])\.")?,
            re_decimal: Regex::new(r"(\d)\.(\d)")?,
            re_terminal: Regex::new(r"([.!?])\s")?,
        })
    }

    /// Split normalized text into sentences.
    ///
    /// `<stop>` markers force a boundary; periods inside abbreviations,
    /// initials, and decimals are protected before terminal punctuation is
    /// turned into boundaries.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut work = text.to_string();

        work = self
            .re_abbrev
            .replace_all(&work, |caps: &regex::Captures| {
                format!("{}{}", &caps[1], PRD)
            })
            .into_owned();
        work = self
            .re_decimal
            .replace_all(&work, format!("${{1}}{}${{2}}", PRD).as_str())
            .into_owned();
        work = self
            .re_initial
            .replace_all(&work, format!("${{1}}{}", PRD).as_str())
            .into_owned();

        work = self
            .re_terminal
            .replace_all(&work, format!("${{1}}{} ", STOP_MARKER).as_str())
            .into_owned();

        work = work.replace(PRD, ".");

        work.split(STOP_MARKER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_non_ascii() {
        assert_eq!(normalize_string("caf\u{e9}  data\tset"), "caf data set");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_string("  a \n\n b  "), "a b");
    }

    #[test]
    fn test_split_basic() {
        let splitter = SentenceSplitter::new().unwrap();
        let sentences = splitter.split("First sentence. Second sentence. ");
        assert_eq!(sentences, vec!["First sentence.", "Second sentence."]);
    }

    #[test]
    fn test_split_protects_abbreviations() {
        let splitter = SentenceSplitter::new().unwrap();
        let sentences =
            splitter.split("See Fig. 3 for details, e.g. the panel data. Next sentence here. ");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("Fig. 3"));
        assert!(sentences[0].contains("e.g."));
    }

    #[test]
    fn test_split_protects_decimals() {
        let splitter = SentenceSplitter::new().unwrap();
        let sentences = splitter.split("The rate was 3.5 percent overall. It rose later. ");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("3.5"));
    }

    #[test]
    fn test_split_honors_stop_marker() {
        let splitter = SentenceSplitter::new().unwrap();
        let sentences = splitter.split("Table of contents<stop>Chapter one begins here");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "Table of contents");
    }

    #[test]
    fn test_split_empty() {
        let splitter = SentenceSplitter::new().unwrap();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   ").is_empty());
    }
}
