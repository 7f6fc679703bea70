//! Corpus records and JSONL loading for labeled sentences.
//!
//! Corpus files hold one JSON record per line: the publication identifier,
//! the token sequence, and the aligned label sequence. The length invariant
//! (one label per token) is checked on load and save; a violation is fatal.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuillError, Result};
use crate::tags::MentionTag;

/// A single labeled sentence from a publication.
#[derive(Debug, Clone)]
pub struct Example {
    /// Publication identifier this sentence came from.
    pub id: i64,
    /// Token sequence.
    pub tokens: Vec<String>,
    /// Label sequence, same length as `tokens`.
    pub labels: Vec<MentionTag>,
    /// Whether the labels are trusted annotations. Sentences from the
    /// inference corpus that received no silver labels carry `false`.
    pub labeled: bool,
}

/// On-disk representation of an [`Example`].
#[derive(Debug, Serialize, Deserialize)]
struct CorpusRecord {
    id: i64,
    tokens: Vec<String>,
    labels: Vec<String>,
    #[serde(default = "default_labeled", skip_serializing_if = "is_true")]
    labeled: bool,
}

fn default_labeled() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_true(v: &bool) -> bool {
    *v
}

impl Example {
    /// Create an example, enforcing the length invariant.
    pub fn new(id: i64, tokens: Vec<String>, labels: Vec<MentionTag>) -> Result<Self> {
        if tokens.len() != labels.len() {
            return Err(QuillError::LengthMismatch {
                id,
                tokens: tokens.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            id,
            tokens,
            labels,
            labeled: true,
        })
    }

    /// Sequence length in tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TryFrom<CorpusRecord> for Example {
    type Error = QuillError;

    fn try_from(record: CorpusRecord) -> Result<Self> {
        if record.tokens.len() != record.labels.len() {
            return Err(QuillError::LengthMismatch {
                id: record.id,
                tokens: record.tokens.len(),
                labels: record.labels.len(),
            });
        }
        let labels = record
            .labels
            .iter()
            .map(|s| MentionTag::parse(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: record.id,
            tokens: record.tokens,
            labels,
            labeled: record.labeled,
        })
    }
}

/// Load a JSONL corpus file.
///
/// Empty lines and `#` comment lines are skipped. Any malformed record is a
/// fatal error: a corpus with silently dropped rows would skew training.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Example>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| QuillError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut examples = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record: CorpusRecord = serde_json::from_str(line)?;
        examples.push(Example::try_from(record)?);
    }

    Ok(examples)
}

/// Write a corpus as JSONL, one record per line.
pub fn save_corpus<P: AsRef<Path>>(path: P, examples: &[Example]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    for example in examples {
        let record = CorpusRecord {
            id: example.id,
            tokens: example.tokens.clone(),
            labels: example.labels.iter().map(|t| t.to_string()).collect(),
            labeled: example.labeled,
        };
        let json = serde_json::to_string(&record)?;
        writeln!(writer, "{}", json)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Example {
        Example::new(
            7,
            vec!["the".into(), "ADNI".into(), "cohort".into()],
            vec![MentionTag::Outside, MentionTag::Begin, MentionTag::Outside],
        )
        .unwrap()
    }

    #[test]
    fn test_length_invariant() {
        let err = Example::new(
            1,
            vec!["a".into(), "b".into()],
            vec![MentionTag::Outside],
        );
        assert!(matches!(
            err,
            Err(QuillError::LengthMismatch {
                id: 1,
                tokens: 2,
                labels: 1
            })
        ));
    }

    #[test]
    fn test_corpus_roundtrip() {
        let path = std::env::temp_dir().join("quill_corpus_roundtrip.jsonl");
        let examples = vec![sample(), sample()];
        save_corpus(&path, &examples).unwrap();

        let loaded = load_corpus(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 7);
        assert_eq!(loaded[0].tokens, examples[0].tokens);
        assert_eq!(loaded[0].labels, examples[0].labels);
        assert!(loaded[0].labeled);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_mismatched_row() {
        let path = std::env::temp_dir().join("quill_corpus_bad.jsonl");
        std::fs::write(
            &path,
            r#"{"id":1,"tokens":["a","b"],"labels":["O"]}"#,
        )
        .unwrap();

        let result = load_corpus(&path);
        assert!(matches!(
            result,
            Err(QuillError::LengthMismatch { id: 1, .. })
        ));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_skips_comments_and_blanks() {
        let path = std::env::temp_dir().join("quill_corpus_comments.jsonl");
        std::fs::write(
            &path,
            "# header\n\n{\"id\":3,\"tokens\":[\"x\"],\"labels\":[\"O\"]}\n",
        )
        .unwrap();

        let loaded = load_corpus(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_corpus("/nonexistent/quill/corpus.jsonl");
        assert!(matches!(result, Err(QuillError::FileRead { .. })));
    }
}
