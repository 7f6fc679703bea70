//! Corpus construction from raw publication dumps.
//!
//! Consumes the competition-style JSON metadata (`publications.json`,
//! `data_set_citations.json`, `data_sets.json`) together with the extracted
//! plain-text files, and produces labeled sentence corpora:
//!
//! - training corpus: known citation mentions matched as token subsequences
//!   inside each publication's sentences and tagged B/I, everything else O;
//! - inference corpus: candidate mentions from the dataset catalog, ranked
//!   newest-first by release date and restricted to datasets that existed
//!   when the publication appeared.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::corpus::Example;
use crate::error::{QuillError, Result};
use crate::tags::MentionTag;
use crate::text::{SentenceSplitter, STOP_MARKER, WordTokenizer, normalize_string};

/// Tokens at or above this length are discarded (PDF extraction garbage).
const MAX_TOKEN_LEN: usize = 20;
/// Sentences outside this token-count range are discarded.
const MIN_SENTENCE_TOKENS: usize = 10;
const MAX_SENTENCE_TOKENS: usize = 50;
/// Lines of at most this many words force a sentence boundary.
const SHORT_LINE_WORDS: usize = 5;

/// Day-resolution key for a missing or unparseable date.
const EPOCH_FALLBACK: i64 = date_key_parts(1800, 1, 1);
/// Publications without a recorded date sort as far future.
const FUTURE_FALLBACK: i64 = date_key_parts(2200, 1, 1);

#[derive(Debug, Deserialize)]
struct PublicationRecord {
    publication_id: i64,
    text_file_name: String,
    #[serde(default)]
    unique_identifier: Option<String>,
    #[serde(default)]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CitationRecord {
    publication_id: i64,
    #[allow(dead_code)]
    data_set_id: i64,
    mention_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetRecord {
    #[allow(dead_code)]
    data_set_id: i64,
    name: String,
    #[serde(default)]
    date: Option<String>,
    mention_list: Vec<String>,
}

/// Builds labeled sentence corpora from raw publication dumps.
pub struct CorpusBuilder {
    splitter: SentenceSplitter,
    tokenizer: WordTokenizer,
}

impl CorpusBuilder {
    /// Constructs a builder with pre-compiled text machinery.
    pub fn new() -> Result<Self> {
        Ok(Self {
            splitter: SentenceSplitter::new()?,
            tokenizer: WordTokenizer::new(),
        })
    }

    /// Build the training corpus: every kept sentence of every publication,
    /// with known citation mentions tagged.
    pub fn build_training_corpus(
        &self,
        text_dir: &Path,
        publications_json: &Path,
        citations_json: &Path,
    ) -> Result<Vec<Example>> {
        info!("loading {}", citations_json.display());
        let citations: Vec<CitationRecord> = read_json(citations_json)?;

        // publication id -> normalized mention token sequences, longest first
        let mut mention_map: HashMap<i64, Vec<Vec<String>>> = HashMap::new();
        for citation in citations {
            let entry = mention_map.entry(citation.publication_id).or_default();
            for mention in &citation.mention_list {
                let words = self.mention_tokens(mention);
                if !words.is_empty() {
                    entry.push(words);
                }
            }
        }
        for mentions in mention_map.values_mut() {
            sort_mentions(mentions);
        }

        info!("loading {}", publications_json.display());
        let publications: Vec<PublicationRecord> = read_json(publications_json)?;
        info!("tokenizing {} publications", publications.len());

        let empty = Vec::new();
        let mut examples = Vec::new();
        for publication in &publications {
            let raw = read_publication_text(&text_dir.join(&publication.text_file_name))?;
            let mentions = mention_map
                .get(&publication.publication_id)
                .unwrap_or(&empty);

            for tokens in self.sentences(&raw) {
                let (labels, _) = label_tokens(&tokens, mentions);
                examples.push(Example::new(publication.publication_id, tokens, labels)?);
            }
        }

        info!("training corpus: {} sentences", examples.len());
        Ok(examples)
    }

    /// Build the inference corpus: sentences with silver labels from the
    /// dataset catalog, newest datasets preferred, datasets released after
    /// the publication excluded.
    pub fn build_inference_corpus(
        &self,
        text_dir: &Path,
        publications_json: &Path,
        datasets_json: &Path,
    ) -> Result<Vec<Example>> {
        info!("loading {}", datasets_json.display());
        let datasets: Vec<DatasetRecord> = read_json(datasets_json)?;

        // (date key, mention token sequences), newest first
        let mut catalog: Vec<(i64, Vec<Vec<String>>)> = Vec::new();
        for dataset in &datasets {
            let mut mentions = Vec::new();
            let name_words = self.mention_tokens(&dataset.name);
            if !name_words.is_empty() {
                mentions.push(name_words);
            }
            for mention in &dataset.mention_list {
                // Pronoun-like mentions ("data", "this survey") produce
                // floods of false positives.
                if mention.split_whitespace().count() <= 2
                    && mention.chars().all(|c| !c.is_uppercase())
                {
                    continue;
                }
                let words = self.mention_tokens(mention);
                if !words.is_empty() {
                    mentions.push(words);
                }
            }
            if !mentions.is_empty() {
                catalog.push((date_key(dataset.date.as_deref()), mentions));
            }
        }
        catalog.sort_by_key(|(date, _)| std::cmp::Reverse(*date));

        info!("loading {}", publications_json.display());
        let publications: Vec<PublicationRecord> = read_json(publications_json)?;

        let mut examples = Vec::new();
        let mut labeled_count = 0usize;
        for publication in &publications {
            let raw = read_publication_text(&text_dir.join(&publication.text_file_name))?;
            let pub_date = publication_date(publication);

            // Newest-first candidates that existed when this was published,
            // longest mention preferred within a dataset.
            let mut candidates: Vec<Vec<String>> = catalog
                .iter()
                .filter(|(date, _)| *date <= pub_date)
                .flat_map(|(_, mentions)| mentions.iter().cloned())
                .collect();
            sort_mentions(&mut candidates);

            for tokens in self.sentences(&raw) {
                let (labels, found) = label_tokens(&tokens, &candidates);
                let mut example = Example::new(publication.publication_id, tokens, labels)?;
                example.labeled = found;
                if found {
                    labeled_count += 1;
                }
                examples.push(example);
            }
        }

        info!(
            "inference corpus: {} sentences, {} with silver labels",
            examples.len(),
            labeled_count
        );
        Ok(examples)
    }

    /// Normalize, split, and tokenize raw publication text into kept
    /// sentences (token-length and sentence-length filters applied).
    pub fn sentences(&self, raw_text: &str) -> Vec<Vec<String>> {
        let normalized = normalize_string(raw_text);
        self.splitter
            .split(&normalized)
            .iter()
            .filter_map(|sentence| {
                let tokens: Vec<String> = self
                    .tokenizer
                    .words(sentence)
                    .into_iter()
                    .filter(|w| w.len() < MAX_TOKEN_LEN)
                    .collect();
                if (MIN_SENTENCE_TOKENS..=MAX_SENTENCE_TOKENS).contains(&tokens.len()) {
                    Some(tokens)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Normalize and tokenize a mention string.
    fn mention_tokens(&self, mention: &str) -> Vec<String> {
        let normalized = normalize_string(mention);
        self.tokenizer
            .words(&normalized)
            .into_iter()
            .filter(|w| w.len() < MAX_TOKEN_LEN)
            .collect()
    }
}

/// Sort mention token sequences longest first and drop duplicates. The
/// length tie-break makes equal sequences adjacent so `dedup` catches them
/// all.
fn sort_mentions(mentions: &mut Vec<Vec<String>>) {
    mentions.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    mentions.dedup();
}

/// Tag mention token subsequences inside a sentence.
///
/// Mentions are tried in the order given (callers pass longest-first), each
/// match claims its tokens, matches never overlap. Returns the label
/// sequence and whether anything matched.
pub fn label_tokens(tokens: &[String], mentions: &[Vec<String>]) -> (Vec<MentionTag>, bool) {
    let mut labels = vec![MentionTag::Outside; tokens.len()];
    let mut found = false;
    let mut i = 0;

    'outer: while i < tokens.len() {
        for mention in mentions {
            let n = mention.len();
            if n == 0 || i + n > tokens.len() {
                continue;
            }
            if tokens[i..i + n] == mention[..] {
                labels[i] = MentionTag::Begin;
                for label in labels.iter_mut().take(i + n).skip(i + 1) {
                    *label = MentionTag::Inside;
                }
                i += n;
                found = true;
                continue 'outer;
            }
        }
        i += 1;
    }

    (labels, found)
}

/// Read a publication's extracted text, forcing sentence boundaries after
/// short lines (headers, captions, references).
fn read_publication_text(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| QuillError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut raw = String::new();
    for line in reader.lines() {
        let line = line?;
        let stripped = line.trim();
        raw.push(' ');
        raw.push_str(stripped);
        if stripped.split_whitespace().count() <= SHORT_LINE_WORDS {
            raw.push_str(STOP_MARKER);
        }
    }
    Ok(raw)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| QuillError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Day-resolution ordering key for a `YYYY-MM-DD...` date string.
fn date_key(date: Option<&str>) -> i64 {
    let Some(date) = date else {
        return EPOCH_FALLBACK;
    };
    if date.len() < 10 || date.contains("None") {
        return EPOCH_FALLBACK;
    }
    let (y, m, d) = (
        date[0..4].parse::<i64>(),
        date[5..7].parse::<i64>(),
        date[8..10].parse::<i64>(),
    );
    match (y, m, d) {
        (Ok(y), Ok(m), Ok(d)) => date_key_parts(y, m, d),
        _ => {
            debug!("unparseable date {:?}, using fallback", date);
            EPOCH_FALLBACK
        }
    }
}

const fn date_key_parts(y: i64, m: i64, d: i64) -> i64 {
    y * 12 * 31 + m * 31 + d
}

fn publication_date(publication: &PublicationRecord) -> i64 {
    // Book-chapter records carry no publication date.
    if publication
        .unique_identifier
        .as_deref()
        .is_some_and(|id| id.contains("bbk"))
    {
        return FUTURE_FALLBACK;
    }
    match publication.pub_date.as_deref() {
        Some(date) => date_key(Some(date)),
        None => {
            warn!(
                "publication {} has no pub_date, treating as future",
                publication.publication_id
            );
            FUTURE_FALLBACK
        }
    }
}
