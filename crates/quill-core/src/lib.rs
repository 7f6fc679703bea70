//! # Quill Core
//!
//! The data layer of the Quill mention-tagging system. Provides the corpus
//! model, BIO tag set, vocabulary, publication ingestion, and evaluation
//! metrics shared by the training crates.
//!
//! ## Quick Start
//!
//! ```rust
//! use quill_core::tags::{MentionTag, mention_spans};
//!
//! let labels = vec![
//!     MentionTag::Outside,
//!     MentionTag::Begin,
//!     MentionTag::Inside,
//!     MentionTag::Outside,
//! ];
//! assert_eq!(mention_spans(&labels), vec![(1, 3)]);
//! ```
pub mod corpus;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod tags;
pub mod text;
pub mod vocab;

// Re-export primary API
pub use corpus::{Example, load_corpus, save_corpus};
pub use error::{QuillError, Result};
pub use ingest::CorpusBuilder;
pub use metrics::{ClassScores, ConfusionMatrix, SpanScorer};
pub use tags::{MentionTag, mention_spans};
pub use text::{SentenceSplitter, WordTokenizer, normalize_string};
pub use vocab::{PAD_IDX, UNK_IDX, Vocab};
