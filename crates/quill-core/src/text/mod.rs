pub mod normalize;
pub mod tokenize;

pub use normalize::{SentenceSplitter, normalize_string, STOP_MARKER};
pub use tokenize::{Token, WordTokenizer};
