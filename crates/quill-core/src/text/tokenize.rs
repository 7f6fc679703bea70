//! Word tokenizer for publication sentences.
//!
//! Splits on whitespace and emits punctuation as standalone tokens, keeping
//! hyphens and apostrophes inside words (dataset names like "Add Health" or
//! "NLSY-79" survive as intended).

/// A token extracted from a sentence with positional information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text content
    pub text: String,
    /// Start position in the original string
    pub start: usize,
    /// End position in the original string
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

/// Characters kept inside a word token.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '\''
}

/// Word-level tokenizer.
#[derive(Debug, Clone, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize a sentence into a sequence of tokens.
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current_start: Option<usize> = None;

        fn push(tokens: &mut Vec<Token>, start: usize, end: usize, input: &str) {
            let text = &input[start..end];
            if !text.is_empty() {
                tokens.push(Token {
                    text: text.to_string(),
                    start,
                    end,
                    index: tokens.len(),
                });
            }
        }

        for (idx, c) in input.char_indices() {
            if is_word_char(c) {
                if current_start.is_none() {
                    current_start = Some(idx);
                }
            } else {
                if let Some(start) = current_start.take() {
                    push(&mut tokens, start, idx, input);
                }
                if !c.is_whitespace() {
                    // Punctuation becomes its own token.
                    push(&mut tokens, idx, idx + c.len_utf8(), input);
                }
            }
        }
        if let Some(start) = current_start {
            push(&mut tokens, start, input.len(), input);
        }

        tokens
    }

    /// Tokenize and return only the token strings.
    pub fn words(&self, input: &str) -> Vec<String> {
        self.tokenize(input).into_iter().map(|t| t.text).collect()
    }
}
