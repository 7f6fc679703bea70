use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during Quill core operations.
#[derive(Debug, Error)]
pub enum QuillError {
    /// A corpus row where the token and label sequences disagree in length.
    /// This is always fatal: the row cannot be repaired.
    #[error("example {id}: {tokens} tokens but {labels} labels")]
    LengthMismatch {
        /// Identifier of the offending example.
        id: i64,
        /// Number of tokens in the row.
        tokens: usize,
        /// Number of labels in the row.
        labels: usize,
    },

    /// A label string that is not part of the tag set.
    #[error("unknown label: {0:?}")]
    UnknownLabel(String),

    /// A referenced corpus or publication file could not be read.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O failure without a more specific path context.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a corpus or metadata file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    RegexError(#[from] regex::Error),
}

/// Result type alias for Quill operations.
pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = QuillError::LengthMismatch {
            id: 42,
            tokens: 10,
            labels: 9,
        };
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("10 tokens"));

        let err = QuillError::UnknownLabel("B-NOPE".into());
        assert!(err.to_string().contains("B-NOPE"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuillError>();
    }
}
