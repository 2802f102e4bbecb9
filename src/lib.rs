pub mod config;
pub mod data;
pub mod io;
pub mod tokenizer;
pub mod utils;

pub use config::{AnnoMethod, Arch, BuildConfig, Dataset, DatasetInfo, Split};
pub use data::{AlignedExample, DatasetDict, ExampleBuilder, RawExample, Record, SplitBuilder};
pub use tokenizer::{HfTokenizer, SpecialTokens, SubwordTokenizer};

/// Custom error type for rationale-prep
#[derive(thiserror::Error, Debug)]
pub enum RationalePrepError {
    #[error("Alignment mismatch at word {word_index}: expected {expected:?}, reconstructed {reconstructed:?}")]
    AlignmentMismatch {
        word_index: usize,
        expected: String,
        reconstructed: String,
    },

    #[error("Empty rationale for a dataset that requires gold rationales")]
    EmptyRationale,

    #[error("Sequence of {length} tokens exceeds the length budget of {max_length}")]
    LengthBudgetExceeded { length: usize, max_length: usize },

    #[error("Length mismatch: {left} tokens vs {right} rationale entries")]
    LengthMismatch { left: usize, right: usize },

    #[error("Rationale has {rationale} entries but the text only has {words} words")]
    RationaleTooLong { words: usize, rationale: usize },

    #[error("Unknown token id {0} found in sequence")]
    UnknownToken(u32),

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, RationalePrepError>;
