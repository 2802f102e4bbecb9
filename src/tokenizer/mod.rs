pub mod hf;

pub use hf::HfTokenizer;

use crate::Result;

/// Fixed special-token identifiers of a tokenizer vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: u32,
    pub sep: u32,
    pub pad: u32,
    pub unk: u32,
    /// Surface form of the separator, used when datasets join text fields
    pub sep_token: String,
}

/// Subword tokenizer the aligner and builder call into
pub trait SubwordTokenizer {
    /// Subword ids for `text`, without special tokens
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Surface pieces for `ids`, continuation markers included
    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Result<Vec<String>>;

    fn special_tokens(&self) -> &SpecialTokens;

    /// Surface form a source word takes inside the pieces, used before alignment
    fn normalize_word(&self, word: &str) -> Result<String> {
        Ok(word.to_string())
    }
}
