use std::path::{Path, PathBuf};
use tokenizers::tokenizer::Tokenizer;
use tokenizers::{NormalizedString, Normalizer};

use super::{SpecialTokens, SubwordTokenizer};
use crate::config::Arch;
use crate::{RationalePrepError, Result};

/// HuggingFace tokenizer wrapper
#[derive(Clone)]
pub struct HfTokenizer {
    tokenizer: Tokenizer,
    special: SpecialTokens,
    vocab_size: usize,
    uncased: bool,
}

impl HfTokenizer {
    /// Load the tokenizer for `arch` from the HuggingFace hub
    pub fn from_pretrained(arch: Arch) -> Result<Self> {
        let tokenizer = match Tokenizer::from_pretrained(arch.hub_id(), None) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Could not download tokenizer for {}: {}", arch, e);
                // Try to load from local cache
                let tokenizer_path = Self::cache_path(arch)?;
                if tokenizer_path.exists() {
                    Tokenizer::from_file(&tokenizer_path).map_err(|e| {
                        RationalePrepError::Tokenizer(format!(
                            "Failed to load tokenizer from cache: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(RationalePrepError::Tokenizer(format!(
                        "Could not load the {} tokenizer. Please ensure you have internet connection \
                         for first-time download, or place the tokenizer file at: {}",
                        arch,
                        tokenizer_path.display()
                    )));
                }
            }
        };

        Self::with_arch(tokenizer, arch)
    }

    /// Load a `tokenizer.json` file for `arch`
    pub fn from_file<P: AsRef<Path>>(path: P, arch: Arch) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            RationalePrepError::Tokenizer(format!(
                "Failed to load tokenizer from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::with_arch(tokenizer, arch)
    }

    fn with_arch(tokenizer: Tokenizer, arch: Arch) -> Result<Self> {
        let (cls, sep, pad, unk) = match arch {
            Arch::BertBaseUncased => ("[CLS]", "[SEP]", "[PAD]", "[UNK]"),
            Arch::BigBirdRobertaBase => ("[CLS]", "[SEP]", "<pad>", "<unk>"),
        };
        let lookup = |token: &str| {
            tokenizer.token_to_id(token).ok_or_else(|| {
                RationalePrepError::Tokenizer(format!(
                    "Special token {} missing from the {} vocabulary",
                    token, arch
                ))
            })
        };

        let special = SpecialTokens {
            cls: lookup(cls)?,
            sep: lookup(sep)?,
            pad: lookup(pad)?,
            unk: lookup(unk)?,
            sep_token: sep.to_string(),
        };
        let vocab_size = tokenizer.get_vocab_size(true);
        log::debug!("Loaded {} tokenizer with {} entries", arch, vocab_size);

        Ok(Self {
            tokenizer,
            special,
            vocab_size,
            uncased: arch.is_uncased(),
        })
    }

    /// Cached tokenizer location used when the hub is unreachable
    pub fn cache_path(arch: Arch) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| {
            RationalePrepError::Tokenizer("Could not find cache directory".to_string())
        })?;
        let file_name = format!("{}.json", arch.hub_id().replace('/', "--"));
        Ok(cache_dir.join("huggingface").join("tokenizers").join(file_name))
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

impl SubwordTokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| RationalePrepError::Tokenizer(format!("Failed to encode text: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Result<Vec<String>> {
        ids.iter()
            .map(|&id| {
                self.tokenizer.id_to_token(id).ok_or_else(|| {
                    RationalePrepError::Tokenizer(format!("Token id {} is not in the vocabulary", id))
                })
            })
            .collect()
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    /// Uncased vocabularies run words through the tokenizer's own normalizer
    /// (lowercasing, accent stripping, control-character cleanup).
    fn normalize_word(&self, word: &str) -> Result<String> {
        if !self.uncased {
            return Ok(word.to_string());
        }
        let Some(normalizer) = self.tokenizer.get_normalizer() else {
            return Ok(word.to_lowercase());
        };

        let mut normalized = NormalizedString::from(word);
        normalizer.normalize(&mut normalized).map_err(|e| {
            RationalePrepError::Tokenizer(format!("Failed to normalize {:?}: {}", word, e))
        })?;
        // chinese-character handling pads with spaces that never reach a piece
        Ok(normalized.get().split_whitespace().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const WORD_LEVEL_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": {"type": "BertNormalizer", "clean_text": true, "handle_chinese_chars": true, "strip_accents": null, "lowercase": true},
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3, "a": 4, "cafe": 5, "film": 6},
            "unk_token": "[UNK]"
        }
    }"#;

    fn write_tokenizer(dir: &Path) -> PathBuf {
        let path = dir.join("tokenizer.json");
        fs::write(&path, WORD_LEVEL_JSON).unwrap();
        path
    }

    #[test]
    fn test_special_tokens_from_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = HfTokenizer::from_file(write_tokenizer(dir.path()), Arch::BertBaseUncased).unwrap();
        let special = tokenizer.special_tokens();
        assert_eq!((special.cls, special.sep, special.pad, special.unk), (2, 3, 0, 1));
        assert_eq!(tokenizer.vocab_size(), 7);
    }

    #[test]
    fn test_missing_special_token_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // no <pad>/<unk> entries
        assert!(HfTokenizer::from_file(write_tokenizer(dir.path()), Arch::BigBirdRobertaBase).is_err());
    }

    #[test]
    fn test_uncased_words_follow_the_normalizer() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = HfTokenizer::from_file(write_tokenizer(dir.path()), Arch::BertBaseUncased).unwrap();

        assert_eq!(tokenizer.normalize_word("Café").unwrap(), "cafe");
        let ids = tokenizer.tokenize("a Café FILM").unwrap();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(tokenizer.convert_ids_to_tokens(&ids).unwrap(), vec!["a", "cafe", "film"]);
    }
}
