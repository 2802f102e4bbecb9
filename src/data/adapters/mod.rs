pub mod eraser;
pub mod hatexplain;
pub mod plain;
pub mod sst;

pub use eraser::EraserAdapter;
pub use hatexplain::HateXplainAdapter;
pub use plain::{LinesAdapter, TsvAdapter};
pub use sst::SstAdapter;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::RationalePrepError;
use crate::config::{BuildConfig, Dataset};
use crate::data::align::pad_word_rationale;
use crate::data::builder::TruncationPolicy;

/// Text with one rationale value per whitespace-separated word.
///
/// Annotated examples are always aligned against their subword pieces, even
/// when every value is zero. Free text (queries, answer candidates, unlabelled
/// lines) carries no word annotation and is never aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExample {
    pub text: String,
    pub word_tokens: Vec<String>,
    pub word_rationale: Vec<f32>,
    pub annotated: bool,
}

impl RawExample {
    /// Split `text` on whitespace and zero-pad a short rationale
    pub fn new(text: &str, word_rationale: &[f32]) -> crate::Result<Self> {
        let word_tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let word_rationale = pad_word_rationale(word_tokens.len(), word_rationale)?;
        Ok(Self {
            text: text.to_string(),
            word_tokens,
            word_rationale,
            annotated: true,
        })
    }

    /// Build from pre-tokenised words
    pub fn from_words(word_tokens: Vec<String>, word_rationale: &[f32]) -> crate::Result<Self> {
        let word_rationale = pad_word_rationale(word_tokens.len(), word_rationale)?;
        Ok(Self {
            text: word_tokens.join(" "),
            word_tokens,
            word_rationale,
            annotated: true,
        })
    }

    /// Free text without word annotation
    pub fn without_rationale(text: &str) -> Self {
        let word_tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let word_rationale = vec![0.0; word_tokens.len()];
        Self {
            text: text.to_string(),
            word_tokens,
            word_rationale,
            annotated: false,
        }
    }

    pub fn has_rationale(&self) -> bool {
        self.word_rationale.iter().any(|&r| r > 0.0)
    }
}

/// One labelled instance as extracted from the raw files.
///
/// `segments` are joined with the separator marker. When `choices` is not
/// empty, one example is built per choice with the choice appended as the
/// final segment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstance {
    pub label: usize,
    pub segments: Vec<RawExample>,
    pub choices: Vec<RawExample>,
}

impl RawInstance {
    pub fn single(label: usize, example: RawExample) -> Self {
        Self {
            label,
            segments: vec![example],
            choices: Vec::new(),
        }
    }
}

/// Label as stored in the raw files, either a class index or a class name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLabel {
    Index(usize),
    Name(String),
}

impl RawLabel {
    pub fn resolve(&self, classes: &[String]) -> crate::Result<usize> {
        match self {
            RawLabel::Index(i) if *i < classes.len() => Ok(*i),
            RawLabel::Index(i) => Err(RationalePrepError::UnknownLabel(i.to_string())),
            RawLabel::Name(name) => classes
                .iter()
                .position(|c| c == name)
                .or_else(|| name.parse::<usize>().ok().filter(|&i| i < classes.len()))
                .ok_or_else(|| RationalePrepError::UnknownLabel(name.clone())),
        }
    }
}

/// Dataset-specific extraction of raw instances
pub trait DatasetAdapter {
    fn dataset(&self) -> Dataset;

    /// Read the raw files of the split
    fn extract_raw_examples(&self) -> Result<Vec<RawInstance>>;

    fn truncation(&self) -> TruncationPolicy {
        TruncationPolicy::None
    }

    /// Whether every example must carry a non-empty gold rationale
    fn requires_rationale(&self) -> bool {
        false
    }

    /// Whether an unknown-token id in a sequence is an error
    fn forbid_unknown(&self) -> bool {
        false
    }
}

/// Pick the adapter for the configured dataset
pub fn adapter_for(config: &BuildConfig) -> Box<dyn DatasetAdapter> {
    let data_dir = &config.data_dir;
    let classes = config.classes.clone();
    match config.dataset {
        Dataset::Sst => Box::new(SstAdapter::new(data_dir, config.split, config.anno_method, classes)),
        Dataset::HateXplain => Box::new(HateXplainAdapter::new(data_dir, config.split, classes)),
        Dataset::Esnli
        | Dataset::Fever
        | Dataset::Movies
        | Dataset::MultiRc
        | Dataset::Cose => Box::new(EraserAdapter::new(data_dir, config.dataset, config.split, classes)),
        Dataset::Stf => Box::new(TsvAdapter::new(
            Dataset::Stf,
            data_dir
                .join("stf")
                .join("stf_raw")
                .join(format!("{}.tsv", config.split)),
            classes,
        )),
        Dataset::ChecklistFlight => Box::new(LinesAdapter::new(
            Dataset::ChecklistFlight,
            data_dir.join("release_data").join("sentiment").join("tests_n500"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> Vec<String> {
        vec!["negative".to_string(), "positive".to_string()]
    }

    #[test]
    fn test_raw_example_pads_missing_last_word() {
        let raw = RawExample::new("a  fine\tfilm", &[0.0, 1.0]).unwrap();
        assert_eq!(raw.word_tokens, vec!["a", "fine", "film"]);
        assert_eq!(raw.word_rationale, vec![0.0, 1.0, 0.0]);
        assert!(raw.has_rationale());
    }

    #[test]
    fn test_only_free_text_is_unannotated() {
        assert!(RawExample::new("a film", &[]).unwrap().annotated);
        assert!(RawExample::from_words(vec!["a".into()], &[0.0]).unwrap().annotated);
        assert!(!RawExample::without_rationale("a film").annotated);
    }

    #[test]
    fn test_raw_example_rejects_long_rationale() {
        assert!(RawExample::new("one", &[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_raw_label_resolution() {
        assert_eq!(RawLabel::Name("positive".into()).resolve(&classes()).unwrap(), 1);
        assert_eq!(RawLabel::Name("0".into()).resolve(&classes()).unwrap(), 0);
        assert_eq!(RawLabel::Index(1).resolve(&classes()).unwrap(), 1);
        assert!(RawLabel::Index(2).resolve(&classes()).is_err());
        assert!(RawLabel::Name("neutral".into()).resolve(&classes()).is_err());
    }
}
