use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{DatasetAdapter, RawExample, RawInstance, RawLabel};
use crate::config::{Dataset, Split};

#[derive(Debug, Deserialize)]
struct HateXplainRow {
    text: String,
    #[serde(default)]
    rationale: Vec<f32>,
    label: RawLabel,
}

/// HateXplain, stored as JSON lines. Posts without annotator
/// rationales get an all-zero word rationale.
pub struct HateXplainAdapter {
    path: PathBuf,
    classes: Vec<String>,
}

impl HateXplainAdapter {
    pub fn new(data_dir: &Path, split: Split, classes: Vec<String>) -> Self {
        Self {
            path: data_dir.join("hatexplain").join(format!("processed_{}.json", split)),
            classes,
        }
    }
}

impl DatasetAdapter for HateXplainAdapter {
    fn dataset(&self) -> Dataset {
        Dataset::HateXplain
    }

    fn extract_raw_examples(&self) -> Result<Vec<RawInstance>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read HateXplain split: {}", self.path.display()))?;

        let mut instances = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: HateXplainRow = serde_json::from_str(line)
                .with_context(|| format!("Failed to parse line {} of {}", line_no + 1, self.path.display()))?;

            // posts without annotator rationales are still aligned
            let rationale = if row.rationale.is_empty() {
                vec![0.0; row.text.split_whitespace().count()]
            } else {
                row.rationale
            };
            let example = RawExample::new(&row.text, &rationale)
                .with_context(|| format!("HateXplain line {}", line_no + 1))?;
            let label = row
                .label
                .resolve(&self.classes)
                .with_context(|| format!("HateXplain line {}", line_no + 1))?;
            instances.push(RawInstance::single(label, example));
        }
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_handles_missing_rationale() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("hatexplain")).unwrap();
        fs::write(
            dir.path().join("hatexplain").join("processed_test.json"),
            "{\"text\": \"you are all idiots\", \"rationale\": [0.0, 0.0, 0.0], \"label\": 1}\n\
             \n\
             {\"text\": \"have a nice day\", \"rationale\": [], \"label\": 0}\n",
        )
        .unwrap();

        let classes = vec!["normal".into(), "offensive".into(), "hatespeech".into()];
        let adapter = HateXplainAdapter::new(dir.path(), Split::Test, classes);
        let instances = adapter.extract_raw_examples().unwrap();

        assert_eq!(instances.len(), 2);
        // rationale one word short is padded
        assert_eq!(instances[0].segments[0].word_rationale, vec![0.0; 4]);
        assert_eq!(instances[0].label, 1);
        assert!(!instances[1].segments[0].has_rationale());
        assert!(instances[1].segments[0].annotated);
        assert_eq!(instances[1].segments[0].word_rationale.len(), 4);
    }
}
