use anyhow::{Context, Result, bail};
use std::fs;
use std::path::PathBuf;

use super::{DatasetAdapter, RawExample, RawInstance, RawLabel};
use crate::config::Dataset;
use crate::data::builder::TruncationPolicy;

/// Tab-separated corpus without rationales: a header row, then
/// `id<TAB>text<TAB>label` per line
pub struct TsvAdapter {
    dataset: Dataset,
    path: PathBuf,
    classes: Vec<String>,
}

impl TsvAdapter {
    pub fn new(dataset: Dataset, path: PathBuf, classes: Vec<String>) -> Self {
        Self { dataset, path, classes }
    }
}

impl DatasetAdapter for TsvAdapter {
    fn dataset(&self) -> Dataset {
        self.dataset
    }

    fn extract_raw_examples(&self) -> Result<Vec<RawInstance>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read TSV file: {}", self.path.display()))?;

        let mut instances = Vec::new();
        for (line_no, line) in content.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                bail!(
                    "Expected 3 tab-separated columns on line {} of {}, found {}",
                    line_no + 1,
                    self.path.display(),
                    fields.len()
                );
            }
            let label = RawLabel::Name(fields[2].trim().to_string())
                .resolve(&self.classes)
                .with_context(|| format!("Line {} of {}", line_no + 1, self.path.display()))?;
            instances.push(RawInstance::single(label, RawExample::without_rationale(fields[1])));
        }
        Ok(instances)
    }

    fn truncation(&self) -> TruncationPolicy {
        TruncationPolicy::Head
    }
}

/// One unlabelled text per line, every line gets label 0
pub struct LinesAdapter {
    dataset: Dataset,
    path: PathBuf,
}

impl LinesAdapter {
    pub fn new(dataset: Dataset, path: PathBuf) -> Self {
        Self { dataset, path }
    }
}

impl DatasetAdapter for LinesAdapter {
    fn dataset(&self) -> Dataset {
        self.dataset
    }

    fn extract_raw_examples(&self) -> Result<Vec<RawInstance>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read text file: {}", self.path.display()))?;
        Ok(content
            .lines()
            .map(|line| RawInstance::single(0, RawExample::without_rationale(line.trim_end())))
            .collect())
    }

    fn truncation(&self) -> TruncationPolicy {
        TruncationPolicy::Head
    }
}
