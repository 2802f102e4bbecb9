use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{DatasetAdapter, RawExample, RawInstance, RawLabel};
use crate::config::{AnnoMethod, Dataset, Split};

/// Threshold at which soft SST rationale scores count as evidence
const RATIONALE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Deserialize)]
struct SstRow {
    text: String,
    rationale: Vec<f32>,
    classification: RawLabel,
}

/// SST with word-level rationales, stored as one JSON array per split
pub struct SstAdapter {
    path: PathBuf,
    classes: Vec<String>,
}

impl SstAdapter {
    pub fn new(data_dir: &Path, split: Split, anno_method: AnnoMethod, classes: Vec<String>) -> Self {
        let file_name = format!("sst_{}{}.json", split, anno_method.suffix());
        Self {
            path: data_dir.join("sst").join(file_name),
            classes,
        }
    }
}

impl DatasetAdapter for SstAdapter {
    fn dataset(&self) -> Dataset {
        Dataset::Sst
    }

    fn extract_raw_examples(&self) -> Result<Vec<RawInstance>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read SST split: {}", self.path.display()))?;
        let rows: Vec<SstRow> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse SST split: {}", self.path.display()))?;

        rows.iter()
            .enumerate()
            .map(|(idx, row)| {
                let rationale: Vec<f32> = row
                    .rationale
                    .iter()
                    .map(|&r| if r >= RATIONALE_THRESHOLD { 1.0 } else { 0.0 })
                    .collect();
                let example = RawExample::new(&row.text, &rationale)
                    .with_context(|| format!("SST example {}", idx))?;
                let label = row
                    .classification
                    .resolve(&self.classes)
                    .with_context(|| format!("SST example {}", idx))?;
                Ok(RawInstance::single(label, example))
            })
            .collect()
    }

    fn forbid_unknown(&self) -> bool {
        true
    }
}
