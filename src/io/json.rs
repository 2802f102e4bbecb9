use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::{AnnoMethod, Arch, Dataset, Split};
use crate::data::dataset::{DATA_KEYS, DatasetDict};
use crate::utils::paths::{SampleKey, SplitPaths};

/// Summary written next to the field files of a split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitManifest {
    pub dataset: Dataset,
    pub arch: Arch,
    pub split: Split,
    pub anno_method: AnnoMethod,
    pub num_records: usize,
    pub num_with_rationale: usize,
    pub multiple_choice: bool,
    pub max_length: usize,
    pub actual_max_length: usize,
    pub seed: u64,
    pub num_samples: Option<usize>,
    pub creation_date: String,
}

impl SplitManifest {
    pub fn new(
        dict: &DatasetDict,
        dataset: Dataset,
        arch: Arch,
        split: Split,
        anno_method: AnnoMethod,
        max_length: usize,
        seed: u64,
        num_samples: Option<usize>,
    ) -> Self {
        Self {
            dataset,
            arch,
            split,
            anno_method,
            num_records: dict.len(),
            num_with_rationale: dict.num_with_rationale(),
            multiple_choice: dict.is_multiple_choice(),
            max_length,
            actual_max_length: dict.actual_max_length(),
            seed,
            num_samples,
            creation_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Field names whose files are not on disk yet
pub fn missing_keys(paths: &SplitPaths, anno: AnnoMethod, sample: Option<SampleKey>) -> Vec<&'static str> {
    DATA_KEYS
        .iter()
        .copied()
        .filter(|key| !paths.field_file(key, anno, sample).exists())
        .collect()
}

/// Save every field of a split as its own JSON file
pub fn save_split(
    paths: &SplitPaths,
    dict: &DatasetDict,
    anno: AnnoMethod,
    sample: Option<SampleKey>,
) -> Result<()> {
    paths
        .ensure_dir()
        .with_context(|| format!("Failed to create split directory: {}", paths.dir().display()))?;

    for key in DATA_KEYS {
        let path = paths.field_file(key, anno, sample);
        let column = dict.field(key)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create field file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &column)
            .with_context(|| format!("Failed to serialize field {}", key))?;
        writer.flush()?;
        log::debug!("Saved {} ({} entries)", path.display(), column.len());
    }

    log::info!("Split saved to: {}", paths.dir().display());
    Ok(())
}

/// Load a split previously written by [`save_split`]
pub fn load_split(paths: &SplitPaths, anno: AnnoMethod, sample: Option<SampleKey>) -> Result<DatasetDict> {
    let mut fields = HashMap::new();
    for key in DATA_KEYS {
        let path = paths.field_file(key, anno, sample);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open field file: {}", path.display()))?;
        let column: Vec<Value> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse field file: {}", path.display()))?;
        fields.insert(key.to_string(), column);
    }

    let dict = DatasetDict::from_fields(fields)
        .with_context(|| format!("Inconsistent split in {}", paths.dir().display()))?;
    log::info!("Loaded {} records from: {}", dict.len(), paths.dir().display());
    Ok(dict)
}

pub fn save_manifest<P: AsRef<Path>>(path: P, manifest: &SplitManifest) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    log::info!("Manifest saved to: {}", path.display());
    Ok(())
}

pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<SplitManifest> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

pub fn save_indices<P: AsRef<Path>>(path: P, indices: &[usize]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string(indices)?)
        .with_context(|| format!("Failed to write indices: {}", path.display()))?;
    Ok(())
}

pub fn load_indices<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read indices: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse indices: {}", path.display()))
}
