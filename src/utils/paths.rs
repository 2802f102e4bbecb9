use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{AnnoMethod, Arch, Dataset, Split};

/// Sample size and seed of a sub-sampled split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleKey {
    pub num_samples: usize,
    pub seed: u64,
}

/// Directory and filename conventions for one built split
///
/// # Example
/// ```
/// use rationale_prep::config::{AnnoMethod, Arch, Dataset, Split};
/// use rationale_prep::utils::SplitPaths;
///
/// let paths = SplitPaths::new("data", Dataset::Sst, Arch::BertBaseUncased, Split::Train);
/// let file = paths.field_file("input_ids", AnnoMethod::Normal, None);
/// assert!(file.ends_with("sst/bert-base-uncased/train/input_ids.json"));
/// ```
#[derive(Debug, Clone)]
pub struct SplitPaths {
    dir: PathBuf,
    split: Split,
}

impl SplitPaths {
    pub fn new<P: AsRef<Path>>(data_dir: P, dataset: Dataset, arch: Arch, split: Split) -> Self {
        // the hub id keeps its slash, so bigbird lands under google/bigbird-roberta-base
        let dir = data_dir
            .as_ref()
            .join(dataset.as_str())
            .join(arch.hub_id())
            .join(split.to_string());
        Self { dir, split }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Suffix shared by every output file of one build variant
    fn suffix(anno: AnnoMethod, sample: Option<SampleKey>) -> String {
        match sample {
            Some(key) => format!("{}_{}_{}", anno.suffix(), key.num_samples, key.seed),
            None => anno.suffix().to_string(),
        }
    }

    pub fn field_file(&self, key: &str, anno: AnnoMethod, sample: Option<SampleKey>) -> PathBuf {
        self.dir.join(format!("{}{}.json", key, Self::suffix(anno, sample)))
    }

    pub fn manifest_file(&self, anno: AnnoMethod, sample: Option<SampleKey>) -> PathBuf {
        self.dir.join(format!("manifest{}.json", Self::suffix(anno, sample)))
    }

    pub fn tensors_file(&self, anno: AnnoMethod, sample: Option<SampleKey>) -> PathBuf {
        self.dir.join(format!("tensors{}.safetensors", Self::suffix(anno, sample)))
    }

    /// Cached positions of a stratified sample
    pub fn sample_cache_file(&self, num_samples: usize, seed: u64) -> PathBuf {
        self.dir.join(format!("{}_split_{}_{}.json", self.split, num_samples, seed))
    }

    /// Item indices that keep gold rationales
    pub fn rationale_indices_file(&self, pct: f64, seed: u64) -> PathBuf {
        // Debug formatting keeps the decimal point, e.g. 10.0
        self.dir.join(format!("rationale_indices_uniform_{:?}_{}.json", pct, seed))
    }
}
