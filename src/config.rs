use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Datasets with local raw files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Sst,
    #[serde(rename = "hatexplain")]
    HateXplain,
    Esnli,
    Fever,
    Movies,
    #[serde(rename = "multirc")]
    MultiRc,
    Cose,
    Stf,
    ChecklistFlight,
}

impl Dataset {
    pub const ALL: [Dataset; 9] = [
        Dataset::Sst,
        Dataset::HateXplain,
        Dataset::Esnli,
        Dataset::Fever,
        Dataset::Movies,
        Dataset::MultiRc,
        Dataset::Cose,
        Dataset::Stf,
        Dataset::ChecklistFlight,
    ];

    /// ERASER benchmark datasets share one annotation format
    pub fn is_eraser(&self) -> bool {
        matches!(
            self,
            Dataset::Esnli | Dataset::Fever | Dataset::Movies | Dataset::MultiRc | Dataset::Cose
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Sst => "sst",
            Dataset::HateXplain => "hatexplain",
            Dataset::Esnli => "esnli",
            Dataset::Fever => "fever",
            Dataset::Movies => "movies",
            Dataset::MultiRc => "multirc",
            Dataset::Cose => "cose",
            Dataset::Stf => "stf",
            Dataset::ChecklistFlight => "checklist_flight",
        }
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                let names: Vec<&str> = Dataset::ALL.iter().map(|d| d.as_str()).collect();
                format!("Invalid dataset: {}. Use one of {}", s, names.join(", "))
            })
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tokenizer architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "google/bigbird-roberta-base")]
    BigBirdRobertaBase,
    #[serde(rename = "bert-base-uncased")]
    BertBaseUncased,
}

impl Arch {
    pub fn hub_id(&self) -> &'static str {
        match self {
            Arch::BigBirdRobertaBase => "google/bigbird-roberta-base",
            Arch::BertBaseUncased => "bert-base-uncased",
        }
    }

    /// Whether the tokenizer normaliser lowercases its input
    pub fn is_uncased(&self) -> bool {
        matches!(self, Arch::BertBaseUncased)
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google/bigbird-roberta-base" | "bigbird" => Ok(Arch::BigBirdRobertaBase),
            "bert-base-uncased" | "bert" => Ok(Arch::BertBaseUncased),
            _ => Err(format!(
                "Invalid arch: {}. Use google/bigbird-roberta-base or bert-base-uncased",
                s
            )),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hub_id())
    }
}

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    /// File stem used by the ERASER release (`val` instead of `dev`)
    pub fn eraser_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "val",
            Split::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "dev" | "val" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            _ => Err(format!("Invalid split: {}. Use train, dev, or test", s)),
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Dev => write!(f, "dev"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// How the SST rationales were annotated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnoMethod {
    #[default]
    Normal,
    InstanceBased,
    LexiconBased,
    LexiconBasedAll,
}

impl AnnoMethod {
    /// Suffix appended to raw input and output field filenames
    pub fn suffix(&self) -> &'static str {
        match self {
            AnnoMethod::Normal => "",
            AnnoMethod::InstanceBased => "_instance_based",
            AnnoMethod::LexiconBased => "_lexicon_based",
            AnnoMethod::LexiconBasedAll => "_lexicon_based_all",
        }
    }
}

impl FromStr for AnnoMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(AnnoMethod::Normal),
            "instance_based" => Ok(AnnoMethod::InstanceBased),
            "lexicon_based" => Ok(AnnoMethod::LexiconBased),
            "lexicon_based_all" => Ok(AnnoMethod::LexiconBasedAll),
            _ => Err(format!(
                "Invalid annotation method: {}. Use normal, instance_based, lexicon_based, or lexicon_based_all",
                s
            )),
        }
    }
}

impl std::fmt::Display for AnnoMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnoMethod::Normal => write!(f, "normal"),
            AnnoMethod::InstanceBased => write!(f, "instance_based"),
            AnnoMethod::LexiconBased => write!(f, "lexicon_based"),
            AnnoMethod::LexiconBasedAll => write!(f, "lexicon_based_all"),
        }
    }
}

/// Strategy for picking which train examples keep gold rationales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RationaleSelection {
    Uniform,
}

impl FromStr for RationaleSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" => Ok(RationaleSelection::Uniform),
            _ => Err(format!("Invalid rationale selection: {}. Use uniform", s)),
        }
    }
}

impl std::fmt::Display for RationaleSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RationaleSelection::Uniform => write!(f, "uniform"),
        }
    }
}

/// Static per-dataset information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub classes: Vec<String>,
    pub max_length: HashMap<Arch, usize>,
}

impl DatasetInfo {
    fn new(classes: &[&str], bigbird: usize, bert: usize) -> Self {
        let mut max_length = HashMap::new();
        max_length.insert(Arch::BigBirdRobertaBase, bigbird);
        max_length.insert(Arch::BertBaseUncased, bert);
        Self {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            max_length,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn max_length_for(&self, arch: Arch) -> Option<usize> {
        self.max_length.get(&arch).copied()
    }

    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == name)
    }
}

/// Registry of dataset information, optionally overridden from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRegistry {
    pub datasets: HashMap<Dataset, DatasetInfo>,
}

impl DatasetRegistry {
    /// Built-in defaults for every supported dataset
    pub fn builtin() -> Self {
        let mut datasets = HashMap::new();
        datasets.insert(Dataset::Sst, DatasetInfo::new(&["negative", "positive"], 128, 128));
        datasets.insert(
            Dataset::HateXplain,
            DatasetInfo::new(&["normal", "offensive", "hatespeech"], 128, 128),
        );
        datasets.insert(
            Dataset::Esnli,
            DatasetInfo::new(&["entailment", "neutral", "contradiction"], 128, 128),
        );
        datasets.insert(Dataset::Fever, DatasetInfo::new(&["SUPPORTS", "REFUTES"], 512, 512));
        datasets.insert(Dataset::Movies, DatasetInfo::new(&["NEG", "POS"], 1024, 512));
        datasets.insert(Dataset::MultiRc, DatasetInfo::new(&["False", "True"], 512, 512));
        datasets.insert(Dataset::Cose, DatasetInfo::new(&["A", "B", "C", "D", "E"], 128, 128));
        datasets.insert(Dataset::Stf, DatasetInfo::new(&["noHate", "hate"], 256, 256));
        datasets.insert(
            Dataset::ChecklistFlight,
            DatasetInfo::new(&["negative", "positive"], 128, 128),
        );
        Self { datasets }
    }

    /// Load overrides from a JSON file on top of the built-in defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset registry: {}", path.display()))?;
        let overrides: HashMap<Dataset, DatasetInfo> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dataset registry: {}", path.display()))?;

        let mut registry = Self::builtin();
        for (dataset, info) in overrides {
            log::debug!("Registry override for {}", dataset);
            registry.datasets.insert(dataset, info);
        }
        Ok(registry)
    }

    pub fn get(&self, dataset: Dataset) -> Option<&DatasetInfo> {
        self.datasets.get(&dataset)
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Everything needed to build one split
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub data_dir: PathBuf,
    pub dataset: Dataset,
    pub arch: Arch,
    pub split: Split,
    pub num_samples: Option<usize>,
    pub seed: u64,
    pub pct_train_rationales: Option<f64>,
    pub rationale_selection: RationaleSelection,
    pub anno_method: AnnoMethod,
    pub max_length: usize,
    pub classes: Vec<String>,
}

impl BuildConfig {
    /// Resolve a build configuration against the registry
    pub fn new(
        data_dir: PathBuf,
        dataset: Dataset,
        arch: Arch,
        split: Split,
        registry: &DatasetRegistry,
    ) -> Result<Self> {
        let info = registry
            .get(dataset)
            .with_context(|| format!("No registry entry for dataset {}", dataset))?;
        let max_length = info
            .max_length_for(arch)
            .with_context(|| format!("No max length configured for {} with {}", dataset, arch))?;

        Ok(Self {
            data_dir,
            dataset,
            arch,
            split,
            num_samples: None,
            seed: 0,
            pct_train_rationales: None,
            rationale_selection: RationaleSelection::Uniform,
            anno_method: AnnoMethod::Normal,
            max_length,
            classes: info.classes.clone(),
        })
    }

    /// Check argument combinations that the build cannot honour
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_samples {
            anyhow::ensure!(n >= 1, "num_samples must be at least 1");
        }
        if let Some(pct) = self.pct_train_rationales {
            anyhow::ensure!(
                self.split == Split::Train,
                "pct_train_rationales is only valid for the train split"
            );
            anyhow::ensure!(
                pct > 0.0 && pct <= 100.0,
                "pct_train_rationales must be in (0, 100], got {}",
                pct
            );
        }
        anyhow::ensure!(self.max_length >= 3, "max_length must leave room for special tokens");
        Ok(())
    }

    pub fn log_settings(&self) {
        log::info!("Build settings:");
        log::info!("  Dataset: {}", self.dataset);
        log::info!("  Arch: {}", self.arch);
        log::info!("  Split: {}", self.split);
        log::info!("  Max length: {}", self.max_length);
        log::info!("  Annotation method: {}", self.anno_method);
        log::info!("  Seed: {}", self.seed);
        if let Some(n) = self.num_samples {
            log::info!("  Samples: {}", n);
        }
        if let Some(pct) = self.pct_train_rationales {
            log::info!("  Train rationales: {}% ({})", pct, self.rationale_selection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_from_str() {
        assert_eq!("sst".parse::<Dataset>().unwrap(), Dataset::Sst);
        assert_eq!("HateXplain".parse::<Dataset>().unwrap(), Dataset::HateXplain);
        assert_eq!("checklist_flight".parse::<Dataset>().unwrap(), Dataset::ChecklistFlight);
        assert!("boolq".parse::<Dataset>().is_err());
    }

    #[test]
    fn test_split_eraser_name() {
        assert_eq!(Split::Dev.eraser_name(), "val");
        assert_eq!("val".parse::<Split>().unwrap(), Split::Dev);
        assert_eq!(Split::Dev.to_string(), "dev");
    }

    #[test]
    fn test_anno_method_serializes_like_display() {
        for anno in [
            AnnoMethod::Normal,
            AnnoMethod::InstanceBased,
            AnnoMethod::LexiconBased,
            AnnoMethod::LexiconBasedAll,
        ] {
            let json = serde_json::to_string(&anno).unwrap();
            assert_eq!(json, format!("\"{}\"", anno));
            assert_eq!(serde_json::from_str::<AnnoMethod>(&json).unwrap(), anno);
        }
        assert_eq!(serde_json::to_string(&RationaleSelection::Uniform).unwrap(), "\"uniform\"");
    }

    #[test]
    fn test_builtin_registry_covers_all_datasets() {
        let registry = DatasetRegistry::builtin();
        for dataset in Dataset::ALL {
            let info = registry.get(dataset).unwrap();
            assert!(info.num_classes() >= 2);
            assert!(info.max_length_for(Arch::BigBirdRobertaBase).is_some());
            assert!(info.max_length_for(Arch::BertBaseUncased).is_some());
        }
    }

    #[test]
    fn test_registry_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(
            &path,
            r#"{"sst": {"classes": ["neg", "pos"], "max_length": {"bert-base-uncased": 64}}}"#,
        )
        .unwrap();

        let registry = DatasetRegistry::from_file(&path).unwrap();
        let sst = registry.get(Dataset::Sst).unwrap();
        assert_eq!(sst.class_index("pos"), Some(1));
        assert_eq!(sst.max_length_for(Arch::BertBaseUncased), Some(64));
        assert_eq!(sst.max_length_for(Arch::BigBirdRobertaBase), None);
        assert!(registry.get(Dataset::Fever).is_some());
    }

    #[test]
    fn test_validate_rejects_rationale_pct_outside_train() {
        let registry = DatasetRegistry::builtin();
        let mut config =
            BuildConfig::new(PathBuf::from("data"), Dataset::Sst, Arch::BertBaseUncased, Split::Dev, &registry)
                .unwrap();
        assert!(config.validate().is_ok());
        config.pct_train_rationales = Some(10.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_anno_suffix() {
        assert_eq!(AnnoMethod::Normal.suffix(), "");
        assert_eq!(AnnoMethod::LexiconBasedAll.suffix(), "_lexicon_based_all");
    }
}
