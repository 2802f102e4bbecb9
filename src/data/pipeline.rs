use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::BuildConfig;
use crate::data::adapters::{DatasetAdapter, RawExample, RawInstance, adapter_for};
use crate::data::align::align_rationale_with_tokens;
use crate::data::builder::{ExampleBuilder, Segment, TruncationPolicy};
use crate::data::dataset::{DatasetDict, Record};
use crate::data::sampling::{sample_split, write_rationale_indices};
use crate::io::{json, safetensors};
use crate::tokenizer::{HfTokenizer, SubwordTokenizer};
use crate::utils::paths::{SampleKey, SplitPaths};

/// Turns the raw instances of one split into a [`DatasetDict`]
pub struct SplitBuilder<'a, T: SubwordTokenizer + ?Sized> {
    tokenizer: &'a T,
    max_length: usize,
    show_progress: bool,
}

impl<'a, T: SubwordTokenizer + ?Sized> SplitBuilder<'a, T> {
    pub fn new(tokenizer: &'a T, max_length: usize) -> Self {
        Self {
            tokenizer,
            max_length,
            show_progress: false,
        }
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Subword ids and token-level rationale for one raw example.
    ///
    /// Annotated text is always aligned, so a text/tokenizer mismatch fails
    /// whatever the rationale values are.
    pub fn encode(&self, raw: &RawExample) -> crate::Result<Segment> {
        let ids = self.tokenizer.tokenize(&raw.text)?;
        if !raw.annotated {
            return Ok(Segment::without_rationale(ids));
        }

        let words = raw
            .word_tokens
            .iter()
            .map(|w| self.tokenizer.normalize_word(w))
            .collect::<crate::Result<Vec<_>>>()?;
        let rationale = align_rationale_with_tokens(self.tokenizer, &ids, &words, &raw.word_rationale)?;
        Segment::new(ids, rationale)
    }

    fn example_builder(&self, adapter: &dyn DatasetAdapter) -> ExampleBuilder {
        ExampleBuilder::new(self.max_length, self.tokenizer.special_tokens().clone())
            .require_rationale(adapter.requires_rationale())
            .forbid_unknown(adapter.forbid_unknown())
    }

    /// Build the record for one instance
    pub fn build_record<R: Rng + ?Sized>(
        &self,
        builder: &ExampleBuilder,
        policy: TruncationPolicy,
        item_idx: usize,
        instance: &RawInstance,
        rng: &mut R,
    ) -> crate::Result<Record> {
        let segments = instance
            .segments
            .iter()
            .map(|raw| self.encode(raw))
            .collect::<crate::Result<Vec<_>>>()?;

        let mut examples = Vec::with_capacity(instance.choices.len().max(1));
        if instance.choices.is_empty() {
            let mut segments = segments;
            builder.truncate(&mut segments, policy)?;
            examples.push(builder.build(&segments, instance.label, rng)?);
        } else {
            for choice in &instance.choices {
                let mut with_choice = segments.clone();
                with_choice.push(self.encode(choice)?);
                builder.truncate(&mut with_choice, policy)?;
                examples.push(builder.build(&with_choice, instance.label, rng)?);
            }
        }

        Ok(Record { item_idx, examples })
    }

    /// Build every instance of the adapter's split, aborting on the first error
    pub fn build<R: Rng + ?Sized>(&self, adapter: &dyn DatasetAdapter, rng: &mut R) -> Result<DatasetDict> {
        let instances = adapter
            .extract_raw_examples()
            .with_context(|| format!("Failed to extract {} examples", adapter.dataset()))?;
        let builder = self.example_builder(adapter);
        let policy = adapter.truncation();
        let multiple_choice = instances.iter().any(|i| !i.choices.is_empty());

        let pb = if self.show_progress {
            let pb = ProgressBar::new(instances.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} examples built")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut dict = DatasetDict::new(multiple_choice);
        for (idx, instance) in instances.iter().enumerate() {
            let record = self
                .build_record(&builder, policy, idx, instance, rng)
                .with_context(|| format!("Failed to build {} example {}", adapter.dataset(), idx))?;
            dict.push(record);
            pb.inc(1);
        }
        pb.finish_with_message("Build complete");

        log::info!(
            "Built {} records ({} with rationale), actual max length {}",
            dict.len(),
            dict.num_with_rationale(),
            dict.actual_max_length()
        );
        Ok(dict)
    }
}

/// Outcome of [`run_build`]
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub split_dir: PathBuf,
    pub num_records: usize,
    pub actual_max_length: usize,
    pub rebuilt: bool,
    pub rationale_indices: Option<Vec<usize>>,
    pub tensors_path: Option<PathBuf>,
}

/// Whether the split on disk was built for a different `max_length`
fn built_with_other_max_length(paths: &SplitPaths, config: &BuildConfig) -> Result<bool> {
    let path = paths.manifest_file(config.anno_method, None);
    if !path.exists() {
        return Ok(false);
    }
    let manifest = json::load_manifest(&path)?;
    if manifest.max_length != config.max_length {
        log::warn!(
            "Split in {} was built with max length {}, rebuilding for {}",
            paths.dir().display(),
            manifest.max_length,
            config.max_length
        );
        return Ok(true);
    }
    Ok(false)
}

/// Build (or load), optionally sub-sample, and persist one split
pub fn run_build(config: &BuildConfig, tokenizer_file: Option<PathBuf>, export: bool) -> Result<BuildSummary> {
    config.validate()?;
    config.log_settings();

    let paths = SplitPaths::new(&config.data_dir, config.dataset, config.arch, config.split);
    paths
        .ensure_dir()
        .with_context(|| format!("Failed to create {}", paths.dir().display()))?;

    let missing = json::missing_keys(&paths, config.anno_method, None);
    let rebuilt = if missing.is_empty() {
        built_with_other_max_length(&paths, config)?
    } else {
        log::info!("Missing fields {:?}, building {} split", missing, config.split);
        true
    };
    let mut dict = if rebuilt {
        let mut rng = StdRng::seed_from_u64(config.seed);
        println!("{}", "Loading tokenizer...".bright_yellow());
        let tokenizer = match tokenizer_file {
            Some(path) => HfTokenizer::from_file(&path, config.arch)?,
            None => HfTokenizer::from_pretrained(config.arch)
                .context("Failed to initialize tokenizer - ensure you have internet access for first-time download")?,
        };

        let adapter = adapter_for(config);
        println!("{}", format!("Building {} {} split", config.dataset, config.split).bright_green());
        let dict = SplitBuilder::new(&tokenizer, config.max_length)
            .show_progress(true)
            .build(adapter.as_ref(), &mut rng)?;

        json::save_split(&paths, &dict, config.anno_method, None)?;
        let manifest = json::SplitManifest::new(
            &dict,
            config.dataset,
            config.arch,
            config.split,
            config.anno_method,
            config.max_length,
            config.seed,
            None,
        );
        json::save_manifest(paths.manifest_file(config.anno_method, None), &manifest)?;
        dict
    } else {
        json::load_split(&paths, config.anno_method, None)?
    };

    let sample = config.num_samples.map(|num_samples| SampleKey {
        num_samples,
        seed: config.seed,
    });
    if let Some(key) = sample {
        // fresh stream so the draw does not depend on whether the split was just built
        let mut rng = StdRng::seed_from_u64(config.seed);
        dict = sample_split(&paths, &dict, key.num_samples, key.seed, &mut rng)?;
        json::save_split(&paths, &dict, config.anno_method, sample)?;
        let manifest = json::SplitManifest::new(
            &dict,
            config.dataset,
            config.arch,
            config.split,
            config.anno_method,
            config.max_length,
            config.seed,
            Some(key.num_samples),
        );
        json::save_manifest(paths.manifest_file(config.anno_method, sample), &manifest)?;
    }

    let mut summary = BuildSummary {
        split_dir: paths.dir().to_path_buf(),
        num_records: dict.len(),
        actual_max_length: dict.actual_max_length(),
        rebuilt,
        rationale_indices: None,
        tensors_path: None,
    };

    // selecting train rationales ends the run
    if let Some(pct) = config.pct_train_rationales {
        let mut rng = StdRng::seed_from_u64(config.seed);
        summary.rationale_indices = Some(write_rationale_indices(&paths, &dict, pct, config.seed, &mut rng)?);
        return Ok(summary);
    }

    summary.tensors_path = if export {
        let path = paths.tensors_file(config.anno_method, sample);
        let mut metadata = HashMap::new();
        metadata.insert("dataset".to_string(), config.dataset.to_string());
        metadata.insert("arch".to_string(), config.arch.to_string());
        metadata.insert("split".to_string(), config.split.to_string());
        metadata.insert("max_length".to_string(), config.max_length.to_string());
        safetensors::save_split_tensors(&dict, &path, metadata)?;
        Some(path)
    } else {
        None
    };
    Ok(summary)
}
