use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::path::PathBuf;

use rationale_prep::config::{AnnoMethod, Arch, BuildConfig, Dataset, DatasetRegistry, RationaleSelection, Split};
use rationale_prep::data::pipeline::{BuildSummary, run_build};
use rationale_prep::io::{json, safetensors};
use rationale_prep::tokenizer::{HfTokenizer, SubwordTokenizer};
use rationale_prep::utils::{SampleKey, SplitPaths};
use rationale_prep::{AlignedExample, DatasetDict};

#[derive(Parser)]
#[command(
    name = "rationale-prep",
    version = "0.1.0",
    about = "Build rationale-aligned model inputs from annotated text datasets",
    long_about = "rationale-prep - Align word-level rationales with subword tokens and build model inputs\n\
                  \n\
                  Examples:\n\
                    # Build the SST train split for BigBird\n\
                    rationale-prep build --dataset sst --split train\n\
                    \n\
                    # Sample 500 training examples and keep 10% of their rationales\n\
                    rationale-prep build --dataset esnli --split train --num-samples 500 --pct-train-rationales 10\n\
                    \n\
                    # Look at a built example\n\
                    rationale-prep inspect --dataset sst --split dev --index 3"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Options shared by every command that addresses one split on disk
#[derive(clap::Args, Clone)]
struct SplitArgs {
    /// Root data directory
    #[arg(long, default_value = "../data/")]
    data_dir: PathBuf,

    /// Dataset name (sst, hatexplain, esnli, fever, movies, multirc, cose, stf, checklist_flight)
    #[arg(long)]
    dataset: Dataset,

    /// Model architecture whose tokenizer is used
    #[arg(long, default_value = "google/bigbird-roberta-base")]
    arch: Arch,

    /// Split to process (train, dev, test)
    #[arg(long)]
    split: Split,

    /// Annotation method of the source files
    #[arg(long, default_value = "normal")]
    anno_method: AnnoMethod,

    /// Stratified sample size
    #[arg(long)]
    num_samples: Option<usize>,

    /// Random seed
    #[arg(long, default_value = "0")]
    seed: u64,
}

impl SplitArgs {
    fn paths(&self) -> SplitPaths {
        SplitPaths::new(&self.data_dir, self.dataset, self.arch, self.split)
    }

    fn sample(&self) -> Option<SampleKey> {
        self.num_samples.map(|num_samples| SampleKey {
            num_samples,
            seed: self.seed,
        })
    }

    fn load(&self) -> Result<DatasetDict> {
        let paths = self.paths();
        let missing = json::missing_keys(&paths, self.anno_method, self.sample());
        if !missing.is_empty() {
            return Err(anyhow!(
                "Split not built yet in {} (missing {:?}); run the build command first",
                paths.dir().display(),
                missing
            ));
        }
        json::load_split(&paths, self.anno_method, self.sample())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or load) a split and persist its fields
    Build {
        #[command(flatten)]
        split: SplitArgs,

        /// Percentage of train examples that keep gold rationales
        #[arg(long)]
        pct_train_rationales: Option<f64>,

        /// Selection strategy for train rationales
        #[arg(long, default_value = "uniform")]
        train_rationale_selection: RationaleSelection,

        /// Override the registry max length
        #[arg(long)]
        max_length: Option<usize>,

        /// Local tokenizer.json instead of the hub download
        #[arg(long)]
        tokenizer_file: Option<PathBuf>,

        /// JSON file with dataset registry overrides
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Also write a safetensors file
        #[arg(long)]
        export: bool,
    },

    /// Print statistics and one example of a built split
    Inspect {
        #[command(flatten)]
        split: SplitArgs,

        /// Record to display
        #[arg(long, default_value = "0")]
        index: usize,

        /// Local tokenizer.json used to show tokens instead of ids
        #[arg(long)]
        tokenizer_file: Option<PathBuf>,
    },

    /// Convert a built split to safetensors
    Export {
        #[command(flatten)]
        split: SplitArgs,

        /// Output file (defaults to the split directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the dataset registry
    List {
        /// JSON file with dataset registry overrides
        #[arg(long)]
        registry: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", "rationale-prep - Rationale alignment and example building".bright_white().bold());
    println!("{}", "Version 0.1.0".bright_white());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    match cli.command {
        Commands::Build {
            split,
            pct_train_rationales,
            train_rationale_selection,
            max_length,
            tokenizer_file,
            registry,
            export,
        } => {
            let registry = load_registry(registry)?;
            let mut config = BuildConfig::new(
                split.data_dir.clone(),
                split.dataset,
                split.arch,
                split.split,
                &registry,
            )?;
            config.num_samples = split.num_samples;
            config.seed = split.seed;
            config.anno_method = split.anno_method;
            config.pct_train_rationales = pct_train_rationales;
            config.rationale_selection = train_rationale_selection;
            if let Some(max_length) = max_length {
                config.max_length = max_length;
            }

            let summary = run_build(&config, tokenizer_file, export)?;
            print_build_summary(&config, &summary);
        }

        Commands::Inspect {
            split,
            index,
            tokenizer_file,
        } => {
            inspect_split(&split, index, tokenizer_file)?;
        }

        Commands::Export { split, output } => {
            let dict = split.load()?;
            let path = output.unwrap_or_else(|| split.paths().tensors_file(split.anno_method, split.sample()));
            let mut metadata = HashMap::new();
            metadata.insert("dataset".to_string(), split.dataset.to_string());
            metadata.insert("arch".to_string(), split.arch.to_string());
            metadata.insert("split".to_string(), split.split.to_string());
            safetensors::save_split_tensors(&dict, &path, metadata)?;
            println!("{}", format!("Exported {} records to {}", dict.len(), path.display()).bright_green());
        }

        Commands::List { registry } => {
            list_datasets(&load_registry(registry)?);
        }
    }

    Ok(())
}

fn load_registry(path: Option<PathBuf>) -> Result<DatasetRegistry> {
    match path {
        Some(path) => DatasetRegistry::from_file(path),
        None => Ok(DatasetRegistry::builtin()),
    }
}

fn print_build_summary(config: &BuildConfig, summary: &BuildSummary) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Build Complete!".bright_green().bold());
    println!("{}", format!("Dataset: {} ({})", config.dataset, config.split).bright_white());
    println!("{}", format!("Arch: {}", config.arch).bright_white());
    println!("{}", format!("Split folder: {}", summary.split_dir.display()).bright_white());
    println!(
        "{}",
        format!(
            "Records: {} ({})",
            summary.num_records,
            if summary.rebuilt { "built" } else { "loaded" }
        )
        .bright_white()
    );
    println!(
        "{}",
        format!("Max length: {} (actual {})", config.max_length, summary.actual_max_length).bright_white()
    );
    if let Some(indices) = &summary.rationale_indices {
        println!("{}", format!("Train rationale indices: {}", indices.len()).bright_white());
    }
    if let Some(path) = &summary.tensors_path {
        println!("{}", format!("Tensors: {}", path.display()).bright_white());
    }
    println!("{}", "=".repeat(60).bright_blue());
}

fn inspect_split(args: &SplitArgs, index: usize, tokenizer_file: Option<PathBuf>) -> Result<()> {
    let dict = args.load()?;
    println!("{}", format!("Split: {}", args.paths().dir().display()).bright_cyan());
    println!("Records: {}", dict.len());
    println!("With rationale: {}", dict.num_with_rationale());
    println!("Multiple choice: {}", dict.is_multiple_choice());
    println!("Actual max length: {}", dict.actual_max_length());
    println!("Label counts:");
    for (label, count) in dict.label_counts() {
        println!("  {}: {}", label, count);
    }

    let record = dict
        .get(index)
        .with_context(|| format!("Record {} out of range for {} records", index, dict.len()))?;
    let tokenizer = tokenizer_file
        .map(|path| HfTokenizer::from_file(path, args.arch))
        .transpose()?;

    println!("\n{}", format!("Record {} (item {}, label {})", index, record.item_idx, record.label()).bright_cyan());
    for (choice, example) in record.examples.iter().enumerate() {
        if record.examples.len() > 1 {
            println!("{}", format!("Choice {}:", choice).bright_yellow());
        }
        println!("{}", render_example(example, tokenizer.as_ref())?);
    }
    Ok(())
}

/// Real tokens with rationale tokens highlighted
fn render_example(example: &AlignedExample, tokenizer: Option<&HfTokenizer>) -> Result<String> {
    let n = example.num_tokens();
    let ids = &example.token_ids[..n];
    let tokens = match tokenizer {
        Some(tokenizer) => tokenizer.convert_ids_to_tokens(ids)?,
        None => ids.iter().map(|id| id.to_string()).collect(),
    };

    let rendered: Vec<String> = tokens
        .iter()
        .zip(&example.rationale)
        .map(|(token, &r)| {
            if r > 0.0 {
                token.bright_green().bold().to_string()
            } else {
                token.normal().to_string()
            }
        })
        .collect();
    Ok(rendered.join(" "))
}

fn list_datasets(registry: &DatasetRegistry) {
    println!("{}", "Available datasets:".bright_cyan());
    println!("{}", "-".repeat(60));
    for dataset in Dataset::ALL {
        let Some(info) = registry.get(dataset) else {
            continue;
        };
        let lengths: Vec<String> = [Arch::BigBirdRobertaBase, Arch::BertBaseUncased]
            .iter()
            .filter_map(|arch| info.max_length_for(*arch).map(|l| format!("{}={}", arch, l)))
            .collect();
        println!("{}", dataset.to_string().bright_white().bold());
        println!("  Classes: {}", info.classes.join(", "));
        println!("  Max length: {}", lengths.join(", "));
    }
}
