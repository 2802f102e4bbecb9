use anyhow::Context;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use crate::data::dataset::DatasetDict;
use crate::io::json::{load_indices, save_indices};
use crate::utils::paths::SplitPaths;
use crate::{RationalePrepError, Result};

/// Draw `n_samples` distinct positions, stratified by label.
///
/// Each label group contributes `floor(count * n_samples / total)` positions;
/// the rounding shortfall is topped up from positions not yet drawn.
pub fn stratified_sample<R: Rng + ?Sized>(
    labels: &[usize],
    n_samples: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let total = labels.len();
    if n_samples == 0 || n_samples >= total {
        return Err(RationalePrepError::InvalidData(format!(
            "Cannot sample {} of {} examples",
            n_samples, total
        )));
    }

    // groups in first-occurrence order of their label
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for (pos, &label) in labels.iter().enumerate() {
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(pos),
            None => groups.push((label, vec![pos])),
        }
    }

    let mut sampled = Vec::with_capacity(n_samples);
    for (_, members) in &groups {
        let k = members.len() * n_samples / total;
        sampled.extend(members.choose_multiple(rng, k).copied());
    }

    if sampled.len() < n_samples {
        let taken: HashSet<usize> = sampled.iter().copied().collect();
        let remaining: Vec<usize> = (0..total).filter(|p| !taken.contains(p)).collect();
        let delta = n_samples - sampled.len();
        sampled.extend(remaining.choose_multiple(rng, delta).copied());
    }

    Ok(sampled)
}

/// Pick `ceil(len * pct / 100)` item indices uniformly without replacement
pub fn select_rationale_indices<R: Rng + ?Sized>(item_idx: &[usize], pct: f64, rng: &mut R) -> Vec<usize> {
    let count = ((item_idx.len() as f64 * pct / 100.0).ceil() as usize).min(item_idx.len());
    item_idx.choose_multiple(rng, count).copied().collect()
}

/// Sub-sample a split, reusing the cached sample positions when present
pub fn sample_split<R: Rng + ?Sized>(
    paths: &SplitPaths,
    dict: &DatasetDict,
    n_samples: usize,
    seed: u64,
    rng: &mut R,
) -> anyhow::Result<DatasetDict> {
    let cache = paths.sample_cache_file(n_samples, seed);
    let positions = if cache.exists() {
        log::info!("Reusing sampled positions from {}", cache.display());
        load_indices(&cache)?
    } else {
        let positions = stratified_sample(&dict.labels(), n_samples, rng)?;
        save_indices(&cache, &positions)?;
        positions
    };

    dict.select(&positions)
        .with_context(|| format!("Sample cache {} does not match the split", cache.display()))
}

/// Write the uniformly selected rationale indices unless already present
pub fn write_rationale_indices<R: Rng + ?Sized>(
    paths: &SplitPaths,
    dict: &DatasetDict,
    pct: f64,
    seed: u64,
    rng: &mut R,
) -> anyhow::Result<Vec<usize>> {
    let path = paths.rationale_indices_file(pct, seed);
    if path.exists() {
        log::info!("Rationale indices already exist at {}", path.display());
        return load_indices(&path);
    }

    let indices = select_rationale_indices(&dict.item_indices(), pct, rng);
    log::info!(
        "Selected {} of {} train examples to keep gold rationales",
        indices.len(),
        dict.len()
    );
    save_indices(&path, &indices)?;
    Ok(indices)
}
