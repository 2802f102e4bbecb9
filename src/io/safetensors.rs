use anyhow::{Context, Result, anyhow, ensure};
use candle_core::{Device, Tensor, WithDType};
use safetensors::serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::data::builder::AlignedExample;
use crate::data::dataset::DatasetDict;

/// Stack one per-example field into a `[N, L]` or `[N, C, L]` tensor
fn stack_field<T: WithDType, F>(dict: &DatasetDict, device: &Device, choices: usize, field: F) -> Result<Tensor>
where
    F: Fn(&AlignedExample) -> Vec<T>,
{
    let mut data = Vec::new();
    let mut width = None;
    for record in dict.records() {
        for example in &record.examples {
            let row = field(example);
            match width {
                None => width = Some(row.len()),
                Some(w) => ensure!(w == row.len(), "Record {} has a row of length {}, expected {}", record.item_idx, row.len(), w),
            }
            data.extend(row);
        }
    }

    let width = width.unwrap_or(0);
    let tensor = if dict.is_multiple_choice() {
        Tensor::from_vec(data, (dict.len(), choices, width), device)?
    } else {
        Tensor::from_vec(data, (dict.len(), width), device)?
    };
    Ok(tensor)
}

/// Dense tensors for every field of a split
pub fn split_tensors(dict: &DatasetDict, device: &Device) -> Result<HashMap<String, Tensor>> {
    let choices = dict.records().first().map_or(1, |r| r.examples.len());
    for record in dict.records() {
        ensure!(
            record.examples.len() == choices,
            "Record {} has {} choices, expected {}",
            record.item_idx,
            record.examples.len(),
            choices
        );
    }

    let mut tensors = HashMap::new();
    tensors.insert(
        "input_ids".to_string(),
        stack_field(dict, device, choices, |e| e.token_ids.clone())?,
    );
    tensors.insert(
        "attention_mask".to_string(),
        stack_field(dict, device, choices, |e| e.attention_mask.clone())?,
    );
    tensors.insert(
        "rationale".to_string(),
        stack_field(dict, device, choices, |e| e.rationale.clone())?,
    );
    tensors.insert(
        "inv_rationale".to_string(),
        stack_field(dict, device, choices, |e| e.inverse_rationale.clone())?,
    );
    tensors.insert(
        "rand_rationale".to_string(),
        stack_field(dict, device, choices, |e| e.noise_rationale.clone())?,
    );

    let has_rationale: Vec<u8> = dict
        .records()
        .iter()
        .flat_map(|r| r.examples.iter().map(|e| u8::from(e.has_rationale)))
        .collect();
    let has_rationale = if dict.is_multiple_choice() {
        Tensor::from_vec(has_rationale, (dict.len(), choices), device)?
    } else {
        Tensor::from_vec(has_rationale, dict.len(), device)?
    };
    tensors.insert("has_rationale".to_string(), has_rationale);

    let labels: Vec<u32> = dict.labels().into_iter().map(|l| l as u32).collect();
    tensors.insert("label".to_string(), Tensor::from_vec(labels, dict.len(), device)?);

    let item_idx: Vec<u32> = dict.item_indices().into_iter().map(|i| i as u32).collect();
    tensors.insert("item_idx".to_string(), Tensor::from_vec(item_idx, dict.len(), device)?);

    Ok(tensors)
}

/// Save a split in safetensors format
pub fn save_split_tensors<P: AsRef<Path>>(
    dict: &DatasetDict,
    path: P,
    metadata: HashMap<String, String>,
) -> Result<()> {
    let path = path.as_ref();
    if dict.is_empty() {
        return Err(anyhow!("Refusing to export an empty split to {}", path.display()));
    }

    let tensors = split_tensors(dict, &Device::Cpu)?;
    let data = serialize(tensors, &Some(metadata))
        .context("Failed to serialize split tensors to safetensors format")?;
    fs::write(path, data)
        .with_context(|| format!("Failed to write tensor file: {}", path.display()))?;

    log::info!("Tensors saved to: {}", path.display());
    Ok(())
}

/// Load tensors written by [`save_split_tensors`]
pub fn load_split_tensors<P: AsRef<Path>>(path: P) -> Result<HashMap<String, Tensor>> {
    let path = path.as_ref();
    let tensors = candle_core::safetensors::load(path, &Device::Cpu)
        .with_context(|| format!("Failed to read tensor file: {}", path.display()))?;
    Ok(tensors)
}
