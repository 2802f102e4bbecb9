use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};

use crate::data::builder::AlignedExample;
use crate::{RationalePrepError, Result};

/// Field names of a persisted split, in output order
pub const DATA_KEYS: [&str; 8] = [
    "item_idx",
    "input_ids",
    "attention_mask",
    "rationale",
    "inv_rationale",
    "rand_rationale",
    "has_rationale",
    "label",
];

/// One raw instance turned into one or more examples
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub item_idx: usize,
    pub examples: Vec<AlignedExample>,
}

impl Record {
    pub fn label(&self) -> usize {
        self.examples.first().map_or(0, |e| e.label)
    }

    pub fn has_rationale(&self) -> bool {
        self.examples.iter().any(|e| e.has_rationale)
    }
}

/// Ordered collection of records for one split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetDict {
    records: Vec<Record>,
    multiple_choice: bool,
    actual_max_length: usize,
}

impl DatasetDict {
    pub fn new(multiple_choice: bool) -> Self {
        Self {
            records: Vec::new(),
            multiple_choice,
            actual_max_length: 0,
        }
    }

    pub fn push(&mut self, record: Record) {
        for example in &record.examples {
            self.actual_max_length = self.actual_max_length.max(example.num_tokens());
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }

    pub fn is_multiple_choice(&self) -> bool {
        self.multiple_choice
    }

    /// Longest real sequence (markers included) seen so far
    pub fn actual_max_length(&self) -> usize {
        self.actual_max_length
    }

    pub fn labels(&self) -> Vec<usize> {
        self.records.iter().map(Record::label).collect()
    }

    pub fn item_indices(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.item_idx).collect()
    }

    pub fn label_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn num_with_rationale(&self) -> usize {
        self.records.iter().filter(|r| r.has_rationale()).count()
    }

    /// New dict holding the records at `positions`, in that order.
    /// `item_idx` becomes the position in this dict.
    pub fn select(&self, positions: &[usize]) -> Result<Self> {
        let mut selected = Self::new(self.multiple_choice);
        for &pos in positions {
            let record = self.records.get(pos).ok_or_else(|| {
                RationalePrepError::InvalidData(format!(
                    "Sample index {} out of range for {} records",
                    pos,
                    self.records.len()
                ))
            })?;
            selected.push(Record {
                item_idx: pos,
                examples: record.examples.clone(),
            });
        }
        Ok(selected)
    }

    /// Column of per-record values for one field name
    pub fn field(&self, key: &str) -> Result<Vec<Value>> {
        self.records
            .iter()
            .map(|record| match key {
                "item_idx" => Ok(json!(record.item_idx)),
                "label" => Ok(json!(record.label())),
                _ => {
                    let values = record
                        .examples
                        .iter()
                        .map(|e| example_field(e, key))
                        .collect::<Result<Vec<_>>>()?;
                    if self.multiple_choice {
                        Ok(Value::Array(values))
                    } else {
                        values.into_iter().next().ok_or_else(|| {
                            RationalePrepError::InvalidData(format!(
                                "Record {} has no examples",
                                record.item_idx
                            ))
                        })
                    }
                }
            })
            .collect()
    }

    /// Rebuild a dict from the columns written by [`DatasetDict::field`]
    pub fn from_fields(mut fields: HashMap<String, Vec<Value>>) -> Result<Self> {
        let mut take = |key: &str| {
            fields
                .remove(key)
                .ok_or_else(|| RationalePrepError::InvalidData(format!("Missing field {}", key)))
        };

        let item_idx: Vec<usize> = take("item_idx")?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        let labels: Vec<usize> = take("label")?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        let input_ids = take("input_ids")?;
        let attention_mask = take("attention_mask")?;
        let rationale = take("rationale")?;
        let inv_rationale = take("inv_rationale")?;
        let rand_rationale = take("rand_rationale")?;
        let has_rationale = take("has_rationale")?;

        let n = item_idx.len();
        for (key, len) in [
            ("label", labels.len()),
            ("input_ids", input_ids.len()),
            ("attention_mask", attention_mask.len()),
            ("rationale", rationale.len()),
            ("inv_rationale", inv_rationale.len()),
            ("rand_rationale", rand_rationale.len()),
            ("has_rationale", has_rationale.len()),
        ] {
            if len != n {
                return Err(RationalePrepError::InvalidData(format!(
                    "Field {} has {} entries, expected {}",
                    key, len, n
                )));
            }
        }

        // multiple-choice splits nest one more level of arrays
        let multiple_choice = matches!(
            input_ids.first(),
            Some(Value::Array(inner)) if matches!(inner.first(), Some(Value::Array(_)))
        );

        let mut dict = Self::new(multiple_choice);
        for i in 0..n {
            let token_ids: Vec<Vec<u32>> = rows(&input_ids[i], multiple_choice)?;
            let masks: Vec<Vec<u8>> = rows(&attention_mask[i], multiple_choice)?;
            let rationales: Vec<Vec<f32>> = rows(&rationale[i], multiple_choice)?;
            let inverses: Vec<Vec<f32>> = rows(&inv_rationale[i], multiple_choice)?;
            let noises: Vec<Vec<f32>> = rows(&rand_rationale[i], multiple_choice)?;
            let flags: Vec<u8> = if multiple_choice {
                serde_json::from_value(has_rationale[i].clone())?
            } else {
                vec![serde_json::from_value(has_rationale[i].clone())?]
            };

            let count = token_ids.len();
            if [masks.len(), rationales.len(), inverses.len(), noises.len(), flags.len()]
                .iter()
                .any(|&len| len != count)
            {
                return Err(RationalePrepError::InvalidData(format!(
                    "Record {} has inconsistent choice counts",
                    i
                )));
            }

            let examples = token_ids
                .into_iter()
                .zip(masks)
                .zip(rationales)
                .zip(inverses)
                .zip(noises)
                .zip(flags)
                .map(|(((((token_ids, attention_mask), rationale), inverse_rationale), noise_rationale), flag)| {
                    AlignedExample {
                        token_ids,
                        attention_mask,
                        rationale,
                        inverse_rationale,
                        noise_rationale,
                        has_rationale: flag != 0,
                        label: labels[i],
                    }
                })
                .collect();

            dict.push(Record {
                item_idx: item_idx[i],
                examples,
            });
        }
        Ok(dict)
    }
}

fn example_field(example: &AlignedExample, key: &str) -> Result<Value> {
    let value = match key {
        "input_ids" => json!(example.token_ids),
        "attention_mask" => json!(example.attention_mask),
        "rationale" => json!(example.rationale),
        "inv_rationale" => json!(example.inverse_rationale),
        "rand_rationale" => json!(example.noise_rationale),
        "has_rationale" => json!(u8::from(example.has_rationale)),
        _ => {
            return Err(RationalePrepError::InvalidData(format!("Unknown field {}", key)));
        }
    };
    Ok(value)
}

fn rows<T: DeserializeOwned>(value: &Value, multiple_choice: bool) -> Result<Vec<Vec<T>>> {
    if multiple_choice {
        Ok(serde_json::from_value(value.clone())?)
    } else {
        Ok(vec![serde_json::from_value(value.clone())?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(label: usize, rationale: &[f32]) -> AlignedExample {
        let n = rationale.len();
        AlignedExample {
            token_ids: (0..n as u32).collect(),
            attention_mask: vec![1; n],
            rationale: rationale.to_vec(),
            inverse_rationale: rationale.iter().map(|r| 1.0 - r).collect(),
            noise_rationale: vec![0.25; n],
            has_rationale: rationale.iter().any(|&r| r > 0.0),
            label,
        }
    }

    #[test]
    fn test_fields_restore_records() {
        let mut dict = DatasetDict::new(false);
        dict.push(Record { item_idx: 0, examples: vec![example(1, &[0.0, 1.0, 0.0])] });
        dict.push(Record { item_idx: 1, examples: vec![example(0, &[0.0, 0.0, 0.0])] });

        let fields: HashMap<String, Vec<Value>> = DATA_KEYS
            .iter()
            .map(|k| (k.to_string(), dict.field(k).unwrap()))
            .collect();
        assert_eq!(fields["has_rationale"], vec![json!(1), json!(0)]);
        assert_eq!(fields["label"], vec![json!(1), json!(0)]);

        let restored = DatasetDict::from_fields(fields).unwrap();
        assert_eq!(restored, dict);
    }

    #[test]
    fn test_multiple_choice_fields_nest() {
        let mut dict = DatasetDict::new(true);
        dict.push(Record {
            item_idx: 0,
            examples: vec![example(2, &[1.0, 0.0]), example(2, &[1.0, 0.0])],
        });

        let input_ids = dict.field("input_ids").unwrap();
        assert_eq!(input_ids[0], json!([[0, 1], [0, 1]]));
        assert_eq!(dict.field("has_rationale").unwrap()[0], json!([1, 1]));

        let fields: HashMap<String, Vec<Value>> = DATA_KEYS
            .iter()
            .map(|k| (k.to_string(), dict.field(k).unwrap()))
            .collect();
        let restored = DatasetDict::from_fields(fields).unwrap();
        assert!(restored.is_multiple_choice());
        assert_eq!(restored, dict);
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let mut dict = DatasetDict::new(false);
        dict.push(Record { item_idx: 0, examples: vec![example(0, &[1.0])] });
        let mut fields: HashMap<String, Vec<Value>> = DATA_KEYS
            .iter()
            .map(|k| (k.to_string(), dict.field(k).unwrap()))
            .collect();
        fields.remove("rand_rationale");
        assert!(DatasetDict::from_fields(fields).is_err());
    }

    #[test]
    fn test_select_reorders_and_reindexes() {
        let mut dict = DatasetDict::new(false);
        for label in [0, 1, 0] {
            dict.push(Record { item_idx: 99, examples: vec![example(label, &[1.0])] });
        }
        let selected = dict.select(&[2, 1]).unwrap();
        assert_eq!(selected.item_indices(), vec![2, 1]);
        assert_eq!(selected.labels(), vec![0, 1]);
        assert!(dict.select(&[3]).is_err());
    }

    #[test]
    fn test_stats() {
        let mut dict = DatasetDict::new(false);
        dict.push(Record { item_idx: 0, examples: vec![example(1, &[0.0, 1.0])] });
        dict.push(Record { item_idx: 1, examples: vec![example(1, &[0.0, 0.0, 0.0])] });
        assert_eq!(dict.actual_max_length(), 3);
        assert_eq!(dict.num_with_rationale(), 1);
        assert_eq!(dict.label_counts().get(&1), Some(&2));
    }
}
