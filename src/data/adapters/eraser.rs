use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};

use super::{DatasetAdapter, RawExample, RawInstance, RawLabel};
use crate::config::{Dataset, Split};
use crate::data::builder::TruncationPolicy;

/// Separator between answer candidates in CoS-E queries
const ANSWER_SEPARATOR: &str = " [sep] ";

#[derive(Debug, Clone, Deserialize)]
struct Evidence {
    docid: String,
    #[serde(default)]
    start_token: Option<i64>,
    #[serde(default)]
    end_token: Option<i64>,
    #[serde(default)]
    start_sentence: Option<i64>,
    #[serde(default)]
    end_sentence: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    annotation_id: String,
    classification: String,
    #[serde(default)]
    evidences: Vec<Vec<Evidence>>,
    #[serde(default)]
    query: String,
    #[serde(default)]
    docids: Option<Vec<String>>,
}

impl Annotation {
    fn evidences_for<'a>(&'a self, docid: &'a str) -> impl Iterator<Item = &'a Evidence> + 'a {
        self.evidences.iter().flatten().filter(move |e| e.docid == docid)
    }

    /// Document the annotation refers to when there is only one
    fn primary_docid(&self) -> &str {
        self.evidences
            .iter()
            .flatten()
            .map(|e| e.docid.as_str())
            .next()
            .or_else(|| self.docids.as_ref().and_then(|d| d.first()).map(String::as_str))
            .unwrap_or(&self.annotation_id)
    }
}

/// Granularity of the gold evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvidenceLevel {
    Token,
    Sentence,
}

/// Whitespace-tokenised document, one sentence per line
#[derive(Debug, Clone)]
struct Document {
    sentences: Vec<Vec<String>>,
}

impl Document {
    fn parse(content: &str) -> Self {
        let sentences = content
            .lines()
            .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|sentence| !sentence.is_empty())
            .collect();
        Self { sentences }
    }

    fn words(&self) -> Vec<String> {
        self.sentences.iter().flatten().cloned().collect()
    }

    fn num_words(&self) -> usize {
        self.sentences.iter().map(Vec::len).sum()
    }

    /// Word range covered by each sentence
    fn sentence_spans(&self) -> Vec<(usize, usize)> {
        let mut start = 0;
        self.sentences
            .iter()
            .map(|sentence| {
                let span = (start, start + sentence.len());
                start += sentence.len();
                span
            })
            .collect()
    }

    /// Word-level rationale marking every evidence span
    fn rationale<'a>(&self, evidences: impl Iterator<Item = &'a Evidence>, level: EvidenceLevel) -> Vec<f32> {
        let total = self.num_words();
        let spans = self.sentence_spans();
        let mut rationale = vec![0.0; total];

        for evidence in evidences {
            let token_range = match (evidence.start_token, evidence.end_token) {
                (Some(s), Some(e)) if s >= 0 && e > s => Some((s as usize, (e as usize).min(total))),
                _ => None,
            };

            let word_range = match level {
                EvidenceLevel::Token => token_range,
                EvidenceLevel::Sentence => {
                    let sentence_range = match (evidence.start_sentence, evidence.end_sentence) {
                        (Some(s), Some(e)) if s >= 0 && e > s => Some((s as usize, (e as usize).min(spans.len()))),
                        // derive the sentences from the token span
                        _ => token_range.map(|(ts, te)| {
                            let first = spans.iter().position(|&(_, end)| end > ts).unwrap_or(spans.len());
                            let last = spans.iter().rposition(|&(start, _)| start < te).map_or(first, |l| l + 1);
                            (first, last.max(first))
                        }),
                    };
                    sentence_range
                        .filter(|(s, e)| s < e)
                        .map(|(s, e)| (spans[s].0, spans[e - 1].1))
                }
            };

            if let Some((start, end)) = word_range {
                for value in rationale.iter_mut().take(end).skip(start) {
                    *value = 1.0;
                }
            }
        }
        rationale
    }
}

/// ERASER benchmark datasets: `docs/<docid>` plus `<split>.jsonl` annotations
pub struct EraserAdapter {
    dataset: Dataset,
    root: PathBuf,
    annotations_path: PathBuf,
    classes: Vec<String>,
}

impl EraserAdapter {
    pub fn new(data_dir: &Path, dataset: Dataset, split: Split, classes: Vec<String>) -> Self {
        let root = data_dir.join("eraser").join(dataset.as_str());
        let annotations_path = root.join(format!("{}.jsonl", split.eraser_name()));
        Self {
            dataset,
            root,
            annotations_path,
            classes,
        }
    }

    fn load_annotations(&self) -> Result<Vec<Annotation>> {
        let content = fs::read_to_string(&self.annotations_path).with_context(|| {
            format!("Failed to read annotations: {}", self.annotations_path.display())
        })?;
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!(
                        "Failed to parse line {} of {}",
                        line_no + 1,
                        self.annotations_path.display()
                    )
                })
            })
            .collect()
    }

    fn document<'a>(&self, cache: &'a mut HashMap<String, Document>, docid: &str) -> Result<&'a Document> {
        match cache.entry(docid.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.root.join("docs").join(docid);
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read document: {}", path.display()))?;
                Ok(entry.insert(Document::parse(&content)))
            }
        }
    }

    fn evidence_level(&self) -> EvidenceLevel {
        match self.dataset {
            Dataset::Fever | Dataset::MultiRc => EvidenceLevel::Sentence,
            _ => EvidenceLevel::Token,
        }
    }

    /// Segment for one document with its evidence marked
    fn document_segment(
        &self,
        cache: &mut HashMap<String, Document>,
        annotation: &Annotation,
        docid: &str,
    ) -> Result<RawExample> {
        let level = self.evidence_level();
        let doc = self.document(cache, docid)?;
        let rationale = doc.rationale(annotation.evidences_for(docid), level);
        Ok(RawExample::from_words(doc.words(), &rationale)?)
    }

    fn label(&self, annotation: &Annotation) -> Result<usize> {
        Ok(RawLabel::Name(annotation.classification.clone()).resolve(&self.classes)?)
    }

    fn instance(&self, cache: &mut HashMap<String, Document>, annotation: &Annotation) -> Result<RawInstance> {
        match self.dataset {
            Dataset::Esnli => {
                let mut segments = Vec::with_capacity(2);
                for part in ["premise", "hypothesis"] {
                    let docid = format!("{}_{}", annotation.annotation_id, part);
                    segments.push(self.document_segment(cache, annotation, &docid)?);
                }
                Ok(RawInstance {
                    label: self.label(annotation)?,
                    segments,
                    choices: Vec::new(),
                })
            }
            Dataset::Fever | Dataset::MultiRc => {
                let evidence = self.document_segment(cache, annotation, annotation.primary_docid())?;
                Ok(RawInstance {
                    label: self.label(annotation)?,
                    segments: vec![evidence, RawExample::without_rationale(&annotation.query)],
                    choices: Vec::new(),
                })
            }
            Dataset::Movies => {
                let review = self.document_segment(cache, annotation, annotation.primary_docid())?;
                Ok(RawInstance::single(self.label(annotation)?, review))
            }
            Dataset::Cose => {
                let question = self.document_segment(cache, annotation, &annotation.annotation_id)?;
                let mut words = vec!["Q:".to_string()];
                words.extend(question.word_tokens);
                let mut rationale = vec![0.0];
                rationale.extend(question.word_rationale);
                let question = RawExample::from_words(words, &rationale)?;

                let answers: Vec<&str> = annotation.query.split(ANSWER_SEPARATOR).collect();
                let label = match answers.iter().position(|a| *a == annotation.classification) {
                    Some(position) => position,
                    None => self.label(annotation)?,
                };
                let choices = answers
                    .iter()
                    .map(|answer| RawExample::without_rationale(&format!("A: {}", answer)))
                    .collect();

                Ok(RawInstance {
                    label,
                    segments: vec![question],
                    choices,
                })
            }
            other => bail!("{} is not an ERASER dataset", other),
        }
    }
}

impl DatasetAdapter for EraserAdapter {
    fn dataset(&self) -> Dataset {
        self.dataset
    }

    fn extract_raw_examples(&self) -> Result<Vec<RawInstance>> {
        let annotations = self.load_annotations()?;
        log::info!(
            "Loaded {} annotations from {}",
            annotations.len(),
            self.annotations_path.display()
        );

        let mut cache = HashMap::new();
        let instances = annotations
            .iter()
            .map(|annotation| {
                self.instance(&mut cache, annotation)
                    .with_context(|| format!("Annotation {}", annotation.annotation_id))
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("Loaded {} documents", cache.len());

        if instances.is_empty() {
            return Err(anyhow!("No annotations found in {}", self.annotations_path.display()));
        }
        Ok(instances)
    }

    fn truncation(&self) -> TruncationPolicy {
        match self.dataset {
            Dataset::Fever | Dataset::Movies => TruncationPolicy::EvidenceWindow { segment: 0 },
            _ => TruncationPolicy::None,
        }
    }

    fn requires_rationale(&self) -> bool {
        true
    }

    fn forbid_unknown(&self) -> bool {
        self.dataset == Dataset::Esnli
    }
}
