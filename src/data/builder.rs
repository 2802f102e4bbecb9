use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::tokenizer::SpecialTokens;
use crate::{RationalePrepError, Result};

/// A run of subword ids with one rationale value per id
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub ids: Vec<u32>,
    pub rationale: Vec<f32>,
}

impl Segment {
    pub fn new(ids: Vec<u32>, rationale: Vec<f32>) -> Result<Self> {
        if ids.len() != rationale.len() {
            return Err(RationalePrepError::LengthMismatch {
                left: ids.len(),
                right: rationale.len(),
            });
        }
        Ok(Self { ids, rationale })
    }

    /// Segment with an all-zero rationale
    pub fn without_rationale(ids: Vec<u32>) -> Self {
        let rationale = vec![0.0; ids.len()];
        Self { ids, rationale }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn keep(&mut self, range: Range<usize>) {
        self.ids = self.ids[range.clone()].to_vec();
        self.rationale = self.rationale[range].to_vec();
    }
}

/// How an adapter shortens sequences that exceed the length budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Overlong sequences are an error
    None,
    /// Keep the prefix that fits
    Head,
    /// Cut one segment to the window that keeps its evidence
    EvidenceWindow { segment: usize },
}

/// Fixed-length example ready for training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedExample {
    pub token_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    pub rationale: Vec<f32>,
    pub inverse_rationale: Vec<f32>,
    pub noise_rationale: Vec<f32>,
    pub has_rationale: bool,
    pub label: usize,
}

impl AlignedExample {
    /// Number of real and marker positions
    pub fn num_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Window of `budget` entries that keeps evidence.
///
/// The prefix window is kept if it holds a positive rationale entry,
/// otherwise the suffix window.
pub fn evidence_window(rationale: &[f32], budget: usize) -> Range<usize> {
    let length = rationale.len().min(budget);
    if rationale[..length].iter().any(|&r| r > 0.0) {
        0..length
    } else {
        rationale.len() - length..rationale.len()
    }
}

/// Assembles padded fixed-length examples
#[derive(Debug, Clone)]
pub struct ExampleBuilder {
    max_length: usize,
    special: SpecialTokens,
    require_rationale: bool,
    forbid_unknown: bool,
}

impl ExampleBuilder {
    pub fn new(max_length: usize, special: SpecialTokens) -> Self {
        Self {
            max_length,
            special,
            require_rationale: false,
            forbid_unknown: false,
        }
    }

    /// Reject examples whose rationale is all zero
    pub fn require_rationale(mut self, require: bool) -> Self {
        self.require_rationale = require;
        self
    }

    /// Reject examples containing the unknown-token id
    pub fn forbid_unknown(mut self, forbid: bool) -> Self {
        self.forbid_unknown = forbid;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Real length of `segments` once markers are added
    pub fn sequence_length(segments: &[Segment]) -> usize {
        // one [CLS] plus a [SEP] after every segment
        segments.iter().map(Segment::len).sum::<usize>() + segments.len() + 1
    }

    /// Shorten `segments` in place so that they fit `max_length`
    pub fn truncate(&self, segments: &mut [Segment], policy: TruncationPolicy) -> Result<()> {
        let length = Self::sequence_length(segments);
        if length <= self.max_length {
            return Ok(());
        }

        match policy {
            TruncationPolicy::None => Ok(()),
            TruncationPolicy::Head => {
                let mut overflow = length - self.max_length;
                for segment in segments.iter_mut().rev() {
                    let cut = overflow.min(segment.len());
                    segment.keep(0..segment.len() - cut);
                    overflow -= cut;
                    if overflow == 0 {
                        break;
                    }
                }
                Ok(())
            }
            TruncationPolicy::EvidenceWindow { segment } => {
                if segment >= segments.len() {
                    return Err(RationalePrepError::InvalidData(format!(
                        "Truncation segment {} out of range for {} segments",
                        segment,
                        segments.len()
                    )));
                }
                let fixed = length - segments[segment].len();
                let budget = self.max_length.saturating_sub(fixed);
                if budget == 0 {
                    return Err(RationalePrepError::LengthBudgetExceeded {
                        length: fixed,
                        max_length: self.max_length,
                    });
                }
                let window = evidence_window(&segments[segment].rationale, budget);
                log::trace!(
                    "Truncating segment {} from {} to {:?}",
                    segment,
                    segments[segment].len(),
                    window
                );
                segments[segment].keep(window);
                Ok(())
            }
        }
    }

    /// Build one example: `[CLS] seg_0 [SEP] seg_1 [SEP] ... [PAD]*`
    pub fn build<R: Rng + ?Sized>(
        &self,
        segments: &[Segment],
        label: usize,
        rng: &mut R,
    ) -> Result<AlignedExample> {
        if segments.is_empty() {
            return Err(RationalePrepError::InvalidData(
                "An example needs at least one segment".to_string(),
            ));
        }
        for segment in segments {
            if segment.ids.len() != segment.rationale.len() {
                return Err(RationalePrepError::LengthMismatch {
                    left: segment.ids.len(),
                    right: segment.rationale.len(),
                });
            }
        }

        let num_tokens = Self::sequence_length(segments);
        if num_tokens > self.max_length {
            return Err(RationalePrepError::LengthBudgetExceeded {
                length: num_tokens,
                max_length: self.max_length,
            });
        }

        let mut token_ids = Vec::with_capacity(self.max_length);
        let mut rationale = Vec::with_capacity(self.max_length);
        token_ids.push(self.special.cls);
        rationale.push(0.0);
        for segment in segments {
            token_ids.extend_from_slice(&segment.ids);
            rationale.extend_from_slice(&segment.rationale);
            token_ids.push(self.special.sep);
            rationale.push(0.0);
        }

        if self.forbid_unknown {
            if let Some(&unk) = token_ids.iter().find(|&&id| id == self.special.unk) {
                return Err(RationalePrepError::UnknownToken(unk));
            }
        }

        token_ids.resize(self.max_length, self.special.pad);
        rationale.resize(self.max_length, 0.0);

        let mut attention_mask = vec![1u8; num_tokens];
        attention_mask.resize(self.max_length, 0);

        let has_rationale = rationale.iter().any(|&r| r > 0.0);
        if self.require_rationale && !has_rationale {
            return Err(RationalePrepError::EmptyRationale);
        }

        let inverse_rationale = rationale.iter().map(|&r| 1.0 - r).collect();
        let noise_rationale = (0..self.max_length)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();

        Ok(AlignedExample {
            token_ids,
            attention_mask,
            rationale,
            inverse_rationale,
            noise_rationale,
            has_rationale,
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn special() -> SpecialTokens {
        SpecialTokens {
            cls: 101,
            sep: 102,
            pad: 0,
            unk: 100,
            sep_token: "[SEP]".to_string(),
        }
    }

    fn segment(ids: &[u32], rationale: &[f32]) -> Segment {
        Segment::new(ids.to_vec(), rationale.to_vec()).unwrap()
    }

    #[test]
    fn test_single_segment_layout() {
        let builder = ExampleBuilder::new(8, special());
        let mut rng = StdRng::seed_from_u64(0);
        let example = builder
            .build(&[segment(&[5, 6, 7], &[0.0, 1.0, 0.0])], 1, &mut rng)
            .unwrap();

        assert_eq!(example.token_ids, vec![101, 5, 6, 7, 102, 0, 0, 0]);
        assert_eq!(example.attention_mask, vec![1, 1, 1, 1, 1, 0, 0, 0]);
        assert_eq!(example.rationale, vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(example.noise_rationale.len(), 8);
        assert!(example.has_rationale);
        assert_eq!(example.label, 1);
        assert_eq!(example.num_tokens(), 5);
        for (r, inv) in example.rationale.iter().zip(&example.inverse_rationale) {
            assert_eq!(*inv, 1.0 - r);
        }
    }

    #[test]
    fn test_pair_layout() {
        let builder = ExampleBuilder::new(8, special());
        let mut rng = StdRng::seed_from_u64(0);
        let example = builder
            .build(
                &[segment(&[5, 6], &[1.0, 1.0]), segment(&[7], &[0.0])],
                0,
                &mut rng,
            )
            .unwrap();

        assert_eq!(example.token_ids, vec![101, 5, 6, 102, 7, 102, 0, 0]);
        assert_eq!(example.rationale, vec![0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(example.attention_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_exact_fit_has_no_padding() {
        let builder = ExampleBuilder::new(4, special());
        let mut rng = StdRng::seed_from_u64(0);
        let example = builder
            .build(&[segment(&[5, 6], &[1.0, 0.0])], 0, &mut rng)
            .unwrap();
        assert_eq!(example.token_ids, vec![101, 5, 6, 102]);
        assert!(example.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_empty_rationale_rejected_when_required() {
        let builder = ExampleBuilder::new(8, special()).require_rationale(true);
        let mut rng = StdRng::seed_from_u64(0);
        let err = builder
            .build(&[segment(&[5, 6], &[0.0, 0.0])], 0, &mut rng)
            .unwrap_err();
        assert!(matches!(err, RationalePrepError::EmptyRationale));
    }

    #[test]
    fn test_empty_rationale_allowed_otherwise() {
        let builder = ExampleBuilder::new(8, special());
        let mut rng = StdRng::seed_from_u64(0);
        let example = builder
            .build(&[Segment::without_rationale(vec![5, 6])], 0, &mut rng)
            .unwrap();
        assert!(!example.has_rationale);
        assert!(example.inverse_rationale.iter().all(|&r| r == 1.0));
    }

    #[test]
    fn test_length_budget_exceeded() {
        let builder = ExampleBuilder::new(4, special());
        let mut rng = StdRng::seed_from_u64(0);
        let err = builder
            .build(&[segment(&[5, 6, 7], &[1.0, 1.0, 1.0])], 0, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            RationalePrepError::LengthBudgetExceeded { length: 5, max_length: 4 }
        ));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let builder = ExampleBuilder::new(8, special()).forbid_unknown(true);
        let mut rng = StdRng::seed_from_u64(0);
        let err = builder
            .build(&[segment(&[5, 100], &[1.0, 0.0])], 0, &mut rng)
            .unwrap_err();
        assert!(matches!(err, RationalePrepError::UnknownToken(100)));
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let builder = ExampleBuilder::new(8, special());
        let segments = [segment(&[5, 6, 7], &[0.0, 1.0, 0.0])];

        let a = builder.build(&segments, 1, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = builder.build(&segments, 1, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);

        let c = builder.build(&segments, 1, &mut StdRng::seed_from_u64(8)).unwrap();
        assert_eq!(a.token_ids, c.token_ids);
        assert_eq!(a.rationale, c.rationale);
        assert_ne!(a.noise_rationale, c.noise_rationale);
    }

    #[test]
    fn test_noise_is_fresh_per_example() {
        let builder = ExampleBuilder::new(8, special());
        let mut rng = StdRng::seed_from_u64(3);
        let segments = [segment(&[5], &[1.0])];
        let first = builder.build(&segments, 0, &mut rng).unwrap();
        let second = builder.build(&segments, 0, &mut rng).unwrap();
        assert_ne!(first.noise_rationale, second.noise_rationale);
    }

    #[test]
    fn test_evidence_window_prefers_prefix() {
        let rationale = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        assert_eq!(evidence_window(&rationale, 3), 0..3);
    }

    #[test]
    fn test_evidence_window_falls_back_to_suffix() {
        let mut rationale = vec![0.0; 12];
        rationale[10] = 1.0;
        assert_eq!(evidence_window(&rationale, 6), 6..12);
    }

    #[test]
    fn test_evidence_window_short_input_is_untouched() {
        assert_eq!(evidence_window(&[0.0, 1.0], 10), 0..2);
    }

    #[test]
    fn test_truncate_keeps_suffix_with_evidence() {
        let builder = ExampleBuilder::new(8, special());
        let ids: Vec<u32> = (1..=12).collect();
        let mut rationale = vec![0.0; 12];
        rationale[9] = 1.0;
        let mut segments = vec![Segment::new(ids, rationale).unwrap()];

        builder
            .truncate(&mut segments, TruncationPolicy::EvidenceWindow { segment: 0 })
            .unwrap();
        assert_eq!(segments[0].ids, vec![7, 8, 9, 10, 11, 12]);
        assert_eq!(segments[0].rationale, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        let mut rng = StdRng::seed_from_u64(0);
        let example = builder.build(&segments, 0, &mut rng).unwrap();
        assert_eq!(example.token_ids.len(), 8);
    }

    #[test]
    fn test_truncate_evidence_window_accounts_for_other_segments() {
        let builder = ExampleBuilder::new(10, special());
        let mut segments = vec![
            segment(&[1, 2, 3, 4, 5, 6, 7, 8], &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            segment(&[20, 21], &[0.0, 0.0]),
        ];
        builder
            .truncate(&mut segments, TruncationPolicy::EvidenceWindow { segment: 0 })
            .unwrap();
        assert_eq!(segments[0].ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(ExampleBuilder::sequence_length(&segments), 10);
    }

    #[test]
    fn test_truncate_evidence_window_without_budget() {
        let builder = ExampleBuilder::new(4, special());
        let mut segments = vec![segment(&[1, 2], &[1.0, 0.0]), segment(&[20, 21], &[0.0, 0.0])];
        let err = builder
            .truncate(&mut segments, TruncationPolicy::EvidenceWindow { segment: 0 })
            .unwrap_err();
        assert!(matches!(err, RationalePrepError::LengthBudgetExceeded { .. }));
    }

    #[test]
    fn test_truncate_head() {
        let builder = ExampleBuilder::new(5, special());
        let mut segments = vec![Segment::without_rationale(vec![1, 2, 3, 4, 5])];
        builder.truncate(&mut segments, TruncationPolicy::Head).unwrap();
        assert_eq!(segments[0].ids, vec![1, 2, 3]);
    }
}
