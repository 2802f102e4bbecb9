use crate::tokenizer::SubwordTokenizer;
use crate::{RationalePrepError, Result};

/// Pad a word-level rationale with zeros up to `num_words`.
///
/// Some upstream annotations drop the value for the final word, so a short
/// rationale is tolerated and zero-filled. A rationale longer than the word
/// list is an error.
pub fn pad_word_rationale(num_words: usize, rationale: &[f32]) -> Result<Vec<f32>> {
    if rationale.len() > num_words {
        return Err(RationalePrepError::RationaleTooLong {
            words: num_words,
            rationale: rationale.len(),
        });
    }

    let missing = num_words - rationale.len();
    if missing > 1 {
        log::debug!("Rationale is missing {} trailing words, padding with zeros", missing);
    }

    let mut padded = rationale.to_vec();
    padded.resize(num_words, 0.0);
    Ok(padded)
}

/// Map a word-level rationale onto subword pieces.
///
/// Each word greedily consumes consecutive pieces. Characters of a piece that
/// match the next unconsumed character of the word are taken, everything else
/// (continuation markers, normalisation artefacts) is skipped. Every piece
/// touched for a word receives that word's rationale value.
pub fn align_pieces<S: AsRef<str>>(
    pieces: &[String],
    words: &[S],
    word_rationale: &[f32],
) -> Result<Vec<f32>> {
    if words.len() != word_rationale.len() {
        return Err(RationalePrepError::LengthMismatch {
            left: words.len(),
            right: word_rationale.len(),
        });
    }

    let mut rationale = Vec::with_capacity(pieces.len());
    let mut j = 0;

    for (i, (word, &value)) in words.iter().zip(word_rationale).enumerate() {
        let word = word.as_ref();
        let mut remaining = word.chars().peekable();
        let mut reconstructed = String::with_capacity(word.len());

        while remaining.peek().is_some() {
            let Some(piece) = pieces.get(j) else {
                return Err(RationalePrepError::AlignmentMismatch {
                    word_index: i,
                    expected: word.to_string(),
                    reconstructed,
                });
            };

            for ch in piece.chars() {
                if remaining.peek() == Some(&ch) {
                    remaining.next();
                    reconstructed.push(ch);
                }
            }

            rationale.push(value);
            j += 1;
        }

        if reconstructed != word {
            return Err(RationalePrepError::AlignmentMismatch {
                word_index: i,
                expected: word.to_string(),
                reconstructed,
            });
        }
    }

    if rationale.len() != pieces.len() {
        return Err(RationalePrepError::LengthMismatch {
            left: pieces.len(),
            right: rationale.len(),
        });
    }

    Ok(rationale)
}

/// Align a word-level rationale to the subword ids produced for the same text
pub fn align_rationale_with_tokens<T: SubwordTokenizer + ?Sized, S: AsRef<str>>(
    tokenizer: &T,
    ids: &[u32],
    words: &[S],
    word_rationale: &[f32],
) -> Result<Vec<f32>> {
    let pieces = tokenizer.convert_ids_to_tokens(ids)?;
    align_pieces(&pieces, words, word_rationale)
}
