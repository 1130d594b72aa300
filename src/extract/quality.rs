//! Extraction quality scoring.
//!
//! Three signals, each in \[0, 1\], averaged with fixed weights:
//! - **readability**: share of characters that are letters, digits,
//!   whitespace or ordinary punctuation
//! - **cleanliness**: one minus the (scaled) share of garbled tokens, such as
//!   mojibake, replacement characters, or symbol soup
//! - **word shape**: how plausible the word-length distribution is for prose

use serde::{Deserialize, Serialize};

/// Weight of the readability ratio.
pub const READABILITY_WEIGHT: f64 = 0.4;
/// Weight of the garbled-token signal.
pub const CLEANLINESS_WEIGHT: f64 = 0.3;
/// Weight of the word-length plausibility signal.
pub const WORD_SHAPE_WEIGHT: f64 = 0.3;

/// A garbled-token share of this much or more zeroes the cleanliness signal.
const GARBLED_SATURATION: f64 = 0.25;

/// Mean word length range considered normal prose.
const PLAUSIBLE_MEAN_LEN: (f64, f64) = (3.0, 8.0);

/// Share of one-letter tokens tolerated before word shape is penalized.
const SINGLE_CHAR_TOLERANCE: f64 = 0.1;

const READABLE_PUNCTUATION: &str = ".,!?;:'\"()[]{}-/&%$#@*+=<>_\u{2018}\u{2019}\u{201C}\u{201D}\u{2013}\u{2014}\u{2026}";

/// Byte sequences that only appear when UTF-8 was decoded as Latin-1/CP1252.
const MOJIBAKE_MARKERS: &[&str] = &["â€", "Ã©", "Ã¨", "Ã¼", "Ã¶", "Ã¤", "Â ", "ï¿½", "\u{FFFD}"];

/// Per-signal breakdown of a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub readability: f64,
    pub cleanliness: f64,
    pub word_shape: f64,
    /// Weighted combination, clamped to \[0, 1\].
    pub score: f64,
}

impl QualityBreakdown {
    fn zero() -> Self {
        Self {
            readability: 0.0,
            cleanliness: 0.0,
            word_shape: 0.0,
            score: 0.0,
        }
    }
}

/// Score normalized text. Empty text scores zero.
pub fn assess_quality(text: &str) -> QualityBreakdown {
    let total_chars = text.chars().count();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if total_chars == 0 || tokens.is_empty() {
        return QualityBreakdown::zero();
    }

    let readable = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || READABLE_PUNCTUATION.contains(*c))
        .count();
    let readability = readable as f64 / total_chars as f64;

    let garbled = tokens.iter().filter(|t| is_garbled(t)).count();
    let garbled_ratio = garbled as f64 / tokens.len() as f64;
    let cleanliness = 1.0 - (garbled_ratio / GARBLED_SATURATION).min(1.0);

    let word_shape = word_shape_score(&tokens);

    let score = (READABILITY_WEIGHT * readability
        + CLEANLINESS_WEIGHT * cleanliness
        + WORD_SHAPE_WEIGHT * word_shape)
        .clamp(0.0, 1.0);

    QualityBreakdown {
        readability,
        cleanliness,
        word_shape,
        score,
    }
}

/// Convenience wrapper returning only the combined score.
pub fn quality_score(text: &str) -> f64 {
    assess_quality(text).score
}

fn is_garbled(token: &str) -> bool {
    if MOJIBAKE_MARKERS.iter().any(|m| token.contains(m)) {
        return true;
    }
    if token.chars().any(|c| c.is_control()) {
        return true;
    }

    let len = token.chars().count();
    if len >= 4 {
        let odd = token
            .chars()
            .filter(|c| !c.is_alphanumeric() && !READABLE_PUNCTUATION.contains(*c))
            .count();
        if odd as f64 / len as f64 > 0.3 {
            return true;
        }
    }

    // Long ASCII letter runs without vowels are almost never words.
    let core: String = token.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if core.len() >= 6 && core.len() == len {
        let has_vowel = core
            .chars()
            .any(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y'));
        if !has_vowel {
            return true;
        }
    }
    false
}

fn word_shape_score(tokens: &[&str]) -> f64 {
    let lengths: Vec<usize> = tokens
        .iter()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).chars().count())
        .filter(|&l| l > 0)
        .collect();
    if lengths.is_empty() {
        return 0.0;
    }

    let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    let (lo, hi) = PLAUSIBLE_MEAN_LEN;
    let length_score = if mean < lo {
        ((mean - 1.0) / (lo - 1.0)).clamp(0.0, 1.0)
    } else if mean > hi {
        (1.0 - (mean - hi) / hi).clamp(0.0, 1.0)
    } else {
        1.0
    };

    // "t h e q u i c k" style OCR output: many isolated letters.
    let singles = tokens
        .iter()
        .filter(|t| {
            let mut chars = t.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
        })
        .count();
    let single_ratio = singles as f64 / tokens.len() as f64;
    let spacing_penalty = ((single_ratio - SINGLE_CHAR_TOLERANCE).max(0.0) * 2.0).min(1.0);

    length_score * (1.0 - spacing_penalty)
}
