//! Text normalization applied to every strategy's raw output.
//!
//! The result is what quality scoring, chunking and all later stages see:
//! - NFKC (folds ligatures and full-width forms from PDFs)
//! - line endings unified, form feeds turned into paragraph breaks
//! - control characters dropped, tabs turned into spaces
//! - words hyphenated across a line break rejoined
//! - runs of spaces collapsed, lines trimmed
//! - at most one blank line between paragraphs

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static RE_HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{Ll})-\n[ \t]*(\p{Ll})").unwrap());

static RE_BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalize raw extracted text.
pub fn normalize_text(raw: &str) -> String {
    let folded: String = raw.nfkc().collect();

    let unified = folded
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\x0C', "\n\n");

    let cleaned: String = unified
        .chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            c if c.is_control() => None,
            // Zero-width and BOM characters carry no text.
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => None,
            c => Some(c),
        })
        .collect();

    let joined = RE_HYPHEN_BREAK.replace_all(&cleaned, "$1$2");

    let lines: Vec<String> = joined
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let joined_lines = lines.join("\n");
    let collapsed = RE_BLANK_RUN.replace_all(&joined_lines, "\n\n");
    collapsed.trim().to_string()
}

/// Number of non-whitespace characters.
pub fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
