//! Shared tokenization helpers for the analysis stages.

use std::sync::LazyLock;

use regex::Regex;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by", "from", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "may", "might", "shall", "can", "this", "that", "these", "those",
    "it", "its", "he", "she", "they", "we", "you", "his", "her", "their",
    "my", "your", "our", "not", "no", "so", "if", "as", "up", "out", "about",
    "into", "over", "after", "than", "then", "just", "also", "very", "quite",
    "rather", "some", "any", "each", "all", "more", "most", "such", "only",
    "same", "other", "own", "there", "here", "when", "where", "which", "while",
    "what", "who", "whom", "whose", "why", "how", "him", "them", "me", "us",
    "i", "one", "two", "upon", "before", "because", "through", "between",
    "under", "again", "further", "once", "both", "few", "many", "much", "now",
    "even", "still", "yet", "ever", "never", "always", "often", "every",
    "said", "says", "like", "well", "back", "down", "off", "too", "way",
    "make", "made", "get", "got", "see", "seen", "use", "used", "using",
    "within", "without", "during", "against", "among", "whether", "though",
    "although", "however", "therefore", "thus", "hence", "since", "until",
];

/// Verb and noun stems that mark a term as procedural.
const PROCEDURAL_STEMS: &[&str] = &[
    "install", "configur", "verif", "setup", "deploy", "compil", "execut",
    "build", "restart", "enabl", "disabl", "upgrad", "updat", "download",
    "connect", "initializ", "authenticat", "migrat", "backup", "restor",
    "validat", "test", "debug", "monitor", "launch", "uninstall", "mount",
    "format", "register", "provision", "select", "click", "step", "procedur",
];

static RE_CHAPTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(chapter|section|part|appendix|book|lesson|step)\s+([0-9]+|[ivxlc]+)\b").unwrap()
});

static RE_TEMPORAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(1[0-9]{3}|20[0-9]{2})s?\b|\b[0-9]{1,2}(st|nd|rd|th)\s+century\b").unwrap()
});

/// Whether `word` (any case) is a stop word.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

/// Whether a lowercase term names an action or procedure.
pub fn is_procedural(term: &str) -> bool {
    PROCEDURAL_STEMS
        .iter()
        .any(|stem| term.starts_with(stem) && term.len() - stem.len() <= 5)
}

/// Whether a term is a year or century reference.
pub fn is_temporal(term: &str) -> bool {
    RE_TEMPORAL.is_match(term)
}

/// All temporal references in `text`, lowercased, in order of appearance.
pub fn temporal_refs(text: &str) -> Vec<String> {
    RE_TEMPORAL
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Strip surrounding punctuation, keeping inner hyphens and apostrophes.
pub fn trim_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Lowercase content words of `text`: at least three characters, not a stop
/// word, not a bare number unless it looks like a year.
pub fn content_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| trim_word(w).to_lowercase())
        .map(|w| w.strip_suffix("'s").map(str::to_string).unwrap_or(w))
        .filter(|w| w.chars().count() >= 3)
        .filter(|w| !is_stopword(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()) || is_temporal(w))
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .collect()
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Capitalized word sequences that are not merely sentence-initial.
///
/// Runs of up to four capitalized words are joined ("Node Manager",
/// "Carl Gustav Jung"). A run that starts a sentence is kept only when it is
/// longer than one word. Stop words are never part of a run.
pub fn capitalized_sequences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut run_at_start = false;
    let mut sentence_start = true;

    let flush = |run: &mut Vec<&str>, at_start: bool, out: &mut Vec<String>| {
        if !run.is_empty() && (!at_start || run.len() > 1) {
            out.push(run.join(" "));
        }
        run.clear();
    };

    for raw in text.split_whitespace() {
        let word = trim_word(raw);
        let capitalized = word.chars().count() > 1
            && starts_uppercase(word)
            && !is_stopword(word)
            && word.chars().any(|c| c.is_lowercase());

        if capitalized && run.len() < 4 {
            if run.is_empty() {
                run_at_start = sentence_start;
            }
            run.push(word);
        } else {
            flush(&mut run, run_at_start, &mut out);
            if capitalized {
                run_at_start = sentence_start;
                run.push(word);
            }
        }

        let ends_sentence = raw.ends_with(['.', '!', '?', ':']) || raw.ends_with(".\"");
        if ends_sentence || raw.ends_with([',', ';']) {
            flush(&mut run, run_at_start, &mut out);
        }
        sentence_start = ends_sentence;
    }
    flush(&mut run, run_at_start, &mut out);
    out
}

/// Heading markers that need no further context: markdown `#`, "Chapter N"
/// style prefixes, or an all-caps line.
pub fn is_marked_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.chars().count() > 100 {
        return false;
    }
    if line.starts_with('#') {
        return true;
    }
    if RE_CHAPTER_MARKER.is_match(line) {
        return true;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 3
        && letters.iter().all(|c| c.is_uppercase())
        && line.split_whitespace().count() <= 10
}

/// A line shaped like a heading: short, no sentence punctuation at the end,
/// starting with an uppercase letter or a digit.
///
/// Only meaningful for a line standing alone; the first line of a
/// hard-wrapped paragraph also matches.
pub fn looks_like_heading(line: &str) -> bool {
    let line = line.trim();
    if is_marked_heading(line) {
        return true;
    }
    let words = line.split_whitespace().count();
    if words == 0 || words > 10 || line.chars().count() > 80 {
        return false;
    }
    if line.ends_with(['.', ',', ';', '!', '?', '"', ')']) {
        return false;
    }
    if has_inner_sentence_break(line) {
        return false;
    }
    line.chars()
        .next()
        .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
}

/// `.`, `!` or `?` followed by a space, other than after a section number
/// ("2. Setup", "3.1. Scope").
fn has_inner_sentence_break(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    chars.windows(2).enumerate().any(|(i, w)| {
        matches!(w[0], '.' | '!' | '?')
            && w[1] == ' '
            && !(w[0] == '.' && i > 0 && chars[i - 1].is_ascii_digit())
    })
}

/// Lowercase "chapter 3" style marker at the start of a title, if any.
pub fn chapter_marker(title: &str) -> Option<String> {
    RE_CHAPTER_MARKER
        .captures(heading_text(title).as_str())
        .map(|c| format!("{} {}", c[1].to_lowercase(), c[2].to_lowercase()))
}

/// Whether lowercase `haystack` contains lowercase `phrase` on word
/// boundaries.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Clean heading text for display: strips markdown markers.
pub fn heading_text(line: &str) -> String {
    line.trim().trim_start_matches('#').trim().to_string()
}

/// The first `n` words of `text`, joined by single spaces.
pub fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}
