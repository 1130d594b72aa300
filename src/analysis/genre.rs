//! Genre classification.
//!
//! Text is scored against a fixed table of content-type profiles. A profile's
//! score is its keyword frequency (per thousand words, longer keywords
//! counting more) plus weighted structural cues: dialogue, citations,
//! procedural markers, code-like symbols, dates and figures. The highest
//! score wins; ties go to the profile listed first. Confidence is the
//! winning score over the sum of all scores.
//!
//! The selected profile also decides how concepts are boosted, how edge
//! reasons are worded, and whether edges carry a reading order.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::text::{capitalized_sequences, temporal_refs};
use crate::model::{ChunkFeatures, ConceptKind};

/// Coarse content classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Narrative,
    Technical,
    Procedural,
    Scientific,
    Historical,
    Business,
    Philosophical,
    Medical,
    SelfHelp,
    Religious,
    Reference,
    /// No profile matched at all.
    General,
}

impl Genre {
    pub fn as_str(&self) -> &'static str {
        self.profile().name
    }

    pub fn profile(&self) -> &'static GenreProfile {
        PROFILES
            .iter()
            .find(|p| p.genre == *self)
            .unwrap_or(&GENERAL)
    }
}

impl std::fmt::Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic flavour of an edge, taken from the document's genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "narrative_connection")]
    Narrative,
    #[serde(rename = "conceptual_dependency")]
    Conceptual,
    #[serde(rename = "procedural_sequence")]
    Procedural,
    #[serde(rename = "evidential_support")]
    Evidential,
    #[serde(rename = "chronological_relationship")]
    Chronological,
    #[serde(rename = "strategic_connection")]
    Strategic,
    #[serde(rename = "thematic_relationship")]
    Thematic,
    #[serde(rename = "cross_reference")]
    CrossReference,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Narrative => "narrative_connection",
            Self::Conceptual => "conceptual_dependency",
            Self::Procedural => "procedural_sequence",
            Self::Evidential => "evidential_support",
            Self::Chronological => "chronological_relationship",
            Self::Strategic => "strategic_connection",
            Self::Thematic => "thematic_relationship",
            Self::CrossReference => "cross_reference",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Weights applied to structural cue densities (per thousand words).
#[derive(Debug, Clone, Copy, Default)]
pub struct CueWeights {
    pub dialogue: f64,
    pub citation: f64,
    pub procedural: f64,
    pub symbol: f64,
    pub temporal: f64,
    pub quantitative: f64,
}

/// Multiplicative concept boosts per concept kind.
#[derive(Debug, Clone, Copy)]
pub struct ConceptBoosts {
    pub term: f64,
    pub entity: f64,
    pub procedural: f64,
    pub temporal: f64,
}

impl ConceptBoosts {
    pub const NEUTRAL: ConceptBoosts = ConceptBoosts {
        term: 1.0,
        entity: 1.0,
        procedural: 1.0,
        temporal: 1.0,
    };

    pub fn for_kind(&self, kind: ConceptKind) -> f64 {
        match kind {
            ConceptKind::Term => self.term,
            ConceptKind::Entity => self.entity,
            ConceptKind::Procedural => self.procedural,
            ConceptKind::Temporal => self.temporal,
        }
    }
}

/// One content-type profile.
#[derive(Debug)]
pub struct GenreProfile {
    pub genre: Genre,
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub cues: CueWeights,
    pub boosts: ConceptBoosts,
    /// Sections can be read in any order (reference works).
    pub order_agnostic: bool,
    /// Lead-in of edge reasons.
    pub reason_prefix: &'static str,
    pub relationship: RelationshipKind,
}

const NO_CUES: CueWeights = CueWeights {
    dialogue: 0.0,
    citation: 0.0,
    procedural: 0.0,
    symbol: 0.0,
    temporal: 0.0,
    quantitative: 0.0,
};

/// Profiles in priority order; earlier entries win ties.
pub static PROFILES: [GenreProfile; 11] = [
    GenreProfile {
        genre: Genre::Narrative,
        name: "narrative",
        keywords: &[
            "said", "asked", "replied", "whispered", "shouted", "looked", "felt", "smiled",
            "walked", "eyes", "heart", "night", "door", "suddenly", "herself", "himself",
            "remembered", "mother", "father", "room", "laughed", "stared",
        ],
        cues: CueWeights {
            dialogue: 0.5,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.0,
            entity: 1.5,
            procedural: 0.9,
            temporal: 1.1,
        },
        order_agnostic: false,
        reason_prefix: "Shared characters and events",
        relationship: RelationshipKind::Narrative,
    },
    GenreProfile {
        genre: Genre::Technical,
        name: "technical",
        keywords: &[
            "install", "installation", "configure", "configuration", "server", "system",
            "software", "command", "file", "directory", "database", "api", "interface",
            "function", "parameter", "version", "network", "module", "package", "deploy",
            "settings", "verify", "service", "client", "debug", "compile", "code", "runtime",
        ],
        cues: CueWeights {
            procedural: 0.2,
            symbol: 0.2,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.0,
            entity: 1.1,
            procedural: 1.5,
            temporal: 0.9,
        },
        order_agnostic: false,
        reason_prefix: "Related concepts",
        relationship: RelationshipKind::Conceptual,
    },
    GenreProfile {
        genre: Genre::Procedural,
        name: "procedural",
        keywords: &[
            "step", "steps", "click", "select", "press", "enter", "procedure", "instructions",
            "follow", "ensure", "repeat", "checklist", "finally", "next", "complete", "open",
        ],
        cues: CueWeights {
            procedural: 0.6,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.0,
            entity: 1.0,
            procedural: 1.6,
            temporal: 0.9,
        },
        order_agnostic: false,
        reason_prefix: "Connected steps",
        relationship: RelationshipKind::Procedural,
    },
    GenreProfile {
        genre: Genre::Scientific,
        name: "scientific",
        keywords: &[
            "hypothesis", "experiment", "data", "results", "analysis", "study", "method",
            "methods", "evidence", "observed", "significant", "sample", "theory", "research",
            "measured", "variable", "findings", "correlation", "laboratory",
        ],
        cues: CueWeights {
            citation: 1.0,
            quantitative: 0.3,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.2,
            entity: 1.1,
            procedural: 1.0,
            temporal: 1.0,
        },
        order_agnostic: false,
        reason_prefix: "Shared concepts",
        relationship: RelationshipKind::Evidential,
    },
    GenreProfile {
        genre: Genre::Historical,
        name: "historical",
        keywords: &[
            "century", "war", "empire", "king", "queen", "revolution", "ancient", "dynasty",
            "era", "historical", "history", "reign", "battle", "treaty", "colonial",
            "medieval", "emperor", "kingdom",
        ],
        cues: CueWeights {
            temporal: 0.6,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.0,
            entity: 1.4,
            procedural: 0.9,
            temporal: 1.5,
        },
        order_agnostic: false,
        reason_prefix: "Connected topics",
        relationship: RelationshipKind::Chronological,
    },
    GenreProfile {
        genre: Genre::Business,
        name: "business",
        keywords: &[
            "market", "revenue", "customer", "customers", "strategy", "growth", "profit",
            "company", "sales", "management", "investment", "business", "competitive",
            "stakeholders", "budget", "product", "leadership", "quarter",
        ],
        cues: CueWeights {
            quantitative: 0.4,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.1,
            entity: 1.3,
            procedural: 1.1,
            temporal: 1.0,
        },
        order_agnostic: false,
        reason_prefix: "Strategic link",
        relationship: RelationshipKind::Strategic,
    },
    GenreProfile {
        genre: Genre::Philosophical,
        name: "philosophical",
        keywords: &[
            "consciousness", "existence", "truth", "reason", "ethics", "moral", "knowledge",
            "mind", "reality", "metaphysics", "virtue", "meaning", "philosophy", "argument",
            "essence", "being", "soul", "wisdom",
        ],
        cues: NO_CUES,
        boosts: ConceptBoosts {
            term: 1.3,
            entity: 1.2,
            procedural: 0.9,
            temporal: 1.0,
        },
        order_agnostic: false,
        reason_prefix: "Shared ideas",
        relationship: RelationshipKind::Conceptual,
    },
    GenreProfile {
        genre: Genre::Medical,
        name: "medical",
        keywords: &[
            "patient", "patients", "treatment", "diagnosis", "symptoms", "disease", "clinical",
            "therapy", "dose", "medication", "chronic", "acute", "syndrome", "infection",
            "surgery", "physician", "prognosis",
        ],
        cues: CueWeights {
            quantitative: 0.1,
            ..NO_CUES
        },
        boosts: ConceptBoosts {
            term: 1.2,
            entity: 1.1,
            procedural: 1.2,
            temporal: 1.0,
        },
        order_agnostic: false,
        reason_prefix: "Related clinical concepts",
        relationship: RelationshipKind::Conceptual,
    },
    GenreProfile {
        genre: Genre::SelfHelp,
        name: "self_help",
        keywords: &[
            "habit", "habits", "goals", "success", "mindset", "motivation", "yourself",
            "confidence", "happiness", "productivity", "achieve", "potential", "believe",
            "growth", "purpose",
        ],
        cues: NO_CUES,
        boosts: ConceptBoosts {
            term: 1.2,
            entity: 1.0,
            procedural: 1.2,
            temporal: 0.9,
        },
        order_agnostic: false,
        reason_prefix: "Shared themes",
        relationship: RelationshipKind::Thematic,
    },
    GenreProfile {
        genre: Genre::Religious,
        name: "religious",
        keywords: &[
            "god", "faith", "prayer", "spiritual", "church", "holy", "scripture", "divine",
            "lord", "sacred", "worship", "salvation", "grace", "prophet",
        ],
        cues: NO_CUES,
        boosts: ConceptBoosts {
            term: 1.2,
            entity: 1.3,
            procedural: 0.9,
            temporal: 1.0,
        },
        order_agnostic: false,
        reason_prefix: "Shared themes",
        relationship: RelationshipKind::Thematic,
    },
    GenreProfile {
        genre: Genre::Reference,
        name: "reference",
        keywords: &[
            "definition", "defined", "glossary", "index", "entry", "entries", "abbreviation",
            "synonym", "appendix", "listed", "alphabetical", "refer", "see",
        ],
        cues: CueWeights {
            citation: 0.3,
            ..NO_CUES
        },
        boosts: ConceptBoosts::NEUTRAL,
        order_agnostic: true,
        reason_prefix: "See also",
        relationship: RelationshipKind::CrossReference,
    },
];

/// Fallback used when no profile scores above zero.
pub static GENERAL: GenreProfile = GenreProfile {
    genre: Genre::General,
    name: "general",
    keywords: &[],
    cues: NO_CUES,
    boosts: ConceptBoosts::NEUTRAL,
    order_agnostic: false,
    reason_prefix: "Thematic connection",
    relationship: RelationshipKind::Thematic,
};

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

static RE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\d+(?:[,-]\s*\d+)*\]|\([A-Z][A-Za-z-]+(?: et al\.)?,? \d{4}[a-z]?\)|\bet al\.|\bdoi:").unwrap()
});

static RE_PROCEDURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:\d+[.)]\s|step\s+\d+|[-*\u{2022}]\s)").unwrap()
});

static RE_IMPERATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|[.!?]\s+)(?:Install|Run|Click|Open|Select|Enter|Configure|Verify|Type|Press|Restart|Download|Check|Set|Create)\b").unwrap()
});

static RE_QUANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$\u{20AC}\u{00A3}]\s?\d|\b\d+(?:\.\d+)?\s?%|\b\d+\.\d+\b").unwrap()
});

const CODE_SYMBOLS: &str = "{}[]<>=;$_/\\|`#";

/// Raw structural counts of a text.
#[derive(Debug, Clone, Copy, Default)]
struct Signals {
    words: usize,
    dialogue: usize,
    citations: usize,
    procedures: usize,
    symbols: usize,
    temporal: usize,
    quantitative: usize,
}

impl Signals {
    fn of(text: &str) -> Self {
        Self {
            words: text.split_whitespace().count(),
            dialogue: dialogue_spans(text),
            citations: RE_CITATION.find_iter(text).count(),
            procedures: procedure_markers(text),
            symbols: text.chars().filter(|c| CODE_SYMBOLS.contains(*c)).count(),
            temporal: temporal_refs(text).len(),
            quantitative: RE_QUANT.find_iter(text).count(),
        }
    }

    /// Occurrences per thousand words; texts shorter than a thousand words
    /// are scaled as if they had a thousand.
    fn per_mille(&self, count: usize) -> f64 {
        count as f64 * 1000.0 / self.words.max(1000) as f64
    }
}

fn dialogue_spans(text: &str) -> usize {
    let straight = text.matches('"').count() / 2;
    let curly = text.matches('\u{201C}').count();
    straight + curly
}

fn procedure_markers(text: &str) -> usize {
    RE_PROCEDURE.find_iter(text).count() + RE_IMPERATIVE.find_iter(text).count()
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Score of one profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenreScore {
    pub genre: Genre,
    pub score: f64,
}

/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreReport {
    pub genre: Genre,
    /// Winning score over the sum of all scores; 0 for `General`.
    pub confidence: f64,
    /// Every profile, score desc then priority.
    pub scores: Vec<GenreScore>,
}

/// Classify normalized text.
pub fn classify(text: &str) -> GenreReport {
    let signals = Signals::of(text);
    let lowered: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    let scale = 1000.0 / signals.words.max(1000) as f64;

    let mut scores: Vec<(usize, GenreScore)> = PROFILES
        .iter()
        .enumerate()
        .map(|(priority, profile)| {
            let keyword_score: f64 = lowered
                .iter()
                .filter(|w| profile.keywords.contains(&w.as_str()))
                .map(|w| 1.0 + w.len() as f64 / 10.0)
                .sum::<f64>()
                * scale;
            let c = profile.cues;
            let cue_score = c.dialogue * signals.per_mille(signals.dialogue)
                + c.citation * signals.per_mille(signals.citations)
                + c.procedural * signals.per_mille(signals.procedures)
                + c.symbol * signals.per_mille(signals.symbols)
                + c.temporal * signals.per_mille(signals.temporal)
                + c.quantitative * signals.per_mille(signals.quantitative);
            (
                priority,
                GenreScore {
                    genre: profile.genre,
                    score: keyword_score + cue_score,
                },
            )
        })
        .collect();

    scores.sort_by(|(pa, a), (pb, b)| b.score.total_cmp(&a.score).then(pa.cmp(pb)));
    let total: f64 = scores.iter().map(|(_, s)| s.score).sum();
    let scores: Vec<GenreScore> = scores.into_iter().map(|(_, s)| s).collect();

    let (genre, confidence) = match scores.first() {
        Some(top) if top.score > 0.0 && total > 0.0 => (top.genre, top.score / total),
        _ => (Genre::General, 0.0),
    };

    tracing::debug!(genre = %genre, confidence, words = signals.words, "genre classified");
    GenreReport {
        genre,
        confidence,
        scores,
    }
}

// ---------------------------------------------------------------------------
// Chunk features
// ---------------------------------------------------------------------------

/// Most entities kept per chunk.
const MAX_ENTITIES: usize = 10;

/// Genre-specific structural features of one chunk.
pub fn chunk_features(text: &str) -> ChunkFeatures {
    let signals = Signals::of(text);
    let words = signals.words.max(1) as f64;
    let temporal: BTreeSet<String> = temporal_refs(text).into_iter().collect();
    let entities: BTreeSet<String> = capitalized_sequences(text).into_iter().collect();

    ChunkFeatures {
        dialogue_density: signals.dialogue as f64 / words,
        procedure_steps: signals.procedures,
        temporal_refs: temporal.len(),
        quantitative_density: signals.quantitative as f64 / words,
        entities: entities.into_iter().take(MAX_ENTITIES).collect(),
    }
}

/// Largest similarity bonus from genre features.
pub const MAX_FEATURE_BONUS: f64 = 0.05;

/// Small similarity bonus for chunks sharing genre-relevant structure:
/// characters for narrative, procedures for technical and procedural
/// material, dates for history, figures for science and business.
pub fn feature_bonus(genre: Genre, a: &ChunkFeatures, b: &ChunkFeatures) -> f64 {
    let bonus = match genre {
        Genre::Narrative => {
            let shared = a.entities.iter().filter(|e| b.entities.contains(e)).count();
            let union = a.entities.len() + b.entities.len() - shared;
            if union == 0 {
                0.0
            } else {
                MAX_FEATURE_BONUS * shared as f64 / union as f64
            }
        }
        Genre::Technical | Genre::Procedural => {
            if a.procedure_steps > 0 && b.procedure_steps > 0 {
                0.03
            } else {
                0.0
            }
        }
        Genre::Historical => {
            if a.temporal_refs > 0 && b.temporal_refs > 0 {
                0.03
            } else {
                0.0
            }
        }
        Genre::Scientific | Genre::Business => {
            if a.quantitative_density > 0.0 && b.quantitative_density > 0.0 {
                0.02
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    bonus.min(MAX_FEATURE_BONUS)
}
