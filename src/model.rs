//! Core data types produced by the analysis pipeline.
//!
//! A [`Document`] is the extracted text of one source. It is split into
//! [`Chunk`]s, each carrying a [`ConceptVector`]. Chunks are linked by
//! [`RelationshipEdge`]s, and the per-chunk reading lists are assembled into a
//! [`Hub`]. Everything here is plain data: once a job completes the whole
//! [`DocumentAnalysis`] is handed to the caller behind an `Arc` and never
//! mutated again.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::analysis::genre::{Genre, GenreReport, RelationshipKind};
use crate::extract::format::ContentFormat;
use crate::extract::{StrategyAttempt, StrategyKind};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier of an extracted document.
///
/// `NonZeroU64` keeps `Option<DocumentId>` the same size as `DocumentId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct DocumentId(NonZeroU64);

impl DocumentId {
    /// Create a `DocumentId` from a raw `u64`. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(DocumentId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Identifier of a chunk: its parent document plus its ordinal.
///
/// Ordering is `(document, ordinal)`, which is the canonical order used for
/// edge storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document: DocumentId,
    pub ordinal: u32,
}

impl ChunkId {
    pub fn new(document: DocumentId, ordinal: u32) -> Self {
        Self { document, ordinal }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document, self.ordinal)
    }
}

/// Thread-safe, monotonically increasing id source starting at 1.
///
/// Returns `None` once the 64-bit space is exhausted.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next raw id.
    pub fn next(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next document id.
    pub fn next_document(&self) -> Option<DocumentId> {
        self.next().map(DocumentId)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Where a document came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentSource {
    /// Local filesystem path.
    File(PathBuf),
    /// Bytes handed over directly, with a display name used for format hints.
    Inline { name: String },
}

impl DocumentSource {
    /// Name used for extension-based format detection.
    pub fn name_hint(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline { name } => name.clone(),
        }
    }
}

impl std::fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Inline { name } => write!(f, "inline:{name}"),
        }
    }
}

/// An extracted document. Built once by the pipeline after extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source: DocumentSource,
    /// Title reported by the format parser, if any.
    pub title: Option<String>,
    pub format: ContentFormat,
    /// Normalized extracted text. Chunk spans index into this string.
    pub text: Arc<str>,
    /// Selected genre; `None` when the job stopped before classification.
    pub genre: Option<Genre>,
    /// Extraction quality in \[0, 1\].
    pub quality_score: f64,
    /// Strategy whose output was kept.
    pub strategy: StrategyKind,
    pub page_count: Option<usize>,
    /// Every strategy attempt, in the order they ran.
    pub attempts: Vec<StrategyAttempt>,
    /// Milliseconds since the UNIX epoch.
    pub created_at: u64,
}

impl Document {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Concepts
// ---------------------------------------------------------------------------

/// How a concept term was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    /// Plain content word.
    Term,
    /// Multi-word capitalized sequence ("Carl Jung", "Node Manager").
    Entity,
    /// Action or procedure noun ("install", "configuration").
    Procedural,
    /// Date, year or era reference.
    Temporal,
}

/// A single weighted term of a [`ConceptVector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptWeight {
    pub term: String,
    pub weight: f64,
    pub kind: ConceptKind,
}

/// Sparse term → weight mapping.
///
/// Entries are kept sorted by weight descending, then term ascending. Every
/// iteration therefore has a defined order, independent of how the vector
/// was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptVector {
    entries: Vec<ConceptWeight>,
}

impl ConceptVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary entries. Duplicate terms keep their highest weight;
    /// non-finite and non-positive weights are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = ConceptWeight>) -> Self {
        let mut by_term: HashMap<String, ConceptWeight> = HashMap::new();
        for entry in entries {
            if !entry.weight.is_finite() || entry.weight <= 0.0 {
                continue;
            }
            match by_term.get_mut(&entry.term) {
                Some(existing) if existing.weight >= entry.weight => {}
                Some(existing) => *existing = entry,
                None => {
                    by_term.insert(entry.term.clone(), entry);
                }
            }
        }
        let mut entries: Vec<ConceptWeight> = by_term.into_values().collect();
        sort_entries(&mut entries);
        Self { entries }
    }

    /// Convenience constructor for plain terms.
    pub fn from_weights<S: Into<String>>(weights: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self::from_entries(weights.into_iter().map(|(term, weight)| ConceptWeight {
            term: term.into(),
            weight,
            kind: ConceptKind::Term,
        }))
    }

    /// Keep only the `k` heaviest entries.
    pub fn truncate(&mut self, k: usize) {
        self.entries.truncate(k);
    }

    /// Scale weights so the heaviest entry is 1.0.
    pub fn normalize_max(&mut self) {
        let Some(max) = self.entries.first().map(|e| e.weight) else {
            return;
        };
        if max > 0.0 {
            for entry in &mut self.entries {
                entry.weight /= max;
            }
        }
    }

    /// Weight of `term`, or `None` if absent.
    pub fn get(&self, term: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.term == term)
            .map(|e| e.weight)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.iter().any(|e| e.term == term)
    }

    /// Entries in weight-desc, term-asc order.
    pub fn iter(&self) -> impl Iterator<Item = &ConceptWeight> {
        self.entries.iter()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.term.as_str())
    }

    /// Sum of weights (L1 magnitude).
    pub fn l1_norm(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Lookup table for pairwise comparisons.
    pub fn as_map(&self) -> HashMap<&str, f64> {
        self.entries
            .iter()
            .map(|e| (e.term.as_str(), e.weight))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sort_entries(entries: &mut [ConceptWeight]) {
    entries.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.term.cmp(&b.term))
    });
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Genre-specific structural features of one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkFeatures {
    /// Quoted dialogue spans per word.
    pub dialogue_density: f64,
    /// Step / numbered-procedure markers.
    pub procedure_steps: usize,
    /// Distinct year and century references.
    pub temporal_refs: usize,
    /// Currency, percentage and decimal figures per word.
    pub quantitative_density: f64,
    /// Named entities (capitalized sequences), sorted, at most ten.
    pub entities: Vec<String>,
}

/// A contiguous slice of one document's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    /// Position within the document; ordinals are `0..N`.
    pub ordinal: u32,
    /// Byte offset of the first character in [`Document::text`].
    pub start: usize,
    /// Byte offset one past the last character in [`Document::text`].
    pub end: usize,
    pub text: String,
    pub title: String,
    pub word_count: usize,
    pub concepts: ConceptVector,
    pub genre: Option<Genre>,
    pub features: ChunkFeatures,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Suggested reading order for the two ends of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// `chunk_b` builds on `chunk_a`; read `chunk_a` first.
    Forward,
    /// No preferred order.
    Undirected,
}

/// A scored, reasoned link between two chunks.
///
/// `chunk_a < chunk_b` always holds; use [`RelationshipEdge::new`] to get the
/// canonical orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub chunk_a: ChunkId,
    pub chunk_b: ChunkId,
    pub score: f64,
    pub shared_concepts: Vec<String>,
    pub reason: String,
    pub direction: EdgeDirection,
    pub kind: RelationshipKind,
    /// One chunk explicitly mentions the other.
    pub cross_mention: bool,
}

impl RelationshipEdge {
    /// Build an edge with its endpoints in canonical order.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: ChunkId,
        y: ChunkId,
        score: f64,
        shared_concepts: Vec<String>,
        reason: String,
        direction: EdgeDirection,
        kind: RelationshipKind,
        cross_mention: bool,
    ) -> Self {
        let (chunk_a, chunk_b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            chunk_a,
            chunk_b,
            score,
            shared_concepts,
            reason,
            direction,
            kind,
            cross_mention,
        }
    }

    /// Canonical key for duplicate detection.
    pub fn key(&self) -> (ChunkId, ChunkId) {
        (self.chunk_a, self.chunk_b)
    }

    /// The endpoint opposite `chunk`, if `chunk` is one of the ends.
    pub fn other(&self, chunk: ChunkId) -> Option<ChunkId> {
        if chunk == self.chunk_a {
            Some(self.chunk_b)
        } else if chunk == self.chunk_b {
            Some(self.chunk_a)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Mandatory-read list for one chunk, strongest link first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubEntry {
    pub chunk: ChunkId,
    pub mandatory_reads: Vec<ChunkId>,
}

/// Aggregated reading structure handed to the hub renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    /// One entry per chunk, in ordinal order.
    pub entries: Vec<HubEntry>,
    /// Union of all mandatory reads, in ordinal order.
    pub master: Vec<ChunkId>,
    /// Groups of chunks connected by edges, each sorted; singletons omitted.
    pub clusters: Vec<Vec<ChunkId>>,
    /// Chunks with the most edges, degree desc then ordinal asc.
    pub central: Vec<(ChunkId, usize)>,
    /// Suggested reading order honouring every forward edge.
    pub reading_path: Vec<ChunkId>,
    /// Suggested file name per chunk, in ordinal order.
    pub file_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// How the requested chunk count was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingReport {
    pub requested: usize,
    pub produced: usize,
    /// The document had fewer sentences than requested chunks.
    pub reduced: bool,
}

/// Everything a job produced. Immutable once handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub document: Document,
    pub genre: Option<GenreReport>,
    pub chunks: Vec<Chunk>,
    pub edges: Vec<RelationshipEdge>,
    pub hub: Option<Hub>,
    pub chunking: Option<ChunkingReport>,
    pub warnings: Vec<String>,
    /// The relationship stage failed; `edges` is empty on purpose.
    pub edges_degraded: bool,
    /// `false` for the partial result of a cancelled job.
    pub complete: bool,
}

impl DocumentAnalysis {
    pub fn quality_score(&self) -> f64 {
        self.document.quality_score
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(raw: u64) -> DocumentId {
        DocumentId::new(raw).unwrap()
    }

    #[test]
    fn document_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<DocumentId>>(),
            std::mem::size_of::<DocumentId>()
        );
        assert!(DocumentId::new(0).is_none());
    }

    #[test]
    fn allocator_is_sequential() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.next().unwrap().get(), 1);
        assert_eq!(alloc.next_document().unwrap().get(), 2);
    }

    #[test]
    fn concept_vector_orders_by_weight_then_term() {
        let v = ConceptVector::from_weights([("beta", 0.5), ("alpha", 0.5), ("gamma", 0.9)]);
        let terms: Vec<&str> = v.terms().collect();
        assert_eq!(terms, vec!["gamma", "alpha", "beta"]);
    }

    #[test]
    fn concept_vector_drops_bad_weights_and_keeps_max_duplicate() {
        let v = ConceptVector::from_weights([
            ("a", 0.2),
            ("a", 0.7),
            ("nan", f64::NAN),
            ("zero", 0.0),
        ]);
        assert_eq!(v.len(), 1);
        assert_eq!(v.get("a"), Some(0.7));
    }

    #[test]
    fn normalize_max_scales_to_one() {
        let mut v = ConceptVector::from_weights([("a", 4.0), ("b", 2.0)]);
        v.normalize_max();
        assert_eq!(v.get("a"), Some(1.0));
        assert_eq!(v.get("b"), Some(0.5));
    }

    #[test]
    fn edge_endpoints_are_canonical() {
        let a = ChunkId::new(doc(1), 0);
        let b = ChunkId::new(doc(1), 3);
        let edge = RelationshipEdge::new(
            b,
            a,
            0.5,
            vec![],
            String::new(),
            EdgeDirection::Forward,
            RelationshipKind::Thematic,
            false,
        );
        assert_eq!(edge.key(), (a, b));
        assert_eq!(edge.other(a), Some(b));
        assert_eq!(edge.other(ChunkId::new(doc(2), 0)), None);
    }
}
