//! Relationship engine: pairwise chunk similarity and reasoned edges.
//!
//! Similarity of two concept vectors is the sum of the smaller weight over
//! shared terms, divided by `sqrt(|a|₁ · |b|₁)`; it lies in `[0, 1]`. An
//! explicit cross-mention between the chunks adds a fixed bonus and genre
//! features add a small one. An edge is kept only when the final score is
//! strictly above the threshold.

use std::collections::{BTreeSet, HashSet};

use rayon::prelude::*;

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::genre::{Genre, RelationshipKind, feature_bonus};
use crate::analysis::text::{chapter_marker, contains_phrase};
use crate::model::{Chunk, ConceptVector, EdgeDirection, RelationshipEdge};

/// Shared concepts named in an edge reason.
const REASON_TERMS: usize = 3;

/// Parameters of one relationship pass.
#[derive(Debug, Clone, Copy)]
pub struct RelationParams {
    /// Edges need a score strictly above this.
    pub threshold: f64,
    /// Added when one chunk explicitly mentions the other.
    pub cross_mention_bonus: f64,
}

/// Overlap of two concept vectors plus the shared terms, strongest first.
pub fn similarity(a: &ConceptVector, b: &ConceptVector) -> (f64, Vec<String>) {
    let b_map = b.as_map();
    let mut shared: Vec<(&str, f64, f64)> = a
        .iter()
        .filter_map(|e| b_map.get(e.term.as_str()).map(|&wb| (e.term.as_str(), e.weight, wb)))
        .collect();
    if shared.is_empty() {
        return (0.0, Vec::new());
    }

    let overlap: f64 = shared.iter().map(|&(_, wa, wb)| wa.min(wb)).sum();
    let magnitude = (a.l1_norm() * b.l1_norm()).sqrt();
    let score = if magnitude > 0.0 { overlap / magnitude } else { 0.0 };

    shared.sort_by(|x, y| {
        (y.1 + y.2)
            .total_cmp(&(x.1 + x.2))
            .then_with(|| x.0.cmp(y.0))
    });
    (score, shared.into_iter().map(|(t, _, _)| t.to_string()).collect())
}

/// Marker words ("chapter", "part", ...) the chunk titles of a document use.
fn marker_kinds<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> BTreeSet<String> {
    chunks
        .into_iter()
        .filter_map(|c| chapter_marker(&c.title))
        .filter_map(|m| m.split_whitespace().next().map(str::to_string))
        .collect()
}

/// Phrases by which other chunks may refer to `chunk`: its title when that is
/// distinctive enough, and its "chapter N" style marker.
///
/// An unlabelled chunk is addressed by ordinal only in documents whose
/// headings use markers, and only with the marker words they use.
fn mention_phrases(chunk: &Chunk, kinds: &BTreeSet<String>) -> Vec<String> {
    let mut phrases = Vec::new();
    let title = chunk.title.trim().to_lowercase();
    if title.split_whitespace().count() >= 2 && title.len() >= 8 {
        phrases.push(title);
    }
    match chapter_marker(&chunk.title) {
        Some(marker) => phrases.push(marker),
        None => {
            let n = chunk.ordinal + 1;
            phrases.extend(kinds.iter().map(|k| format!("{k} {n}")));
        }
    }
    phrases
}

/// A chunk with its lowercase text and mention phrases, computed once per
/// relationship pass.
struct Prepared<'a> {
    chunk: &'a Chunk,
    lower: String,
    phrases: Vec<String>,
}

impl<'a> Prepared<'a> {
    fn new(chunk: &'a Chunk, kinds: &BTreeSet<String>) -> Self {
        Self {
            chunk,
            lower: chunk.text.to_lowercase(),
            phrases: mention_phrases(chunk, kinds),
        }
    }

    /// Whether this chunk explicitly refers to `other`.
    fn mentions(&self, other: &Prepared<'_>) -> bool {
        other.phrases.iter().any(|p| contains_phrase(&self.lower, p))
    }
}

fn reason(prefix: &str, shared: &[String], cross_mention: bool) -> String {
    if shared.is_empty() {
        return "Explicit cross-reference".to_string();
    }
    let terms = shared
        .iter()
        .take(REASON_TERMS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if cross_mention {
        format!("{prefix}: {terms} (explicit cross-reference)")
    } else {
        format!("{prefix}: {terms}")
    }
}

fn check_unique(chunks: &[Chunk]) -> AnalysisResult<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.id) {
            return Err(AnalysisError::DuplicateChunk {
                chunk: chunk.id.to_string(),
            });
        }
    }
    Ok(())
}

/// Score one pair; `None` when the pair stays unlinked.
fn score_pair(
    pa: &Prepared<'_>,
    pb: &Prepared<'_>,
    genre: Genre,
    params: RelationParams,
) -> AnalysisResult<Option<RelationshipEdge>> {
    let (a, b) = (pa.chunk, pb.chunk);
    let profile = genre.profile();
    let (base, shared) = similarity(&a.concepts, &b.concepts);
    let cross_mention = pa.mentions(pb) || pb.mentions(pa);

    let mut score = base;
    if cross_mention {
        score += params.cross_mention_bonus;
    }
    if cross_mention || !shared.is_empty() {
        score += feature_bonus(genre, &a.features, &b.features);
    }
    let score = score.min(1.0);

    if !score.is_finite() {
        return Err(AnalysisError::NonFiniteScore {
            chunk_a: a.id.to_string(),
            chunk_b: b.id.to_string(),
        });
    }
    if score <= params.threshold {
        return Ok(None);
    }

    let direction = if profile.order_agnostic {
        EdgeDirection::Undirected
    } else {
        EdgeDirection::Forward
    };
    let reason = reason(profile.reason_prefix, &shared, cross_mention);
    Ok(Some(RelationshipEdge::new(
        a.id,
        b.id,
        score,
        shared,
        reason,
        direction,
        profile.relationship,
        cross_mention,
    )))
}

/// Edges between every pair of chunks of one document.
///
/// Pairs are visited in chunk-id order and the output is sorted by canonical
/// key, so the result is independent of input order and thread scheduling.
pub fn build_relationships(
    chunks: &[Chunk],
    genre: Genre,
    params: RelationParams,
) -> AnalysisResult<Vec<RelationshipEdge>> {
    check_unique(chunks)?;
    let kinds = marker_kinds(chunks);
    let mut ordered: Vec<Prepared<'_>> = chunks.iter().map(|c| Prepared::new(c, &kinds)).collect();
    ordered.sort_by_key(|p| p.chunk.id);

    let per_chunk: Vec<AnalysisResult<Vec<RelationshipEdge>>> = (0..ordered.len())
        .into_par_iter()
        .map(|i| {
            let mut edges = Vec::new();
            for j in i + 1..ordered.len() {
                if let Some(edge) = score_pair(&ordered[i], &ordered[j], genre, params)? {
                    edges.push(edge);
                }
            }
            Ok(edges)
        })
        .collect();

    let mut edges = Vec::new();
    for result in per_chunk {
        edges.extend(result?);
    }
    edges.sort_by_key(|e| e.key());
    tracing::debug!(chunks = chunks.len(), edges = edges.len(), genre = %genre, "relationships built");
    Ok(edges)
}

/// Edges between the chunks of two different documents.
///
/// Cross-document edges carry no reading order and no genre flavour.
pub fn relate_documents(
    left: &[Chunk],
    right: &[Chunk],
    threshold: f64,
) -> AnalysisResult<Vec<RelationshipEdge>> {
    check_unique(left)?;
    check_unique(right)?;
    let mut edges = Vec::new();
    for a in left {
        for b in right {
            if a.id.document == b.id.document {
                continue;
            }
            let (score, shared) = similarity(&a.concepts, &b.concepts);
            if !score.is_finite() {
                return Err(AnalysisError::NonFiniteScore {
                    chunk_a: a.id.to_string(),
                    chunk_b: b.id.to_string(),
                });
            }
            if score > threshold {
                let reason = reason(Genre::General.profile().reason_prefix, &shared, false);
                edges.push(RelationshipEdge::new(
                    a.id,
                    b.id,
                    score,
                    shared,
                    reason,
                    EdgeDirection::Undirected,
                    RelationshipKind::Thematic,
                    false,
                ));
            }
        }
    }
    edges.sort_by_key(|e| e.key());
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkFeatures, ChunkId, DocumentId};

    const PARAMS: RelationParams = RelationParams {
        threshold: 0.2,
        cross_mention_bonus: 0.1,
    };

    fn chunk_in(doc: u64, ordinal: u32, title: &str, text: &str, concepts: &[(&str, f64)]) -> Chunk {
        Chunk {
            id: ChunkId::new(DocumentId::new(doc).unwrap(), ordinal),
            ordinal,
            start: 0,
            end: text.len(),
            text: text.to_string(),
            title: title.to_string(),
            word_count: text.split_whitespace().count(),
            concepts: ConceptVector::from_weights(concepts.iter().copied()),
            genre: None,
            features: ChunkFeatures::default(),
        }
    }

    fn chunk(ordinal: u32, concepts: &[(&str, f64)]) -> Chunk {
        chunk_in(1, ordinal, "Untitled", "plain text", concepts)
    }

    #[test]
    fn similarity_is_bounded_and_symmetric() {
        let a = ConceptVector::from_weights([("x", 1.0), ("y", 0.5)]);
        let b = ConceptVector::from_weights([("x", 0.4), ("z", 1.0)]);
        let (ab, shared) = similarity(&a, &b);
        let (ba, _) = similarity(&b, &a);
        assert_eq!(ab, ba);
        assert!(ab > 0.0 && ab <= 1.0);
        assert_eq!(shared, vec!["x"]);
        assert_eq!(similarity(&a, &a).0, 1.0);
        assert_eq!(similarity(&a, &ConceptVector::new()).0, 0.0);
    }

    #[test]
    fn threshold_is_exclusive() {
        let at = vec![chunk(0, &[("x", 0.2), ("y", 0.8)]), chunk(1, &[("x", 0.2), ("z", 0.8)])];
        let edges = build_relationships(&at, Genre::Technical, PARAMS).unwrap();
        assert!(edges.is_empty());

        let above = vec![
            chunk(0, &[("x", 0.2001), ("y", 0.7999)]),
            chunk(1, &[("x", 0.2001), ("z", 0.7999)]),
        ];
        let edges = build_relationships(&above, Genre::Technical, PARAMS).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].score > 0.2);
    }

    #[test]
    fn edges_are_canonical_and_sorted() {
        let chunks = vec![
            chunk(2, &[("install", 1.0), ("verify", 0.8)]),
            chunk(0, &[("install", 1.0), ("verify", 0.6)]),
            chunk(1, &[("install", 0.9), ("configure", 1.0)]),
        ];
        let edges = build_relationships(&chunks, Genre::Technical, PARAMS).unwrap();
        let mut keys = HashSet::new();
        for edge in &edges {
            assert!(edge.chunk_a < edge.chunk_b);
            assert!(keys.insert(edge.key()));
            assert!(keys.insert((edge.chunk_b, edge.chunk_a)));
            assert_eq!(edge.direction, EdgeDirection::Forward);
            assert_eq!(edge.kind, RelationshipKind::Conceptual);
        }
        let first = &edges[0];
        assert_eq!((first.chunk_a.ordinal, first.chunk_b.ordinal), (0, 1));
        let strong = edges
            .iter()
            .find(|e| (e.chunk_a.ordinal, e.chunk_b.ordinal) == (0, 2))
            .unwrap();
        assert_eq!(strong.shared_concepts, vec!["install", "verify"]);
        assert_eq!(strong.reason, "Related concepts: install, verify");
    }

    #[test]
    fn reference_edges_are_undirected() {
        let chunks = vec![chunk(0, &[("term", 1.0)]), chunk(1, &[("term", 1.0)])];
        let edges = build_relationships(&chunks, Genre::Reference, PARAMS).unwrap();
        assert_eq!(edges[0].direction, EdgeDirection::Undirected);
        assert_eq!(edges[0].kind, RelationshipKind::CrossReference);
    }

    #[test]
    fn cross_mentions_add_a_bonus() {
        let target = chunk_in(1, 2, "Chapter 3: Storage", "Disks and volumes.", &[("disk", 1.0)]);
        let source = chunk_in(
            1,
            0,
            "Overview",
            "Storage is covered in chapter 3 below.",
            &[("overview", 1.0)],
        );
        let edges = build_relationships(&[source.clone(), target.clone()], Genre::General, RelationParams {
            threshold: 0.05,
            cross_mention_bonus: 0.1,
        })
        .unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].cross_mention);
        assert!(edges[0].shared_concepts.is_empty());
        assert_eq!(edges[0].reason, "Explicit cross-reference");
        assert!((edges[0].score - 0.1).abs() < 1e-12);

        let kinds = marker_kinds([&source, &target]);
        let (source, target) = (Prepared::new(&source, &kinds), Prepared::new(&target, &kinds));
        assert!(source.mentions(&target));
        assert!(!target.mentions(&source));
    }

    #[test]
    fn ordinal_mentions_need_marked_headings() {
        let install = chunk_in(1, 0, "Installing", "Copy the files.", &[("copy", 1.0)]);
        let tuning = chunk_in(
            1,
            1,
            "Tuning",
            "This is part 1 of the install story.",
            &[("tune", 1.0)],
        );
        let params = RelationParams {
            threshold: 0.05,
            cross_mention_bonus: 0.1,
        };
        let unmarked = build_relationships(&[install.clone(), tuning.clone()], Genre::General, params)
            .unwrap();
        assert!(unmarked.is_empty());
        assert!(marker_kinds([&install, &tuning]).is_empty());

        // Once the document labels its parts, "part 1" addresses the first chunk.
        let labelled = chunk_in(1, 2, "Part 3: Upgrades", "New releases.", &[("release", 1.0)]);
        let kinds = marker_kinds([&install, &tuning, &labelled]);
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec!["part"]);
        let edges = build_relationships(&[install, tuning, labelled], Genre::General, params).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].chunk_a.ordinal, edges[0].chunk_b.ordinal), (0, 1));
        assert!(edges[0].cross_mention);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let chunks = vec![chunk(0, &[("x", 1.0)]), chunk(0, &[("x", 1.0)])];
        assert!(matches!(
            build_relationships(&chunks, Genre::General, PARAMS),
            Err(AnalysisError::DuplicateChunk { .. })
        ));
    }

    #[test]
    fn cross_document_edges() {
        let left = vec![chunk_in(1, 0, "A", "a", &[("kernel", 1.0), ("module", 0.5)])];
        let right = vec![
            chunk_in(2, 0, "B", "b", &[("kernel", 1.0)]),
            chunk_in(2, 1, "C", "c", &[("garden", 1.0)]),
        ];
        let edges = relate_documents(&left, &right, 0.2).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].direction, EdgeDirection::Undirected);
        assert_eq!(edges[0].kind, RelationshipKind::Thematic);
        assert_eq!(edges[0].chunk_b.document.get(), 2);
    }
}
