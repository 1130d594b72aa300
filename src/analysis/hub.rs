//! Hub assembly: mandatory-read lists and reading structure for a renderer.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;

use crate::model::{Chunk, ChunkId, EdgeDirection, Hub, HubEntry, RelationshipEdge};

/// Chunks listed as central.
const CENTRAL_LIMIT: usize = 5;

/// Longest slug segment in a file name.
const SLUG_LIMIT: usize = 40;

/// The `k` strongest links of `chunk`: score descending, then ordinal
/// ascending of the linked chunk.
pub fn top_links(chunk: ChunkId, edges: &[RelationshipEdge], k: usize) -> Vec<ChunkId> {
    let mut linked: Vec<(f64, ChunkId)> = edges
        .iter()
        .filter_map(|e| e.other(chunk).map(|other| (e.score, other)))
        .collect();
    linked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    linked.into_iter().take(k).map(|(_, id)| id).collect()
}

/// Assemble the hub for one document's chunks and edges.
pub fn build_hub(document_title: &str, chunks: &[Chunk], edges: &[RelationshipEdge], top_k: usize) -> Hub {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.id);
    let index: HashMap<ChunkId, usize> = ordered.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    let entries: Vec<HubEntry> = ordered
        .iter()
        .map(|c| HubEntry {
            chunk: c.id,
            mandatory_reads: top_links(c.id, edges, top_k),
        })
        .collect();
    let master: Vec<ChunkId> = entries
        .iter()
        .flat_map(|e| e.mandatory_reads.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let local_edges: Vec<(usize, usize, &RelationshipEdge)> = edges
        .iter()
        .filter_map(|e| Some((*index.get(&e.chunk_a)?, *index.get(&e.chunk_b)?, e)))
        .collect();

    Hub {
        entries,
        master,
        clusters: clusters(&ordered, &local_edges),
        central: central(&ordered, &local_edges),
        reading_path: reading_path(&ordered, &local_edges),
        file_names: ordered
            .iter()
            .map(|c| file_name(document_title, c))
            .collect(),
    }
}

fn clusters(ordered: &[&Chunk], edges: &[(usize, usize, &RelationshipEdge)]) -> Vec<Vec<ChunkId>> {
    let mut sets = UnionFind::<usize>::new(ordered.len());
    for &(a, b, _) in edges {
        sets.union(a, b);
    }
    let mut groups: HashMap<usize, Vec<ChunkId>> = HashMap::new();
    for (i, chunk) in ordered.iter().enumerate() {
        groups.entry(sets.find(i)).or_default().push(chunk.id);
    }
    let mut clusters: Vec<Vec<ChunkId>> = groups.into_values().filter(|g| g.len() > 1).collect();
    for group in &mut clusters {
        group.sort();
    }
    clusters.sort();
    clusters
}

fn central(ordered: &[&Chunk], edges: &[(usize, usize, &RelationshipEdge)]) -> Vec<(ChunkId, usize)> {
    let mut degree = vec![0usize; ordered.len()];
    for &(a, b, _) in edges {
        degree[a] += 1;
        degree[b] += 1;
    }
    let mut ranked: Vec<(ChunkId, usize)> = ordered
        .iter()
        .zip(degree)
        .filter(|(_, d)| *d > 0)
        .map(|(c, d)| (c.id, d))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(CENTRAL_LIMIT);
    ranked
}

/// Topological order over forward edges, lowest ordinal first among the
/// ready chunks. Falls back to ordinal order if the edges form a cycle.
fn reading_path(ordered: &[&Chunk], edges: &[(usize, usize, &RelationshipEdge)]) -> Vec<ChunkId> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(ordered.len(), edges.len());
    let nodes: Vec<NodeIndex> = (0..ordered.len()).map(|i| graph.add_node(i)).collect();
    for &(a, b, edge) in edges {
        if edge.direction == EdgeDirection::Forward {
            graph.add_edge(nodes[a], nodes[b], ());
        }
    }
    if is_cyclic_directed(&graph) {
        tracing::warn!("reading order edges form a cycle, using ordinal order");
        return ordered.iter().map(|c| c.id).collect();
    }

    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut path = Vec::with_capacity(ordered.len());
    while let Some(Reverse(i)) = ready.pop() {
        path.push(ordered[i].id);
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }
    path
}

/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed to `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
        if slug.len() >= SLUG_LIMIT {
            break;
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Suggested file name: `<document>_<NN>_<title>.md`, numbered from 01.
pub fn file_name(document_title: &str, chunk: &Chunk) -> String {
    let doc = match slugify(document_title) {
        s if s.is_empty() => "document".to_string(),
        s => s,
    };
    let title = match slugify(&chunk.title) {
        s if s.is_empty() => "section".to_string(),
        s => s,
    };
    format!("{doc}_{:02}_{title}.md", chunk.ordinal + 1)
}
