//! End-to-end integration tests for the crossref engine.
//!
//! These tests drive the public engine interface the way a caller would:
//! submit a document, poll its task, and inspect the chunks, edges and hub
//! of the result.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crossref_engine::analysis::{Genre, RelationParams, build_relationships};
use crossref_engine::config::{EngineConfig, SubmitConfig};
use crossref_engine::engine::Engine;
use crossref_engine::model::{Chunk, ChunkFeatures, ChunkId, ConceptVector, DocumentAnalysis, DocumentId};
use crossref_engine::pipeline::{CancelAtStage, DocumentRef};
use crossref_engine::task::{ErrorKind, Stage, TaskId, TaskState};

const WAIT: Duration = Duration::from_secs(60);

const NOUNS: &[&str] = &[
    "server", "agent", "daemon", "cluster", "node", "gateway", "database", "cache", "proxy",
    "scheduler", "firewall", "certificate", "volume", "kernel", "module", "package", "plugin",
    "driver", "socket", "endpoint", "registry", "bucket", "queue", "worker", "listener",
];

const ADJECTIVES: &[&str] = &[
    "primary", "secondary", "local", "remote", "shared", "encrypted", "default", "custom",
    "legacy", "stable",
];

fn test_engine() -> Engine {
    Engine::new(EngineConfig {
        workers: Some(2),
        ..EngineConfig::default()
    })
    .unwrap()
}

fn pick<'a>(rng: &mut StdRng, words: &[&'a str]) -> &'a str {
    words[rng.gen_range(0..words.len())]
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A seeded synthetic installation manual of at least `words` words.
fn technical_document(words: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = String::new();
    let mut count = 0;
    let mut paragraph = 0;
    while count < words {
        if paragraph % 10 == 0 {
            let heading = format!("Operating the {} Layer", capitalize(pick(&mut rng, NOUNS)));
            count += heading.split_whitespace().count();
            out.push_str(&heading);
            out.push_str("\n\n");
        }
        let mut sentences = Vec::new();
        for _ in 0..5 {
            let (n1, n2, adj) = (pick(&mut rng, NOUNS), pick(&mut rng, NOUNS), pick(&mut rng, ADJECTIVES));
            let sentence = match rng.gen_range(0..5) {
                0 => format!("Install the {adj} {n1} on every {n2} in the cluster."),
                1 => format!("Configure the {n1} so the {adj} {n2} accepts connections."),
                2 => format!("Verify that the {n1} reports a healthy {n2} status."),
                3 => format!("After you install the {n1}, configure its {adj} {n2} settings."),
                _ => format!("Always verify the {n1} and the {adj} {n2} together."),
            };
            count += sentence.split_whitespace().count();
            sentences.push(sentence);
        }
        out.push_str(&sentences.join(" "));
        out.push_str("\n\n");
        paragraph += 1;
    }
    out
}

fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("crossref-")
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn analyze(engine: &Engine, document: DocumentRef, job: SubmitConfig) -> (TaskId, Arc<DocumentAnalysis>) {
    let task = engine.submit(document, job).unwrap();
    let status = engine.wait(task, WAIT).unwrap();
    assert_eq!(status.state, TaskState::Completed, "task ended with {:?}", status.error);
    (task, engine.get_result(task).unwrap())
}

fn assert_well_formed(result: &DocumentAnalysis, threshold: f64) {
    let quality = result.quality_score();
    assert!((0.0..=1.0).contains(&quality), "quality {quality}");
    for (i, chunk) in result.chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal as usize, i);
    }
    let mut seen = HashSet::new();
    for edge in &result.edges {
        assert!(edge.chunk_a < edge.chunk_b);
        assert!(edge.score > threshold);
        assert!(seen.insert(edge.key()));
        assert!(!seen.contains(&(edge.chunk_b, edge.chunk_a)));
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn technical_manual_links_install_configure_verify() {
    let text = technical_document(10_000, 42);
    assert!(text.split_whitespace().count() >= 10_000);
    let file = write_temp(&text, ".txt");

    let engine = test_engine();
    let (_, result) = analyze(
        &engine,
        DocumentRef::path(file.path()),
        SubmitConfig::default().with_max_chunks(5),
    );

    assert_eq!(result.chunks.len(), 5);
    assert_well_formed(&result, 0.2);
    assert_eq!(result.genre.as_ref().map(|g| g.genre), Some(Genre::Technical));

    let key_terms = ["install", "configure", "verify"];
    for term in key_terms {
        let holders = result
            .chunks
            .iter()
            .filter(|c| c.text.to_lowercase().contains(term))
            .count();
        assert!(holders >= 2, "{term} appears in {holders} chunks");
    }

    let linked = result.edges.iter().any(|edge| {
        key_terms
            .iter()
            .filter(|t| edge.shared_concepts.iter().any(|s| s == *t))
            .count()
            >= 2
    });
    assert!(linked, "no edge shares two of {key_terms:?}");

    let hub = result.hub.as_ref().unwrap();
    assert_eq!(hub.entries.len(), 5);
    assert!(hub.entries.iter().all(|e| e.mandatory_reads.len() <= 3));
    assert_eq!(hub.reading_path.len(), 5);
}

#[test]
fn whitespace_document_fails_with_extraction_failed() {
    let engine = test_engine();
    for content in ["", "   \n\n\t  "] {
        let task = engine
            .submit(DocumentRef::bytes("blank.txt", content), SubmitConfig::default())
            .unwrap();
        let status = engine.wait(task, WAIT).unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.error.unwrap().kind, ErrorKind::ExtractionFailed);
        assert!(engine.get_result(task).is_err());
    }
}

#[test]
fn zero_max_chunks_is_rejected_without_a_task() {
    let engine = test_engine();
    let err = engine
        .submit(
            DocumentRef::bytes("doc.txt", "Install the agent."),
            SubmitConfig::default().with_max_chunks(0),
        )
        .unwrap_err();
    assert!(err.is_invalid_config());
    assert!(engine.list_tasks().is_empty());

    let err = engine
        .submit(
            DocumentRef::bytes("doc.txt", "Install the agent."),
            SubmitConfig::default().with_max_chunks(51),
        )
        .unwrap_err();
    assert!(err.is_invalid_config());
    assert!(engine.list_tasks().is_empty());
}

#[test]
fn cancel_between_chunking_and_relationships_keeps_chunks() {
    let engine = Engine::with_checkpoint(
        EngineConfig {
            workers: Some(1),
            ..EngineConfig::default()
        },
        Arc::new(CancelAtStage(Stage::ExtractingConcepts)),
    )
    .unwrap();
    let task = engine
        .submit(
            DocumentRef::bytes("manual.txt", technical_document(2_000, 7)),
            SubmitConfig::default().with_max_chunks(4),
        )
        .unwrap();
    let status = engine.wait(task, WAIT).unwrap();
    assert_eq!(status.state, TaskState::Cancelled);
    assert_eq!(status.error.as_ref().unwrap().kind, ErrorKind::Cancelled);

    let partial = engine.get_result(task).unwrap();
    assert!(!partial.complete);
    assert_eq!(partial.chunks.len(), 4);
    assert!(partial.edges.is_empty());
    assert!(partial.hub.is_none());
}

#[test]
fn progress_never_decreases() {
    let engine = test_engine();
    let task = engine
        .submit(
            DocumentRef::bytes("manual.txt", technical_document(6_000, 3)),
            SubmitConfig::default().with_max_chunks(10),
        )
        .unwrap();

    let mut last = 0.0;
    let deadline = std::time::Instant::now() + WAIT;
    loop {
        let status = engine.get_status(task).unwrap();
        assert!((0.0..=100.0).contains(&status.progress));
        assert!(status.progress >= last, "{} after {last}", status.progress);
        last = status.progress;
        if status.state.is_terminal() {
            assert_eq!(status.state, TaskState::Completed);
            assert_eq!(status.progress, 100.0);
            break;
        }
        assert!(std::time::Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn identical_input_gives_identical_output() {
    let text = technical_document(4_000, 11);
    let engine = test_engine();
    let job = SubmitConfig::default().with_max_chunks(6);
    let (_, first) = analyze(&engine, DocumentRef::bytes("a.txt", text.as_str()), job.clone());
    let (_, second) = analyze(&engine, DocumentRef::bytes("a.txt", text.as_str()), job);

    let spans = |r: &DocumentAnalysis| r.chunks.iter().map(|c| (c.start, c.end)).collect::<Vec<_>>();
    assert_eq!(spans(&first), spans(&second));

    let edges = |r: &DocumentAnalysis| {
        r.edges
            .iter()
            .map(|e| {
                (
                    e.chunk_a.ordinal,
                    e.chunk_b.ordinal,
                    e.score.to_bits(),
                    e.shared_concepts.clone(),
                    e.reason.clone(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(edges(&first), edges(&second));
}

#[test]
fn list_is_newest_first_and_unknown_ids_are_not_found() {
    let engine = test_engine();
    let a = engine
        .submit(DocumentRef::bytes("a.txt", "Install the agent now."), SubmitConfig::default())
        .unwrap();
    let b = engine
        .submit(DocumentRef::bytes("b.txt", "Configure the agent now."), SubmitConfig::default())
        .unwrap();
    engine.wait(a, WAIT).unwrap();
    engine.wait(b, WAIT).unwrap();

    let ids: Vec<TaskId> = engine.list_tasks().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![b, a]);

    let ghost = TaskId::new(10_000).unwrap();
    assert!(engine.get_status(ghost).unwrap_err().is_task_not_found());
}

// ---------------------------------------------------------------------------
// Relationship threshold
// ---------------------------------------------------------------------------

fn bare_chunk(ordinal: u32, concepts: &[(&str, f64)]) -> Chunk {
    Chunk {
        id: ChunkId::new(DocumentId::new(1).unwrap(), ordinal),
        ordinal,
        start: 0,
        end: 0,
        text: String::new(),
        title: String::new(),
        word_count: 0,
        concepts: ConceptVector::from_weights(concepts.iter().copied()),
        genre: None,
        features: ChunkFeatures::default(),
    }
}

#[test]
fn pair_scoring_exactly_the_threshold_is_not_linked() {
    let params = RelationParams {
        threshold: 0.2,
        cross_mention_bonus: 0.1,
    };
    let at = [
        bare_chunk(0, &[("alpha", 0.2), ("beta", 0.8)]),
        bare_chunk(1, &[("alpha", 0.2), ("gamma", 0.8)]),
    ];
    assert!(build_relationships(&at, Genre::Technical, params).unwrap().is_empty());

    let above = [
        bare_chunk(0, &[("alpha", 0.2001), ("beta", 0.7999)]),
        bare_chunk(1, &[("alpha", 0.2001), ("gamma", 0.7999)]),
    ];
    let edges = build_relationships(&above, Genre::Technical, params).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].shared_concepts, vec!["alpha"]);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn engine_config_round_trips_through_toml() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("conf").join("crossref.toml");
    let mut config = EngineConfig::default();
    config.workers = Some(3);
    config.extraction.acceptance_threshold = 0.6;
    config.analysis.concepts_per_chunk = 12;
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}
