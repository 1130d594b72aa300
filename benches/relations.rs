//! Benchmarks for concept extraction and relationship building.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use crossref_engine::analysis::{
    Genre, RelationParams, build_relationships, chunk_document, extract_concepts,
};
use crossref_engine::model::DocumentId;

const WORDS: &[&str] = &[
    "install", "configure", "verify", "server", "agent", "cluster", "gateway", "database",
    "cache", "proxy", "firewall", "certificate", "volume", "kernel", "module", "package",
    "plugin", "driver", "socket", "endpoint", "registry", "bucket", "queue", "worker",
];

fn document(sentences: usize) -> String {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    (0..sentences)
        .map(|_| {
            let words: Vec<&str> = (0..10).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect();
            format!("The {}.", words.join(" "))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_concepts(c: &mut Criterion) {
    let text = document(2_000);
    let doc = DocumentId::new(1).unwrap();
    let (chunks, _) = chunk_document(doc, &text, 20, 8).unwrap();

    c.bench_function("concepts_20_chunks", |bench| {
        bench.iter(|| {
            let mut chunks = chunks.clone();
            extract_concepts(&mut chunks, Genre::Technical, 15);
            black_box(chunks)
        })
    });
}

fn bench_relationships(c: &mut Criterion) {
    let text = document(5_000);
    let doc = DocumentId::new(1).unwrap();
    let (mut chunks, _) = chunk_document(doc, &text, 50, 8).unwrap();
    extract_concepts(&mut chunks, Genre::Technical, 15);
    let params = RelationParams {
        threshold: 0.2,
        cross_mention_bonus: 0.1,
    };

    c.bench_function("relationships_50_chunks", |bench| {
        bench.iter(|| black_box(build_relationships(&chunks, Genre::Technical, params).unwrap()))
    });
}

criterion_group!(benches, bench_concepts, bench_relationships);
criterion_main!(benches);
