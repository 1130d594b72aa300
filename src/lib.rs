// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # crossref-engine
//!
//! Content-aware document analysis: turns long-form documents into a network
//! of linked text segments for "must-read-together" documentation hubs.
//!
//! ## Architecture
//!
//! - **Extraction** (`extract`): direct-text, structured and OCR strategies
//!   behind one trait, coordinated by quality score with per-attempt timeouts
//! - **Task tracking** (`task`): lifecycle, stage and monotonic progress of
//!   every job, readable as consistent snapshots while workers write
//! - **Analysis** (`analysis`): sentence-aligned chunking, genre
//!   classification, genre-boosted concept vectors, thresholded similarity
//!   edges and hub assembly
//! - **Pipeline** (`pipeline`): stage sequencing with cancellation checkpoints
//! - **Engine** (`engine`): worker pool plus the submit / poll interface
//!
//! ## Library usage
//!
//! ```no_run
//! use std::time::Duration;
//! use crossref_engine::config::{EngineConfig, SubmitConfig};
//! use crossref_engine::engine::Engine;
//! use crossref_engine::pipeline::DocumentRef;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let task = engine
//!     .submit(DocumentRef::path("manual.pdf"), SubmitConfig::default().with_max_chunks(10))
//!     .unwrap();
//! engine.wait(task, Duration::from_secs(60)).unwrap();
//! let result = engine.get_result(task).unwrap();
//! for edge in &result.edges {
//!     println!("{} -> {}: {}", edge.chunk_a, edge.chunk_b, edge.reason);
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod task;
