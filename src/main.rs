//! crossref CLI: document analysis and cross-reference generation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use crossref_engine::config::{EngineConfig, SubmitConfig};
use crossref_engine::engine::Engine;
use crossref_engine::extract::{AttemptOutcome, ExtractionCoordinator, ExtractionInput, StrategyKind};
use crossref_engine::model::DocumentAnalysis;
use crossref_engine::pipeline::DocumentRef;
use crossref_engine::task::TaskState;

/// Interval between status polls while a job runs.
const POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "crossref", version, about = "Content-aware document analysis and cross-reference engine")]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a document: extract, chunk, classify and cross-reference.
    Analyze {
        /// Document to analyze (PDF, EPUB, HTML, image or plain text).
        file: PathBuf,

        /// Number of chunks to split the document into (1-50).
        #[arg(long, default_value = "20")]
        max_chunks: usize,

        /// Minimum similarity for an edge (exclusive).
        #[arg(long, default_value = "0.2")]
        threshold: f64,

        /// Mandatory reads listed per chunk.
        #[arg(long, default_value = "3")]
        top_k: usize,

        /// Extraction strategy to try first: direct, structured or ocr.
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run only text extraction and report every strategy attempt.
    Extract {
        /// Document to extract.
        file: PathBuf,

        /// Extraction strategy to try first: direct, structured or ocr.
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Print the extracted text after the report.
        #[arg(long)]
        text: bool,
    },

    /// Print the default engine configuration as TOML.
    Config,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            file,
            max_chunks,
            threshold,
            top_k,
            strategy,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let engine = Engine::new(config)?;
            let mut job = SubmitConfig::default()
                .with_max_chunks(max_chunks)
                .with_threshold(threshold)
                .with_top_k(top_k);
            if let Some(strategy) = strategy {
                job = job.with_strategy_hint(strategy);
            }

            let task = engine.submit(DocumentRef::path(&file), job)?;
            let mut last_progress = -1.0;
            let status = loop {
                let status = engine.get_status(task)?;
                if status.state.is_terminal() {
                    break status;
                }
                if status.progress > last_progress {
                    last_progress = status.progress;
                    eprintln!("[{:>5.1}%] {}", status.progress, status.state);
                }
                std::thread::sleep(POLL);
            };

            for warning in &status.warnings {
                eprintln!("warning: {warning}");
            }
            match status.state {
                TaskState::Completed | TaskState::Cancelled if status.has_result => {
                    let result = engine.get_result(task)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&*result).into_diagnostic()?);
                    } else {
                        print_summary(&result);
                    }
                }
                _ => {
                    let error = status
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| status.state.to_string());
                    match status.last_stage {
                        Some(stage) => miette::bail!(
                            "analysis of {} ended during {stage}: {error}",
                            file.display()
                        ),
                        None => miette::bail!("analysis of {} ended: {error}", file.display()),
                    }
                }
            }
        }

        Commands::Extract {
            file,
            strategy,
            text,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let bytes = std::fs::read(&file).into_diagnostic()?;
            let input = ExtractionInput::new(bytes, file.display().to_string());
            let coordinator = ExtractionCoordinator::new(&config.extraction);
            let extraction = coordinator.extract(&input, strategy)?;

            println!("Format: {}", extraction.format);
            println!("Attempts:");
            for attempt in &extraction.attempts {
                let outcome = match &attempt.outcome {
                    AttemptOutcome::Scored {
                        quality,
                        confidence,
                        chars,
                    } => format!("quality {quality:.3}, confidence {confidence:.2}, {chars} chars"),
                    AttemptOutcome::Skipped { reason } => format!("skipped ({reason})"),
                    AttemptOutcome::Failed { message } => format!("failed: {message}"),
                    AttemptOutcome::TimedOut { after_ms } => format!("timed out after {after_ms} ms"),
                };
                println!("  {:<10} {outcome} [{} ms]", attempt.strategy, attempt.elapsed_ms);
            }
            println!(
                "Selected: {} (quality {:.3}: readability {:.3}, cleanliness {:.3}, word shape {:.3})",
                extraction.strategy,
                extraction.quality.score,
                extraction.quality.readability,
                extraction.quality.cleanliness,
                extraction.quality.word_shape,
            );
            if let Some(pages) = extraction.page_count {
                println!("Pages: {pages}");
            }
            if text {
                println!();
                println!("{}", extraction.text);
            }
        }

        Commands::Config => {
            let toml = EngineConfig::default()
                .to_toml()
                .map_err(|e| miette::miette!("failed to render config: {e}"))?;
            print!("{toml}");
        }
    }

    Ok(())
}

fn print_summary(result: &DocumentAnalysis) {
    let doc = &result.document;
    println!("Document: {}", doc.title.as_deref().unwrap_or("(untitled)"));
    println!(
        "Format: {}  Strategy: {}  Quality: {:.3}",
        doc.format, doc.strategy, doc.quality_score
    );
    if let Some(genre) = &result.genre {
        println!("Genre: {} (confidence {:.2})", genre.genre, genre.confidence);
    }
    if !result.complete {
        println!("Partial result: the job was cancelled.");
    }

    println!();
    println!("Chunks ({}):", result.chunks.len());
    for chunk in &result.chunks {
        let top: Vec<&str> = chunk.concepts.terms().take(5).collect();
        println!(
            "  {:>2}. {} [{} words] {}",
            chunk.ordinal + 1,
            chunk.title,
            chunk.word_count,
            top.join(", ")
        );
    }

    println!();
    println!("Edges ({}):", result.edges.len());
    for edge in &result.edges {
        println!(
            "  {:>2} -> {:>2}  {:.3}  {}",
            edge.chunk_a.ordinal + 1,
            edge.chunk_b.ordinal + 1,
            edge.score,
            edge.reason
        );
    }

    if let Some(hub) = &result.hub {
        println!();
        println!("Mandatory reads:");
        for (entry, name) in hub.entries.iter().zip(&hub.file_names) {
            let reads: Vec<String> = entry
                .mandatory_reads
                .iter()
                .map(|id| (id.ordinal + 1).to_string())
                .collect();
            println!("  {name}: {}", reads.join(", "));
        }
        let path: Vec<String> = hub
            .reading_path
            .iter()
            .map(|id| (id.ordinal + 1).to_string())
            .collect();
        println!("Reading path: {}", path.join(" "));
    }
}
