//! Engine and per-job configuration.
//!
//! `EngineConfig` is long-lived and persisted as TOML; every field has a
//! default so a partial file is valid. `SubmitConfig` travels with a single
//! job and is validated before a task is created.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::StrategyKind;

/// Largest chunk count a job may request.
pub const MAX_CHUNKS_LIMIT: usize = 50;

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration: {field} {message}")]
    #[diagnostic(
        code(crossref::config::invalid),
        help("Valid ranges: max_chunks 1..=50, relevance_threshold 0.0..=1.0, top_k_edges >= 1.")
    )]
    Invalid { field: String, message: String },

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(crossref::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(crossref::config::parse),
        help("Check the TOML syntax. Run `crossref config` to print a valid default file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(crossref::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

fn check_unit(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("must be within [0, 1], got {value}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// External OCR tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract binary.
    #[serde(default = "default_ocr_command")]
    pub command: String,
    /// Binary that renders PDF pages to PNG (poppler's `pdftoppm`).
    #[serde(default = "default_pdf_renderer")]
    pub pdf_renderer: String,
    /// Tesseract language list, e.g. `eng+deu`.
    #[serde(default = "default_ocr_languages")]
    pub languages: String,
    /// PDF pages run through OCR, counted from the first.
    #[serde(default = "default_ocr_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
}

fn default_ocr_command() -> String {
    "tesseract".into()
}
fn default_pdf_renderer() -> String {
    "pdftoppm".into()
}
fn default_ocr_languages() -> String {
    "eng".into()
}
fn default_ocr_max_pages() -> usize {
    5
}
fn default_ocr_dpi() -> u32 {
    200
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            pdf_renderer: default_pdf_renderer(),
            languages: default_ocr_languages(),
            max_pages: default_ocr_max_pages(),
            dpi: default_ocr_dpi(),
        }
    }
}

/// Extraction coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// A result scoring above this stops the strategy search.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// Bound on a single strategy attempt.
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,
    /// Non-whitespace characters below which text counts as empty.
    #[serde(default = "default_min_viable_chars")]
    pub min_viable_chars: usize,
    #[serde(default)]
    pub ocr: OcrConfig,
}

fn default_acceptance_threshold() -> f64 {
    0.75
}
fn default_strategy_timeout_ms() -> u64 {
    30_000
}
fn default_min_viable_chars() -> usize {
    8
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            strategy_timeout_ms: default_strategy_timeout_ms(),
            min_viable_chars: default_min_viable_chars(),
            ocr: OcrConfig::default(),
        }
    }
}

/// Analysis stage settings shared by every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Concepts kept per chunk after weighting.
    #[serde(default = "default_concepts_per_chunk")]
    pub concepts_per_chunk: usize,
    /// Similarity added when one chunk explicitly mentions the other.
    #[serde(default = "default_cross_mention_bonus")]
    pub cross_mention_bonus: f64,
    /// Words used for a chunk title when it has no heading.
    #[serde(default = "default_title_words")]
    pub title_words: usize,
}

fn default_concepts_per_chunk() -> usize {
    15
}
fn default_cross_mention_bonus() -> f64 {
    0.1
}
fn default_title_words() -> usize {
    8
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concepts_per_chunk: default_concepts_per_chunk(),
            cross_mention_bonus: default_cross_mention_bonus(),
            title_words: default_title_words(),
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size; `None` uses the number of available cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Yield to the pool at every pipeline checkpoint.
    #[serde(default)]
    pub yield_at_checkpoints: bool,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml().map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == Some(0) {
            return Err(invalid("workers", "must be at least 1"));
        }
        check_unit(
            "extraction.acceptance_threshold",
            self.extraction.acceptance_threshold,
        )?;
        if self.extraction.strategy_timeout_ms == 0 {
            return Err(invalid("extraction.strategy_timeout_ms", "must be positive"));
        }
        if self.extraction.min_viable_chars == 0 {
            return Err(invalid("extraction.min_viable_chars", "must be at least 1"));
        }
        if self.analysis.concepts_per_chunk == 0 {
            return Err(invalid("analysis.concepts_per_chunk", "must be at least 1"));
        }
        check_unit(
            "analysis.cross_mention_bonus",
            self.analysis.cross_mention_bonus,
        )?;
        Ok(())
    }

    /// Worker count after applying the default.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

// ---------------------------------------------------------------------------
// Per-job configuration
// ---------------------------------------------------------------------------

/// Parameters of one `submit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Requested chunk count, `1..=50`.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    /// Edges need a similarity strictly above this.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    /// Mandatory reads kept per chunk.
    #[serde(default = "default_top_k_edges")]
    pub top_k_edges: usize,
    /// Strategy tried first.
    #[serde(default)]
    pub strategy_hint: Option<StrategyKind>,
}

fn default_max_chunks() -> usize {
    20
}
fn default_relevance_threshold() -> f64 {
    0.2
}
fn default_top_k_edges() -> usize {
    3
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_chunks: default_max_chunks(),
            relevance_threshold: default_relevance_threshold(),
            top_k_edges: default_top_k_edges(),
            strategy_hint: None,
        }
    }
}

impl SubmitConfig {
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k_edges = top_k;
        self
    }

    pub fn with_strategy_hint(mut self, hint: StrategyKind) -> Self {
        self.strategy_hint = Some(hint);
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=MAX_CHUNKS_LIMIT).contains(&self.max_chunks) {
            return Err(invalid(
                "max_chunks",
                format!("must be within 1..={MAX_CHUNKS_LIMIT}, got {}", self.max_chunks),
            ));
        }
        check_unit("relevance_threshold", self.relevance_threshold)?;
        if self.top_k_edges == 0 {
            return Err(invalid("top_k_edges", "must be at least 1"));
        }
        Ok(())
    }
}
