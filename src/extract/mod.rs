//! Multi-strategy text extraction.
//!
//! An [`Extractor`] turns document bytes into raw text plus a confidence.
//! The [`ExtractionCoordinator`] runs the configured extractors in priority
//! order (direct text, structured, OCR), normalizes and scores each result,
//! and keeps the best one:
//!
//! - a result whose quality exceeds the acceptance threshold ends the search;
//! - otherwise every strategy runs and the highest quality wins, earlier
//!   strategies winning ties;
//! - each attempt runs under its own [`Deadline`]; a timed-out attempt is
//!   abandoned and only forfeits that strategy.
//!
//! Extraction fails only when no attempt produced viable text.

pub mod direct;
pub mod error;
pub mod format;
pub mod normalize;
pub mod ocr;
pub mod parser;
pub mod quality;
pub mod structured;

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use self::error::{ExtractError, ExtractResult};
use self::format::{ContentFormat, detect_format};
use self::normalize::{normalize_text, visible_chars};
use self::quality::{QualityBreakdown, assess_quality};

// ---------------------------------------------------------------------------
// Strategy capability
// ---------------------------------------------------------------------------

/// The extraction strategies, in default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Text layer as-is. Fast, no layout.
    #[serde(alias = "direct")]
    DirectText,
    /// Format-aware parsing that keeps headings and paragraphs.
    Structured,
    /// Optical character recognition over rendered pages.
    Ocr,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectText => "direct",
            Self::Structured => "structured",
            Self::Ocr => "ocr",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "direct_text" | "text" => Ok(Self::DirectText),
            "structured" | "layout" => Ok(Self::Structured),
            "ocr" | "image" => Ok(Self::Ocr),
            other => Err(format!(
                "unknown extraction strategy \"{other}\" (expected direct, structured or ocr)"
            )),
        }
    }
}

/// Document bytes handed to every strategy. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub bytes: Arc<[u8]>,
    /// Path or display name, used in diagnostics and for format hints.
    pub name: String,
    pub format: ContentFormat,
}

impl ExtractionInput {
    /// Wrap bytes, detecting the format from content and name.
    pub fn new(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        let name = name.into();
        let format = detect_format(&bytes, &name);
        Self {
            bytes: bytes.into(),
            name,
            format,
        }
    }

    /// Wrap bytes with an explicit format.
    pub fn with_format(bytes: Vec<u8>, name: impl Into<String>, format: ContentFormat) -> Self {
        Self {
            bytes: bytes.into(),
            name: name.into(),
            format,
        }
    }
}

/// What a single strategy produced, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtraction {
    pub text: String,
    /// The strategy's own confidence in \[0, 1\].
    pub confidence: f64,
    pub page_count: Option<usize>,
    pub title: Option<String>,
}

/// Time budget of one extraction attempt.
///
/// The coordinator abandons an attempt when its timeout fires. Extractors
/// call [`Deadline::check`] between units of work (pages, chapters, tool
/// runs) and stop there; external tools still running at the deadline are
/// killed.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    abandoned: Arc<AtomicBool>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// No time limit; only [`Deadline::abandon`] ends the attempt.
    pub fn unbounded() -> Self {
        Self {
            at: None,
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tell the attempt to stop at its next check. Shared by every clone.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub fn is_expired(&self) -> bool {
        self.abandoned.load(Ordering::Acquire) || self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// `Err(DeadlineExceeded)` once the budget is spent.
    pub fn check(&self, strategy: StrategyKind) -> ExtractResult<()> {
        if self.is_expired() {
            return Err(ExtractError::DeadlineExceeded {
                strategy: strategy.to_string(),
            });
        }
        Ok(())
    }
}

/// One text-extraction strategy.
///
/// Implementations must be side-effect free apart from scratch files, and
/// safe to run on any thread.
pub trait Extractor: Send + Sync {
    fn strategy(&self) -> StrategyKind;

    /// Extract text. Return [`ExtractError::NotApplicable`] for formats the
    /// strategy cannot handle, and stop with
    /// [`ExtractError::DeadlineExceeded`] once `deadline` has expired.
    fn extract(&self, input: &ExtractionInput, deadline: &Deadline) -> ExtractResult<RawExtraction>;
}

// ---------------------------------------------------------------------------
// Attempt reporting
// ---------------------------------------------------------------------------

/// How one strategy attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Produced text, scored after normalization.
    Scored {
        quality: f64,
        confidence: f64,
        chars: usize,
    },
    /// The strategy does not handle this format.
    Skipped { reason: String },
    /// The strategy returned an error.
    Failed { message: String },
    /// The attempt exceeded the per-strategy timeout.
    TimedOut { after_ms: u64 },
}

/// Record of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

/// The coordinator's chosen result.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Normalized text.
    pub text: String,
    pub quality: QualityBreakdown,
    pub strategy: StrategyKind,
    pub confidence: f64,
    pub format: ContentFormat,
    pub page_count: Option<usize>,
    pub title: Option<String>,
    /// Every attempt, in execution order.
    pub attempts: Vec<StrategyAttempt>,
}

impl Extraction {
    pub fn quality_score(&self) -> f64 {
        self.quality.score
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Candidate {
    strategy: StrategyKind,
    text: String,
    quality: QualityBreakdown,
    raw: RawExtraction,
}

enum RunResult {
    Finished(ExtractResult<RawExtraction>),
    TimedOut,
}

/// Runs extractors in priority order and keeps the best-scoring output.
pub struct ExtractionCoordinator {
    extractors: Vec<Arc<dyn Extractor>>,
    config: ExtractionConfig,
}

impl ExtractionCoordinator {
    /// The default strategy set: direct text, structured, OCR.
    pub fn new(config: &ExtractionConfig) -> Self {
        let extractors: Vec<Arc<dyn Extractor>> = vec![
            Arc::new(direct::DirectTextExtractor),
            Arc::new(structured::StructuredExtractor),
            Arc::new(ocr::OcrExtractor::from_config(&config.ocr)),
        ];
        Self::with_extractors(config, extractors)
    }

    /// A custom strategy set, tried in the given order.
    pub fn with_extractors(config: &ExtractionConfig, extractors: Vec<Arc<dyn Extractor>>) -> Self {
        Self {
            extractors,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Strategies in the order they will be tried; a hint moves its
    /// strategy to the front.
    pub fn order(&self, hint: Option<StrategyKind>) -> Vec<StrategyKind> {
        self.ordered(hint).iter().map(|e| e.strategy()).collect()
    }

    fn ordered(&self, hint: Option<StrategyKind>) -> Vec<Arc<dyn Extractor>> {
        let mut ordered = self.extractors.clone();
        if let Some(hint) = hint {
            // Stable partition: hinted strategy first, the rest unchanged.
            ordered.sort_by_key(|e| e.strategy() != hint);
        }
        ordered
    }

    /// Extract without progress reporting.
    pub fn extract(
        &self,
        input: &ExtractionInput,
        hint: Option<StrategyKind>,
    ) -> ExtractResult<Extraction> {
        self.extract_with(input, hint, |_, _, _| {})
    }

    /// Extract, calling `on_attempt(done, total, attempt)` after each attempt.
    pub fn extract_with(
        &self,
        input: &ExtractionInput,
        hint: Option<StrategyKind>,
        mut on_attempt: impl FnMut(usize, usize, &StrategyAttempt),
    ) -> ExtractResult<Extraction> {
        let order = self.ordered(hint);
        let total = order.len();
        let timeout = Duration::from_millis(self.config.strategy_timeout_ms);
        let mut attempts: Vec<StrategyAttempt> = Vec::with_capacity(total);
        let mut best: Option<Candidate> = None;

        for (idx, extractor) in order.iter().enumerate() {
            let strategy = extractor.strategy();
            let started = Instant::now();
            let result = run_with_timeout(Arc::clone(extractor), input.clone(), timeout);
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let outcome = match result {
                RunResult::Finished(Ok(raw)) => {
                    let text = normalize_text(&raw.text);
                    let quality = assess_quality(&text);
                    let chars = visible_chars(&text);
                    tracing::debug!(
                        strategy = %strategy,
                        quality = quality.score,
                        chars,
                        elapsed_ms,
                        "extraction attempt scored"
                    );
                    let outcome = AttemptOutcome::Scored {
                        quality: quality.score,
                        confidence: raw.confidence,
                        chars,
                    };
                    if chars >= self.config.min_viable_chars {
                        let better = best
                            .as_ref()
                            .is_none_or(|b| quality.score > b.quality.score);
                        if better {
                            best = Some(Candidate {
                                strategy,
                                text,
                                quality,
                                raw,
                            });
                        }
                    }
                    outcome
                }
                RunResult::Finished(Err(ExtractError::NotApplicable { .. })) => {
                    tracing::debug!(strategy = %strategy, format = %input.format, "strategy not applicable");
                    AttemptOutcome::Skipped {
                        reason: format!("{strategy} does not handle {} content", input.format),
                    }
                }
                RunResult::TimedOut | RunResult::Finished(Err(ExtractError::DeadlineExceeded { .. })) => {
                    tracing::warn!(
                        strategy = %strategy,
                        timeout_ms = self.config.strategy_timeout_ms,
                        "extraction attempt timed out"
                    );
                    AttemptOutcome::TimedOut {
                        after_ms: self.config.strategy_timeout_ms,
                    }
                }
                RunResult::Finished(Err(err)) => {
                    tracing::warn!(strategy = %strategy, error = %err, "extraction attempt failed");
                    AttemptOutcome::Failed {
                        message: err.to_string(),
                    }
                }
            };

            let attempt = StrategyAttempt {
                strategy,
                outcome,
                elapsed_ms,
            };
            on_attempt(idx + 1, total, &attempt);
            attempts.push(attempt);

            if best
                .as_ref()
                .is_some_and(|b| b.quality.score > self.config.acceptance_threshold)
            {
                break;
            }
        }

        let Some(best) = best else {
            return Err(self.failure(input, &attempts));
        };

        tracing::info!(
            source = %input.name,
            strategy = %best.strategy,
            quality = best.quality.score,
            attempts = attempts.len(),
            "extraction complete"
        );

        Ok(Extraction {
            text: best.text,
            quality: best.quality,
            strategy: best.strategy,
            confidence: best.raw.confidence,
            format: input.format,
            page_count: best.raw.page_count,
            title: best.raw.title,
            attempts,
        })
    }

    fn failure(&self, input: &ExtractionInput, attempts: &[StrategyAttempt]) -> ExtractError {
        let ran = attempts.iter().any(|a| {
            matches!(
                a.outcome,
                AttemptOutcome::Scored { .. } | AttemptOutcome::Failed { .. }
            )
        });
        let timed_out = attempts
            .iter()
            .any(|a| matches!(a.outcome, AttemptOutcome::TimedOut { .. }));
        if timed_out && !ran {
            return ExtractError::AllStrategiesTimedOut {
                origin: input.name.clone(),
            };
        }

        let summary = attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::Scored { chars, .. } => {
                    format!("{}: {chars} visible characters", a.strategy)
                }
                AttemptOutcome::Skipped { .. } => format!("{}: not applicable", a.strategy),
                AttemptOutcome::Failed { message } => format!("{}: {message}", a.strategy),
                AttemptOutcome::TimedOut { after_ms } => {
                    format!("{}: timed out after {after_ms} ms", a.strategy)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        ExtractError::ExtractionFailed {
            origin: input.name.clone(),
            message: if summary.is_empty() {
                "no extraction strategies configured".into()
            } else {
                format!(
                    "no strategy produced at least {} visible characters ({summary})",
                    self.config.min_viable_chars
                )
            },
        }
    }
}

/// Run one attempt on a dedicated thread and wait at most `timeout`.
///
/// On timeout the attempt's deadline is abandoned: the worker stops at its
/// next check, killing any external tool, and its result is discarded.
fn run_with_timeout(
    extractor: Arc<dyn Extractor>,
    input: ExtractionInput,
    timeout: Duration,
) -> RunResult {
    let strategy = extractor.strategy();
    let deadline = Deadline::after(timeout);
    let worker_deadline = deadline.clone();
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name(format!("crossref-extract-{strategy}"))
        .spawn(move || {
            let result = extractor.extract(&input, &worker_deadline);
            // The receiver is gone when the coordinator stopped waiting.
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return RunResult::Finished(Err(ExtractError::from(e)));
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => RunResult::Finished(result),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            deadline.abandon();
            RunResult::TimedOut
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            RunResult::Finished(Err(ExtractError::WorkerLost {
                strategy: strategy.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const GOOD: &str = "The installer copies every configuration file into place. \
        Afterwards, verify the service starts and check the log for warnings.";

    struct Fixed {
        kind: StrategyKind,
        text: &'static str,
    }

    impl Extractor for Fixed {
        fn strategy(&self) -> StrategyKind {
            self.kind
        }
        fn extract(&self, _input: &ExtractionInput, _deadline: &Deadline) -> ExtractResult<RawExtraction> {
            Ok(RawExtraction {
                text: self.text.into(),
                confidence: 0.5,
                ..Default::default()
            })
        }
    }

    struct Sleepy(StrategyKind, u64);

    impl Extractor for Sleepy {
        fn strategy(&self) -> StrategyKind {
            self.0
        }
        fn extract(&self, _input: &ExtractionInput, deadline: &Deadline) -> ExtractResult<RawExtraction> {
            let until = Instant::now() + Duration::from_millis(self.1);
            while Instant::now() < until {
                deadline.check(self.0)?;
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(RawExtraction {
                text: GOOD.into(),
                confidence: 1.0,
                ..Default::default()
            })
        }
    }

    struct Panicky;

    impl Extractor for Panicky {
        fn strategy(&self) -> StrategyKind {
            StrategyKind::DirectText
        }
        fn extract(&self, _input: &ExtractionInput, _deadline: &Deadline) -> ExtractResult<RawExtraction> {
            panic!("strategy bug");
        }
    }

    /// Works in 5 ms slices for 400 ms, counting finished and stopped runs.
    #[derive(Default)]
    struct Counted {
        finished: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl Extractor for Counted {
        fn strategy(&self) -> StrategyKind {
            StrategyKind::Ocr
        }
        fn extract(&self, _input: &ExtractionInput, deadline: &Deadline) -> ExtractResult<RawExtraction> {
            for _ in 0..80 {
                if let Err(e) = deadline.check(StrategyKind::Ocr) {
                    self.stopped.fetch_add(1, Ordering::SeqCst);
                    return Err(e);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(RawExtraction {
                text: GOOD.into(),
                confidence: 1.0,
                ..Default::default()
            })
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig {
            strategy_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    fn fixed(kind: StrategyKind, text: &'static str) -> Arc<dyn Extractor> {
        Arc::new(Fixed { kind, text })
    }

    fn input() -> ExtractionInput {
        ExtractionInput::new(b"ignored".to_vec(), "doc.txt")
    }

    #[test]
    fn stops_at_first_accepted_result() {
        let coord = ExtractionCoordinator::with_extractors(
            &config(),
            vec![
                fixed(StrategyKind::DirectText, GOOD),
                fixed(StrategyKind::Structured, GOOD),
            ],
        );
        let out = coord.extract(&input(), None).unwrap();
        assert_eq!(out.strategy, StrategyKind::DirectText);
        assert_eq!(out.attempts.len(), 1);
        assert!(out.quality_score() > 0.75);
    }

    #[test]
    fn keeps_best_when_nothing_is_accepted() {
        let noisy = "t h e q u i c k b r o w n f o x";
        let worse = "â€œ Ã© â€ garbled Ã¼ text â€™ here";
        let coord = ExtractionCoordinator::with_extractors(
            &config(),
            vec![
                fixed(StrategyKind::DirectText, worse),
                fixed(StrategyKind::Structured, noisy),
            ],
        );
        let out = coord.extract(&input(), None).unwrap();
        assert_eq!(out.attempts.len(), 2);
        let scores: Vec<f64> = out
            .attempts
            .iter()
            .filter_map(|a| match a.outcome {
                AttemptOutcome::Scored { quality, .. } => Some(quality),
                _ => None,
            })
            .collect();
        let max = scores.iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(out.quality_score(), max);
    }

    #[test]
    fn hint_moves_strategy_to_front() {
        let coord = ExtractionCoordinator::with_extractors(
            &config(),
            vec![
                fixed(StrategyKind::DirectText, GOOD),
                fixed(StrategyKind::Structured, GOOD),
                fixed(StrategyKind::Ocr, GOOD),
            ],
        );
        assert_eq!(
            coord.order(Some(StrategyKind::Ocr)),
            vec![StrategyKind::Ocr, StrategyKind::DirectText, StrategyKind::Structured]
        );
        let out = coord.extract(&input(), Some(StrategyKind::Structured)).unwrap();
        assert_eq!(out.strategy, StrategyKind::Structured);
    }

    #[test]
    fn empty_text_everywhere_fails() {
        let coord = ExtractionCoordinator::with_extractors(
            &config(),
            vec![
                fixed(StrategyKind::DirectText, "   \n\t "),
                fixed(StrategyKind::Structured, ""),
            ],
        );
        let err = coord.extract(&input(), None).unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailed { .. }), "{err:?}");
    }

    #[test]
    fn timeout_only_forfeits_that_strategy() {
        let cfg = ExtractionConfig {
            strategy_timeout_ms: 50,
            ..Default::default()
        };
        let coord = ExtractionCoordinator::with_extractors(
            &cfg,
            vec![
                Arc::new(Sleepy(StrategyKind::DirectText, 2_000)),
                fixed(StrategyKind::Structured, GOOD),
            ],
        );
        let out = coord.extract(&input(), None).unwrap();
        assert_eq!(out.strategy, StrategyKind::Structured);
        assert!(matches!(
            out.attempts[0].outcome,
            AttemptOutcome::TimedOut { after_ms: 50 }
        ));
    }

    #[test]
    fn all_timeouts_is_reported_as_timeout() {
        let cfg = ExtractionConfig {
            strategy_timeout_ms: 20,
            ..Default::default()
        };
        let coord = ExtractionCoordinator::with_extractors(
            &cfg,
            vec![Arc::new(Sleepy(StrategyKind::Ocr, 1_000))],
        );
        let err = coord.extract(&input(), None).unwrap_err();
        assert!(matches!(err, ExtractError::AllStrategiesTimedOut { .. }));
    }

    #[test]
    fn timed_out_attempts_stop_working() {
        let cfg = ExtractionConfig {
            strategy_timeout_ms: 20,
            ..Default::default()
        };
        let counted = Arc::new(Counted::default());
        let coord = ExtractionCoordinator::with_extractors(
            &cfg,
            vec![Arc::clone(&counted) as Arc<dyn Extractor>],
        );
        for _ in 0..8 {
            let err = coord.extract(&input(), None).unwrap_err();
            assert!(matches!(err, ExtractError::AllStrategiesTimedOut { .. }), "{err:?}");
        }
        // Outlast the full 400 ms workload of every abandoned attempt.
        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(counted.finished.load(Ordering::SeqCst), 0);
        assert_eq!(counted.stopped.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn deadline_expires_and_can_be_abandoned() {
        let unbounded = Deadline::unbounded();
        assert!(unbounded.check(StrategyKind::DirectText).is_ok());
        let clone = unbounded.clone();
        unbounded.abandon();
        assert!(matches!(
            clone.check(StrategyKind::DirectText),
            Err(ExtractError::DeadlineExceeded { .. })
        ));

        let short = Deadline::after(Duration::from_millis(10));
        assert!(!short.is_expired());
        std::thread::sleep(Duration::from_millis(20));
        assert!(short.is_expired());
    }

    #[test]
    fn panicking_strategy_is_recorded_as_failure() {
        let coord = ExtractionCoordinator::with_extractors(
            &config(),
            vec![Arc::new(Panicky), fixed(StrategyKind::Structured, GOOD)],
        );
        let out = coord.extract(&input(), None).unwrap();
        assert!(matches!(out.attempts[0].outcome, AttemptOutcome::Failed { .. }));
        assert_eq!(out.strategy, StrategyKind::Structured);
    }

    #[test]
    fn progress_callback_sees_every_attempt() {
        let coord = ExtractionCoordinator::with_extractors(
            &config(),
            vec![
                fixed(StrategyKind::DirectText, ""),
                fixed(StrategyKind::Structured, GOOD),
            ],
        );
        let mut seen = Vec::new();
        coord
            .extract_with(&input(), None, |done, total, a| seen.push((done, total, a.strategy)))
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (1, 2, StrategyKind::DirectText),
                (2, 2, StrategyKind::Structured)
            ]
        );
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("direct".parse::<StrategyKind>(), Ok(StrategyKind::DirectText));
        assert_eq!("OCR".parse::<StrategyKind>(), Ok(StrategyKind::Ocr));
        assert!("magic".parse::<StrategyKind>().is_err());
    }
}
