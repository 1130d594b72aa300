//! Image-based recognition: the last-resort strategy for scans and images.
//!
//! Recognition itself sits behind [`OcrEngine`] so the engine can be swapped
//! (or mocked in tests). The default engine drives the `tesseract` CLI; PDF
//! pages are rasterized first with `pdftoppm`. Both tools exchange data
//! through temporary files and are killed when the attempt's deadline passes.

use std::io::{self, Read as _, Seek as _, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::extract::error::{ExtractError, ExtractResult};
use crate::extract::format::ContentFormat;
use crate::extract::{Deadline, ExtractionInput, Extractor, RawExtraction, StrategyKind};

/// Interval between exit checks of a running external tool.
const TOOL_POLL: Duration = Duration::from_millis(20);

/// Recognized text of one page image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPage {
    pub text: String,
    /// Mean word confidence in \[0, 1\].
    pub confidence: f64,
}

/// Optical character recognition over a single encoded image.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize one image, giving up once `deadline` expires.
    fn recognize(&self, image: &[u8], deadline: &Deadline) -> ExtractResult<OcrPage>;
}

/// Renders PDF pages to encoded images for an [`OcrEngine`].
pub trait PageRasterizer: Send + Sync {
    /// Render at most `max_pages` pages, first page first.
    fn rasterize(
        &self,
        pdf: &[u8],
        max_pages: usize,
        deadline: &Deadline,
    ) -> ExtractResult<Vec<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// OCR strategy: images directly, PDFs page by page up to a page limit.
pub struct OcrExtractor {
    engine: Arc<dyn OcrEngine>,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
    max_pages: usize,
}

impl OcrExtractor {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        rasterizer: Option<Arc<dyn PageRasterizer>>,
        max_pages: usize,
    ) -> Self {
        Self {
            engine,
            rasterizer,
            max_pages,
        }
    }

    /// Tesseract plus pdftoppm, configured from `config`.
    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            Arc::new(TesseractCli::new(&config.command, &config.languages)),
            Some(Arc::new(PdftoppmCli::new(&config.pdf_renderer, config.dpi))),
            config.max_pages,
        )
    }
}

impl Extractor for OcrExtractor {
    fn strategy(&self) -> StrategyKind {
        StrategyKind::Ocr
    }

    fn extract(&self, input: &ExtractionInput, deadline: &Deadline) -> ExtractResult<RawExtraction> {
        let pages = match input.format {
            ContentFormat::Image => vec![self.engine.recognize(&input.bytes, deadline)?],
            ContentFormat::Pdf => {
                let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
                    ExtractError::ToolUnavailable {
                        tool: "pdf rasterizer".into(),
                        message: "no rasterizer configured for PDF OCR".into(),
                    }
                })?;
                let images = rasterizer.rasterize(&input.bytes, self.max_pages, deadline)?;
                tracing::debug!(
                    engine = self.engine.name(),
                    pages = images.len(),
                    "running OCR over rasterized PDF pages"
                );
                let mut pages = Vec::with_capacity(images.len());
                for image in &images {
                    deadline.check(self.strategy())?;
                    pages.push(self.engine.recognize(image, deadline)?);
                }
                pages
            }
            _ => {
                return Err(ExtractError::NotApplicable {
                    strategy: self.strategy().to_string(),
                    format: input.format.to_string(),
                });
            }
        };

        let confidence = if pages.is_empty() {
            0.0
        } else {
            pages.iter().map(|p| p.confidence).sum::<f64>() / pages.len() as f64
        };
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\x0C");

        Ok(RawExtraction {
            text,
            confidence,
            page_count: Some(pages.len()),
            title: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tesseract CLI
// ---------------------------------------------------------------------------

/// Runs `tesseract <image> <out> -l <languages> tsv` and reads `<out>.tsv`.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    languages: String,
}

impl TesseractCli {
    pub fn new(command: &str, languages: &str) -> Self {
        Self {
            command: command.to_string(),
            languages: languages.to_string(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &[u8], deadline: &Deadline) -> ExtractResult<OcrPage> {
        let dir = tempfile::Builder::new().prefix("crossref-ocr-").tempdir()?;
        let image_path = dir.path().join("page");
        std::fs::write(&image_path, image)?;
        let out = dir.path().join("out");

        let mut command = Command::new(&self.command);
        command
            .arg(&image_path)
            .arg(&out)
            .args(["-l", self.languages.as_str()])
            .arg("tsv");
        run_tool(command, &self.command, deadline)?;

        let tsv = std::fs::read(out.with_extension("tsv"))?;
        Ok(parse_tsv(&String::from_utf8_lossy(&tsv)))
    }
}

/// Rebuild text and mean confidence from tesseract TSV output.
///
/// Only word rows (level 5) are used. Words on the same line are joined by
/// spaces, lines by newlines, and paragraphs by blank lines.
pub fn parse_tsv(tsv: &str) -> OcrPage {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut prev: Option<(&str, &str, &str)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let key = (cols[2], cols[3], cols[4]);
        match prev {
            None => {}
            Some((block, par, _)) if block != key.0 || par != key.1 => text.push_str("\n\n"),
            Some((_, _, line)) if line != key.2 => text.push('\n'),
            Some(_) => text.push(' '),
        }
        text.push_str(word);
        prev = Some(key);

        if let Ok(conf) = cols[10].trim().parse::<f64>() {
            if conf >= 0.0 {
                confidences.push(conf.min(100.0) / 100.0);
            }
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
    OcrPage { text, confidence }
}

// ---------------------------------------------------------------------------
// pdftoppm
// ---------------------------------------------------------------------------

/// Runs `pdftoppm -png -r <dpi> -f 1 -l <max_pages>` into a temp directory.
#[derive(Debug, Clone)]
pub struct PdftoppmCli {
    command: String,
    dpi: u32,
}

impl PdftoppmCli {
    pub fn new(command: &str, dpi: u32) -> Self {
        Self {
            command: command.to_string(),
            dpi,
        }
    }
}

impl PageRasterizer for PdftoppmCli {
    fn rasterize(
        &self,
        pdf: &[u8],
        max_pages: usize,
        deadline: &Deadline,
    ) -> ExtractResult<Vec<Vec<u8>>> {
        let dir = tempfile::Builder::new()
            .prefix("crossref-pages-")
            .tempdir()?;
        let input = dir.path().join("input.pdf");
        std::fs::write(&input, pdf)?;
        let prefix = dir.path().join("page");

        let mut command = Command::new(&self.command);
        command
            .arg("-png")
            .args(["-r", self.dpi.to_string().as_str()])
            .args(["-f", "1", "-l", max_pages.max(1).to_string().as_str()])
            .arg(&input)
            .arg(&prefix);
        run_tool(command, &self.command, deadline)?;
        read_page_images(dir.path())
    }
}

/// Read `page-*.png` files from `dir` in page order.
fn read_page_images(dir: &Path) -> ExtractResult<Vec<Vec<u8>>> {
    let mut pages: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("page") && n.ends_with(".png"))
        })
        .collect();
    // pdftoppm zero-pads page numbers to a common width, so names sort.
    pages.sort();
    pages
        .iter()
        .map(|p| std::fs::read(p).map_err(ExtractError::from))
        .collect()
}

/// Run an external tool to completion, killing it once `deadline` expires.
///
/// Output goes to files the caller chose; stderr is captured in a scratch
/// file so a chatty tool never blocks on a full pipe.
fn run_tool(mut command: Command, tool: &str, deadline: &Deadline) -> ExtractResult<()> {
    deadline.check(StrategyKind::Ocr)?;
    let mut stderr = tempfile::tempfile()?;
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr.try_clone()?))
        .spawn()
        .map_err(|e| spawn_error(tool, e))?;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if deadline.is_expired() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(tool, "killed external tool at the attempt deadline");
            return Err(ExtractError::DeadlineExceeded {
                strategy: StrategyKind::Ocr.to_string(),
            });
        }
        std::thread::sleep(TOOL_POLL);
    };

    if !status.success() {
        let mut message = Vec::new();
        stderr.seek(SeekFrom::Start(0))?;
        stderr.read_to_end(&mut message)?;
        return Err(ExtractError::Ocr {
            message: format!(
                "{tool} exited with {status}: {}",
                String::from_utf8_lossy(&message).trim()
            ),
        });
    }
    Ok(())
}

fn spawn_error(tool: &str, err: io::Error) -> ExtractError {
    if err.kind() == io::ErrorKind::NotFound {
        ExtractError::ToolUnavailable {
            tool: tool.to_string(),
            message: "not found on PATH".into(),
        }
    } else {
        ExtractError::ToolUnavailable {
            tool: tool.to_string(),
            message: err.to_string(),
        }
    }
}
