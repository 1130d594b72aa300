//! Content format detection.
//!
//! Magic bytes win; the file extension is only consulted when the bytes are
//! inconclusive.

use serde::{Deserialize, Serialize};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    Html,
    Pdf,
    Epub,
    Image,
    PlainText,
}

impl ContentFormat {
    /// Human-readable name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Image => "image",
            Self::PlainText => "text",
        }
    }
}

impl std::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the format of `data`, using `name` (a path or file name) as a hint.
pub fn detect_format(data: &[u8], name: &str) -> ContentFormat {
    sniff(data)
        .or_else(|| format_from_extension(name))
        .unwrap_or(ContentFormat::PlainText)
}

/// Detect the content format from a file extension.
pub fn format_from_extension(path: &str) -> Option<ContentFormat> {
    let lower = path.to_lowercase();
    if lower.ends_with(".html") || lower.ends_with(".htm") || lower.ends_with(".xhtml") {
        Some(ContentFormat::Html)
    } else if lower.ends_with(".pdf") {
        Some(ContentFormat::Pdf)
    } else if lower.ends_with(".epub") {
        Some(ContentFormat::Epub)
    } else if [".png", ".jpg", ".jpeg", ".tif", ".tiff", ".bmp"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        Some(ContentFormat::Image)
    } else if lower.ends_with(".txt") || lower.ends_with(".md") || lower.ends_with(".text") {
        Some(ContentFormat::PlainText)
    } else {
        None
    }
}

fn sniff(data: &[u8]) -> Option<ContentFormat> {
    if data.starts_with(b"%PDF-") {
        return Some(ContentFormat::Pdf);
    }
    // EPUB is a zip whose first entry is the `mimetype` file.
    if data.starts_with(b"PK\x03\x04") {
        let window = &data[..data.len().min(128)];
        if contains(window, b"application/epub+zip") {
            return Some(ContentFormat::Epub);
        }
        return None;
    }
    if data.starts_with(b"\x89PNG")
        || data.starts_with(b"\xFF\xD8\xFF")
        || data.starts_with(b"II*\x00")
        || data.starts_with(b"MM\x00*")
        || data.starts_with(b"BM")
    {
        return Some(ContentFormat::Image);
    }

    let head = String::from_utf8_lossy(&data[..data.len().min(512)]).to_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return Some(ContentFormat::Html);
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_pdf_regardless_of_name() {
        assert_eq!(detect_format(b"%PDF-1.7\n...", "notes.txt"), ContentFormat::Pdf);
    }

    #[test]
    fn sniffs_html_doctype() {
        assert_eq!(
            detect_format(b"  <!DOCTYPE html><html></html>", "page"),
            ContentFormat::Html
        );
    }

    #[test]
    fn sniffs_epub_mimetype_entry() {
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(&[0u8; 26]);
        data.extend_from_slice(b"mimetypeapplication/epub+zip");
        assert_eq!(detect_format(&data, "book"), ContentFormat::Epub);
    }

    #[test]
    fn sniffs_png() {
        assert_eq!(detect_format(b"\x89PNG\r\n\x1a\n", "scan"), ContentFormat::Image);
    }

    #[test]
    fn falls_back_to_extension_then_text() {
        assert_eq!(detect_format(b"hello", "page.HTM"), ContentFormat::Html);
        assert_eq!(detect_format(b"hello", "readme"), ContentFormat::PlainText);
        assert_eq!(format_from_extension("image.bin"), None);
    }
}
