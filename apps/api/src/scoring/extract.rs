//! Document extraction: turns an uploaded resume file into plain text.

use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not extract text from PDF: {0}")]
    Pdf(String),

    #[error("Could not extract text from PDF: parser aborted ({0})")]
    ParserPanic(String),
}

/// Declared type of an uploaded resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    Text,
}

impl MediaType {
    /// Infers the media type from a file name. Anything that is not `.pdf` is read as text.
    pub fn from_file_name(name: &str) -> Self {
        Self::recognized(name).unwrap_or(MediaType::Text)
    }

    /// Returns the media type only for the two extensions the service accepts.
    pub fn recognized(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Some(MediaType::Pdf)
        } else if lower.ends_with(".txt") {
            Some(MediaType::Text)
        } else {
            None
        }
    }
}

/// An uploaded resume file. Consumed by extraction; never persisted.
#[derive(Debug, Clone)]
pub struct ResumeDocument {
    pub bytes: Bytes,
    pub media_type: MediaType,
    pub file_name: Option<String>,
}

impl ResumeDocument {
    pub fn new(bytes: impl Into<Bytes>, file_name: Option<String>) -> Self {
        let media_type = file_name
            .as_deref()
            .map(MediaType::from_file_name)
            .unwrap_or(MediaType::Text);
        Self {
            bytes: bytes.into(),
            media_type,
            file_name,
        }
    }
}

/// Extracts trimmed plain text. A blank result is returned as-is; the caller decides
/// that it is an empty-input condition.
///
/// CPU-bound for PDFs; call from `spawn_blocking` in async contexts.
pub fn extract(document: &ResumeDocument) -> Result<String, ExtractionError> {
    match document.media_type {
        MediaType::Pdf => extract_pdf(&document.bytes),
        MediaType::Text => {
            if let Some(name) = document.file_name.as_deref() {
                if MediaType::recognized(name).is_none() {
                    warn!("Non-PDF file '{name}' uploaded. Attempting raw text read.");
                }
            }
            Ok(decode_lossy(&document.bytes))
        }
    }
}

/// Decodes UTF-8, dropping undecodable byte sequences.
fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim()
        .to_string()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract can panic on malformed content streams; contain it as an extraction failure.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }))
    .map_err(|payload| ExtractionError::ParserPanic(panic_message(payload.as_ref())))?;

    let text = result.map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    // Pages may be separated by form feeds; join them with a single space.
    let pages: Vec<&str> = text
        .split('\x0c')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    Ok(pages.join(" ").trim().to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builds a small, well-formed single-font PDF with one page per entry of `pages`.
#[cfg(test)]
pub(crate) fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let font_id = 3 + 2 * page_count;
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        page_count
    ));
    for (i, text) in pages.iter().enumerate() {
        let page_id = 3 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {} 0 R >>",
            page_id + 1
        ));
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_returned_trimmed() {
        let doc = ResumeDocument::new(
            "  Python Data Science Machine Learning \n".as_bytes().to_vec(),
            Some("resume.txt".to_string()),
        );
        assert_eq!(doc.media_type, MediaType::Text);
        assert_eq!(
            extract(&doc).unwrap(),
            "Python Data Science Machine Learning"
        );
    }

    #[test]
    fn test_invalid_utf8_is_dropped_not_fatal() {
        let mut bytes = b"Rust ".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"Engineer");
        let doc = ResumeDocument::new(bytes, Some("cv.txt".to_string()));
        assert_eq!(extract(&doc).unwrap(), "Rust Engineer");
    }

    #[test]
    fn test_unknown_extension_read_as_text() {
        let doc = ResumeDocument::new(b"SQL and Tableau".to_vec(), Some("cv.docx".to_string()));
        assert_eq!(doc.media_type, MediaType::Text);
        assert_eq!(extract(&doc).unwrap(), "SQL and Tableau");
    }

    #[test]
    fn test_media_type_detection_is_case_insensitive() {
        assert_eq!(MediaType::from_file_name("CV.PDF"), MediaType::Pdf);
        assert_eq!(MediaType::recognized("notes.TXT"), Some(MediaType::Text));
        assert_eq!(MediaType::recognized("archive.zip"), None);
    }

    #[test]
    fn test_whitespace_only_text_extracts_to_empty() {
        let doc = ResumeDocument::new(b" \n\t ".to_vec(), Some("blank.txt".to_string()));
        assert!(extract(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_pdf_is_extraction_error() {
        let doc = ResumeDocument::new(
            b"%PDF-1.4\nthis is not really a pdf".to_vec(),
            Some("broken.pdf".to_string()),
        );
        assert!(extract(&doc).is_err());
    }

    #[test]
    fn test_minimal_pdf_extracts_text() {
        let bytes = minimal_pdf(&["Python Developer", "AWS Kubernetes"]);
        let doc = ResumeDocument::new(bytes, Some("candidate.pdf".to_string()));
        let text = extract(&doc).unwrap();
        assert!(text.contains("Python"), "got {text:?}");
        assert!(text.contains("Kubernetes"), "got {text:?}");
    }
}
