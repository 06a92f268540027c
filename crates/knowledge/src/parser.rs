//! Source file reading and text extraction.

use crate::error::{KnowledgeError, KnowledgeResult};
use std::fs;
use std::path::Path;

/// Bytes inspected when sniffing for binary content.
const SNIFF_LEN: usize = 8192;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    PlainText,
    Pdf,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("txt") | Some("text") => Self::PlainText,
            Some("pdf") => Self::Pdf,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::PlainText => "text",
            Self::Pdf => "pdf",
            Self::Unknown => "unknown",
        }
    }

    /// Types picked up when ingesting a directory.
    pub fn is_ingestible(&self) -> bool {
        matches!(self, Self::Markdown | Self::PlainText)
    }
}

/// Read a source file and return its trimmed text.
///
/// Invalid UTF-8 sequences are replaced rather than rejected. Binary files,
/// PDFs and files with no readable text fail with `InvalidInput`.
pub fn parse_file(path: &Path) -> KnowledgeResult<String> {
    if ContentType::from_path(path) == ContentType::Pdf {
        return Err(KnowledgeError::InvalidInput(format!(
            "{:?}: PDF extraction is not supported, convert to text first",
            path
        )));
    }

    let raw = fs::read(path).map_err(|e| {
        KnowledgeError::InvalidInput(format!("Failed to read {:?}: {}", path, e))
    })?;

    if !is_likely_text(&raw) {
        tracing::warn!("Skipping likely binary file: {:?}", path);
        return Err(KnowledgeError::InvalidInput(format!(
            "{:?}: binary file not supported",
            path
        )));
    }

    parse_text(&String::from_utf8_lossy(&raw))
        .map_err(|_| KnowledgeError::InvalidInput(format!("{:?}: no readable text", path)))
}

/// Normalize raw text; fails when nothing but whitespace remains.
pub fn parse_text(raw: &str) -> KnowledgeResult<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(KnowledgeError::InvalidInput("no readable text".to_string()));
    }
    Ok(text.to_string())
}

/// Check if content is likely text (no NUL bytes near the start).
fn is_likely_text(data: &[u8]) -> bool {
    !data[..data.len().min(SNIFF_LEN)].contains(&0)
}
