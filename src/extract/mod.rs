//! Text extraction (C2): converts a local file into plain text plus
//! per-page/per-paragraph structure and metadata.

mod docx;
mod pdf;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};

/// The file formats this pipeline knows how to extract text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" | "doc" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }
}

/// Per-page extracted text, 1-based page numbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub text: String,
}

/// Per-paragraph extracted text with its originating style name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedParagraph {
    pub text: String,
    pub style: Option<String>,
}

/// Result of extracting a document: full text, structure, and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractedDocument {
    pub text: String,
    #[serde(default)]
    pub pages: Vec<ExtractedPage>,
    #[serde(default)]
    pub paragraphs: Vec<ExtractedParagraph>,
    #[serde(default)]
    pub tables: Vec<Vec<Vec<String>>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Extract text and structure from a file, dispatching on its extension.
pub fn extract_document(path: &Path, config: &ExtractConfig) -> Result<ExtractedDocument> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let format = DocumentFormat::from_extension(ext).ok_or_else(|| {
        warn!(extension = %ext, "unsupported file format");
        ExtractError::UnsupportedFormat(ext.to_string())
    })?;

    let extracted = match format {
        DocumentFormat::Pdf => pdf::extract_pdf(path, config)?,
        DocumentFormat::Docx => docx::extract_docx(path)?,
    };

    if extracted.text.trim().is_empty() {
        return Err(ExtractError::ExtractionEmpty.into());
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension_rejected() {
        let config = ExtractConfig::default();
        let result = extract_document(Path::new("report.txt"), &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_dispatch() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("doc"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("xlsx"), None);
    }
}
