//! PDF extraction: text-layer-aware per-page extraction with an optional
//! rasterize + OCR fallback for pages with no text layer.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};

use super::{ExtractedDocument, ExtractedPage};

pub fn extract_pdf(path: &Path, config: &ExtractConfig) -> Result<ExtractedDocument> {
    let bytes = std::fs::read(path)?;
    let document = lopdf::Document::load_mem(&bytes)
        .map_err(|e| ExtractError::ParseFailure(format!("pdf parse failed: {e}")))?;

    let page_ids: Vec<_> = document.get_pages().into_iter().collect();
    let mut pages = Vec::with_capacity(page_ids.len());

    for (index, (page_number, page_id)) in page_ids.iter().enumerate() {
        let mut text = document
            .extract_text(&[*page_number])
            .unwrap_or_default()
            .trim()
            .to_string();

        if text.is_empty() && config.use_ocr {
            debug!(page = page_number, "empty text layer, falling back to OCR");
            text = match ocr_page(&bytes, index, config.ocr_scale) {
                Ok(ocr_text) => ocr_text,
                Err(err) => {
                    warn!(page = page_number, error = %err, "ocr failed for page");
                    String::new()
                }
            };
        }

        let _ = page_id;
        pages.push(ExtractedPage {
            page_number: *page_number,
            text,
        });
    }

    let full_text = pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut metadata = HashMap::new();
    metadata.insert("pages".to_string(), pages.len().to_string());
    if let Some(info) = document.trailer.get(b"Info").ok().and_then(|o| o.as_reference().ok()) {
        if let Ok(dict) = document.get_dictionary(info) {
            if let Ok(producer) = dict.get(b"Producer").and_then(|o| o.as_str()) {
                metadata.insert("producer".to_string(), String::from_utf8_lossy(producer).to_string());
            }
            if let Ok(creator) = dict.get(b"Creator").and_then(|o| o.as_str()) {
                metadata.insert("creator".to_string(), String::from_utf8_lossy(creator).to_string());
            }
        }
    }

    Ok(ExtractedDocument {
        text: full_text,
        pages,
        paragraphs: Vec::new(),
        tables: Vec::new(),
        metadata,
    })
}

#[cfg(feature = "ocr")]
fn ocr_page(bytes: &[u8], page_index: usize, scale: f32) -> Result<String> {
    use leptess::LepTess;
    use pdfium_render::prelude::*;

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractError::OcrFailure(format!("pdfium load failed: {e}")))?;

    let page = document
        .pages()
        .get(page_index as u16)
        .map_err(|e| ExtractError::OcrFailure(format!("page {page_index} unavailable: {e}")))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .render_form_data(false);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExtractError::OcrFailure(format!("rasterize failed: {e}")))?;

    let mut png_bytes = Vec::new();
    bitmap
        .as_image()
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .map_err(|e| ExtractError::OcrFailure(format!("png encode failed: {e}")))?;

    let mut ocr = LepTess::new(None, "eng")
        .map_err(|e| ExtractError::OcrFailure(format!("tesseract init failed: {e}")))?;
    ocr.set_image_from_mem(&png_bytes)
        .map_err(|e| ExtractError::OcrFailure(format!("set image failed: {e}")))?;

    ocr.get_utf8_text()
        .map_err(|e| ExtractError::OcrFailure(format!("ocr text extraction failed: {e}")).into())
}

#[cfg(not(feature = "ocr"))]
fn ocr_page(_bytes: &[u8], _page_index: usize, _scale: f32) -> Result<String> {
    Err(ExtractError::OcrFailure("OCR support not compiled in".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_disabled_returns_error() {
        #[cfg(not(feature = "ocr"))]
        {
            let result = ocr_page(&[], 0, 2.0);
            assert!(result.is_err());
        }
    }
}
