//! DOCX extraction: paragraphs in document order with style names, tables
//! serialized as `" | "`-joined cells, core properties best-effort.

use std::collections::HashMap;
use std::path::Path;

use docx_rs::{DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRowChild};
use tracing::warn;

use crate::error::{ExtractError, Result};

use super::{ExtractedDocument, ExtractedParagraph};

pub fn extract_docx(path: &Path) -> Result<ExtractedDocument> {
    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes)
        .map_err(|e| ExtractError::ParseFailure(format!("docx parse failed: {e}")))?;

    let mut paragraphs = Vec::new();
    let mut tables = Vec::new();

    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(para) => {
                let text = paragraph_text(para);
                if !text.trim().is_empty() {
                    paragraphs.push(ExtractedParagraph {
                        text,
                        style: para.property.style.as_ref().map(|s| s.val.clone()),
                    });
                }
            }
            DocumentChild::Table(table) => {
                tables.push(table_rows(table));
            }
            _ => {}
        }
    }

    let mut full_text = paragraphs
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    for table in &tables {
        for row in table {
            full_text.push('\n');
            full_text.push_str(&row.join(" | "));
        }
    }

    let mut metadata = HashMap::new();
    metadata.insert("paragraphs".to_string(), paragraphs.len().to_string());
    metadata.insert("tables".to_string(), tables.len().to_string());

    // Core properties are best-effort: their absence must not fail extraction.
    if let Some(core) = docx.core.as_ref() {
        if let Some(title) = core.title.clone() {
            metadata.insert("title".to_string(), title);
        }
        if let Some(author) = core.creator.clone() {
            metadata.insert("author".to_string(), author);
        }
        if let Some(created) = core.created.clone() {
            metadata.insert("created".to_string(), created);
        }
        if let Some(modified) = core.modified.clone() {
            metadata.insert("modified".to_string(), modified);
        }
    } else {
        warn!("docx core properties unavailable, continuing without them");
    }

    Ok(ExtractedDocument {
        text: full_text,
        pages: Vec::new(),
        paragraphs,
        tables,
        metadata,
    })
}

fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

fn table_rows(table: &docx_rs::Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for child in &table.rows {
        let TableChild::TableRow(row) = child;
        let mut cells = Vec::new();
        for cell_child in &row.cells {
            let TableRowChild::TableCell(cell) = cell_child;
            let mut cell_text = String::new();
            for content in &cell.children {
                if let TableCellContent::Paragraph(para) = content {
                    cell_text.push_str(&paragraph_text(para));
                }
            }
            cells.push(cell_text);
        }
        rows.push(cells);
    }
    rows
}
