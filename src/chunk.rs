//! Chunker (C3): paragraph-first greedy splitting bounded by a target
//! character size, with sentence-boundary splitting for oversized
//! paragraphs and a carried-forward character overlap.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::ChunkConfig;

static PARAGRAPH_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
// The regex crate doesn't support lookbehind, so sentence boundaries are
// located by matching the punctuation + whitespace and keeping the
// punctuation attached to the preceding sentence when splitting below.
static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// One emitted chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub char_count: usize,
    pub section_title: Option<String>,
    pub section_level: Option<u32>,
    pub page_number: Option<u32>,
}

/// An explicit document section, used by the structured chunking variant.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub level: u32,
    pub text: String,
}

/// One page of extracted text, used by the page-aware chunking variant.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

/// Split `text` into chunks per the configured size/overlap.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut next_index = 0usize;
    chunk_into(text, config, None, None, None, &mut next_index, &mut chunks);
    chunks
}

/// Split a sequence of explicit sections, tagging each emitted chunk with
/// its section's title/level while keeping chunk indices globally monotonic.
pub fn chunk_sections(sections: &[Section], config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut next_index = 0usize;
    for section in sections {
        chunk_into(
            &section.text,
            config,
            Some(section.title.as_str()),
            Some(section.level),
            None,
            &mut next_index,
            &mut chunks,
        );
    }
    chunks
}

/// Split a sequence of extracted pages, tagging each emitted chunk with its
/// originating page number while keeping chunk indices globally monotonic.
pub fn chunk_pages(pages: &[Page], config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut next_index = 0usize;
    for page in pages {
        chunk_into(
            &page.text,
            config,
            None,
            None,
            Some(page.page_number),
            &mut next_index,
            &mut chunks,
        );
    }
    chunks
}

fn chunk_into(
    text: &str,
    config: &ChunkConfig,
    section_title: Option<&str>,
    section_level: Option<u32>,
    page_number: Option<u32>,
    next_index: &mut usize,
    out: &mut Vec<Chunk>,
) {
    let paragraphs: Vec<&str> = PARAGRAPH_SPLIT
        .split(text)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    let mut accumulator = String::new();

    let mut flush = |accumulator: &mut String, out: &mut Vec<Chunk>, next_index: &mut usize| {
        let trimmed = accumulator.trim();
        if !trimmed.is_empty() {
            out.push(Chunk {
                text: trimmed.to_string(),
                chunk_index: *next_index,
                char_count: trimmed.chars().count(),
                section_title: section_title.map(|s| s.to_string()),
                section_level,
                page_number,
            });
            *next_index += 1;
        }
        accumulator.clear();
    };

    for paragraph in paragraphs {
        if paragraph.chars().count() > config.chunk_size {
            flush(&mut accumulator, out, next_index);
            for piece in split_by_sentence(paragraph, config) {
                out.push(Chunk {
                    text: piece.clone(),
                    chunk_index: *next_index,
                    char_count: piece.chars().count(),
                    section_title: section_title.map(|s| s.to_string()),
                    section_level,
                    page_number,
                });
                *next_index += 1;
            }
        } else if accumulator.chars().count() + paragraph.chars().count() > config.chunk_size
            && !accumulator.is_empty()
        {
            let overlap = tail_chars(&accumulator, config.chunk_overlap);
            flush(&mut accumulator, out, next_index);
            accumulator.push_str(&overlap);
            if !accumulator.is_empty() {
                accumulator.push_str("\n\n");
            }
            accumulator.push_str(paragraph);
        } else {
            if !accumulator.is_empty() {
                accumulator.push_str("\n\n");
            }
            accumulator.push_str(paragraph);
        }
    }

    flush(&mut accumulator, out, next_index);
}

/// Greedy+overlap split of an oversized paragraph along sentence boundaries.
fn split_by_sentence(paragraph: &str, config: &ChunkConfig) -> Vec<String> {
    let sentences = split_sentences(paragraph);

    let mut pieces = Vec::new();
    let mut accumulator = String::new();

    for sentence in sentences {
        if accumulator.chars().count() + sentence.chars().count() > config.chunk_size
            && !accumulator.is_empty()
        {
            let overlap = tail_chars(&accumulator, config.chunk_overlap);
            pieces.push(accumulator.trim().to_string());
            accumulator = overlap;
            if !accumulator.is_empty() {
                accumulator.push(' ');
            }
            accumulator.push_str(sentence);
        } else {
            if !accumulator.is_empty() {
                accumulator.push(' ');
            }
            accumulator.push_str(sentence);
        }
    }

    if !accumulator.trim().is_empty() {
        pieces.push(accumulator.trim().to_string());
    }

    if pieces.is_empty() {
        pieces.push(paragraph.to_string());
    }

    pieces
}

/// Split text into sentences on `.`/`!`/`?` followed by whitespace,
/// keeping the terminating punctuation with the sentence it ends.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let boundary = m.start() + 1; // include the punctuation, drop the whitespace
        let sentence = text[start..boundary].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= n {
        s.to_string()
    } else {
        chars[chars.len() - n..].iter().collect()
    }
}
