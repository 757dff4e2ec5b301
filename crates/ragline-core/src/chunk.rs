//! Overlapping, boundary-snapped text chunker.
//!
//! Slides a window of `target_chars` over the text. When the window does
//! not reach the end of the text, it is clipped back to the last sentence
//! terminator or newline, provided that boundary lies past the window's
//! midpoint. The next window starts `overlap_chars` before the previous
//! window's end, so the overlap holds even after clipping.
//!
//! All offsets and lengths are measured in characters, not bytes.
//!
//! Each chunk is tagged with structural metadata (see [`extract_metadata`]).

use crate::models::{Chunk, ChunkMetadata, ContentType, DocumentId};

pub const DEFAULT_TARGET_CHARS: usize = 1000;
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

/// Split `text` into ordered, overlapping chunks.
///
/// Returns an empty vector for pathological input: a zero target size, an
/// overlap that is not smaller than the target, or text that is empty after
/// trimming.
pub fn chunk_text(
    document_id: DocumentId,
    text: &str,
    target_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    if target_chars == 0 || overlap_chars >= target_chars {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let spans = window_spans(&chars, target_chars, overlap_chars);

    let mut chunks = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if trimmed.is_empty() {
            continue;
        }
        chunks.push(Chunk {
            document_id,
            index: chunks.len(),
            text: trimmed.to_string(),
            length: trimmed.chars().count(),
            word_count: trimmed.split_whitespace().count(),
            start,
            end,
            metadata: extract_metadata(trimmed),
        });
    }
    chunks
}

/// Compute `[start, end)` character spans of each window.
fn window_spans(chars: &[char], target: usize, overlap: usize) -> Vec<(usize, usize)> {
    let total = chars.len();
    if total <= target {
        return vec![(0, total)];
    }

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + target).min(total);
        if end < total {
            if let Some(pos) = last_boundary(&chars[start..end]) {
                if pos > target / 2 {
                    end = start + pos + 1;
                }
            }
        }
        spans.push((start, end));
        if end >= total {
            break;
        }
        // A clipped window shorter than the overlap must still advance.
        start = end.saturating_sub(overlap).max(start + 1);
    }
    spans
}

fn last_boundary(window: &[char]) -> Option<usize> {
    window
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?' | '\n'))
}

/// Detect headings, tables, fenced code, and lists in a chunk.
///
/// Only a heading on the chunk's first non-empty line becomes its section
/// title; headings further down just set `has_header`.
pub fn extract_metadata(text: &str) -> ChunkMetadata {
    let mut meta = ChunkMetadata::default();

    if let Some((level, title)) = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .and_then(parse_heading)
    {
        meta.section_level = Some(level);
        meta.section_title = Some(title);
    }

    meta.has_code = text.contains("```") || text.contains("~~~");

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parse_heading(line).is_some() {
            meta.has_header = true;
        }
        if is_table_row(trimmed) {
            meta.has_table = true;
        }
        if is_list_item(trimmed) {
            meta.has_list = true;
        }
    }

    meta.content_type = if meta.has_table {
        ContentType::Table
    } else if meta.has_code {
        ContentType::Code
    } else if meta.has_list {
        ContentType::List
    } else {
        ContentType::Text
    };

    meta
}

/// Parse an ATX heading (`# Title` .. `###### Title`).
fn parse_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title.to_string()))
}

fn is_table_row(trimmed: &str) -> bool {
    trimmed.len() > 1 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

fn is_list_item(trimmed: &str) -> bool {
    if ["- ", "* ", "+ ", "• "]
        .iter()
        .any(|bullet| trimmed.starts_with(bullet))
    {
        return true;
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && (trimmed[digits..].starts_with(". ") || trimmed[digits..].starts_with(") "))
}
