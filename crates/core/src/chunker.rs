//! Line-based chunking with overlap.
//!
//! A file at or under the chunk size becomes a single `file` chunk; larger
//! files are tiled with overlapping `block` chunks. Block chunks covering a
//! symbol definition take that symbol's name, type, and export flag.

use crate::types::{chunk_id, Chunk, ChunkParams, ChunkType, ExtractedSymbol};

/// Chunk a file's content into retrieval units.
///
/// Chunk k of a tiled file covers lines
/// `[k*(size-overlap)+1, min(k*(size-overlap)+size, N)]`, so every line of
/// the file is covered by at least one chunk.
pub fn chunk_file(
    filepath: &str,
    content: &str,
    symbols: &[ExtractedSymbol],
    params: ChunkParams,
) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let n = lines.len();
    if n == 0 {
        return Vec::new();
    }

    if n <= params.chunk_size {
        return vec![Chunk {
            chunk_id: chunk_id(filepath, 1, n),
            filepath: filepath.to_string(),
            start_line: 1,
            end_line: n,
            content: lines.join("\n"),
            chunk_type: ChunkType::File,
            name: None,
            is_exported: None,
        }];
    }

    let step = params.chunk_size.saturating_sub(params.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize; // 0-based
    loop {
        let end = (start + params.chunk_size).min(n); // exclusive
        let start_line = start + 1;
        let end_line = end;

        let mut chunk = Chunk {
            chunk_id: chunk_id(filepath, start_line, end_line),
            filepath: filepath.to_string(),
            start_line,
            end_line,
            content: lines[start..end].join("\n"),
            chunk_type: ChunkType::Block,
            name: None,
            is_exported: None,
        };

        // First symbol inside the range names the block; ties broken by
        // smallest line, then extraction order.
        if let Some(sym) = symbols
            .iter()
            .filter(|s| s.line >= start_line && s.line <= end_line)
            .min_by_key(|s| s.line)
        {
            chunk.name = Some(sym.name.clone());
            chunk.chunk_type = sym.kind.chunk_type();
            chunk.is_exported = Some(sym.is_exported);
        }

        chunks.push(chunk);
        if end >= n {
            break;
        }
        start += step;
    }

    chunks
}
