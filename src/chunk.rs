//! Fixed-window line chunker.
//!
//! Splits file text into [`Chunk`]s of at most `max_tokens` (approximated as
//! 4 chars per token) made of whole lines, carrying the trailing
//! `overlap_tokens` worth of lines into the next window so that a match
//! near a boundary keeps its context. A single line longer than the window
//! is hard-split on char boundaries.
//!
//! Every chunk records its index and 1-based line span so search results
//! can point back into the source file, plus a SHA-256 of its text.

use sha2::{Digest, Sha256};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPosition {
    pub index: usize,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub position: ChunkPosition,
    pub hash: String,
}

/// Split `text` into line windows. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    // (line number, line text including its newline)
    let mut window: Vec<(usize, &str)> = Vec::new();
    let mut window_len = 0usize;

    for (i, line) in text.split_inclusive('\n').enumerate() {
        let line_no = i + 1;

        if line.len() > max_chars {
            flush(&mut chunks, &window);
            window.clear();
            window_len = 0;
            for piece in split_long_line(line, max_chars) {
                push_chunk(&mut chunks, piece, line_no, line_no);
            }
            continue;
        }

        if window_len + line.len() > max_chars && !window.is_empty() {
            flush(&mut chunks, &window);
            let keep = overlap_start(&window, overlap_chars, max_chars - line.len());
            window.drain(..keep);
            window_len = window.iter().map(|(_, l)| l.len()).sum();
        }

        window.push((line_no, line));
        window_len += line.len();
    }

    flush(&mut chunks, &window);
    chunks
}

/// Index of the first window line to carry over: the longest suffix that
/// fits both the overlap budget and the room left beside the next line.
fn overlap_start(window: &[(usize, &str)], overlap_chars: usize, room: usize) -> usize {
    let budget = overlap_chars.min(room);
    let mut kept = 0usize;
    let mut start = window.len();
    for (idx, (_, line)) in window.iter().enumerate().rev() {
        if kept + line.len() > budget {
            break;
        }
        kept += line.len();
        start = idx;
    }
    // Never carry the whole window; the next chunk must make progress.
    start.max(1).min(window.len())
}

fn flush(chunks: &mut Vec<Chunk>, window: &[(usize, &str)]) {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return;
    };
    let text: String = window.iter().map(|(_, l)| *l).collect();
    push_chunk(chunks, &text, first.0, last.0);
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, start_line: usize, end_line: usize) {
    let text = text.trim_end();
    if text.trim().is_empty() {
        return;
    }
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    let index = chunks.len();
    chunks.push(Chunk {
        text: text.to_string(),
        position: ChunkPosition {
            index,
            start_line,
            end_line,
        },
        hash,
    });
}

fn split_long_line(line: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = line;
    while !remaining.is_empty() {
        let mut split_at = remaining.len().min(max_chars);
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // A single char wider than the window.
            split_at = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        } else if split_at < remaining.len() {
            if let Some(space) = remaining[..split_at].rfind(' ') {
                if space > 0 {
                    split_at = space + 1;
                }
            }
        }
        pieces.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    pieces
}
