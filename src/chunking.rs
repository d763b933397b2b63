//! Chunking utilities for splitting page text into overlapping passages.
//!
//! Pages longer than the chunk size are split into overlapping windows so
//! that a sentence cut at one boundary still appears whole in a neighbour.
//! Sizes are measured in characters.

use serde::{Deserialize, Serialize};

use crate::loader::Page;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// A retrievable unit: one chunk of one page of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Identity shared by both indexes of a knowledge base.
    pub id: u64,
    /// File name of the source document.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// Split text into overlapping chunks.
///
/// If the text is shorter than `chunk_size`, returns a single chunk.
/// Chunk ends are pulled back to whitespace where possible. Properly
/// handles UTF-8 multi-byte characters.
///
/// # Examples
///
/// ```
/// use pdfchat::chunking::chunk_text;
///
/// // Short text returns a single chunk
/// let chunks = chunk_text("Hello, world!", 1000, 100);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0], "Hello, world!");
///
/// // Long text gets split
/// let text = "word ".repeat(500);
/// let chunks = chunk_text(&text, 1000, 100);
/// assert!(chunks.len() >= 2);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let char_count = text.chars().count();

    // Short text doesn't need chunking
    if char_count <= chunk_size {
        if text.trim().is_empty() {
            return Vec::new();
        }
        return vec![text.to_string()];
    }

    // Build a map of char index -> byte index for O(1) lookups
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start_char = 0;

    while start_char < char_count {
        let end_char = (start_char + chunk_size).min(char_count);

        // Try to break at word boundary
        let mut chunk_end_char = if end_char < char_count {
            find_word_boundary_char(text, &char_to_byte, end_char)
        } else {
            end_char
        };
        if chunk_end_char <= start_char {
            chunk_end_char = end_char;
        }

        let start_byte = char_to_byte[start_char];
        let end_byte = char_to_byte[chunk_end_char];

        let chunk_text = &text[start_byte..end_byte];
        if !chunk_text.trim().is_empty() {
            chunks.push(chunk_text.to_string());
        }

        if chunk_end_char >= char_count {
            break;
        }

        // Step back by the overlap, but always make progress.
        start_char = chunk_end_char
            .saturating_sub(overlap)
            .max(start_char + 1);
    }

    chunks
}

/// Find a word boundary near the given char position, preferring to break
/// at whitespace.
fn find_word_boundary_char(
    text: &str,
    char_to_byte: &[usize],
    pos_char: usize,
) -> usize {
    // Look back up to 100 chars for a good break point
    let search_start_char = pos_char.saturating_sub(100);

    let start_byte = char_to_byte[search_start_char];
    let end_byte = char_to_byte[pos_char];
    let search_region = &text[start_byte..end_byte];

    if let Some(ws_byte_offset) =
        search_region.rfind(|c: char| c.is_whitespace())
    {
        let ws_byte = start_byte + ws_byte_offset;
        // First char index past the whitespace byte.
        return char_to_byte.partition_point(|&byte_idx| byte_idx <= ws_byte);
    }

    pos_char
}

/// Split pages into passages with sequential ids starting at zero.
pub fn split_pages(
    pages: &[Page],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Passage> {
    let mut passages = Vec::new();
    for page in pages {
        for chunk in chunk_text(&page.text, chunk_size, overlap) {
            passages.push(Passage {
                id: passages.len() as u64,
                source: page.source.clone(),
                page: page.page,
                text: chunk,
            });
        }
    }
    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text(
            "Hello, world!",
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
        );
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(chunk_text("   \n\t ", 1000, 100).is_empty());
        assert!(chunk_text("", 1000, 100).is_empty());
    }

    #[test]
    fn long_text_multiple_chunks_overlap() {
        let text: String = (0..500).map(|i| format!("w{i:03} ")).collect(); // 2500 chars
        let chunks = chunk_text(&text, 1000, 100);

        assert!(chunks.len() >= 3);
        let head = chunks[1].split_whitespace().next().unwrap();
        let at = chunks[0].rfind(head).expect("chunks should overlap");
        assert!(chunks[0].len() - at <= 100);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = "lorem ipsum dolor sit amet ".repeat(200);
        for chunk in chunk_text(&text, 1000, 100) {
            assert!(chunk.chars().count() <= 1000);
        }
    }

    #[test]
    fn chunks_reach_end_of_text() {
        let text = "a".repeat(3000);
        let chunks = chunk_text(&text, 1000, 100);

        assert!(text.starts_with(chunks[0].as_str()));
        assert!(text.ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn handles_emoji_and_multibyte_chars() {
        let emoji_text = "Hello 👉 world 🌍 test ".repeat(100);
        let chunks = chunk_text(&emoji_text, 200, 50);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 200);
        }
    }

    #[test]
    fn split_pages_assigns_sequential_ids_and_keeps_provenance() {
        let pages = vec![
            Page {
                source: "a.pdf".to_string(),
                page: 1,
                text: "alpha ".repeat(300),
            },
            Page {
                source: "b.pdf".to_string(),
                page: 7,
                text: "short page".to_string(),
            },
            Page {
                source: "b.pdf".to_string(),
                page: 8,
                text: "   ".to_string(),
            },
        ];

        let passages = split_pages(&pages, 1000, 100);
        assert!(passages.len() >= 3);
        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.id, i as u64);
        }
        let last = passages.last().unwrap();
        assert_eq!(last.source, "b.pdf");
        assert_eq!(last.page, 7);
        assert_eq!(last.text, "short page");
    }
}
