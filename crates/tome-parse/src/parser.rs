//! Paragraph-boundary document chunker.

use std::path::Path;

use tracing::debug;

use tome_core::Fragment;

use crate::error::ParseError;

/// Upper bound on fragment size in characters.
pub const MAX_CHUNK_CHARS: usize = 1200;

/// Paragraphs are packed together until a fragment reaches at least this
/// many characters, so tiny paragraphs don't each become a fragment.
pub const MIN_CHUNK_CHARS: usize = 200;

/// File extensions the parser accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Parses a document into ordered text fragments.
///
/// # Example
///
/// ```
/// use tome_parse::DocParser;
///
/// let parser = DocParser::default();
/// let fragments = parser.parse(b"First paragraph.\n\nSecond paragraph.", "notes.md").unwrap();
/// assert_eq!(fragments.len(), 1);
/// assert_eq!(fragments[0].source, "notes.md");
/// ```
#[derive(Debug, Clone)]
pub struct DocParser {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
}

impl DocParser {
    pub fn new(max_chunk_chars: usize, min_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            min_chunk_chars,
        }
    }

    /// Parse raw document bytes into fragments.
    ///
    /// The filename determines both the format check and the `source` field
    /// of every produced fragment. Bytes are decoded as UTF-8 lossily, so
    /// stray invalid sequences never fail the parse.
    pub fn parse(&self, bytes: &[u8], filename: &str) -> Result<Vec<Fragment>, ParseError> {
        if !Self::is_supported(filename) {
            return Err(ParseError::UnsupportedFormat(filename.to_string()));
        }

        let text = String::from_utf8_lossy(bytes);
        let chunks = self.chunk_text(&text);
        debug!(
            file = filename,
            fragments = chunks.len(),
            "Parsed document"
        );

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(position, text)| Fragment::new(filename, position, text))
            .collect())
    }

    /// True when the filename's extension is one the parser accepts.
    pub fn is_supported(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Pack paragraphs into chunks bounded by `max_chunk_chars`.
    fn chunk_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if paragraph.len() > self.max_chunk_chars {
                flush(&mut buffer, &mut chunks);
                self.split_oversized(paragraph, &mut chunks);
                continue;
            }

            if !buffer.is_empty() && buffer.len() + 2 + paragraph.len() > self.max_chunk_chars {
                flush(&mut buffer, &mut chunks);
            }
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(paragraph);

            if buffer.len() >= self.min_chunk_chars {
                flush(&mut buffer, &mut chunks);
            }
        }
        flush(&mut buffer, &mut chunks);
        chunks
    }

    /// Split a paragraph longer than the chunk bound on sentence endings,
    /// falling back to whitespace, then to a raw char boundary.
    fn split_oversized(&self, paragraph: &str, chunks: &mut Vec<String>) {
        let mut remaining = paragraph;
        while !remaining.is_empty() {
            if remaining.len() <= self.max_chunk_chars {
                chunks.push(remaining.trim().to_string());
                break;
            }

            let window_end = floor_char_boundary(remaining, self.max_chunk_chars);
            let window = &remaining[..window_end];
            let split_at = rfind_sentence_end(window)
                .or_else(|| {
                    window
                        .char_indices()
                        .rev()
                        .find(|(_, c)| c.is_whitespace())
                        .map(|(i, c)| i + c.len_utf8())
                })
                .filter(|&i| i > 0)
                .unwrap_or(window_end);
            // A chunk bound below one char still has to make progress.
            let split_at = if split_at == 0 {
                remaining
                    .chars()
                    .next()
                    .map(|c| c.len_utf8())
                    .unwrap_or(remaining.len())
            } else {
                split_at
            };

            let piece = remaining[..split_at].trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }
            remaining = &remaining[split_at..];
        }
    }
}

impl Default for DocParser {
    fn default() -> Self {
        Self::new(MAX_CHUNK_CHARS, MIN_CHUNK_CHARS)
    }
}

fn flush(buffer: &mut String, chunks: &mut Vec<String>) {
    if !buffer.is_empty() {
        chunks.push(std::mem::take(buffer));
    }
}

/// Byte index of the last sentence ending (`. `, `! `, `? `) in the window.
fn rfind_sentence_end(window: &str) -> Option<usize> {
    let bytes = window.as_bytes();
    (1..bytes.len())
        .rev()
        .find(|&i| {
            matches!(bytes[i - 1], b'.' | b'!' | b'?')
                && (bytes[i] == b' ' || bytes[i] == b'\n')
        })
        .map(|i| i + 1)
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
