use crate::chunk::{Chunk, estimate_tokens};
use crate::document::Document;

pub struct ChunkerConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 6000,
            overlap_tokens: 200,
        }
    }
}

/// A paragraph or heading line with its byte offset in the document.
struct Block<'a> {
    start: usize,
    text: &'a str,
    heading: bool,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split a document into extraction units. Short documents come back as a
    /// single chunk; longer ones are cut at headings and paragraph breaks.
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let text = doc.text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        if estimate_tokens(text) <= self.config.max_tokens {
            return vec![Chunk::new(doc.doc_id.clone(), 0, text.to_string(), (0, text.len()))];
        }

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut buffer: Option<(usize, usize)> = None;
        let mut buffer_tokens = 0;

        for block in split_blocks(text) {
            let block_tokens = estimate_tokens(block.text);
            let block_end = block.start + block.text.len();

            if let Some((start, end)) = buffer {
                // Headings always open a new section
                if block.heading {
                    spans.push((start, end));
                    buffer = None;
                    buffer_tokens = 0;
                } else if buffer_tokens + block_tokens > self.config.max_tokens {
                    spans.push((start, end));
                    // Start new buffer with overlap
                    let overlap = self.overlap_start(text, start, end);
                    buffer = overlap.map(|s| (s, end));
                    buffer_tokens = buffer
                        .map(|(s, e)| estimate_tokens(&text[s..e]))
                        .unwrap_or(0);
                }
            }

            buffer = Some(match buffer {
                Some((start, _)) => (start, block_end),
                None => (block.start, block_end),
            });
            buffer_tokens += block_tokens;
        }

        if let Some(span) = buffer {
            spans.push(span);
        }

        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                Chunk::new(doc.doc_id.clone(), index, text[start..end].to_string(), (start, end))
            })
            .collect()
    }

    /// Byte offset where the trailing overlap of `text[start..end]` begins.
    fn overlap_start(&self, text: &str, start: usize, end: usize) -> Option<usize> {
        let target_words = (self.config.overlap_tokens as f64 / 1.3) as usize;
        if target_words == 0 {
            return None;
        }

        let segment = &text[start..end];
        let mut word_starts = Vec::new();
        let mut prev_whitespace = true;
        for (i, c) in segment.char_indices() {
            if !c.is_whitespace() && prev_whitespace {
                word_starts.push(i);
            }
            prev_whitespace = c.is_whitespace();
        }

        if word_starts.len() <= target_words {
            return None;
        }
        Some(start + word_starts[word_starts.len() - target_words])
    }
}

fn split_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let trimmed = line.trim();
        let line_end = line_start + line.trim_end().len();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            if let Some((start, end)) = current.take() {
                blocks.push(Block { start, text: &text[start..end], heading: false });
            }
            if !trimmed.is_empty() {
                blocks.push(Block { start: line_start, text: &text[line_start..line_end], heading: true });
            }
            continue;
        }

        current = Some(match current {
            Some((start, _)) => (start, line_end),
            None => (line_start, line_end),
        });
    }

    if let Some((start, end)) = current {
        blocks.push(Block { start, text: &text[start..end], heading: false });
    }

    blocks
}
