use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;

/// Words to tokens, roughly, for English scientific prose.
const TOKENS_PER_WORD: f64 = 1.3;

/// A contiguous slice of a document handed to the extraction capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    /// Position of the chunk in the document, starting at 0
    pub index: usize,
    pub text: String,
    pub offset: (usize, usize), // [start, end) byte positions
}

impl Chunk {
    pub fn new(doc_id: String, index: usize, text: String, offset: (usize, usize)) -> Self {
        let chunk_id = chunk_id(&doc_id, index, offset);
        Self {
            doc_id,
            chunk_id,
            index,
            text,
            offset,
        }
    }

    /// Byte range of this chunk in the document text.
    pub fn span(&self) -> Range<usize> {
        self.offset.0..self.offset.1
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Same document and same span always give the same id.
fn chunk_id(doc_id: &str, index: usize, (start, end): (usize, usize)) -> String {
    let digest = Sha256::new()
        .chain_update(doc_id.as_bytes())
        .chain_update(start.to_le_bytes())
        .chain_update(end.to_le_bytes())
        .finalize();
    format!("{doc_id}-{index}-{}", hex::encode(&digest[..4]))
}

pub(crate) fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD) as usize
}
