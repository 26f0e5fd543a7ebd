use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::generate_doc_id;

/// Upper bound on the text handed to extraction, in characters.
pub const MAX_DOCUMENT_CHARS: usize = 500_000;

/// Normalized plain-text input for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: Option<String>,
    pub text: String,
}

impl Document {
    /// Build a document whose id is derived from its title, or from its text
    /// when untitled.
    pub fn new(title: Option<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let doc_id = match &title {
            Some(title) => generate_doc_id(title),
            None => generate_doc_id(&text),
        };
        Self::with_id(doc_id, title, text)
    }

    pub fn with_id(doc_id: String, title: Option<String>, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if let Some((cut, _)) = text.char_indices().nth(MAX_DOCUMENT_CHARS) {
            warn!(doc_id = %doc_id, limit = MAX_DOCUMENT_CHARS, "Document truncated");
            text.truncate(cut);
        }

        Self { doc_id, title, text }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
