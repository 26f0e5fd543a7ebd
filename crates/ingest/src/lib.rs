pub mod chunk;
pub mod chunker;
pub mod document;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig};
pub use document::{Document, MAX_DOCUMENT_CHARS};
pub use reader::FileReader;

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Stable document id: first 16 bytes of SHA-256 over a path or title, as hex.
pub fn generate_doc_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..16])
}

/// Read a plain-text document from disk, titled after its file stem.
pub async fn load_document(file_path: &Path) -> Result<Document> {
    let content = FileReader::read_file(file_path).await?;
    let path_str = file_path.to_string_lossy().to_string();
    let title = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string());

    Ok(Document::with_id(generate_doc_id(&path_str), title, content))
}
