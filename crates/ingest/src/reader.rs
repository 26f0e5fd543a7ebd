use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::fs;

/// Extensions read as-is. PDFs and office formats are converted upstream.
const PLAIN_TEXT: &[&str] = &["txt", "md"];

pub struct FileReader;

impl FileReader {
    pub async fn read_file(path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if !PLAIN_TEXT.contains(&extension.as_str()) {
            bail!("Unsupported file format: {:?} ({})", extension, path.display());
        }

        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        // Papers exported from PDF tools occasionally carry stray bytes
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unconverted_formats() {
        let err = FileReader::read_file(Path::new("paper.pdf")).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported file format"));
    }

    #[tokio::test]
    async fn strips_byte_order_marks() {
        let path = std::env::temp_dir().join(format!("aop-reader-{}.MD", std::process::id()));
        std::fs::write(&path, "\u{feff}# Methods\n").unwrap();

        let text = FileReader::read_file(&path).await.unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(text, "# Methods\n");
    }
}
