use std::path::Path;

use lopdf::Document;
use tracing::warn;

use crate::domain::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PdfPage {
    pub number: u32,
    pub text: String,
}

/// Text layer of every page, in page order. Pages without text come back empty.
pub fn extract_pages(path: &Path) -> Result<Vec<PdfPage>> {
    let document = Document::load(path)
        .map_err(|e| AppError::ParseError(format!("Failed to load PDF {}: {}", path.display(), e)))?;
    Ok(pages_of(&document))
}

fn pages_of(document: &Document) -> Vec<PdfPage> {
    document
        .get_pages()
        .into_keys()
        .map(|number| {
            let text = match document.extract_text(&[number]) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!(page = number, error = %e, "No text layer on page");
                    String::new()
                }
            };
            PdfPage { number, text }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pdf_is_parse_error() {
        let path = std::env::temp_dir().join(format!("not-a-pdf-{}.pdf", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = extract_pages(&path).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }
}
