//! Corpus loading from parsed-document JSON files.
//!
//! Document acquisition and PDF text extraction happen upstream; this
//! module consumes their output: one JSON file per document carrying the
//! source filename and the per-page extracted text. A file that fails to
//! load is reported and skipped, the rest of the corpus still indexes.

use crate::chunker;
use crate::types::{DocumentFailure, PageRecord, ParsedDocument};
use coverqa_core::{AppError, AppResult};
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

/// On-disk document shape. The id is derived, never trusted from input.
#[derive(Debug, Deserialize)]
struct RawDocument {
    filename: Option<String>,
    pages: Vec<PageRecord>,
}

/// Result of scanning a corpus directory.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub documents: Vec<ParsedDocument>,
    pub failures: Vec<DocumentFailure>,
}

/// Load every `.json` document under `dir`, in filename order.
pub fn load_corpus(dir: &Path) -> AppResult<CorpusLoad> {
    if !dir.is_dir() {
        return Err(AppError::Parse(format!(
            "Corpus directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    tracing::info!("Found {} document file(s) in {}", paths.len(), dir.display());

    let mut load = CorpusLoad::default();
    for path in paths {
        match load_document(&path) {
            Ok(doc) => load.documents.push(doc),
            Err(e) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                tracing::warn!("Skipping '{}': {}", filename, e);
                load.failures.push(DocumentFailure {
                    filename,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(load)
}

/// Load and validate a single parsed-document file.
pub fn load_document(path: &Path) -> AppResult<ParsedDocument> {
    let content = std::fs::read_to_string(path)?;
    let raw: RawDocument = serde_json::from_str(&content)
        .map_err(|e| AppError::Parse(format!("Invalid document JSON: {}", e)))?;

    if raw.pages.is_empty() {
        return Err(AppError::Parse("Document has no pages".to_string()));
    }

    let filename = raw.filename.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    Ok(ParsedDocument {
        id: chunker::document_id(&filename),
        filename,
        pages: raw.pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_doc(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_corpus_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(
            dir.path(),
            "good.json",
            r#"{"filename": "policy-a.pdf", "pages": [{"page_number": 1, "text": "Covered."}]}"#,
        );
        write_doc(dir.path(), "bad.json", "not json at all");
        write_doc(dir.path(), "empty.json", r#"{"filename": "x.pdf", "pages": []}"#);
        write_doc(dir.path(), "notes.txt", "ignored");

        let load = load_corpus(dir.path()).unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.documents[0].filename, "policy-a.pdf");
        assert_eq!(load.failures.len(), 2);
    }

    #[test]
    fn test_filename_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(
            dir.path(),
            "policy-b.json",
            r#"{"pages": [{"page_number": 1, "text": "Excluded."}]}"#,
        );

        let load = load_corpus(dir.path()).unwrap();
        assert_eq!(load.documents[0].filename, "policy-b");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(load_corpus(Path::new("/nonexistent/corpus")).is_err());
    }
}
