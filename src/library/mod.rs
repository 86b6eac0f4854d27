// Boundary to the host application's document store. Only the surface
// the search core consumes is defined here.


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

/// Metadata the search core needs about a document.
///
/// `published` drives genealogical ordering; it is optional because not
/// every document in a library carries a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub published: Option<NaiveDate>,
}

/// Read access to the host application's documents.
///
/// Implementations are expected to be cheap to call repeatedly; the search
/// core fetches metadata per result when ordering genealogically.
pub trait DocumentLibrary: Send + Sync {
    /// Full text of a document.
    fn fetch_text(&self, document_id: &str) -> Result<String>;

    /// Title/author/date record for a document.
    fn metadata(&self, document_id: &str) -> Result<DocumentMeta>;

    /// Every document currently in the library.
    fn list_documents(&self) -> Result<Vec<DocumentMeta>>;
}

/// Filesystem-backed library: a directory of `.txt` and `.md` files.
///
/// The document id is the file stem. Files may open with header lines
/// (`Title:`, `Author:`, `Date:`) which are stripped from the text returned
/// by `fetch_text`; `Date:` accepts `YYYY-MM-DD` or a bare year.
#[derive(Debug, Clone)]
pub struct FsLibrary {
    root: PathBuf,
}

impl FsLibrary {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, document_id: &str) -> Result<PathBuf> {
        for extension in ["txt", "md"] {
            let candidate = self.root.join(format!("{document_id}.{extension}"));
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        anyhow::bail!(
            "document '{}' not found under {}",
            document_id,
            self.root.display()
        )
    }

    fn read(&self, document_id: &str) -> Result<(DocumentMeta, String)> {
        let path = self.document_path(document_id)?;
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document file: {}", path.display()))?;
        Ok(parse_document(document_id, &raw))
    }
}

impl DocumentLibrary for FsLibrary {
    #[inline]
    fn fetch_text(&self, document_id: &str) -> Result<String> {
        let (_, text) = self.read(document_id)?;
        Ok(text)
    }

    #[inline]
    fn metadata(&self, document_id: &str) -> Result<DocumentMeta> {
        let (meta, _) = self.read(document_id)?;
        Ok(meta)
    }

    #[inline]
    fn list_documents(&self) -> Result<Vec<DocumentMeta>> {
        let mut documents = BTreeMap::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read library root: {}", self.root.display()))?;
        for entry in entries {
            let path = entry?.path();
            let is_document = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"));
            if !is_document {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let meta = self.metadata(id)?;
            documents.insert(id.to_string(), meta);
        }
        debug!("library lists {} documents", documents.len());
        Ok(documents.into_values().collect())
    }
}

/// Split optional header lines from the body of a document file.
fn parse_document(document_id: &str, raw: &str) -> (DocumentMeta, String) {
    let mut title = None;
    let mut author = None;
    let mut published = None;

    let mut body_start = 0;
    for line in raw.lines() {
        let parsed = if let Some(value) = line.strip_prefix("Title:") {
            title = Some(value.trim().to_string());
            true
        } else if let Some(value) = line.strip_prefix("Author:") {
            author = Some(value.trim().to_string());
            true
        } else if let Some(value) = line.strip_prefix("Date:") {
            published = parse_date(value.trim());
            true
        } else {
            false
        };
        if !parsed {
            break;
        }
        // Consume the header line plus its newline.
        body_start += line.len();
        if raw[body_start..].starts_with('\n') {
            body_start += 1;
        }
    }

    let meta = DocumentMeta {
        id: document_id.to_string(),
        title: title.unwrap_or_else(|| document_id.to_string()),
        author,
        published,
    };
    (meta, raw[body_start..].trim_start().to_string())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    value
        .parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}
