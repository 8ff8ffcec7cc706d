//! Open Documents
//!
//! Files opened from a decompiled project are held as one of three
//! document kinds, chosen from the file extension. Only bookkeeping lives
//! here (path, modified flag, save); editing widgets are out of scope.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;

/// Kind of document, selected from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Hex,
    Image,
}

impl DocumentKind {
    /// Detect the document kind for a path
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "ico" => DocumentKind::Image,
            "dex" | "so" | "arsc" | "bin" | "dat" | "odex" | "oat" | "class" => DocumentKind::Hex,
            _ => DocumentKind::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextDocument {
    path: PathBuf,
    content: String,
    modified: bool,
}

impl TextDocument {
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the content and mark the document modified
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.modified = true;
    }
}

#[derive(Debug, Clone)]
pub struct HexDocument {
    path: PathBuf,
    bytes: Vec<u8>,
    modified: bool,
}

impl HexDocument {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite one byte
    pub fn set_byte(&mut self, offset: usize, value: u8) -> bool {
        match self.bytes.get_mut(offset) {
            Some(byte) => {
                *byte = value;
                self.modified = true;
                true
            }
            None => false,
        }
    }
}

/// Images are view-only
#[derive(Debug, Clone)]
pub struct ImageDocument {
    path: PathBuf,
    size: u64,
}

impl ImageDocument {
    /// File size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// An open file
#[derive(Debug, Clone)]
pub enum Document {
    Text(TextDocument),
    Hex(HexDocument),
    Image(ImageDocument),
}

impl Document {
    /// Open a file as the document kind its extension selects
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = match DocumentKind::for_path(&path) {
            DocumentKind::Text => {
                let bytes = tokio::fs::read(&path).await?;
                Document::Text(TextDocument {
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                    path,
                    modified: false,
                })
            }
            DocumentKind::Hex => {
                let bytes = tokio::fs::read(&path).await?;
                Document::Hex(HexDocument {
                    path,
                    bytes,
                    modified: false,
                })
            }
            DocumentKind::Image => {
                let size = tokio::fs::metadata(&path).await?.len();
                Document::Image(ImageDocument { path, size })
            }
        };
        debug!("Opened {:?} as {:?}", document.file_path(), document.kind());
        Ok(document)
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Text(_) => DocumentKind::Text,
            Document::Hex(_) => DocumentKind::Hex,
            Document::Image(_) => DocumentKind::Image,
        }
    }

    pub fn file_path(&self) -> &Path {
        match self {
            Document::Text(doc) => &doc.path,
            Document::Hex(doc) => &doc.path,
            Document::Image(doc) => &doc.path,
        }
    }

    pub fn is_modified(&self) -> bool {
        match self {
            Document::Text(doc) => doc.modified,
            Document::Hex(doc) => doc.modified,
            Document::Image(_) => false,
        }
    }

    /// Write pending changes back to disk
    pub async fn save(&mut self) -> Result<()> {
        match self {
            Document::Text(doc) => {
                tokio::fs::write(&doc.path, doc.content.as_bytes()).await?;
                doc.modified = false;
            }
            Document::Hex(doc) => {
                tokio::fs::write(&doc.path, &doc.bytes).await?;
                doc.modified = false;
            }
            Document::Image(_) => {}
        }
        info!("Saved {:?}", self.file_path());
        Ok(())
    }
}

/// Documents open in the current session
#[derive(Debug, Default)]
pub struct OpenDocuments {
    documents: Vec<Document>,
    current: Option<usize>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reopen the files of a saved session, skipping any that fail to open
    pub async fn restore(paths: &[PathBuf]) -> Self {
        let mut documents = Self::new();
        for path in paths {
            if let Err(e) = documents.open(path.clone()).await {
                warn!("Could not reopen {:?}: {}", path, e);
            }
        }
        documents
    }

    /// Open a file, or focus it when it is already open
    pub async fn open(&mut self, path: impl Into<PathBuf>) -> Result<&mut Document> {
        let path = path.into();
        let index = match self.position(&path) {
            Some(index) => index,
            None => {
                let document = Document::open(path).await?;
                self.documents.push(document);
                self.documents.len() - 1
            }
        };
        self.current = Some(index);
        Ok(&mut self.documents[index])
    }

    /// Close a document, returning it when it was open
    pub fn close(&mut self, path: &Path) -> Option<Document> {
        let index = self.position(path)?;
        let document = self.documents.remove(index);
        self.current = if self.documents.is_empty() {
            None
        } else {
            Some(index.min(self.documents.len() - 1))
        };
        Some(document)
    }

    pub fn current(&self) -> Option<&Document> {
        self.current.and_then(|i| self.documents.get(i))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether any document has unsaved changes
    pub fn has_unsaved(&self) -> bool {
        self.documents.iter().any(Document::is_modified)
    }

    /// Save every modified document
    pub async fn save_all(&mut self) -> Result<usize> {
        let mut saved = 0;
        for document in self.documents.iter_mut().filter(|d| d.is_modified()) {
            document.save().await?;
            saved += 1;
        }
        Ok(saved)
    }

    /// Paths to persist into `session.open_files`
    pub fn paths(&self) -> Vec<PathBuf> {
        self.documents.iter().map(|d| d.file_path().to_path_buf()).collect()
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.documents.iter().position(|d| d.file_path() == path)
    }
}
