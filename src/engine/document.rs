use crate::engine::types::{PageIndex, Size};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Identifier of an opened document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPage {
    pub index: PageIndex,
    pub size: Size,
}

/// An opened document as handed over by the document engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfDocument {
    pub id: DocumentId,
    pub pages: Vec<PdfPage>,
}

impl PdfDocument {
    /// Document with `page_count` pages of identical size.
    pub fn new(page_count: u32, size: Size) -> Self {
        Self {
            id: DocumentId::new(),
            pages: (0..page_count).map(|index| PdfPage { index, size }).collect(),
        }
    }

    pub fn page(&self, index: PageIndex) -> Option<&PdfPage> {
        self.pages.iter().find(|p| p.index == index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// The currently open document, shared by the handle and the worker.
#[derive(Debug, Default)]
pub struct DocumentSlot {
    inner: RwLock<Option<PdfDocument>>,
}

impl DocumentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<PdfDocument> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the open document, returning the previous one.
    pub fn set(&self, doc: Option<PdfDocument>) -> Option<PdfDocument> {
        std::mem::replace(&mut *self.inner.write().unwrap_or_else(PoisonError::into_inner), doc)
    }

    pub fn is_open(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}
