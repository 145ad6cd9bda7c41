//! Document engine capability.
//!
//! The annotation layer never talks to a PDF library directly. It consumes an
//! [`AnnotationBackend`] whose operations return [`EngineTask`]s: boxed futures
//! resolving to exactly one success value or one [`EngineFailure`].

pub mod in_memory;

use crate::engine::document::PdfDocument;
use crate::engine::errors::EngineFailure;
use crate::engine::types::{AnnotationId, AnnotationObject, PageIndex};
use futures::future::BoxFuture;
use std::collections::BTreeMap;

/// Asynchronous engine operation.
pub type EngineTask<T> = BoxFuture<'static, Result<T, EngineFailure>>;

/// All annotations of a document, keyed by page.
pub type AnnotationsByPage = BTreeMap<PageIndex, Vec<AnnotationObject>>;

/// RGBA8 pixels, tightly packed unless `stride` says otherwise.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl ImageData {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0; (width as usize) * (height as usize) * 4],
            width,
            height,
            stride: width * 4,
        }
    }
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Side-channel data needed only to create an annotation (e.g. the bitmap
/// behind a stamp). Never part of the tracked state.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateContext {
    Image(ImageData),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AppearanceMode {
    #[default]
    Normal,
    Rollover,
    Down,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderOptions {
    pub scale_factor: f32,
    pub dpr: f32,
    pub appearance: AppearanceMode,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            dpr: 1.0,
            appearance: AppearanceMode::Normal,
        }
    }
}

/// Task based annotation operations of the document engine.
///
/// Implementations must be cheap to call: every method returns immediately
/// with a task and does the work when the task is polled (or in the
/// background). Arguments are owned so that tasks are `'static`.
pub trait AnnotationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the id the engine assigned. Usually the id of `object`.
    fn create_page_annotation(
        &self,
        doc: &PdfDocument,
        page: PageIndex,
        object: AnnotationObject,
        context: Option<CreateContext>,
    ) -> EngineTask<AnnotationId>;

    fn update_page_annotation(&self, doc: &PdfDocument, page: PageIndex, object: AnnotationObject) -> EngineTask<bool>;

    fn remove_page_annotation(&self, doc: &PdfDocument, page: PageIndex, object: AnnotationObject) -> EngineTask<bool>;

    fn get_all_annotations(&self, doc: &PdfDocument) -> EngineTask<AnnotationsByPage>;

    fn get_page_annotations(&self, doc: &PdfDocument, page: PageIndex) -> EngineTask<Vec<AnnotationObject>>;

    fn render_page_annotation(
        &self,
        doc: &PdfDocument,
        page: PageIndex,
        object: AnnotationObject,
        options: &RenderOptions,
    ) -> EngineTask<ImageData>;
}
