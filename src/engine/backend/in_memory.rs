use crate::engine::backend::{AnnotationBackend, AnnotationsByPage, CreateContext, EngineTask, ImageData, RenderOptions};
use crate::engine::document::{DocumentId, PdfDocument};
use crate::engine::errors::{EngineErrorCode, EngineFailure};
use crate::engine::types::{AnnotationId, AnnotationObject, PageIndex};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Engine operations that can be made to fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallKind {
    Create,
    Update,
    Remove,
    Render,
}

impl CallKind {
    fn failure_code(&self) -> EngineErrorCode {
        match self {
            CallKind::Create => EngineErrorCode::CantCreateAnnotation,
            CallKind::Update => EngineErrorCode::CantUpdateAnnotation,
            CallKind::Remove => EngineErrorCode::CantRemoveAnnotation,
            CallKind::Render => EngineErrorCode::CantRender,
        }
    }
}

/// One recorded engine call, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create { id: AnnotationId, page: PageIndex, with_context: bool },
    Update { id: AnnotationId, page: PageIndex },
    Remove { id: AnnotationId, page: PageIndex },
    GetAll,
    GetPage { page: PageIndex },
    Render { id: AnnotationId, page: PageIndex },
}

impl BackendCall {
    pub fn id(&self) -> Option<AnnotationId> {
        match self {
            BackendCall::Create { id, .. }
            | BackendCall::Update { id, .. }
            | BackendCall::Remove { id, .. }
            | BackendCall::Render { id, .. } => Some(*id),
            BackendCall::GetAll | BackendCall::GetPage { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<DocumentId, AnnotationsByPage>,
    calls: Vec<BackendCall>,
    failures: HashSet<(CallKind, AnnotationId)>,
    /// Objects as they were last sent to update, by id
    updates: HashMap<AnnotationId, AnnotationObject>,
    latency: Option<Duration>,
}

/// Engine kept entirely in memory. Records every call, can delay tasks and
/// fail selected operations. Used by the tests and the demo.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task sleeps for `latency` before doing its work.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Store `objects` as already persisted in `doc`.
    pub fn seed(&self, doc: &PdfDocument, objects: impl IntoIterator<Item = AnnotationObject>) {
        let mut inner = self.lock();
        let pages = inner.docs.entry(doc.id).or_default();
        for object in objects {
            pages.entry(object.page_index).or_default().push(object);
        }
    }

    pub fn fail_on(&self, kind: CallKind, id: AnnotationId) {
        self.lock().failures.insert((kind, id));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, id: AnnotationId) -> Vec<BackendCall> {
        self.lock().calls.iter().filter(|c| c.id() == Some(id)).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn annotations_on(&self, doc: &PdfDocument, page: PageIndex) -> Vec<AnnotationObject> {
        self.lock()
            .docs
            .get(&doc.id)
            .and_then(|pages| pages.get(&page))
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, doc: &PdfDocument, id: AnnotationId) -> bool {
        self.lock()
            .docs
            .get(&doc.id)
            .map(|pages| pages.values().flatten().any(|a| a.id == id))
            .unwrap_or(false)
    }

    /// Last object received by `update_page_annotation` for `id`.
    pub fn last_update(&self, id: AnnotationId) -> Option<AnnotationObject> {
        self.lock().updates.get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call` and returns a task running `work` once polled.
    fn task<T, F>(&self, call: BackendCall, failable: Option<CallKind>, work: F) -> EngineTask<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> Result<T, EngineFailure> + Send + 'static,
    {
        let (latency, injected) = {
            let mut inner = self.lock();
            let injected = match (failable, call.id()) {
                (Some(kind), Some(id)) if inner.failures.contains(&(kind, id)) => Some(kind),
                _ => None,
            };
            inner.calls.push(call);
            (inner.latency, injected)
        };

        let shared = Arc::clone(&self.inner);
        async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(kind) = injected {
                return Err(EngineFailure::new(kind.failure_code(), "injected failure"));
            }
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            work(&mut inner)
        }
        .boxed()
    }
}

fn check_page(doc: &PdfDocument, page: PageIndex) -> Result<(), EngineFailure> {
    match doc.page(page) {
        Some(_) => Ok(()),
        None => Err(EngineFailure::not_found(format!("Page {page} not found"))),
    }
}

fn annotation_not_found(id: AnnotationId) -> EngineFailure {
    EngineFailure::not_found(format!("Annotation {id} not found"))
}

impl AnnotationBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn create_page_annotation(
        &self,
        doc: &PdfDocument,
        page: PageIndex,
        object: AnnotationObject,
        context: Option<CreateContext>,
    ) -> EngineTask<AnnotationId> {
        let call = BackendCall::Create { id: object.id, page, with_context: context.is_some() };
        let doc = doc.clone();
        self.task(call, Some(CallKind::Create), move |inner| {
            check_page(&doc, page)?;
            let id = object.id;
            let annotations = inner.docs.entry(doc.id).or_default().entry(page).or_default();
            annotations.retain(|a| a.id != id);
            annotations.push(object);
            Ok(id)
        })
    }

    fn update_page_annotation(&self, doc: &PdfDocument, page: PageIndex, object: AnnotationObject) -> EngineTask<bool> {
        let call = BackendCall::Update { id: object.id, page };
        let doc = doc.clone();
        self.task(call, Some(CallKind::Update), move |inner| {
            check_page(&doc, page)?;
            let id = object.id;
            let slot = inner
                .docs
                .get_mut(&doc.id)
                .and_then(|pages| pages.get_mut(&page))
                .and_then(|annotations| annotations.iter_mut().find(|a| a.id == id))
                .ok_or_else(|| annotation_not_found(id))?;
            *slot = object.clone();
            inner.updates.insert(id, object);
            Ok(true)
        })
    }

    fn remove_page_annotation(&self, doc: &PdfDocument, page: PageIndex, object: AnnotationObject) -> EngineTask<bool> {
        let call = BackendCall::Remove { id: object.id, page };
        let doc = doc.clone();
        self.task(call, Some(CallKind::Remove), move |inner| {
            check_page(&doc, page)?;
            let annotations = inner
                .docs
                .get_mut(&doc.id)
                .and_then(|pages| pages.get_mut(&page))
                .ok_or_else(|| annotation_not_found(object.id))?;
            let before = annotations.len();
            annotations.retain(|a| a.id != object.id);
            if annotations.len() == before {
                return Err(annotation_not_found(object.id));
            }
            Ok(true)
        })
    }

    fn get_all_annotations(&self, doc: &PdfDocument) -> EngineTask<AnnotationsByPage> {
        let doc_id = doc.id;
        self.task(BackendCall::GetAll, None, move |inner| {
            Ok(inner.docs.get(&doc_id).cloned().unwrap_or_default())
        })
    }

    fn get_page_annotations(&self, doc: &PdfDocument, page: PageIndex) -> EngineTask<Vec<AnnotationObject>> {
        let doc = doc.clone();
        self.task(BackendCall::GetPage { page }, None, move |inner| {
            check_page(&doc, page)?;
            Ok(inner
                .docs
                .get(&doc.id)
                .and_then(|pages| pages.get(&page))
                .cloned()
                .unwrap_or_default())
        })
    }

    fn render_page_annotation(
        &self,
        doc: &PdfDocument,
        page: PageIndex,
        object: AnnotationObject,
        options: &RenderOptions,
    ) -> EngineTask<ImageData> {
        let call = BackendCall::Render { id: object.id, page };
        let doc = doc.clone();
        let scale = options.scale_factor * options.dpr;
        self.task(call, Some(CallKind::Render), move |_inner| {
            check_page(&doc, page)?;
            let width = (object.rect.size.width * scale).ceil().max(1.0) as u32;
            let height = (object.rect.size.height * scale).ceil().max(1.0) as u32;
            Ok(ImageData::new(width, height))
        })
    }
}
