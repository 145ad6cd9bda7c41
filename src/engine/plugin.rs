//! Plugin wiring.
//!
//! [`AnnotationPlugin::new`] resolves every collaborator once: the engine
//! backend, the optional services and the configuration. It registers the
//! configured tools, builds the store, the history bridge and the commit
//! orchestrator, and prepares the worker. [`AnnotationPlugin::start`] spawns the
//! worker and hands out the [`AnnotationHandle`].

use crate::engine::backend::{AnnotationBackend, CreateContext};
use crate::engine::commands::{FlushRequester, HistoryBridge};
use crate::engine::commit::{CommitOrchestrator, CommitReport};
use crate::engine::config::AnnotationConfig;
use crate::engine::document::{DocumentSlot, PdfDocument};
use crate::engine::errors::AnnotationError;
use crate::engine::events::WorkerCommand;
use crate::engine::handle::AnnotationHandle;
use crate::engine::services::{PluginServices, SelectionService};
use crate::engine::store::AnnotationStore;
use crate::engine::tools::ToolRegistry;
use crate::engine::tracker::{AnnotationAction, AnnotationState};
use crate::engine::types::{AnnotationFlags, AnnotationId, AnnotationObject, AnnotationPatch, PageIndex};
use crate::engine::worker::AnnotationWorker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State and collaborators shared by the handle and the worker.
pub(crate) struct PluginCore {
    pub(crate) config: AnnotationConfig,
    pub(crate) store: Arc<AnnotationStore>,
    pub(crate) backend: Arc<dyn AnnotationBackend>,
    pub(crate) document: Arc<DocumentSlot>,
    pub(crate) registry: ToolRegistry,
    pub(crate) services: PluginServices,
    pub(crate) bridge: HistoryBridge,
    pub(crate) orchestrator: CommitOrchestrator,
    pub(crate) cmd_tx: mpsc::Sender<WorkerCommand>,
}

impl PluginCore {
    /// Mirrors the interaction manager's mode into the active variant.
    /// Modes without a tool clear it.
    pub(crate) fn sync_active_mode(&self, mode_id: &str) {
        let variant = self.registry.variant_for(mode_id).map(str::to_string);
        if variant != self.store.state().active_variant {
            log::debug!("active variant {variant:?} (mode {mode_id})");
            self.store.dispatch(AnnotationAction::SetActiveVariant(variant));
        }
    }

    /// Turns a finished text selection into one text markup annotation per
    /// selected page segment when a text markup tool is active.
    pub(crate) async fn handle_selection_end(&self) {
        let state = self.store.state();
        let Some(defaults) = state.active_tool_defaults().cloned() else {
            return;
        };
        if !defaults.is_text_markup() {
            return;
        }
        let Some(selection) = self.services.selection.as_ref() else {
            return;
        };

        let segments = selection.formatted_selection();
        if segments.is_empty() {
            return;
        }
        let text = selection.selected_text();
        selection.clear();

        let text = match text.await {
            Ok(lines) => lines.join("\n"),
            Err(e) => {
                log::warn!("could not read selected text: {e}");
                return;
            }
        };

        for segment in segments {
            let mut object = AnnotationObject::new(segment.page_index, defaults.subtype, segment.rect)
                .with_segments(segment.segment_rects);
            object.color = Some(defaults.color);
            object.opacity = defaults.opacity;
            object.blend_mode = defaults.blend_mode.unwrap_or_default();
            object.author = self.config.annotation_author.clone();
            object.custom = Some(serde_json::json!({ "text": text }));

            self.create_annotation(segment.page_index, object, None);
        }
    }

    pub(crate) fn create_annotation(
        &self,
        page_index: PageIndex,
        mut object: AnnotationObject,
        context: Option<CreateContext>,
    ) -> AnnotationId {
        object.page_index = page_index;
        if object.author.is_none() {
            object.author = self.config.annotation_author.clone();
        }
        object.flags |= AnnotationFlags::PRINT;
        self.bridge.create(object, context)
    }

    pub(crate) fn update_annotation(
        &self,
        page_index: PageIndex,
        id: AnnotationId,
        mut patch: AnnotationPatch,
    ) -> Result<(), AnnotationError> {
        if patch.author.is_none() {
            if let Some(author) = &self.config.annotation_author {
                patch.author = Some(Some(author.clone()));
            }
        }
        self.bridge.update(page_index, id, patch)
    }

    pub(crate) async fn commit(&self) -> Result<CommitReport, AnnotationError> {
        self.orchestrator.commit().await
    }

    /// Opens `doc` and hydrates the tracker from the engine. Whatever was
    /// tracked for the previous document is dropped before loading starts.
    pub(crate) async fn open_document(&self, doc: PdfDocument) -> Result<usize, AnnotationError> {
        let doc_id = doc.id;
        if let Some(previous) = self.orchestrator.switch_document(Some(doc.clone())).await {
            log::debug!("document {} replaced by {doc_id}", previous.id);
        }

        let by_page = self.backend.get_all_annotations(&doc).await?;
        let objects: Vec<AnnotationObject> = by_page.into_values().flatten().collect();
        let count = objects.len();
        if !self.orchestrator.hydrate(doc_id, objects).await {
            log::debug!("document {doc_id} was replaced while loading, discarding annotations");
            return Ok(0);
        }

        log::info!("loaded {count} annotation(s) for document {doc_id}");
        Ok(count)
    }

    pub(crate) async fn close_document(&self) {
        if let Some(doc) = self.orchestrator.switch_document(None).await {
            log::info!("closed document {}", doc.id);
        }
    }
}

pub struct AnnotationPlugin {
    core: Arc<PluginCore>,
    worker: AnnotationWorker,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AnnotationPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationPlugin")
            .field("backend", &self.core.backend.name())
            .field("services", &self.core.services)
            .field("tools", &self.core.registry.len())
            .finish()
    }
}

impl AnnotationPlugin {
    pub const ID: &'static str = "annotation";

    pub fn new(config: AnnotationConfig, backend: Arc<dyn AnnotationBackend>, services: PluginServices) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity);

        let state = AnnotationState::new(&config.tools, config.color_presets.clone());
        let store = Arc::new(AnnotationStore::new(state, config.channel_capacity));

        let mut registry = ToolRegistry::new();
        for tool in &config.tools {
            registry.register(
                &tool.variant_key(),
                tool,
                services.interaction.as_deref(),
                services.selection.as_deref(),
            );
        }

        let document = Arc::new(DocumentSlot::new());
        let orchestrator = CommitOrchestrator::new(Arc::clone(&store), Arc::clone(&backend), Arc::clone(&document));
        let bridge = HistoryBridge::new(
            Arc::clone(&store),
            services.history.clone(),
            FlushRequester::new(config.auto_commit, cmd_tx.clone()),
        );

        let core = Arc::new(PluginCore {
            config,
            store,
            backend,
            document,
            registry,
            services,
            bridge,
            orchestrator,
            cmd_tx,
        });

        let cancel = CancellationToken::new();
        let worker = AnnotationWorker::new(Arc::clone(&core), cmd_rx, cancel.clone());

        Self { core, worker, cancel }
    }

    /// Token that stops the worker when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns the worker on the current tokio runtime.
    pub fn start(self) -> (AnnotationHandle, JoinHandle<()>) {
        let handle = AnnotationHandle::new(Arc::clone(&self.core));
        let join_handle = tokio::spawn(self.worker.run());
        (handle, join_handle)
    }
}
