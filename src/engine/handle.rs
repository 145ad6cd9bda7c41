//! Capability surface of the annotation plugin.
//!
//! [`AnnotationHandle`] is what UI layers and other plugins talk to. It is
//! cheap to clone; all clones drive the same plugin instance.
//!
//! Mutations (`create_annotation`, `update_annotation`, `delete_annotation`)
//! apply to local state immediately and never wait for the engine. Their
//! engine outcome is only visible through state notifications and commit
//! reports.

use crate::engine::backend::{AnnotationBackend, CreateContext, EngineTask, ImageData, RenderOptions};
use crate::engine::commit::CommitReport;
use crate::engine::document::PdfDocument;
use crate::engine::errors::{AnnotationError, EngineFailure};
use crate::engine::events::{
    ActiveTool, ActiveToolSubscription, CommitSubscription, StateSubscription, VariantSubscription, WorkerCommand,
};
use crate::engine::plugin::PluginCore;
use crate::engine::services::InteractionModeService;
use crate::engine::tools::{ToolDefaults, ToolDefaultsPatch};
use crate::engine::tracker::{AnnotationAction, AnnotationState, TrackedAnnotation};
use crate::engine::types::{AnnotationId, AnnotationObject, AnnotationPatch, AnnotationSubtype, Color, PageIndex};
use crate::engine::variant::{make_variant_key, parse_variant_key};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Clone)]
pub struct AnnotationHandle {
    core: Arc<PluginCore>,
}

impl std::fmt::Debug for AnnotationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationHandle")
            .field("backend", &self.core.backend.name())
            .field("document", &self.core.document.get().map(|d| d.id))
            .finish()
    }
}

impl AnnotationHandle {
    pub(crate) fn new(core: Arc<PluginCore>) -> Self {
        Self { core }
    }

    // ****************************************************************
    // State and notifications

    pub fn state(&self) -> Arc<AnnotationState> {
        self.core.store.state()
    }

    pub fn on_state_change(&self) -> StateSubscription {
        self.core.store.bus().subscribe_state()
    }

    pub fn on_active_variant_change(&self) -> VariantSubscription {
        self.core.store.bus().subscribe_active_variant()
    }

    pub fn on_active_tool_change(&self) -> ActiveToolSubscription {
        self.core.store.bus().subscribe_active_tool()
    }

    pub fn on_commit(&self) -> CommitSubscription {
        self.core.store.bus().subscribe_commits()
    }

    // ****************************************************************
    // Document

    /// Opens `doc` and loads its annotations as synced. Returns how many were loaded.
    pub async fn open_document(&self, doc: PdfDocument) -> Result<usize, AnnotationError> {
        self.core.open_document(doc).await
    }

    /// Closes the open document once a running commit finished, and drops
    /// the tracked annotations.
    pub async fn close_document(&self) {
        self.core.close_document().await
    }

    pub fn document(&self) -> Option<PdfDocument> {
        self.core.document.get()
    }

    // ****************************************************************
    // Reads

    /// Annotations of `page` as the engine has them. Not cached.
    pub fn get_page_annotations(&self, page_index: PageIndex) -> EngineTask<Vec<AnnotationObject>> {
        let Some(doc) = self.core.document.get() else {
            return futures::future::ready(Err(EngineFailure::not_found("Document not found"))).boxed();
        };
        if doc.page(page_index).is_none() {
            return futures::future::ready(Err(EngineFailure::not_found("Page not found"))).boxed();
        }
        self.core.backend.get_page_annotations(&doc, page_index)
    }

    /// Locally tracked annotations of `page`, pending deletions excluded.
    pub fn page_annotations(&self, page_index: PageIndex) -> Vec<TrackedAnnotation> {
        self.state().page_annotations(page_index).into_iter().cloned().collect()
    }

    pub fn get_annotation(&self, id: AnnotationId) -> Option<TrackedAnnotation> {
        self.state().get(id).cloned()
    }

    pub fn get_selected_annotation(&self) -> Option<TrackedAnnotation> {
        self.state().selected().cloned()
    }

    pub fn select_annotation(&self, page_index: PageIndex, id: AnnotationId) {
        self.core.store.dispatch(AnnotationAction::Select { page_index, id });
    }

    pub fn deselect_annotation(&self) {
        self.core.store.dispatch(AnnotationAction::Deselect);
    }

    // ****************************************************************
    // Tools

    pub fn get_active_variant(&self) -> Option<String> {
        self.state().active_variant.clone()
    }

    /// Activates the interaction mode bound to `variant_key`, or the default
    /// mode for `None`. No-op when the variant is already active.
    pub fn set_active_variant(&self, variant_key: Option<&str>) -> Result<(), AnnotationError> {
        if variant_key == self.state().active_variant.as_deref() {
            return Ok(());
        }

        let mode = match variant_key {
            Some(key) => Some(
                self.core
                    .registry
                    .mode_for(key)
                    .ok_or_else(|| AnnotationError::ModeMissing(key.to_string()))?,
            ),
            None => None,
        };

        match (&self.core.services.interaction, mode) {
            (Some(im), Some(mode)) => {
                im.activate(mode);
                self.core.sync_active_mode(&im.active_mode());
            }
            (Some(im), None) => {
                im.activate_default_mode();
                self.core.sync_active_mode(&im.active_mode());
            }
            (None, _) => {
                self.core
                    .store
                    .dispatch(AnnotationAction::SetActiveVariant(variant_key.map(str::to_string)));
            }
        }
        Ok(())
    }

    pub fn get_active_tool(&self) -> ActiveTool {
        let state = self.state();
        ActiveTool {
            variant_key: state.active_variant.clone(),
            defaults: state.active_tool_defaults().cloned(),
        }
    }

    pub fn get_tool_defaults(&self, variant_key: &str) -> Result<ToolDefaults, AnnotationError> {
        self.state()
            .tool_defaults
            .get(variant_key)
            .cloned()
            .ok_or_else(|| AnnotationError::VariantNotFound(variant_key.to_string()))
    }

    /// Defaults of `subtype` + `intent`, falling back to the plain subtype
    /// tool when there is none for the intent.
    pub fn get_tool_defaults_by_subtype_and_intent(
        &self,
        subtype: AnnotationSubtype,
        intent: Option<&str>,
    ) -> Result<ToolDefaults, AnnotationError> {
        let key = make_variant_key(subtype, intent);
        self.get_tool_defaults(&key)
            .or_else(|_| self.get_tool_defaults(subtype.as_str()))
            .map_err(|_| AnnotationError::VariantNotFound(key))
    }

    pub fn get_tool_defaults_by_subtype(&self, subtype: AnnotationSubtype) -> Result<ToolDefaults, AnnotationError> {
        self.get_tool_defaults(subtype.as_str())
    }

    pub fn get_subtype_and_intent_by_variant(
        &self,
        variant_key: &str,
    ) -> Result<(AnnotationSubtype, Option<String>), AnnotationError> {
        parse_variant_key(variant_key)
    }

    pub fn set_tool_defaults(&self, variant_key: &str, patch: ToolDefaultsPatch) -> Result<(), AnnotationError> {
        if !self.state().tool_defaults.contains_key(variant_key) {
            return Err(AnnotationError::VariantNotFound(variant_key.to_string()));
        }
        self.core.store.dispatch(AnnotationAction::UpdateToolDefaults {
            variant_key: variant_key.to_string(),
            patch,
        });
        Ok(())
    }

    pub fn get_color_presets(&self) -> Vec<Color> {
        self.state().color_presets.clone()
    }

    pub fn add_color_preset(&self, color: Color) {
        self.core.store.dispatch(AnnotationAction::AddColorPreset(color));
    }

    // ****************************************************************
    // Mutations

    /// Tracks `object` as a new annotation on `page_index`. It reaches the
    /// engine on the next commit.
    pub fn create_annotation(
        &self,
        page_index: PageIndex,
        object: AnnotationObject,
        context: Option<CreateContext>,
    ) -> AnnotationId {
        self.core.create_annotation(page_index, object, context)
    }

    pub fn update_annotation(
        &self,
        page_index: PageIndex,
        id: AnnotationId,
        patch: AnnotationPatch,
    ) -> Result<(), AnnotationError> {
        self.core.update_annotation(page_index, id, patch)
    }

    pub fn delete_annotation(&self, page_index: PageIndex, id: AnnotationId) -> Result<(), AnnotationError> {
        self.core.bridge.delete(page_index, id)
    }

    /// Preconditions are checked right away; drawing is left to the engine.
    pub fn render_annotation(
        &self,
        page_index: PageIndex,
        object: AnnotationObject,
        options: &RenderOptions,
    ) -> Result<EngineTask<ImageData>, AnnotationError> {
        let doc = self.core.document.get().ok_or(AnnotationError::DocumentNotFound)?;
        if doc.page(page_index).is_none() {
            return Err(AnnotationError::PageNotFound(page_index));
        }
        Ok(self.core.backend.render_page_annotation(&doc, page_index, object, options))
    }

    /// Flushes pending changes to the engine. Overlapping calls are queued.
    pub async fn commit(&self) -> Result<CommitReport, AnnotationError> {
        self.core.commit().await
    }

    /// Stops the worker and waits until it acknowledged.
    pub async fn shutdown(&self) -> Result<(), AnnotationError> {
        let (tx, rx) = oneshot::channel();

        self.core
            .cmd_tx
            .send(WorkerCommand::Shutdown { reply: tx })
            .await
            .map_err(|_| AnnotationError::ChannelClosed)?;

        rx.await.map_err(|_| AnnotationError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::in_memory::{BackendCall, InMemoryBackend};
    use crate::engine::config::AnnotationConfig;
    use crate::engine::errors::{EngineErrorCode, ErrorKind};
    use crate::engine::plugin::AnnotationPlugin;
    use crate::engine::services::history::InMemoryHistory;
    use crate::engine::services::interaction::InMemoryInteractionManager;
    use crate::engine::services::selection::InMemorySelection;
    use crate::engine::services::{PluginServices, SelectionSegment, DEFAULT_MODE};
    use crate::engine::tracker::CommitState;
    use crate::engine::types::{AnnotationFlags, BlendMode, Rect, Size};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Harness {
        handle: AnnotationHandle,
        join: JoinHandle<()>,
        backend: InMemoryBackend,
        interaction: Arc<InMemoryInteractionManager>,
        selection: Arc<InMemorySelection>,
        history: Arc<InMemoryHistory>,
    }

    fn start(config: AnnotationConfig, with_history: bool) -> Harness {
        start_with(InMemoryBackend::new(), config, with_history)
    }

    fn start_with(backend: InMemoryBackend, config: AnnotationConfig, with_history: bool) -> Harness {
        let interaction = Arc::new(InMemoryInteractionManager::new());
        let selection = Arc::new(InMemorySelection::new());
        let history = Arc::new(InMemoryHistory::new());

        let mut services = PluginServices::none()
            .with_interaction(interaction.clone())
            .with_selection(selection.clone());
        if with_history {
            services = services.with_history(history.clone());
        }

        let plugin = AnnotationPlugin::new(config, Arc::new(backend.clone()), services);
        let (handle, join) = plugin.start();
        Harness { handle, join, backend, interaction, selection, history }
    }

    fn manual() -> AnnotationConfig {
        AnnotationConfig::builder().auto_commit(false).build().unwrap()
    }

    fn doc(pages: u32) -> PdfDocument {
        PdfDocument::new(pages, Size::new(612.0, 792.0))
    }

    fn square(page: PageIndex) -> AnnotationObject {
        AnnotationObject::new(page, AnnotationSubtype::Square, Rect::new(5.0, 5.0, 40.0, 20.0))
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn open_document_hydrates_synced_annotations() {
        let h = start(manual(), false);
        let doc = doc(2);
        let a = square(0);
        let b = square(1);
        h.backend.seed(&doc, vec![a.clone(), b.clone()]);

        assert_eq!(h.handle.open_document(doc.clone()).await.unwrap(), 2);
        let state = h.handle.state();
        assert_eq!(state.get(a.id).unwrap().commit_state, CommitState::Synced);
        assert!(!state.has_pending_changes);
        assert_eq!(h.handle.page_annotations(1).len(), 1);

        h.handle.close_document().await;
        assert!(h.handle.document().is_none());
        assert!(h.handle.state().by_uid.is_empty());
    }

    #[tokio::test]
    async fn pending_edits_stay_with_their_document() {
        let h = start_with(InMemoryBackend::new().with_latency(Duration::from_millis(40)), manual(), false);
        let first = doc(1);
        let second = doc(1);
        h.handle.open_document(first.clone()).await.unwrap();
        let id = h.handle.create_annotation(0, square(0), None);

        let handle = h.handle.clone();
        let next = second.clone();
        let opening = tokio::spawn(async move { handle.open_document(next).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.handle.commit().await.unwrap();
        opening.await.unwrap().unwrap();

        assert!(!h.backend.contains(&second, id));
        assert!(h.handle.get_annotation(id).is_none());
        assert_eq!(h.handle.document().map(|d| d.id), Some(second.id));
    }

    #[tokio::test]
    async fn deleting_during_a_commit_removes_the_landed_creation() {
        let h = start_with(InMemoryBackend::new().with_latency(Duration::from_millis(40)), manual(), false);
        let doc = doc(1);
        h.handle.open_document(doc.clone()).await.unwrap();
        let id = h.handle.create_annotation(0, square(0), None);

        let handle = h.handle.clone();
        let committing = tokio::spawn(async move { handle.commit().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.handle.delete_annotation(0, id).unwrap();
        committing.await.unwrap().unwrap();

        assert!(h.handle.get_annotation(id).is_none());
        assert!(!h.backend.contains(&doc, id));
        assert!(h.handle.commit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_page_annotations_checks_document_and_page() {
        let h = start(manual(), false);
        let err = h.handle.get_page_annotations(0).await.unwrap_err();
        assert_eq!(err.code, EngineErrorCode::NotFound);

        let doc = doc(1);
        h.backend.seed(&doc, vec![square(0)]);
        h.handle.open_document(doc).await.unwrap();
        assert_eq!(h.handle.get_page_annotations(0).await.unwrap().len(), 1);
        assert_eq!(h.handle.get_page_annotations(4).await.unwrap_err().code, EngineErrorCode::NotFound);
    }

    #[tokio::test]
    async fn render_requires_document_and_page() {
        let h = start(manual(), false);
        let options = RenderOptions::default();
        assert!(matches!(
            h.handle.render_annotation(0, square(0), &options),
            Err(AnnotationError::DocumentNotFound)
        ));

        h.handle.open_document(doc(1)).await.unwrap();
        assert!(matches!(
            h.handle.render_annotation(3, square(3), &options),
            Err(AnnotationError::PageNotFound(3))
        ));

        let image = h.handle.render_annotation(0, square(0), &options).unwrap().await.unwrap();
        assert_eq!((image.width, image.height), (40, 20));
    }

    #[tokio::test]
    async fn set_active_variant_drives_interaction_mode() {
        let h = start(manual(), false);
        let mut variants = h.handle.on_active_variant_change();

        h.handle.set_active_variant(Some("ink")).unwrap();
        assert_eq!(h.interaction.active_mode(), "ink");
        assert_eq!(h.handle.get_active_variant().as_deref(), Some("ink"));
        assert_eq!(variants.recv().await.unwrap().as_deref(), Some("ink"));
        assert_eq!(h.handle.get_active_tool().defaults.map(|d| d.subtype), Some(AnnotationSubtype::Ink));

        h.handle.set_active_variant(None).unwrap();
        assert_eq!(h.interaction.active_mode(), DEFAULT_MODE);
        assert!(h.handle.get_active_variant().is_none());
        assert_eq!(variants.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_variant_is_a_configuration_error() {
        let h = start(manual(), false);
        let err = h.handle.set_active_variant(Some("laser")).unwrap_err();
        assert!(matches!(err, AnnotationError::ModeMissing(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn external_mode_changes_update_active_variant() {
        let h = start(manual(), false);
        let mut tools = h.handle.on_active_tool_change();

        h.interaction.activate("highlight");
        eventually(|| h.handle.get_active_variant().as_deref() == Some("highlight")).await;
        let tool = tools.recv().await.unwrap();
        assert_eq!(tool.variant_key.as_deref(), Some("highlight"));

        h.interaction.activate_default_mode();
        eventually(|| h.handle.get_active_variant().is_none()).await;
    }

    #[tokio::test]
    async fn created_then_deleted_never_reaches_engine() {
        let h = start(manual(), false);
        let doc = doc(1);
        h.handle.open_document(doc.clone()).await.unwrap();

        let id = h.handle.create_annotation(0, square(0), None);
        h.handle.delete_annotation(0, id).unwrap();
        h.handle.commit().await.unwrap();

        assert!(h.backend.calls_for(id).is_empty());
        assert!(h.handle.get_annotation(id).is_none());
    }

    #[tokio::test]
    async fn create_defaults_author_and_print_flag() {
        let config = AnnotationConfig::builder()
            .annotation_author("Reviewer")
            .auto_commit(false)
            .build()
            .unwrap();
        let h = start(config, false);

        let id = h.handle.create_annotation(0, square(7), None);
        let tracked = h.handle.get_annotation(id).unwrap();
        assert_eq!(tracked.object.page_index, 0);
        assert_eq!(tracked.object.author.as_deref(), Some("Reviewer"));
        assert!(tracked.object.flags.contains(AnnotationFlags::PRINT));

        let explicit = h.handle.create_annotation(0, square(0).with_author("Someone"), None);
        assert_eq!(h.handle.get_annotation(explicit).unwrap().object.author.as_deref(), Some("Someone"));

        let synced = square(0).with_author("Original");
        h.handle.core.store.dispatch(AnnotationAction::SetAnnotations(vec![synced.clone()]));
        h.handle
            .update_annotation(0, synced.id, AnnotationPatch { opacity: Some(0.5), ..Default::default() })
            .unwrap();
        let updated = h.handle.get_annotation(synced.id).unwrap();
        assert_eq!(updated.object.author.as_deref(), Some("Reviewer"));
        assert_eq!(updated.commit_state, CommitState::Dirty);
    }

    #[tokio::test]
    async fn autocommit_without_history_flushes_after_each_mutation() {
        let h = start(AnnotationConfig::default(), false);
        let doc = doc(1);
        h.handle.open_document(doc.clone()).await.unwrap();

        let id = h.handle.create_annotation(0, square(0), None);
        eventually(|| h.backend.contains(&doc, id) && !h.handle.state().has_pending_changes).await;

        h.handle.delete_annotation(0, id).unwrap();
        eventually(|| h.handle.get_annotation(id).is_none()).await;
        assert!(!h.backend.contains(&doc, id));
    }

    #[tokio::test]
    async fn autocommit_with_history_flushes_on_history_change() {
        let h = start(AnnotationConfig::default(), true);
        let doc = doc(1);
        h.handle.open_document(doc.clone()).await.unwrap();

        let id = h.handle.create_annotation(0, square(0), None);
        eventually(|| h.backend.contains(&doc, id)).await;

        // Undo of a committed creation removes it from the engine as well.
        assert!(h.history.undo());
        eventually(|| !h.backend.contains(&doc, id)).await;
        eventually(|| h.handle.get_annotation(id).is_none()).await;
    }

    #[tokio::test]
    async fn undoing_an_uncommitted_creation_issues_no_engine_call() {
        let h = start(manual(), true);
        h.handle.open_document(doc(1)).await.unwrap();

        let id = h.handle.create_annotation(0, square(0), None);
        assert!(h.history.undo());
        h.handle.commit().await.unwrap();

        assert!(h.handle.get_annotation(id).is_none());
        assert!(h.backend.calls_for(id).is_empty());
    }

    #[tokio::test]
    async fn text_markup_selection_across_two_documents() {
        let config = AnnotationConfig::builder().annotation_author("Reviewer").build().unwrap();
        let h = start(config, true);
        let highlight = h.handle.get_tool_defaults("highlight").unwrap();

        for doc in [doc(2), doc(3)] {
            h.handle.open_document(doc.clone()).await.unwrap();
            h.handle.set_active_variant(Some("highlight")).unwrap();

            let first = vec![Rect::new(10.0, 10.0, 100.0, 12.0), Rect::new(10.0, 24.0, 60.0, 12.0)];
            let second = vec![Rect::new(10.0, 700.0, 80.0, 12.0)];
            h.selection.set_selection(
                vec![
                    SelectionSegment { page_index: 0, rect: Rect::new(10.0, 10.0, 100.0, 26.0), segment_rects: first.clone() },
                    SelectionSegment { page_index: 1, rect: Rect::new(10.0, 700.0, 80.0, 12.0), segment_rects: second },
                ],
                vec!["lorem ipsum".into(), "dolor".into()],
            );
            h.selection.end_selection(Some("highlight"));

            eventually(|| {
                h.backend.annotations_on(&doc, 0).len() == 1 && h.backend.annotations_on(&doc, 1).len() == 1
            })
            .await;
            assert!(h.selection.is_empty());

            let created = h.backend.annotations_on(&doc, 0).remove(0);
            assert_eq!(created.subtype, AnnotationSubtype::Highlight);
            assert_eq!(created.author.as_deref(), Some("Reviewer"));
            assert_eq!(created.segment_rects, first);
            assert_eq!(created.rect, Rect::new(10.0, 10.0, 100.0, 26.0));
            assert_eq!(created.color, Some(highlight.color));
            assert_eq!(created.blend_mode, BlendMode::Multiply);
            assert!(created.flags.contains(AnnotationFlags::PRINT));
            assert_eq!(created.custom, Some(serde_json::json!({ "text": "lorem ipsum\ndolor" })));

            eventually(|| !h.handle.state().has_pending_changes).await;
            assert_eq!(h.handle.state().by_uid.len(), 2);
        }
    }

    #[tokio::test]
    async fn selection_end_without_markup_tool_is_ignored() {
        let h = start(manual(), false);
        h.handle.open_document(doc(1)).await.unwrap();
        h.handle.set_active_variant(Some("ink")).unwrap();

        h.selection.set_selection(
            vec![SelectionSegment { page_index: 0, rect: Rect::new(0.0, 0.0, 1.0, 1.0), segment_rects: vec![] }],
            vec!["x".into()],
        );
        h.selection.end_selection(None);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(h.handle.state().by_uid.is_empty());
        assert!(!h.selection.is_empty());
    }

    #[tokio::test]
    async fn tool_defaults_queries_and_updates() {
        let h = start(manual(), false);

        assert_eq!(
            h.handle.get_tool_defaults_by_subtype_and_intent(AnnotationSubtype::Ink, Some("highlighter")).unwrap().opacity,
            0.5
        );
        // Unknown intent falls back to the plain subtype.
        assert_eq!(
            h.handle.get_tool_defaults_by_subtype_and_intent(AnnotationSubtype::Ink, Some("marker")).unwrap().variant_key(),
            "ink"
        );
        assert!(matches!(
            h.handle.get_tool_defaults_by_subtype(AnnotationSubtype::Text),
            Err(AnnotationError::VariantNotFound(_))
        ));
        assert_eq!(
            h.handle.get_subtype_and_intent_by_variant("line_arrow").unwrap(),
            (AnnotationSubtype::Line, Some("arrow".to_string()))
        );

        h.handle.set_active_variant(Some("square")).unwrap();
        let mut tools = h.handle.on_active_tool_change();
        h.handle
            .set_tool_defaults("square", ToolDefaultsPatch { color: Some(Color::rgb(1, 2, 3)), ..Default::default() })
            .unwrap();
        assert_eq!(tools.recv().await.unwrap().defaults.map(|d| d.color), Some(Color::rgb(1, 2, 3)));
        assert!(matches!(
            h.handle.set_tool_defaults("nope", ToolDefaultsPatch::default()),
            Err(AnnotationError::VariantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn color_presets_are_an_ordered_set() {
        let h = start(manual(), false);
        let before = h.handle.get_color_presets();
        h.handle.add_color_preset(before[0]);
        h.handle.add_color_preset(Color::rgb(9, 9, 9));
        let after = h.handle.get_color_presets();
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after.last(), Some(&Color::rgb(9, 9, 9)));
    }

    #[tokio::test]
    async fn selection_projection() {
        let h = start(manual(), false);
        let id = h.handle.create_annotation(0, square(0), None);
        h.handle.select_annotation(0, id);
        assert_eq!(h.handle.get_selected_annotation().map(|t| t.id()), Some(id));
        h.handle.deselect_annotation();
        assert!(h.handle.get_selected_annotation().is_none());
    }

    #[tokio::test]
    async fn commit_report_lists_operations() {
        let h = start(manual(), false);
        let doc = doc(1);
        let synced = square(0);
        h.backend.seed(&doc, vec![synced.clone()]);
        h.handle.open_document(doc).await.unwrap();
        h.backend.clear_calls();

        let created = h.handle.create_annotation(0, square(0), None);
        h.handle.delete_annotation(0, synced.id).unwrap();

        let report = h.handle.commit().await.unwrap();
        assert!(report.all_succeeded());
        assert_eq!(report.items.len(), 2);
        assert_eq!(
            h.backend.calls(),
            vec![
                BackendCall::Create { id: created, page: 0, with_context: false },
                BackendCall::Remove { id: synced.id, page: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let h = start(manual(), false);
        h.handle.shutdown().await.unwrap();
        h.join.await.unwrap();
        assert!(matches!(h.handle.shutdown().await, Err(AnnotationError::ChannelClosed)));
    }

    #[tokio::test]
    async fn cancellation_token_stops_the_worker() {
        let plugin = AnnotationPlugin::new(manual(), Arc::new(InMemoryBackend::new()), PluginServices::none());
        let token = plugin.cancellation_token();
        let (_handle, join) = plugin.start();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), join).await.unwrap().unwrap();
    }
}
