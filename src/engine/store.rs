use crate::engine::backend::CreateContext;
use crate::engine::events::{ActiveTool, AnnotationBus};
use crate::engine::tracker::{AnnotationAction, AnnotationState};
use crate::engine::types::AnnotationId;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Single-writer store of the [`AnnotationState`].
///
/// Every [`dispatch`](Self::dispatch) reduces the current state into a new
/// immutable snapshot, swaps it in and publishes it before returning. The
/// state lock is held for the whole sequence, so subscribers observe
/// snapshots in dispatch order and a dispatch never interleaves with another.
///
/// The store also keeps the pending creation contexts. They live next to the
/// state rather than in it: they are consumed by the next commit and never
/// shown to subscribers.
pub struct AnnotationStore {
    state: Mutex<Arc<AnnotationState>>,
    contexts: Mutex<HashMap<AnnotationId, CreateContext>>,
    bus: AnnotationBus,
}

impl Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("annotations", &self.state().by_uid.len())
            .field("contexts", &self.lock_contexts().len())
            .finish_non_exhaustive()
    }
}

impl AnnotationStore {
    pub fn new(initial: AnnotationState, channel_capacity: usize) -> Self {
        Self {
            state: Mutex::new(Arc::new(initial)),
            contexts: Mutex::new(HashMap::new()),
            bus: AnnotationBus::new(channel_capacity),
        }
    }

    pub fn bus(&self) -> &AnnotationBus {
        &self.bus
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<AnnotationState> {
        Arc::clone(&self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn dispatch(&self, action: AnnotationAction) -> Arc<AnnotationState> {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        log::trace!("dispatch {action:?}");

        let prev = Arc::clone(&current);
        let next = Arc::new(prev.reduce(action));
        *current = Arc::clone(&next);

        self.prune_contexts(&next);
        self.bus.publish_state(Arc::clone(&next));

        if prev.active_variant != next.active_variant {
            self.bus.publish_active_variant(next.active_variant.clone());
        }
        if prev.active_variant != next.active_variant || prev.active_tool_defaults() != next.active_tool_defaults() {
            self.bus.publish_active_tool(ActiveTool {
                variant_key: next.active_variant.clone(),
                defaults: next.active_tool_defaults().cloned(),
            });
        }

        next
    }

    // ****************************************************************
    // Pending creation contexts

    pub fn set_context(&self, id: AnnotationId, context: CreateContext) {
        self.lock_contexts().insert(id, context);
    }

    pub fn context(&self, id: AnnotationId) -> Option<CreateContext> {
        self.lock_contexts().get(&id).cloned()
    }

    pub fn remove_context(&self, id: AnnotationId) -> Option<CreateContext> {
        self.lock_contexts().remove(&id)
    }

    pub fn context_count(&self) -> usize {
        self.lock_contexts().len()
    }

    fn lock_contexts(&self) -> MutexGuard<'_, HashMap<AnnotationId, CreateContext>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Contexts never outlive the annotation they belong to.
    fn prune_contexts(&self, state: &AnnotationState) {
        self.lock_contexts().retain(|id, _| state.by_uid.contains_key(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::ImageData;
    use crate::engine::tools::{default_tools, ToolDefaultsPatch};
    use crate::engine::types::{AnnotationObject, AnnotationSubtype, Rect};

    fn store() -> AnnotationStore {
        AnnotationStore::new(AnnotationState::new(&default_tools(), vec![]), 16)
    }

    fn stamp() -> AnnotationObject {
        AnnotationObject::new(0, AnnotationSubtype::Stamp, Rect::new(0.0, 0.0, 20.0, 20.0))
    }

    #[test]
    fn subscribers_see_every_dispatch_in_order() {
        let store = store();
        let mut rx = store.bus().subscribe_state();
        let a = stamp();

        store.dispatch(AnnotationAction::Create(a.clone()));
        store.dispatch(AnnotationAction::Select { page_index: 0, id: a.id });
        store.dispatch(AnnotationAction::Deselect);

        assert!(rx.try_recv().unwrap().selection.is_none());
        assert!(rx.try_recv().unwrap().selection.is_some());
        assert!(rx.try_recv().unwrap().selection.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshots_are_immutable() {
        let store = store();
        let before = store.state();
        store.dispatch(AnnotationAction::Create(stamp()));
        assert!(before.by_uid.is_empty());
        assert_eq!(store.state().by_uid.len(), 1);
    }

    #[test]
    fn contexts_are_pruned_with_their_annotation() {
        let store = store();
        let a = stamp();
        store.dispatch(AnnotationAction::Create(a.clone()));
        store.set_context(a.id, CreateContext::Image(ImageData::new(2, 2)));
        assert_eq!(store.context_count(), 1);

        store.dispatch(AnnotationAction::Delete { page_index: 0, id: a.id });
        assert_eq!(store.context_count(), 0);
        assert!(store.context(a.id).is_none());
    }

    #[test]
    fn active_variant_and_tool_changes_are_published() {
        let store = store();
        let mut variants = store.bus().subscribe_active_variant();
        let mut tools = store.bus().subscribe_active_tool();

        store.dispatch(AnnotationAction::SetActiveVariant(Some("ink".into())));
        assert_eq!(variants.try_recv().unwrap().as_deref(), Some("ink"));
        assert_eq!(tools.try_recv().unwrap().variant_key.as_deref(), Some("ink"));

        // Defaults of an inactive tool: nothing to report.
        store.dispatch(AnnotationAction::UpdateToolDefaults {
            variant_key: "square".into(),
            patch: ToolDefaultsPatch { opacity: Some(0.2), ..Default::default() },
        });
        assert!(tools.try_recv().is_err());

        store.dispatch(AnnotationAction::UpdateToolDefaults {
            variant_key: "ink".into(),
            patch: ToolDefaultsPatch { opacity: Some(0.2), ..Default::default() },
        });
        assert_eq!(tools.try_recv().unwrap().defaults.map(|d| d.opacity), Some(0.2));
        assert!(variants.try_recv().is_err());
    }
}
