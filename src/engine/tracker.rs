//! Annotation tracker.
//!
//! Holds every annotation of the open document together with its commit state
//! relative to the document engine, and the tool/selection state of the
//! plugin. [`AnnotationState`] is immutable from the outside: the store
//! replaces it wholesale with the result of [`AnnotationState::reduce`] for
//! every dispatched [`AnnotationAction`].
//!
//! ```text
//!   new ──patch──> new            synced ──patch──> dirty ──patch──> dirty
//!   new ──delete─> (purged)       synced ──delete─> deleted <─delete─ dirty
//!   * ──commit───> synced         deleted ──commit─> (purged)
//! ```

use crate::engine::commit::CommitOperation;
use crate::engine::tools::{ToolDefaults, ToolDefaultsPatch};
use crate::engine::types::{AnnotationId, AnnotationObject, AnnotationPatch, Color, PageIndex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    New,
    Dirty,
    Deleted,
    Synced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedAnnotation {
    pub object: AnnotationObject,
    pub commit_state: CommitState,
    /// The engine knows this annotation (hydrated, or created successfully).
    pub persisted: bool,
    /// Logical time of the last local mutation of this entry.
    pub revision: u64,
}

impl TrackedAnnotation {
    pub fn id(&self) -> AnnotationId {
        self.object.id
    }

    pub fn page_index(&self) -> PageIndex {
        self.object.page_index
    }

    pub fn is_pending(&self) -> bool {
        self.commit_state != CommitState::Synced
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedAnnotation {
    pub page_index: PageIndex,
    pub id: AnnotationId,
}

/// Outcome of one engine operation of a commit batch, fed back into the
/// tracker once the whole batch settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub id: AnnotationId,
    /// Revision of the entry when the operation was issued
    pub revision: u64,
    pub operation: CommitOperation,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationAction {
    /// Replace all annotations with engine state (hydration). Clears the selection.
    SetAnnotations(Vec<AnnotationObject>),
    Create(AnnotationObject),
    Patch { page_index: PageIndex, id: AnnotationId, patch: AnnotationPatch },
    Delete { page_index: PageIndex, id: AnnotationId },
    Select { page_index: PageIndex, id: AnnotationId },
    Deselect,
    SetActiveVariant(Option<String>),
    UpdateToolDefaults { variant_key: String, patch: ToolDefaultsPatch },
    AddColorPreset(Color),
    Purge(AnnotationId),
    FinalizeCommit(Vec<Settlement>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotationState {
    pub by_uid: HashMap<AnnotationId, TrackedAnnotation>,
    /// Tracked uids per page, in insertion order
    pub pages: BTreeMap<PageIndex, Vec<AnnotationId>>,
    pub active_variant: Option<String>,
    pub tool_defaults: BTreeMap<String, ToolDefaults>,
    pub color_presets: Vec<Color>,
    pub has_pending_changes: bool,
    pub selection: Option<SelectedAnnotation>,
    clock: u64,
}

impl AnnotationState {
    pub fn new(tools: &[ToolDefaults], color_presets: Vec<Color>) -> Self {
        Self {
            tool_defaults: tools.iter().map(|t| (t.variant_key(), t.clone())).collect(),
            color_presets,
            ..Default::default()
        }
    }

    // ****************************************************************
    // Projections

    pub fn get(&self, id: AnnotationId) -> Option<&TrackedAnnotation> {
        self.by_uid.get(&id)
    }

    /// Annotations on `page` that are not pending deletion, in insertion order.
    pub fn page_annotations(&self, page: PageIndex) -> Vec<&TrackedAnnotation> {
        self.pages
            .get(&page)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_uid.get(id))
            .filter(|t| t.commit_state != CommitState::Deleted)
            .collect()
    }

    pub fn selected(&self) -> Option<&TrackedAnnotation> {
        self.selection.and_then(|s| self.by_uid.get(&s.id))
    }

    pub fn pending(&self) -> impl Iterator<Item = &TrackedAnnotation> {
        self.by_uid.values().filter(|t| t.is_pending())
    }

    pub fn active_tool_defaults(&self) -> Option<&ToolDefaults> {
        self.active_variant.as_ref().and_then(|key| self.tool_defaults.get(key))
    }

    // ****************************************************************
    // Reducer

    /// Returns the state after `action`. `self` is left untouched.
    pub fn reduce(&self, action: AnnotationAction) -> AnnotationState {
        let mut next = self.clone();
        next.apply(action);
        next.has_pending_changes = next.by_uid.values().any(TrackedAnnotation::is_pending);
        next
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn apply(&mut self, action: AnnotationAction) {
        match action {
            AnnotationAction::SetAnnotations(objects) => {
                self.by_uid.clear();
                self.pages.clear();
                self.selection = None;
                let revision = self.tick();
                for object in objects {
                    self.insert(TrackedAnnotation {
                        object,
                        commit_state: CommitState::Synced,
                        persisted: true,
                        revision,
                    });
                }
            }
            AnnotationAction::Create(object) => {
                let revision = self.tick();
                let persisted = self.by_uid.get(&object.id).map(|t| t.persisted).unwrap_or(false);
                // Re-creating a persisted entry (undo of a delete) only has to
                // bring the engine copy up to date.
                let commit_state = if persisted { CommitState::Dirty } else { CommitState::New };
                self.remove(object.id);
                self.insert(TrackedAnnotation { object, commit_state, persisted, revision });
            }
            AnnotationAction::Patch { id, patch, .. } => {
                let revision = self.tick();
                match self.by_uid.get_mut(&id) {
                    Some(tracked) if tracked.commit_state != CommitState::Deleted => {
                        patch.apply_to(&mut tracked.object);
                        tracked.revision = revision;
                        if tracked.commit_state != CommitState::New {
                            tracked.commit_state = CommitState::Dirty;
                        }
                    }
                    _ => log::warn!("ignoring patch of unknown or deleted annotation {id}"),
                }
            }
            AnnotationAction::Delete { id, .. } => {
                let revision = self.tick();
                if self.selection.map(|s| s.id) == Some(id) {
                    self.selection = None;
                }
                match self.by_uid.get(&id).map(|t| t.commit_state) {
                    Some(CommitState::New) => {
                        self.remove(id);
                    }
                    Some(_) => {
                        if let Some(tracked) = self.by_uid.get_mut(&id) {
                            tracked.commit_state = CommitState::Deleted;
                            tracked.revision = revision;
                        }
                    }
                    None => log::warn!("ignoring delete of unknown annotation {id}"),
                }
            }
            AnnotationAction::Select { page_index, id } => {
                match self.by_uid.get(&id) {
                    Some(tracked) if tracked.commit_state != CommitState::Deleted => {
                        self.selection = Some(SelectedAnnotation { page_index, id });
                    }
                    _ => log::debug!("cannot select unknown or deleted annotation {id}"),
                }
            }
            AnnotationAction::Deselect => self.selection = None,
            AnnotationAction::SetActiveVariant(variant) => self.active_variant = variant,
            AnnotationAction::UpdateToolDefaults { variant_key, patch } => {
                if let Some(defaults) = self.tool_defaults.get_mut(&variant_key) {
                    *defaults = defaults.apply(&patch);
                }
            }
            AnnotationAction::AddColorPreset(color) => {
                if !self.color_presets.contains(&color) {
                    self.color_presets.push(color);
                }
            }
            AnnotationAction::Purge(id) => {
                if self.selection.map(|s| s.id) == Some(id) {
                    self.selection = None;
                }
                self.remove(id);
            }
            AnnotationAction::FinalizeCommit(settlements) => {
                for settlement in settlements {
                    self.settle(settlement);
                }
            }
        }
    }

    fn settle(&mut self, s: Settlement) {
        let removed = s.operation == CommitOperation::Remove && s.succeeded;
        if removed && self.by_uid.get(&s.id).map(|t| t.commit_state) == Some(CommitState::Deleted) {
            self.remove(s.id);
            return;
        }

        let Some(tracked) = self.by_uid.get_mut(&s.id) else {
            return;
        };
        let unchanged = tracked.revision == s.revision;

        match (s.operation, s.succeeded) {
            (CommitOperation::Create, true) => {
                tracked.persisted = true;
                if unchanged {
                    tracked.commit_state = CommitState::Synced;
                } else if tracked.commit_state == CommitState::New {
                    // Patched while in flight: the engine holds a stale copy.
                    tracked.commit_state = CommitState::Dirty;
                }
            }
            (CommitOperation::Remove, true) => {
                // Restored while the removal was in flight.
                tracked.persisted = false;
                tracked.commit_state = CommitState::New;
            }
            (CommitOperation::Create | CommitOperation::Update | CommitOperation::Remove, _) => {
                if unchanged {
                    tracked.commit_state = CommitState::Synced;
                }
            }
        }
    }

    fn insert(&mut self, tracked: TrackedAnnotation) {
        let id = tracked.id();
        self.pages.entry(tracked.page_index()).or_default().push(id);
        self.by_uid.insert(id, tracked);
    }

    fn remove(&mut self, id: AnnotationId) -> Option<TrackedAnnotation> {
        let tracked = self.by_uid.remove(&id)?;
        if let Some(ids) = self.pages.get_mut(&tracked.page_index()) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.pages.remove(&tracked.page_index());
            }
        }
        Some(tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tools::default_tools;
    use crate::engine::types::{AnnotationSubtype, Rect};

    fn square(page: PageIndex) -> AnnotationObject {
        AnnotationObject::new(page, AnnotationSubtype::Square, Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    fn opacity(value: f32) -> AnnotationPatch {
        AnnotationPatch { opacity: Some(value), ..Default::default() }
    }

    fn hydrated(objects: Vec<AnnotationObject>) -> AnnotationState {
        AnnotationState::default().reduce(AnnotationAction::SetAnnotations(objects))
    }

    fn settle(state: &AnnotationState, id: AnnotationId, operation: CommitOperation, succeeded: bool, revision: u64) -> AnnotationState {
        state.reduce(AnnotationAction::FinalizeCommit(vec![Settlement { id, revision, operation, succeeded }]))
    }

    #[test]
    fn hydration_marks_everything_synced() {
        let a = square(0);
        let b = square(1);
        let state = hydrated(vec![a.clone(), b.clone()]);
        assert!(!state.has_pending_changes);
        assert_eq!(state.get(a.id).unwrap().commit_state, CommitState::Synced);
        assert!(state.get(b.id).unwrap().persisted);
        assert_eq!(state.pages.get(&1), Some(&vec![b.id]));
    }

    #[test]
    fn patching_new_stays_new() {
        let a = square(0);
        let s = AnnotationState::default().reduce(AnnotationAction::Create(a.clone()));
        let s = s.reduce(AnnotationAction::Patch { page_index: 0, id: a.id, patch: opacity(0.5) });
        let s = s.reduce(AnnotationAction::Patch { page_index: 0, id: a.id, patch: opacity(0.2) });
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::New);
        assert_eq!(t.object.opacity, 0.2);
        assert!(s.has_pending_changes);
    }

    #[test]
    fn patching_synced_makes_dirty() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Patch { page_index: 0, id: a.id, patch: opacity(0.5) });
        assert_eq!(s.get(a.id).unwrap().commit_state, CommitState::Dirty);
        assert!(s.has_pending_changes);
    }

    #[test]
    fn deleting_new_purges_immediately() {
        let a = square(3);
        let s = AnnotationState::default().reduce(AnnotationAction::Create(a.clone()));
        let s = s.reduce(AnnotationAction::Select { page_index: 3, id: a.id });
        let s = s.reduce(AnnotationAction::Delete { page_index: 3, id: a.id });
        assert!(s.get(a.id).is_none());
        assert!(s.pages.get(&3).is_none());
        assert!(s.selection.is_none());
        assert!(!s.has_pending_changes);
    }

    #[test]
    fn deleting_synced_keeps_object_for_commit() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::Deleted);
        assert_eq!(t.object, a);
        assert!(s.page_annotations(0).is_empty());
    }

    #[test]
    fn pending_deletions_cannot_be_selected() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let s = s.reduce(AnnotationAction::Select { page_index: 0, id: a.id });
        assert!(s.selection.is_none());
        assert!(s.selected().is_none());
    }

    #[test]
    fn patching_deleted_is_ignored() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let s = s.reduce(AnnotationAction::Patch { page_index: 0, id: a.id, patch: opacity(0.1) });
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::Deleted);
        assert_eq!(t.object.opacity, 1.0);
    }

    #[test]
    fn recreating_deleted_persisted_entry_restores_as_dirty() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let s = s.reduce(AnnotationAction::Create(a.clone()));
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::Dirty);
        assert!(t.persisted);
        assert_eq!(s.pages.get(&0), Some(&vec![a.id]));
    }

    #[test]
    fn finalize_syncs_unchanged_entries() {
        let a = square(0);
        let s = AnnotationState::default().reduce(AnnotationAction::Create(a.clone()));
        let rev = s.get(a.id).unwrap().revision;
        let s = settle(&s, a.id, CommitOperation::Create, true, rev);
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::Synced);
        assert!(t.persisted);
        assert!(!s.has_pending_changes);
    }

    #[test]
    fn failed_operations_still_sync() {
        let a = square(0);
        let s = AnnotationState::default().reduce(AnnotationAction::Create(a.clone()));
        let rev = s.get(a.id).unwrap().revision;
        let s = settle(&s, a.id, CommitOperation::Create, false, rev);
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::Synced);
        assert!(!t.persisted);
    }

    #[test]
    fn entries_patched_in_flight_stay_pending() {
        let a = square(0);
        let s = AnnotationState::default().reduce(AnnotationAction::Create(a.clone()));
        let rev = s.get(a.id).unwrap().revision;
        let s = s.reduce(AnnotationAction::Patch { page_index: 0, id: a.id, patch: opacity(0.3) });
        let s = settle(&s, a.id, CommitOperation::Create, true, rev);
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::Dirty);
        assert!(t.persisted);
        assert!(s.has_pending_changes);
    }

    #[test]
    fn successful_removal_purges() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let rev = s.get(a.id).unwrap().revision;
        let s = settle(&s, a.id, CommitOperation::Remove, true, rev);
        assert!(s.get(a.id).is_none());
        assert!(!s.has_pending_changes);
    }

    #[test]
    fn failed_removal_resurfaces_the_annotation() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let rev = s.get(a.id).unwrap().revision;
        let s = settle(&s, a.id, CommitOperation::Remove, false, rev);
        assert_eq!(s.get(a.id).unwrap().commit_state, CommitState::Synced);
        assert_eq!(s.page_annotations(0).len(), 1);
    }

    #[test]
    fn removal_of_entry_restored_in_flight_turns_it_new() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let s = s.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        let rev = s.get(a.id).unwrap().revision;
        let s = s.reduce(AnnotationAction::Create(a.clone()));
        let s = settle(&s, a.id, CommitOperation::Remove, true, rev);
        let t = s.get(a.id).unwrap();
        assert_eq!(t.commit_state, CommitState::New);
        assert!(!t.persisted);
    }

    #[test]
    fn tool_defaults_and_presets() {
        let s = AnnotationState::new(&default_tools(), vec![Color::rgb(1, 1, 1)]);
        assert!(s.tool_defaults.contains_key("ink"));

        let s = s.reduce(AnnotationAction::SetActiveVariant(Some("ink".into())));
        let s = s.reduce(AnnotationAction::UpdateToolDefaults {
            variant_key: "ink".into(),
            patch: ToolDefaultsPatch { opacity: Some(0.4), ..Default::default() },
        });
        assert_eq!(s.active_tool_defaults().map(|d| d.opacity), Some(0.4));

        let s = s.reduce(AnnotationAction::AddColorPreset(Color::rgb(1, 1, 1)));
        let s = s.reduce(AnnotationAction::AddColorPreset(Color::rgb(2, 2, 2)));
        assert_eq!(s.color_presets, vec![Color::rgb(1, 1, 1), Color::rgb(2, 2, 2)]);
    }

    #[test]
    fn reduce_does_not_touch_previous_state() {
        let a = square(0);
        let before = hydrated(vec![a.clone()]);
        let after = before.reduce(AnnotationAction::Delete { page_index: 0, id: a.id });
        assert_eq!(before.get(a.id).unwrap().commit_state, CommitState::Synced);
        assert_eq!(after.get(a.id).unwrap().commit_state, CommitState::Deleted);
    }

    #[test]
    fn state_serializes_to_json() {
        let a = square(0);
        let s = hydrated(vec![a.clone()]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["has_pending_changes"], serde_json::json!(false));
        assert_eq!(json["by_uid"][a.id.to_string()]["commit_state"], serde_json::json!("synced"));
    }
}
