//! Commit orchestrator.
//!
//! A commit reconciles the tracker with the document engine:
//!
//! 1. pending entries are grouped into creations, updates and deletions;
//!    entries on pages the open document does not have are skipped and stay
//!    pending,
//! 2. deletions the engine never knew about are purged locally,
//! 3. one engine task per remaining entry is issued, all concurrently,
//! 4. the batch waits until **every** task settled, whatever the outcome,
//! 5. the outcomes are folded back into the tracker in a single dispatch.
//!
//! Individual engine failures do not fail the commit. They are logged and
//! listed in the returned [`CommitReport`].

use crate::engine::backend::{AnnotationBackend, EngineTask};
use crate::engine::document::{DocumentId, DocumentSlot, PdfDocument};
use crate::engine::errors::{AnnotationError, EngineFailure};
use crate::engine::store::AnnotationStore;
use crate::engine::tracker::{AnnotationAction, CommitState, Settlement, TrackedAnnotation};
use crate::engine::types::{AnnotationId, AnnotationObject, PageIndex};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use std::fmt::{self, Display};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum CommitOperation {
    Create,
    Update,
    Remove,
}

impl Display for CommitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitOperation::Create => write!(f, "create"),
            CommitOperation::Update => write!(f, "update"),
            CommitOperation::Remove => write!(f, "remove"),
        }
    }
}

/// Outcome of one engine operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitItem {
    pub id: AnnotationId,
    pub page_index: PageIndex,
    pub operation: CommitOperation,
    pub result: Result<(), EngineFailure>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitReport {
    /// Issued engine operations in issue order: creations, updates, removals
    pub items: Vec<CommitItem>,
    /// Pending entries whose page is not part of the open document
    pub skipped: Vec<AnnotationId>,
    /// Deletions that never reached the engine
    pub purged_locally: Vec<AnnotationId>,
}

impl CommitReport {
    /// Nothing was issued, skipped or purged.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.skipped.is_empty() && self.purged_locally.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommitItem> {
        self.items.iter().filter(|i| i.result.is_err())
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn count(&self, operation: CommitOperation) -> usize {
        self.items.iter().filter(|i| i.operation == operation).count()
    }
}

pub struct CommitOrchestrator {
    store: Arc<AnnotationStore>,
    backend: Arc<dyn AnnotationBackend>,
    document: Arc<DocumentSlot>,
    /// Serialises overlapping commits. Later callers queue up.
    guard: tokio::sync::Mutex<()>,
}

impl fmt::Debug for CommitOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitOrchestrator")
            .field("backend", &self.backend.name())
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl CommitOrchestrator {
    pub fn new(store: Arc<AnnotationStore>, backend: Arc<dyn AnnotationBackend>, document: Arc<DocumentSlot>) -> Self {
        Self {
            store,
            backend,
            document,
            guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Makes `doc` the open document and drops everything tracked for the
    /// previous one. Waits for a running commit, so no batch ever mixes the
    /// entries of one document with another.
    pub async fn switch_document(&self, doc: Option<PdfDocument>) -> Option<PdfDocument> {
        let _running = self.guard.lock().await;
        let previous = self.document.set(doc);
        self.store.dispatch(AnnotationAction::SetAnnotations(Vec::new()));
        previous
    }

    /// Replaces the tracked annotations with `objects` loaded for `doc_id`.
    /// Returns false, leaving the state alone, when another document was
    /// opened in the meantime.
    pub async fn hydrate(&self, doc_id: DocumentId, objects: Vec<AnnotationObject>) -> bool {
        let _running = self.guard.lock().await;
        if self.document.get().map(|d| d.id) != Some(doc_id) {
            return false;
        }
        self.store.dispatch(AnnotationAction::SetAnnotations(objects));
        true
    }

    pub async fn commit(&self) -> Result<CommitReport, AnnotationError> {
        let _running = self.guard.lock().await;

        let state = self.store.state();
        if !state.has_pending_changes {
            return Ok(CommitReport::default());
        }
        let doc = self.document.get().ok_or(AnnotationError::DocumentNotFound)?;

        let mut report = CommitReport::default();
        let mut creations = Vec::new();
        let mut updates = Vec::new();
        let mut removals = Vec::new();

        let pending = state
            .pages
            .values()
            .flatten()
            .filter_map(|id| state.get(*id))
            .filter(|t| t.is_pending());

        for tracked in pending {
            if doc.page(tracked.page_index()).is_none() {
                log::warn!("skipping annotation {}: page {} not found", tracked.id(), tracked.page_index());
                report.skipped.push(tracked.id());
                continue;
            }
            match tracked.commit_state {
                CommitState::New => creations.push(tracked.clone()),
                CommitState::Dirty => updates.push(tracked.clone()),
                CommitState::Deleted if tracked.persisted => removals.push(tracked.clone()),
                CommitState::Deleted => report.purged_locally.push(tracked.id()),
                CommitState::Synced => {}
            }
        }

        for id in &report.purged_locally {
            self.store.dispatch(AnnotationAction::Purge(*id));
        }

        let mut tasks = Vec::with_capacity(creations.len() + updates.len() + removals.len());
        for t in &creations {
            let context = self.store.context(t.id());
            let task = self.backend.create_page_annotation(&doc, t.page_index(), t.object.clone(), context);
            tasks.push(issue(t, CommitOperation::Create, task));
        }
        for t in &updates {
            let task = self.backend.update_page_annotation(&doc, t.page_index(), t.object.clone());
            tasks.push(issue(t, CommitOperation::Update, task));
        }
        for t in &removals {
            let task = self.backend.remove_page_annotation(&doc, t.page_index(), t.object.clone());
            tasks.push(issue(t, CommitOperation::Remove, task));
        }

        // All settled: never short-circuits on a failure.
        let outcomes = join_all(tasks).await;

        let mut settlements = Vec::with_capacity(outcomes.len());
        for (item, revision) in outcomes {
            if let Err(e) = &item.result {
                log::warn!("{} of annotation {} failed: {e}", item.operation, item.id);
            }
            settlements.push(Settlement {
                id: item.id,
                revision,
                operation: item.operation,
                succeeded: item.result.is_ok(),
            });
            report.items.push(item);
        }

        if !settlements.is_empty() {
            self.store.dispatch(AnnotationAction::FinalizeCommit(settlements));
        }
        for t in &creations {
            self.store.remove_context(t.id());
        }

        // Creations that landed after their entry was dropped locally.
        let current = self.store.state();
        let created: Vec<AnnotationId> = report
            .items
            .iter()
            .filter(|i| i.operation == CommitOperation::Create && i.result.is_ok())
            .map(|i| i.id)
            .collect();
        let orphans: Vec<&TrackedAnnotation> = creations
            .iter()
            .filter(|t| created.contains(&t.id()) && current.get(t.id()).is_none())
            .collect();

        if !orphans.is_empty() {
            let tasks: Vec<_> = orphans
                .iter()
                .map(|t| {
                    log::debug!("annotation {} was deleted while being created, removing it", t.id());
                    let task = self.backend.remove_page_annotation(&doc, t.page_index(), t.object.clone());
                    issue(t, CommitOperation::Remove, task)
                })
                .collect();

            let mut settlements = Vec::with_capacity(tasks.len());
            for (item, revision) in join_all(tasks).await {
                if let Err(e) = &item.result {
                    log::warn!("annotation {} stays in the engine, removal failed: {e}", item.id);
                }
                settlements.push(Settlement {
                    id: item.id,
                    revision,
                    operation: item.operation,
                    succeeded: item.result.is_ok(),
                });
                report.items.push(item);
            }
            self.store.dispatch(AnnotationAction::FinalizeCommit(settlements));
        }

        log::info!(
            "commit finished: {} succeeded, {} failed, {} skipped, {} purged locally",
            report.succeeded(),
            report.items.len() - report.succeeded(),
            report.skipped.len(),
            report.purged_locally.len()
        );
        self.store.bus().publish_commit(report.clone());

        Ok(report)
    }
}

/// Wraps an engine task so that it resolves with its outcome and the revision
/// of the entry at issue time.
fn issue<T: Send + 'static>(
    tracked: &TrackedAnnotation,
    operation: CommitOperation,
    task: EngineTask<T>,
) -> BoxFuture<'static, (CommitItem, u64)> {
    let id = tracked.id();
    let page_index = tracked.page_index();
    let revision = tracked.revision;

    async move {
        let result = task.await.map(|_| ());
        (CommitItem { id, page_index, operation, result }, revision)
    }
    .boxed()
}
