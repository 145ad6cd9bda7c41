//! Notifications and worker commands.
//!
//! The annotation plugin publishes four independent streams through an
//! [`AnnotationBus`]:
//!
//! - the full [`AnnotationState`] after every dispatch,
//! - the active variant key whenever it changes,
//! - the [`ActiveTool`] whenever the active variant or its defaults change,
//! - a [`CommitReport`] after every commit that had work to do.
//!
//! Every stream is a `tokio::sync::broadcast` channel: each subscriber gets its
//! own bounded queue, slow subscribers observe `Lagged` instead of blocking the
//! dispatcher, and dropping the receiver unsubscribes.

use crate::engine::commit::CommitReport;
use crate::engine::tools::ToolDefaults;
use crate::engine::tracker::AnnotationState;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// Tool currently in use, or none.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveTool {
    pub variant_key: Option<String>,
    pub defaults: Option<ToolDefaults>,
}

pub type StateSubscription = broadcast::Receiver<Arc<AnnotationState>>;
pub type VariantSubscription = broadcast::Receiver<Option<String>>;
pub type ActiveToolSubscription = broadcast::Receiver<ActiveTool>;
pub type CommitSubscription = broadcast::Receiver<CommitReport>;

#[derive(Debug)]
pub struct AnnotationBus {
    state_tx: broadcast::Sender<Arc<AnnotationState>>,
    variant_tx: broadcast::Sender<Option<String>>,
    tool_tx: broadcast::Sender<ActiveTool>,
    commit_tx: broadcast::Sender<CommitReport>,
}

impl AnnotationBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            state_tx: broadcast::channel(capacity).0,
            variant_tx: broadcast::channel(capacity).0,
            tool_tx: broadcast::channel(capacity).0,
            commit_tx: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_state(&self) -> StateSubscription {
        self.state_tx.subscribe()
    }

    pub fn subscribe_active_variant(&self) -> VariantSubscription {
        self.variant_tx.subscribe()
    }

    pub fn subscribe_active_tool(&self) -> ActiveToolSubscription {
        self.tool_tx.subscribe()
    }

    pub fn subscribe_commits(&self) -> CommitSubscription {
        self.commit_tx.subscribe()
    }

    // broadcast::Sender::send() fails only when there are 0 receivers.
    // That's fine: if nobody listens, we can ignore the error.

    pub fn publish_state(&self, state: Arc<AnnotationState>) {
        let _ = self.state_tx.send(state);
    }

    pub fn publish_active_variant(&self, variant: Option<String>) {
        let _ = self.variant_tx.send(variant);
    }

    pub fn publish_active_tool(&self, tool: ActiveTool) {
        let _ = self.tool_tx.send(tool);
    }

    pub fn publish_commit(&self, report: CommitReport) {
        let _ = self.commit_tx.send(report);
    }
}

/// Commands handled by the annotation worker.
pub enum WorkerCommand {
    /// Commit pending changes, fire and forget
    Flush,
    /// Stop the worker. Replies once the loop has exited.
    Shutdown { reply: oneshot::Sender<()> },
}

impl Debug for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Display for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerCommand::Flush => write!(f, "Flush"),
            WorkerCommand::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}
