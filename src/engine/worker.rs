use crate::engine::commands::ANNOTATION_HISTORY_TOPIC;
use crate::engine::events::WorkerCommand;
use crate::engine::plugin::PluginCore;
use crate::engine::services::{HistoryChange, InteractionModeService, ModeChange, SelectionEnded};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Background loop of the annotation plugin.
///
/// Reacts to flush requests, interaction mode changes, finished text
/// selections and history changes. Events of services that were not provided
/// simply never fire.
pub struct AnnotationWorker {
    core: Arc<PluginCore>,
    cmd_rx: mpsc::Receiver<WorkerCommand>,
    mode_rx: Option<broadcast::Receiver<ModeChange>>,
    selection_rx: Option<broadcast::Receiver<SelectionEnded>>,
    history_rx: Option<broadcast::Receiver<HistoryChange>>,
    cancel: CancellationToken,
}

impl AnnotationWorker {
    pub(crate) fn new(core: Arc<PluginCore>, cmd_rx: mpsc::Receiver<WorkerCommand>, cancel: CancellationToken) -> Self {
        // Subscribe right away so nothing emitted before the worker runs is lost.
        let mode_rx = core.services.interaction.as_ref().map(|s| s.subscribe());
        let selection_rx = core.services.selection.as_ref().map(|s| s.subscribe_end_selection());
        let history_rx = core.services.history.as_ref().map(|s| s.subscribe());

        Self {
            core,
            cmd_rx,
            mode_rx,
            selection_rx,
            history_rx,
            cancel,
        }
    }

    pub async fn run(mut self) {
        log::debug!("annotation worker started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(WorkerCommand::Flush) => self.flush().await,
                    Some(WorkerCommand::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    None => break,
                },
                Some(change) = recv_from(&mut self.mode_rx) => {
                    // Events may be stale by now: follow the manager's current mode.
                    let mode = match &self.core.services.interaction {
                        Some(im) => im.active_mode(),
                        None => change.active_mode,
                    };
                    self.core.sync_active_mode(&mode);
                }
                Some(_) = recv_from(&mut self.selection_rx) => {
                    self.core.handle_selection_end().await;
                }
                Some(change) = recv_from(&mut self.history_rx) => {
                    if change.topic.as_deref() == Some(ANNOTATION_HISTORY_TOPIC) && self.core.config.auto_commit {
                        self.flush().await;
                    }
                }
            }
        }

        log::debug!("annotation worker stopped");
    }

    async fn flush(&self) {
        match self.core.commit().await {
            Ok(report) if report.is_empty() => log::trace!("flush: nothing to commit"),
            Ok(report) => log::debug!("flush committed {} operation(s)", report.items.len()),
            Err(e) => log::warn!("autocommit failed: {e}"),
        }
    }
}

/// Next event of an optional subscription. Absent or closed subscriptions
/// never resolve; lagging only loses the skipped events.
async fn recv_from<T: Clone>(rx: &mut Option<broadcast::Receiver<T>>) -> Option<T> {
    loop {
        let Some(inner) = rx.as_mut() else {
            return futures::future::pending().await;
        };
        match inner.recv().await {
            Ok(value) => return Some(value),
            Err(RecvError::Lagged(skipped)) => log::warn!("annotation worker lagged, {skipped} event(s) skipped"),
            Err(RecvError::Closed) => *rx = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn recv_from_absent_subscription_never_resolves() {
        let mut rx: Option<broadcast::Receiver<u8>> = None;
        let res = tokio::time::timeout(Duration::from_millis(10), recv_from(&mut rx)).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn recv_from_skips_lag_and_drops_closed() {
        let (tx, rx) = broadcast::channel(1);
        let mut rx = Some(rx);
        tx.send(1u8).unwrap();
        tx.send(2u8).unwrap();
        assert_eq!(recv_from(&mut rx).await, Some(2));

        drop(tx);
        let res = tokio::time::timeout(Duration::from_millis(10), recv_from(&mut rx)).await;
        assert!(res.is_err());
        assert!(rx.is_none());
    }
}
