use crate::engine::backend::EngineTask;
use crate::engine::services::{SelectionEnded, SelectionSegment, SelectionService};
use crate::engine::DEFAULT_CHANNEL_CAPACITY;
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct Inner {
    enabled_modes: HashSet<String>,
    segments: Vec<SelectionSegment>,
    text: Vec<String>,
}

/// Selection service fed by the caller: set a selection with
/// [`set_selection`](Self::set_selection) and finish it with
/// [`end_selection`](Self::end_selection).
#[derive(Debug)]
pub struct InMemorySelection {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<SelectionEnded>,
}

impl Default for InMemorySelection {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            tx,
        }
    }
}

impl InMemorySelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled_for(&self, mode_id: &str) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).enabled_modes.contains(mode_id)
    }

    pub fn set_selection(&self, segments: Vec<SelectionSegment>, text: Vec<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.segments = segments;
        inner.text = text;
    }

    pub fn end_selection(&self, mode: Option<&str>) {
        let _ = self.tx.send(SelectionEnded {
            mode: mode.map(str::to_string),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).segments.is_empty()
    }
}

impl SelectionService for InMemorySelection {
    fn enable_for_mode(&self, mode_id: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enabled_modes
            .insert(mode_id.to_string());
    }

    fn subscribe_end_selection(&self) -> broadcast::Receiver<SelectionEnded> {
        self.tx.subscribe()
    }

    fn formatted_selection(&self) -> Vec<SelectionSegment> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).segments.clone()
    }

    fn selected_text(&self) -> EngineTask<Vec<String>> {
        let text = self.inner.lock().unwrap_or_else(PoisonError::into_inner).text.clone();
        futures::future::ready(Ok(text)).boxed()
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.segments.clear();
        inner.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Rect;

    #[tokio::test]
    async fn selection_roundtrip_and_clear() {
        let sel = InMemorySelection::new();
        let mut rx = sel.subscribe_end_selection();
        sel.set_selection(
            vec![SelectionSegment {
                page_index: 0,
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                segment_rects: vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
            }],
            vec!["hello".into(), "world".into()],
        );
        sel.end_selection(Some("highlight"));

        assert_eq!(rx.recv().await.unwrap().mode.as_deref(), Some("highlight"));
        assert_eq!(sel.formatted_selection().len(), 1);
        assert_eq!(sel.selected_text().await.unwrap(), vec!["hello", "world"]);

        sel.clear();
        assert!(sel.is_empty());
        assert!(sel.selected_text().await.unwrap().is_empty());
    }
}
