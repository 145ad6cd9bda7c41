use annotation_engine::{
    AnnotationConfig, AnnotationObject, AnnotationPatch, AnnotationPlugin, AnnotationSubtype, Color, InMemoryBackend,
    InMemoryHistory, InMemoryInteractionManager, InMemorySelection, PdfDocument, PluginServices, Position, Rect,
    SelectionSegment, Size,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    // Commits are triggered by hand in this demo so the individual steps stay visible.
    let config = AnnotationConfig::builder()
        .annotation_author("Demo Reviewer")
        .auto_commit(false)
        .build()?;

    // The in-memory backend plays the document engine. Give it some latency so
    // commits actually run concurrently.
    let backend = InMemoryBackend::new().with_latency(Duration::from_millis(20));
    let interaction = Arc::new(InMemoryInteractionManager::new());
    let selection = Arc::new(InMemorySelection::new());
    let history = Arc::new(InMemoryHistory::new());

    let services = PluginServices::none()
        .with_interaction(interaction.clone())
        .with_selection(selection.clone())
        .with_history(history.clone());

    let plugin = AnnotationPlugin::new(config, Arc::new(backend.clone()), services);
    let (handle, worker) = plugin.start();

    // A document with one existing annotation.
    let doc = PdfDocument::new(3, Size::new(612.0, 792.0));
    let existing = AnnotationObject::new(0, AnnotationSubtype::Square, Rect::new(50.0, 50.0, 80.0, 40.0))
        .with_author("Someone Else");
    backend.seed(&doc, [existing.clone()]);

    let loaded = handle.open_document(doc.clone()).await?;
    println!("loaded {loaded} annotation(s)");

    // Draw an ink stroke and recolour the existing square.
    let stroke = AnnotationObject::new(1, AnnotationSubtype::Ink, Rect::default()).with_ink(vec![vec![
        Position::new(10.0, 10.0),
        Position::new(40.0, 30.0),
        Position::new(70.0, 12.0),
    ]]);
    let ink_id = handle.create_annotation(1, stroke, None);
    handle.update_annotation(
        0,
        existing.id,
        AnnotationPatch {
            color: Some(Some(Color::rgb(0x22, 0x88, 0xEE))),
            ..Default::default()
        },
    )?;
    println!("pending changes: {}", handle.state().has_pending_changes);

    let report = handle.commit().await?;
    println!(
        "commit: {} create(s), {} update(s), {} failure(s)",
        report.count(annotation_engine::CommitOperation::Create),
        report.count(annotation_engine::CommitOperation::Update),
        report.failures().count()
    );

    // Highlight a text selection on page 2.
    handle.set_active_variant(Some("highlight"))?;
    let line = Rect::new(72.0, 100.0, 200.0, 12.0);
    selection.set_selection(
        vec![SelectionSegment {
            page_index: 2,
            rect: line,
            segment_rects: vec![line],
        }],
        vec!["The quick brown fox".to_string()],
    );
    selection.end_selection(Some("highlight"));
    sleep(Duration::from_millis(50)).await;

    for tracked in handle.page_annotations(2) {
        println!(
            "page 2: {} {} ({:?}) by {:?}",
            tracked.object.subtype.as_str(),
            tracked.object.id,
            tracked.commit_state,
            tracked.object.author
        );
    }

    // The highlight is the last recorded edit; undoing it drops the local entry.
    history.undo();
    let report = handle.commit().await?;
    println!(
        "after undo: {} operation(s), page 2 has {} annotation(s), ink on engine: {}",
        report.items.len(),
        handle.page_annotations(2).len(),
        backend.contains(&doc, ink_id)
    );

    handle.shutdown().await?;
    worker.await?;
    Ok(())
}
