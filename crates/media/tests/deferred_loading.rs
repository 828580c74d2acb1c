use std::sync::Arc;

use dom::{
    Document, DomOp, HeadlessDocument, IntersectionEntry, MediaSignal, NodeKey, PageEvent, Rect,
    Size,
};
use media::{
    DeferredMediaLoader, LoadOutcome, LoaderOptions, MediaError, MediaState, Registration,
};
use rhythm::{Diagnostic, GridCell, RecordingSink};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

const CELL: GridCell = GridCell::new(8.0, 24.0);

struct Harness {
    doc: HeadlessDocument,
    events: UnboundedReceiver<PageEvent>,
    loader: DeferredMediaLoader,
    sink: RecordingSink,
}

impl Harness {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let (tx, events) = unbounded_channel();
        let sink = RecordingSink::new();
        let loader = DeferredMediaLoader::new(LoaderOptions::default(), Arc::new(sink.clone()));
        Self {
            doc: HeadlessDocument::new(tx),
            events,
            loader,
            sink,
        }
    }

    fn media(&mut self, tag: &str, src: Option<&str>, rect: Rect) -> NodeKey {
        let body = self.doc.body();
        let node = self.doc.insert_element(body, tag);
        if let Some(src) = src {
            self.doc.set_attribute(node, "src", src);
        }
        self.doc.set_rect(node, rect);
        node
    }

    fn begin_pass(&mut self, cell: GridCell) {
        self.loader.begin_pass(&mut self.doc, cell);
    }

    fn register(&mut self, node: NodeKey) -> Result<Registration, MediaError> {
        self.loader.register(&mut self.doc, node)
    }

    /// Feed queued platform events to the loader, returning settled outcomes.
    fn pump(&mut self) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                PageEvent::Intersection { watcher, entries } => {
                    self.loader.on_intersection(&mut self.doc, watcher, &entries);
                }
                PageEvent::Media { node, signal } => {
                    outcomes.extend(self.loader.on_signal(&mut self.doc, node, &signal));
                }
                _ => {}
            }
        }
        outcomes
    }

    fn src_writes(&self, node: NodeKey) -> usize {
        self.doc
            .ops()
            .iter()
            .filter(|op| matches!(op, DomOp::SetAttribute { node: target, name, .. } if *target == node && name == "src"))
            .count()
    }
}

#[test]
fn visible_image_loads_and_snaps_to_the_grid() {
    let mut harness = Harness::new();
    let image = harness.media("img", Some("hero.jpg"), Rect::new(0.0, 96.0, 400.0, 50.0));
    harness.doc.set_intrinsic_size(image, Size::new(800.0, 400.0));
    harness.begin_pass(CELL);

    assert_eq!(harness.register(image), Ok(Registration::Observed));
    assert_eq!(harness.doc.attribute(image, "src"), None);
    assert_eq!(harness.doc.attribute(image, "data-src").as_deref(), Some("hero.jpg"));
    assert!(harness.pump().is_empty());
    assert_eq!(harness.loader.state(image), Some(MediaState::Proximate));
    assert_eq!(harness.doc.attribute(image, "src").as_deref(), Some("hero.jpg"));
    assert!(!harness.doc.is_observed(image));

    harness.doc.complete_media(image);
    assert_eq!(harness.pump(), vec![LoadOutcome::Loaded(image)]);
    assert_eq!(harness.loader.state(image), Some(MediaState::Loaded));
    assert_eq!(harness.doc.style(image, "height").as_deref(), Some("192px"));
    assert!(harness.sink.is_empty());
}

#[test]
fn proximity_triggers_restore_exactly_once() {
    let mut harness = Harness::new();
    let image = harness.media("img", Some("far.jpg"), Rect::new(0.0, 2400.0, 400.0, 200.0));
    harness.begin_pass(CELL);
    harness.register(image).unwrap();
    harness.doc.clear_ops();
    harness.pump();
    assert_eq!(harness.loader.state(image), Some(MediaState::Dormant));
    assert_eq!(harness.src_writes(image), 0);

    harness.doc.scroll_to(1700.0);
    harness.pump();
    assert_eq!(harness.loader.state(image), Some(MediaState::Proximate));

    harness.doc.scroll_to(0.0);
    harness.pump();
    harness.doc.scroll_to(1700.0);
    harness.pump();

    // A late duplicate entry for the same target is ignored as well.
    let watcher = harness.loader.watcher().unwrap();
    let entry = IntersectionEntry {
        target: image,
        is_intersecting: true,
        ratio: 1.0,
    };
    assert_eq!(harness.loader.on_intersection(&mut harness.doc, watcher, &[entry]), 0);
    assert_eq!(harness.src_writes(image), 1);
}

#[test]
fn srcset_is_restored_before_src() {
    let mut harness = Harness::new();
    let image = harness.media("img", Some("small.jpg"), Rect::new(0.0, 0.0, 400.0, 200.0));
    harness.doc.set_attribute(image, "srcset", "small.jpg 1x, large.jpg 2x");
    harness.begin_pass(CELL);
    harness.register(image).unwrap();
    assert_eq!(harness.doc.attribute(image, "srcset"), None);
    assert_eq!(harness.doc.attribute(image, "loading").as_deref(), Some("lazy"));
    assert_eq!(harness.doc.style(image, "min-height").as_deref(), Some("50px"));

    harness.doc.clear_ops();
    harness.pump();
    let order: Vec<&str> = harness
        .doc
        .ops()
        .iter()
        .filter_map(|op| match op {
            DomOp::SetAttribute { node, name, .. } if *node == image => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec!["srcset", "src"]);
    assert_eq!(
        harness.doc.attribute(image, "srcset").as_deref(),
        Some("small.jpg 1x, large.jpg 2x")
    );
}

#[test]
fn failed_load_reapplies_source_and_uses_fallback_ratio() {
    let mut harness = Harness::new();
    let failing = harness.media("img", Some("square.png"), Rect::new(0.0, 0.0, 410.0, 50.0));
    let loading = harness.media("img", Some("square.png"), Rect::new(0.0, 480.0, 410.0, 50.0));
    for node in [failing, loading] {
        harness.doc.set_intrinsic_size(node, Size::new(410.0, 410.0));
    }
    harness.begin_pass(CELL);
    harness.register(failing).unwrap();
    harness.register(loading).unwrap();
    harness.pump();

    harness.doc.fail_media(failing, "404");
    harness.doc.complete_media(loading);
    let outcomes = harness.pump();
    assert_eq!(
        outcomes,
        vec![
            LoadOutcome::Failed(MediaError::LoadFailure {
                src: "square.png".to_owned(),
                reason: "404".to_owned(),
            }),
            LoadOutcome::Loaded(loading),
        ]
    );
    assert_eq!(harness.doc.attribute(failing, "src").as_deref(), Some("square.png"));
    assert_eq!(harness.doc.style(failing, "height").as_deref(), Some("216px"));
    assert_eq!(harness.doc.style(loading, "height").as_deref(), Some("408px"));

    // The direct reload fails too: reported, not retried.
    let writes = harness.src_writes(failing);
    harness.doc.fail_media(failing, "404");
    assert!(harness.pump().is_empty());
    assert_eq!(harness.src_writes(failing), writes);
    assert_eq!(harness.loader.state(failing), Some(MediaState::Failed));

    let kinds: Vec<bool> = harness
        .sink
        .snapshot()
        .iter()
        .map(|diagnostic| matches!(diagnostic, Diagnostic::LoadFailed { .. }))
        .collect();
    assert_eq!(kinds, vec![true, false]);
    assert!(matches!(
        harness.sink.snapshot()[1],
        Diagnostic::RetryFailed { ref source, .. } if source == "square.png"
    ));

    // Further errors on the settled element stay quiet.
    harness.doc.fail_media(failing, "404");
    harness.doc.fail_media(failing, "timeout");
    assert!(harness.pump().is_empty());
    assert_eq!(harness.sink.len(), 2);
    assert_eq!(harness.src_writes(failing), writes);
}

#[test]
fn video_reloads_and_waits_for_first_frame() {
    let mut harness = Harness::new();
    let video = harness.media("video", Some("clip.mp4"), Rect::new(0.0, 0.0, 640.0, 50.0));
    harness.doc.set_intrinsic_size(video, Size::new(1920.0, 1080.0));
    harness.begin_pass(CELL);
    harness.register(video).unwrap();
    harness.doc.clear_ops();
    harness.pump();

    let tail: Vec<DomOp> = harness.doc.ops().iter().skip(1).cloned().collect();
    assert_eq!(
        tail,
        vec![
            DomOp::SetAttribute {
                node: video,
                name: "src".to_owned(),
                value: "clip.mp4".to_owned(),
            },
            DomOp::LoadMedia(video),
        ]
    );

    // A decode signal is not the video's ready signal.
    assert!(harness.loader.on_signal(&mut harness.doc, video, &MediaSignal::Decoded).is_none());
    harness.doc.complete_media(video);
    assert_eq!(harness.pump(), vec![LoadOutcome::Loaded(video)]);
    // 640 / (16 / 9) = 360 = 15 rows.
    assert_eq!(harness.doc.style(video, "height").as_deref(), Some("360px"));
}

#[test]
fn media_without_source_loads_eagerly_with_fallback() {
    let mut harness = Harness::new();
    let image = harness.media("img", None, Rect::new(0.0, 0.0, 400.0, 50.0));
    let video = harness.media("video", None, Rect::new(0.0, 0.0, 400.0, 50.0));
    // Videos only honour the declared attribute.
    harness.doc.set_current_src(video, "resolved.mp4");
    harness.begin_pass(CELL);

    assert_eq!(harness.register(image), Ok(Registration::Eager { height: 192.0 }));
    assert_eq!(harness.register(video), Ok(Registration::Eager { height: 192.0 }));
    assert_eq!(harness.loader.state(image), None);
    assert!(!harness.doc.is_observed(image));
    assert_eq!(harness.doc.style(image, "height").as_deref(), Some("192px"));
    let nodes: Vec<NodeKey> = harness.sink.snapshot().iter().map(Diagnostic::node).collect();
    assert_eq!(nodes, vec![image, video]);
}

#[test]
fn resolved_current_source_is_captured_for_images() {
    let mut harness = Harness::new();
    let image = harness.media("img", None, Rect::new(0.0, 3000.0, 400.0, 50.0));
    harness.doc.set_current_src(image, "picked-by-picture.webp");
    harness.begin_pass(CELL);
    assert_eq!(harness.register(image), Ok(Registration::Observed));
    assert_eq!(
        harness.loader.record(image).map(|record| record.original_src.as_str()),
        Some("picked-by-picture.webp")
    );
}

#[test]
fn new_pass_swaps_watcher_and_keeps_progress() {
    let mut harness = Harness::new();
    let near = harness.media("img", Some("near.jpg"), Rect::new(0.0, 0.0, 400.0, 50.0));
    let far = harness.media("img", Some("far.jpg"), Rect::new(0.0, 5000.0, 400.0, 50.0));
    let done = harness.media("img", Some("done.jpg"), Rect::new(0.0, 200.0, 400.0, 50.0));
    harness.doc.set_intrinsic_size(done, Size::new(800.0, 400.0));
    harness.begin_pass(CELL);
    for node in [near, far, done] {
        harness.register(node).unwrap();
    }
    harness.pump();
    harness.doc.complete_media(done);
    harness.pump();
    let first_watcher = harness.loader.watcher().unwrap();

    harness.begin_pass(GridCell::new(8.0, 20.0));
    assert_eq!(harness.doc.live_watchers(), 1);
    assert_ne!(harness.loader.watcher(), Some(first_watcher));
    assert!(!harness.doc.is_observed(far));

    assert_eq!(harness.register(near), Ok(Registration::InFlight));
    assert_eq!(harness.register(far), Ok(Registration::Observed));
    assert_eq!(harness.register(done), Ok(Registration::Resized { height: 200.0 }));
    assert!(harness.doc.is_observed(far));

    let stale = IntersectionEntry {
        target: far,
        is_intersecting: true,
        ratio: 1.0,
    };
    assert_eq!(harness.loader.on_intersection(&mut harness.doc, first_watcher, &[stale]), 0);

    harness.doc.complete_media(near);
    assert_eq!(harness.pump(), vec![LoadOutcome::Loaded(near)]);
    assert_eq!(harness.loader.census(), [1, 0, 2, 0]);
}

#[test]
fn unsupported_and_forgotten_elements() {
    let mut harness = Harness::new();
    let body = harness.doc.body();
    let div = harness.doc.insert_element(body, "div");
    harness.begin_pass(CELL);
    assert_eq!(
        harness.register(div),
        Err(MediaError::UnsupportedElement {
            tag: "div".to_owned()
        })
    );

    let image = harness.media("img", Some("gone.jpg"), Rect::new(0.0, 5000.0, 400.0, 50.0));
    harness.register(image).unwrap();
    assert!(harness.doc.is_observed(image));
    assert!(harness.loader.forget(&mut harness.doc, image));
    assert!(!harness.doc.is_observed(image));
    assert_eq!(harness.loader.state(image), None);
    assert!(!harness.loader.forget(&mut harness.doc, image));
}
