//! Tests for the headless platform: tree mirroring, measurement, scheduling
//! and proximity notifications.

use dom::{
    DOMSubscriber, DOMUpdate, Document, DomOp, HeadlessDocument, NodeKey, PageEvent, Rect,
    WatcherOptions, describe,
};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

fn make_document() -> (HeadlessDocument, UnboundedReceiver<PageEvent>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tx, rx) = unbounded_channel();
    (HeadlessDocument::new(tx), rx)
}

fn drain(rx: &mut UnboundedReceiver<PageEvent>) -> Vec<PageEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn dom_updates_build_tree_in_order() {
    let (mut doc, mut rx) = make_document();
    let body = doc.body();
    let first = NodeKey(100);
    let second = NodeKey(101);
    let inserted = NodeKey(102);
    doc.apply_batch(vec![
        DOMUpdate::InsertElement { parent: body, node: first, tag: "P".into(), pos: 0 },
        DOMUpdate::InsertElement { parent: body, node: second, tag: "img".into(), pos: 1 },
        DOMUpdate::InsertElement { parent: body, node: inserted, tag: "div".into(), pos: 1 },
        DOMUpdate::SetAttr { node: second, name: "src".into(), value: "/a.png".into() },
        DOMUpdate::EndOfDocument,
    ])
    .unwrap();

    assert_eq!(doc.descendants(body), vec![first, inserted, second]);
    assert_eq!(doc.tag_name(first).as_deref(), Some("p"));
    assert_eq!(doc.attribute(second, "src").as_deref(), Some("/a.png"));
    assert_eq!(doc.current_src(second).as_deref(), Some("/a.png"));
    assert!(matches!(drain(&mut rx).as_slice(), [PageEvent::DomContentLoaded]));
}

#[test]
fn dom_update_with_unknown_parent_fails() {
    let (mut doc, _rx) = make_document();
    let result = doc.apply_update(DOMUpdate::InsertElement {
        parent: NodeKey(9999),
        node: NodeKey(10),
        tag: "div".into(),
        pos: 0,
    });
    assert!(result.is_err());
}

#[test]
fn class_helpers_edit_the_class_attribute() {
    let (mut doc, _rx) = make_document();
    let body = doc.body();
    let node = doc.insert_element(body, "section");
    doc.set_attribute(node, "id", "intro");
    doc.add_class(node, "wide");
    doc.add_class(node, "off-grid");
    doc.add_class(node, "off-grid");
    assert_eq!(doc.attribute(node, "class").as_deref(), Some("wide off-grid"));
    assert_eq!(describe(&doc, node), "section#intro.wide.off-grid");

    doc.remove_class(node, "wide");
    assert!(doc.has_class(node, "off-grid"));
    doc.remove_class(node, "off-grid");
    assert_eq!(doc.attribute(node, "class"), None);
}

#[test]
fn style_sized_probe_is_measured_and_removed() {
    let (mut doc, _rx) = make_document();
    doc.set_custom_property("--line-height", "1.5rem");
    let body = doc.body();
    let probe = doc.insert_element(body, "div");
    doc.set_style(probe, "position", "fixed");
    doc.set_style(probe, "width", "1ch");
    doc.set_style(probe, "height", "var(--line-height)");

    let rect = doc.bounding_rect(probe);
    assert_eq!(rect.height, 24.0);
    assert_eq!(rect.width, 8.0);

    doc.remove_node(probe);
    assert!(doc.descendants(body).is_empty());
    assert_eq!(doc.bounding_rect(probe), Rect::default());
}

#[test]
fn explicit_rects_are_viewport_relative() {
    let (mut doc, _rx) = make_document();
    let body = doc.body();
    let node = doc.insert_element(body, "div");
    doc.set_rect(node, Rect::new(0.0, 300.0, 100.0, 48.0));
    doc.scroll_to(120.0);
    assert_eq!(doc.bounding_rect(node).top() + doc.scroll_y(), 300.0);
}

#[test]
fn cancelled_frames_never_run() {
    let (mut doc, mut rx) = make_document();
    let first = doc.request_animation_frame();
    let second = doc.request_animation_frame();
    doc.cancel_animation_frame(first);
    assert_eq!(doc.run_animation_frames(), 1);
    match drain(&mut rx).as_slice() {
        [PageEvent::AnimationFrame(handle)] => assert_eq!(*handle, second),
        other => panic!("unexpected events: {other:?}"),
    }
}

#[test]
fn watcher_reports_initial_state_then_changes() {
    let (mut doc, mut rx) = make_document();
    let body = doc.body();
    let near = doc.insert_element(body, "img");
    let far = doc.insert_element(body, "img");
    doc.set_rect(near, Rect::new(0.0, 100.0, 400.0, 200.0));
    doc.set_rect(far, Rect::new(0.0, 2000.0, 400.0, 200.0));

    let watcher = doc.create_watcher(WatcherOptions::default());
    doc.observe(watcher, near);
    doc.observe(watcher, far);
    let initial = drain(&mut rx);
    assert_eq!(initial.len(), 2);
    let states: Vec<bool> = initial
        .iter()
        .flat_map(|event| match event {
            PageEvent::Intersection { entries, .. } => entries.clone(),
            other => panic!("unexpected event {other:?}"),
        })
        .map(|entry| entry.is_intersecting)
        .collect();
    assert_eq!(states, vec![true, false]);

    // 2000 - 768 - 50 margin: the far image is proximate before it is visible.
    doc.scroll_to(1190.0);
    match drain(&mut rx).as_slice() {
        [PageEvent::Intersection { entries, .. }] => {
            assert_eq!(entries.len(), 2);
            assert!(entries.iter().any(|entry| entry.target == far && entry.is_intersecting));
            assert!(entries.iter().any(|entry| entry.target == near && !entry.is_intersecting));
        }
        other => panic!("unexpected events: {other:?}"),
    }

    doc.unobserve(watcher, far);
    doc.disconnect(watcher);
    assert!(!doc.is_observed(near));
    assert_eq!(doc.live_watchers(), 0);
    assert!(doc.ops().contains(&DomOp::Disconnect(watcher)));
}
