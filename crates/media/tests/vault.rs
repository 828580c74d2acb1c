use dom::{Document, HeadlessDocument, NodeKey};
use media::{
    DORMANT_SRC, DORMANT_SRCSET, ImageElement, MediaError, MediaRecord, MediaSourceVault,
    VideoElement, media_for,
};
use tokio::sync::mpsc::unbounded_channel;

fn make_document() -> HeadlessDocument {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tx, _rx) = unbounded_channel();
    HeadlessDocument::new(tx)
}

fn image(doc: &mut HeadlessDocument, src: &str) -> NodeKey {
    let body = doc.body();
    let node = doc.insert_element(body, "img");
    doc.set_attribute(node, "src", src);
    node
}

#[test]
fn capture_is_idempotent() {
    let mut doc = make_document();
    let node = image(&mut doc, "photo.jpg");
    doc.set_attribute(node, "srcset", "photo.jpg 1x, photo@2x.jpg 2x");
    let vault = MediaSourceVault::default();
    let element = ImageElement(node);

    let first = vault.capture(&mut doc, &element).unwrap();
    assert_eq!(
        first,
        MediaRecord {
            element: node,
            original_src: "photo.jpg".to_owned(),
            original_srcset: Some("photo.jpg 1x, photo@2x.jpg 2x".to_owned()),
        }
    );
    assert_eq!(doc.attribute(node, DORMANT_SRC).as_deref(), Some("photo.jpg"));
    assert_eq!(
        doc.attribute(node, DORMANT_SRCSET).as_deref(),
        Some("photo.jpg 1x, photo@2x.jpg 2x")
    );

    doc.clear_ops();
    let second = vault.capture(&mut doc, &element).unwrap();
    assert_eq!(second, first);
    assert!(doc.ops().is_empty());
}

#[test]
fn placeholder_height_is_configurable() {
    let mut doc = make_document();
    let node = image(&mut doc, "photo.jpg");
    MediaSourceVault::new(72.0)
        .capture(&mut doc, &ImageElement(node))
        .unwrap();
    assert_eq!(doc.style(node, "min-height").as_deref(), Some("72px"));
    assert_eq!(doc.attribute(node, "srcset"), None);
}

#[test]
fn empty_sources_are_not_captured() {
    let mut doc = make_document();
    let node = image(&mut doc, "");
    let vault = MediaSourceVault::default();
    assert!(matches!(
        vault.capture(&mut doc, &ImageElement(node)),
        Err(MediaError::NoSourceFound { .. })
    ));
    assert_eq!(doc.attribute(node, DORMANT_SRC), None);
    assert_eq!(doc.attribute(node, "src").as_deref(), Some(""));
}

#[test]
fn restore_returns_sources_in_order() {
    let mut doc = make_document();
    let body = doc.body();
    let node = doc.insert_element(body, "video");
    doc.set_attribute(node, "src", "clip.webm");
    let element = VideoElement(node);
    let record = MediaSourceVault::default().capture(&mut doc, &element).unwrap();
    assert_eq!(doc.attribute(node, "src"), None);

    record.restore(&mut doc, &element);
    assert_eq!(doc.attribute(node, "src").as_deref(), Some("clip.webm"));
    assert_eq!(MediaRecord::from_marker(&doc, node), Some(record));
}

#[test]
fn dispatch_by_tag() {
    let mut doc = make_document();
    let body = doc.body();
    let node = image(&mut doc, "a.png");
    let video = doc.insert_element(body, "video");
    let span = doc.insert_element(body, "span");
    assert_eq!(media_for(&doc, node).map(|element| element.node()).ok(), Some(node));
    assert_eq!(media_for(&doc, video).map(|element| element.node()).ok(), Some(video));
    assert_eq!(
        media_for(&doc, span).err(),
        Some(MediaError::UnsupportedElement {
            tag: "span".to_owned()
        })
    );
}
