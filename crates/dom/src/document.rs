//! The platform DOM surface consumed by Gridline.
//!
//! Everything a browser provides natively (measurement, attribute and style
//! mutation, element creation, frame and idle scheduling, proximity watching)
//! is reached through [`Document`]. The trait is object safe so subsystems can
//! take `&mut dyn Document` and stay independent of the embedding.

use core::time::Duration;

use crate::geometry::{Rect, Size};
use crate::NodeKey;

/// Handle returned by [`Document::request_animation_frame`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FrameHandle(pub u64);

/// Handle returned by [`Document::request_idle_callback`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdleHandle(pub u64);

/// Identity of a proximity watcher created with [`Document::create_watcher`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct WatcherId(pub u64);

/// Configuration of a proximity watcher.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WatcherOptions {
    /// Vertical margin added above and below the viewport, in CSS pixels.
    pub margin_px: f64,
    /// Fraction of the target area that must intersect to count as proximate.
    pub threshold: f64,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            margin_px: 50.0,
            threshold: 0.01,
        }
    }
}

/// A single notification from a proximity watcher.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeKey,
    pub is_intersecting: bool,
    pub ratio: f64,
}

/// Host DOM operations. Tag names are reported lowercase.
pub trait Document {
    /// The `<body>` element.
    fn body(&self) -> NodeKey;
    /// The `<head>` element.
    fn head(&self) -> NodeKey;
    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> NodeKey;
    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: NodeKey, child: NodeKey);
    /// Remove a node and its subtree.
    fn remove_node(&mut self, node: NodeKey);
    /// Lowercase tag name, `None` for text and unknown nodes.
    fn tag_name(&self, node: NodeKey) -> Option<String>;
    /// All descendants of `root` in document order, `root` excluded.
    fn descendants(&self, root: NodeKey) -> Vec<NodeKey>;

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String>;
    fn set_attribute(&mut self, node: NodeKey, name: &str, value: &str);
    fn remove_attribute(&mut self, node: NodeKey, name: &str);

    /// Set an inline style property.
    fn set_style(&mut self, node: NodeKey, property: &str, value: &str);
    /// Read an inline style property.
    fn style(&self, node: NodeKey, property: &str) -> Option<String>;

    /// Border box relative to the viewport.
    fn bounding_rect(&self, node: NodeKey) -> Rect;
    /// Vertical scroll offset of the viewport.
    fn scroll_y(&self) -> f64;

    /// Source the element is actually using (`currentSrc`).
    fn current_src(&self, node: NodeKey) -> Option<String>;
    /// `naturalWidth`/`naturalHeight` of an image.
    fn natural_size(&self, node: NodeKey) -> Option<Size>;
    /// `videoWidth`/`videoHeight` of a video.
    fn video_size(&self, node: NodeKey) -> Option<Size>;
    /// Ask a media element to (re)load its current source.
    fn load_media(&mut self, node: NodeKey);

    fn request_animation_frame(&mut self) -> FrameHandle;
    fn cancel_animation_frame(&mut self, handle: FrameHandle);
    /// Schedule idle work; the platform forces it after `timeout`.
    fn request_idle_callback(&mut self, timeout: Duration) -> IdleHandle;
    fn cancel_idle_callback(&mut self, handle: IdleHandle);

    fn create_watcher(&mut self, options: WatcherOptions) -> WatcherId;
    fn observe(&mut self, watcher: WatcherId, node: NodeKey);
    fn unobserve(&mut self, watcher: WatcherId, node: NodeKey);
    /// Release every registration held by `watcher`.
    fn disconnect(&mut self, watcher: WatcherId);

    /// Current location as an absolute URL string.
    fn location(&self) -> String;
    /// Replace the current history entry without navigating.
    fn replace_location(&mut self, href: &str);

    fn has_class(&self, node: NodeKey, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|list| list.split_ascii_whitespace().any(|token| token == class))
    }

    fn add_class(&mut self, node: NodeKey, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let joined = match self.attribute(node, "class") {
            Some(list) if !list.trim().is_empty() => format!("{} {class}", list.trim()),
            _ => class.to_owned(),
        };
        self.set_attribute(node, "class", &joined);
    }

    fn remove_class(&mut self, node: NodeKey, class: &str) {
        let Some(list) = self.attribute(node, "class") else {
            return;
        };
        if !list.split_ascii_whitespace().any(|token| token == class) {
            return;
        }
        let kept: Vec<&str> = list
            .split_ascii_whitespace()
            .filter(|token| *token != class)
            .collect();
        if kept.is_empty() {
            self.remove_attribute(node, "class");
        } else {
            self.set_attribute(node, "class", &kept.join(" "));
        }
    }
}

/// Short human-readable identity for diagnostics, e.g. `img#hero.wide`.
pub fn describe(doc: &dyn Document, node: NodeKey) -> String {
    let mut out = doc.tag_name(node).unwrap_or_else(|| "#node".to_owned());
    if let Some(id) = doc.attribute(node, "id").filter(|id| !id.is_empty()) {
        out.push('#');
        out.push_str(&id);
    }
    if let Some(classes) = doc.attribute(node, "class") {
        for class in classes.split_ascii_whitespace() {
            out.push('.');
            out.push_str(class);
        }
    }
    out
}
