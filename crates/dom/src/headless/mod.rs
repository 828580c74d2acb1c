//! In-memory [`Document`] used for tests and headless embedding.
//!
//! Layout is explicit: callers assign border boxes with
//! [`HeadlessDocument::set_rect`]. Nodes without a box fall back to the
//! `width`/`height` inline styles, which is how the grid probe gets measured.
//! Frames, idle callbacks, proximity notifications and media completion are
//! queued and only delivered as [`PageEvent`]s when the caller drives them.

mod watchers;

use core::mem;
use core::time::Duration;
use std::collections::HashMap;

use anyhow::{Result, anyhow};
use indextree::{Arena, Node, NodeId};
use log::debug;
use smallvec::SmallVec;
use tokio::sync::mpsc::UnboundedSender;

use crate::document::{Document, FrameHandle, IdleHandle, WatcherId, WatcherOptions};
use crate::events::{MediaSignal, PageEvent};
use crate::geometry::{Rect, Size};
use crate::length::{LengthContext, resolve_length};
use crate::{DOMSubscriber, DOMUpdate, NodeKey};
use watchers::WatcherSet;

/// Keys minted by `create_element` start here so they never collide with
/// keys supplied through `DOMUpdate` batches.
const MINTED_KEY_BASE: u64 = 1 << 32;

const HTML_KEY: NodeKey = NodeKey(1);
const HEAD_KEY: NodeKey = NodeKey(2);
const BODY_KEY: NodeKey = NodeKey(3);

/// Mutations recorded in call order, for ordering assertions.
#[derive(Clone, Debug, PartialEq)]
pub enum DomOp {
    AppendChild { parent: NodeKey, child: NodeKey },
    RemoveNode(NodeKey),
    SetAttribute { node: NodeKey, name: String, value: String },
    RemoveAttribute { node: NodeKey, name: String },
    SetStyle { node: NodeKey, property: String, value: String },
    LoadMedia(NodeKey),
    Observe { watcher: WatcherId, node: NodeKey },
    Unobserve { watcher: WatcherId, node: NodeKey },
    Disconnect(WatcherId),
    ReplaceLocation(String),
}

#[derive(Debug, Clone, Default)]
enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text,
}

#[derive(Debug, Clone, Default)]
struct HeadlessNode {
    key: NodeKey,
    kind: NodeKind,
    attrs: SmallVec<(String, String), 4>,
    styles: SmallVec<(String, String), 4>,
    /// Border box in document coordinates.
    layout: Option<Rect>,
    intrinsic: Option<Size>,
    current_src: Option<String>,
}

impl HeadlessNode {
    fn element(key: NodeKey, tag: &str) -> Self {
        Self {
            key,
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
            ..Self::default()
        }
    }

    fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            NodeKind::Document | NodeKind::Text => None,
        }
    }
}

fn lookup<'list>(list: &'list SmallVec<(String, String), 4>, name: &str) -> Option<&'list str> {
    list.iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn upsert(list: &mut SmallVec<(String, String), 4>, name: &str, value: &str) {
    if let Some(entry) = list.iter_mut().find(|(key, _)| key == name) {
        entry.1 = value.to_owned();
    } else {
        list.push((name.to_owned(), value.to_owned()));
    }
}

fn remove_entry(list: &mut SmallVec<(String, String), 4>, name: &str) {
    if let Some(index) = list.iter().position(|(key, _)| key == name) {
        list.remove(index);
    }
}

/// Arena-backed document with a simulated viewport and event queue.
pub struct HeadlessDocument {
    arena: Arena<HeadlessNode>,
    ids: HashMap<NodeKey, NodeId>,
    root: NodeId,
    next_key: u64,
    events: UnboundedSender<PageEvent>,
    viewport: Size,
    scroll_y: f64,
    font_size_px: f64,
    char_width_px: f64,
    custom_properties: HashMap<String, String>,
    next_handle: u64,
    pending_frames: Vec<FrameHandle>,
    pending_idle: Vec<(IdleHandle, Duration)>,
    watchers: WatcherSet,
    location: String,
    ops: Vec<DomOp>,
}

impl HeadlessDocument {
    /// Create a document with `html`, `head` and `body`, a 1024x768 viewport
    /// and a 16px root font. Platform callbacks are sent on `events`.
    pub fn new(events: UnboundedSender<PageEvent>) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(HeadlessNode::default());
        let mut ids = HashMap::new();
        ids.insert(NodeKey::ROOT, root);
        let mut doc = Self {
            arena,
            ids,
            root,
            next_key: MINTED_KEY_BASE,
            events,
            viewport: Size::new(1024.0, 768.0),
            scroll_y: 0.0,
            font_size_px: 16.0,
            char_width_px: 8.0,
            custom_properties: HashMap::new(),
            next_handle: 1,
            pending_frames: Vec::new(),
            pending_idle: Vec::new(),
            watchers: WatcherSet::default(),
            location: "https://example.test/".to_owned(),
            ops: Vec::new(),
        };
        doc.attach_new(NodeKey::ROOT, HeadlessNode::element(HTML_KEY, "html"), None);
        doc.attach_new(HTML_KEY, HeadlessNode::element(HEAD_KEY, "head"), None);
        doc.attach_new(HTML_KEY, HeadlessNode::element(BODY_KEY, "body"), None);
        doc
    }

    fn attach_new(&mut self, parent: NodeKey, node: HeadlessNode, pos: Option<usize>) -> Option<NodeId> {
        let parent_id = *self.ids.get(&parent)?;
        let key = node.key;
        let id = self.arena.new_node(node);
        let sibling = pos.and_then(|index| parent_id.children(&self.arena).nth(index));
        match sibling {
            Some(before) => before.insert_before(id, &mut self.arena),
            None => parent_id.append(id, &mut self.arena),
        }
        self.ids.insert(key, id);
        Some(id)
    }

    fn node(&self, key: NodeKey) -> Option<&HeadlessNode> {
        let id = self.ids.get(&key)?;
        self.arena.get(*id).map(Node::get)
    }

    fn node_mut(&mut self, key: NodeKey) -> Option<&mut HeadlessNode> {
        let id = self.ids.get(&key)?;
        self.arena.get_mut(*id).map(Node::get_mut)
    }

    fn mint_key(&mut self) -> NodeKey {
        loop {
            let key = NodeKey(self.next_key);
            self.next_key = self.next_key.wrapping_add(1);
            if !self.ids.contains_key(&key) {
                return key;
            }
        }
    }

    fn mint_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        handle
    }

    fn emit(&self, event: PageEvent) {
        if self.events.send(event).is_err() {
            debug!("headless document: event receiver dropped");
        }
    }

    fn is_connected(&self, key: NodeKey) -> bool {
        self.ids
            .get(&key)
            .is_some_and(|id| id.ancestors(&self.arena).any(|ancestor| ancestor == self.root))
    }

    fn length_context(&self) -> LengthContext<'_> {
        LengthContext {
            font_size_px: self.font_size_px,
            root_font_size_px: self.font_size_px,
            char_width_px: self.char_width_px,
            viewport_width_px: self.viewport.width,
            viewport_height_px: self.viewport.height,
            custom_properties: &self.custom_properties,
        }
    }

    /// Box in document coordinates, from explicit layout or sizing styles.
    fn document_rect(&self, key: NodeKey) -> Rect {
        if !self.is_connected(key) {
            return Rect::default();
        }
        let Some(node) = self.node(key) else {
            return Rect::default();
        };
        if let Some(rect) = node.layout {
            return rect;
        }
        let context = self.length_context();
        let resolve = |property: &str| {
            lookup(&node.styles, property)
                .and_then(|value| resolve_length(value, &context))
                .unwrap_or(0.0)
        };
        let width = resolve("width");
        let height = resolve("height").max(resolve("min-height"));
        let fixed = lookup(&node.styles, "position") == Some("fixed");
        let top = if fixed { self.scroll_y } else { 0.0 };
        Rect::new(0.0, top, width, height)
    }

    // ---- test and embedding controls ----

    /// Create an element and append it to `parent`.
    pub fn insert_element(&mut self, parent: NodeKey, tag: &str) -> NodeKey {
        let key = self.create_element(tag);
        self.append_child(parent, key);
        key
    }

    /// Assign a border box in document coordinates.
    pub fn set_rect(&mut self, node: NodeKey, rect: Rect) {
        if let Some(entry) = self.node_mut(node) {
            entry.layout = Some(rect);
        }
    }

    /// Intrinsic dimensions reported once the media element has loaded.
    pub fn set_intrinsic_size(&mut self, node: NodeKey, size: Size) {
        if let Some(entry) = self.node_mut(node) {
            entry.intrinsic = Some(size);
        }
    }

    /// Override the resolved source (`currentSrc`).
    pub fn set_current_src(&mut self, node: NodeKey, src: &str) {
        if let Some(entry) = self.node_mut(node) {
            entry.current_src = Some(src.to_owned());
        }
    }

    /// Define a custom property on the root element, e.g. `--line-height`.
    pub fn set_custom_property(&mut self, name: &str, value: &str) {
        self.custom_properties.insert(name.to_owned(), value.to_owned());
    }

    /// Remove a custom property from the root element.
    pub fn clear_custom_property(&mut self, name: &str) {
        self.custom_properties.remove(name);
    }

    /// Root font size used by `rem`, `em` and unitless lengths.
    pub fn set_font_size(&mut self, px: f64) {
        self.font_size_px = px;
    }

    pub fn set_location(&mut self, href: &str) {
        href.clone_into(&mut self.location);
    }

    pub const fn viewport(&self) -> Size {
        self.viewport
    }

    /// Change the viewport and raise `Resize`, then re-evaluate watchers.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport = Size::new(width, height);
        self.emit(PageEvent::Resize);
        self.notify_watchers();
    }

    /// Scroll to `y` and deliver proximity changes.
    pub fn scroll_to(&mut self, y: f64) {
        self.scroll_y = y;
        self.notify_watchers();
    }

    /// Raise the initial ready signal.
    pub fn dom_content_loaded(&self) {
        self.emit(PageEvent::DomContentLoaded);
    }

    /// Deliver every pending animation frame. Returns how many ran.
    pub fn run_animation_frames(&mut self) -> usize {
        let frames = mem::take(&mut self.pending_frames);
        for handle in &frames {
            self.emit(PageEvent::AnimationFrame(*handle));
        }
        frames.len()
    }

    /// Deliver every pending idle callback. Returns how many ran.
    pub fn run_idle_callbacks(&mut self) -> usize {
        let callbacks = mem::take(&mut self.pending_idle);
        for (handle, _) in &callbacks {
            self.emit(PageEvent::Idle {
                handle: *handle,
                timed_out: false,
            });
        }
        callbacks.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.pending_frames.len()
    }

    /// Deadlines of the idle callbacks still waiting, in request order.
    pub fn pending_idle_deadlines(&self) -> Vec<Duration> {
        self.pending_idle.iter().map(|(_, timeout)| *timeout).collect()
    }

    /// Finish loading a media element with its type's ready signal.
    pub fn complete_media(&self, node: NodeKey) {
        let signal = match self.tag_name(node).as_deref() {
            Some("video") => MediaSignal::FirstFrame,
            _ => MediaSignal::Decoded,
        };
        self.emit(PageEvent::Media { node, signal });
    }

    /// Fail loading a media element.
    pub fn fail_media(&self, node: NodeKey, reason: &str) {
        self.emit(PageEvent::Media {
            node,
            signal: MediaSignal::Error(reason.to_owned()),
        });
    }

    /// Report an injected script as loaded.
    pub fn complete_script(&self, node: NodeKey) {
        self.emit(PageEvent::ScriptLoaded(node));
    }

    /// Remove a node on behalf of the page and raise `Detached`.
    pub fn detach(&mut self, node: NodeKey) {
        self.remove_node(node);
        self.emit(PageEvent::Detached(node));
    }

    /// Mutation log since creation or the last [`Self::clear_ops`].
    pub fn ops(&self) -> &[DomOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Whether any live watcher observes `node`.
    pub fn is_observed(&self, node: NodeKey) -> bool {
        self.watchers.is_observed(node)
    }

    /// Number of watchers that were created and not disconnected.
    pub fn live_watchers(&self) -> usize {
        self.watchers.len()
    }

    fn notify_watchers(&mut self) {
        let mut set = mem::take(&mut self.watchers);
        let batches = set.collect_changes(|node, options| {
            watchers::evaluate(
                node,
                self.document_rect(node),
                self.scroll_y,
                self.viewport.height,
                options,
            )
        });
        self.watchers = set;
        for (watcher, entries) in batches {
            self.emit(PageEvent::Intersection { watcher, entries });
        }
    }
}

impl Document for HeadlessDocument {
    fn body(&self) -> NodeKey {
        BODY_KEY
    }

    fn head(&self) -> NodeKey {
        HEAD_KEY
    }

    fn create_element(&mut self, tag: &str) -> NodeKey {
        let key = self.mint_key();
        let id = self.arena.new_node(HeadlessNode::element(key, tag));
        self.ids.insert(key, id);
        key
    }

    fn append_child(&mut self, parent: NodeKey, child: NodeKey) {
        let (Some(parent_id), Some(child_id)) = (self.ids.get(&parent), self.ids.get(&child))
        else {
            debug!("append_child on unknown node {parent:?} <- {child:?}");
            return;
        };
        let (parent_id, child_id) = (*parent_id, *child_id);
        child_id.detach(&mut self.arena);
        parent_id.append(child_id, &mut self.arena);
        self.ops.push(DomOp::AppendChild { parent, child });
    }

    fn remove_node(&mut self, node: NodeKey) {
        let Some(id) = self.ids.get(&node).copied() else {
            return;
        };
        let removed: Vec<NodeKey> = id
            .descendants(&self.arena)
            .filter_map(|desc| self.arena.get(desc).map(|entry| entry.get().key))
            .collect();
        id.remove_subtree(&mut self.arena);
        for key in removed {
            self.ids.remove(&key);
            self.watchers.forget_node(key);
        }
        self.ops.push(DomOp::RemoveNode(node));
    }

    fn tag_name(&self, node: NodeKey) -> Option<String> {
        self.node(node).and_then(HeadlessNode::tag).map(str::to_owned)
    }

    fn descendants(&self, root: NodeKey) -> Vec<NodeKey> {
        let Some(id) = self.ids.get(&root) else {
            return Vec::new();
        };
        id.descendants(&self.arena)
            .skip(1)
            .filter_map(|desc| self.arena.get(desc).map(|entry| entry.get().key))
            .collect()
    }

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String> {
        self.node(node)
            .and_then(|entry| lookup(&entry.attrs, name))
            .map(str::to_owned)
    }

    fn set_attribute(&mut self, node: NodeKey, name: &str, value: &str) {
        let Some(entry) = self.node_mut(node) else {
            return;
        };
        upsert(&mut entry.attrs, name, value);
        if name == "src" && matches!(entry.tag(), Some("img" | "video")) {
            entry.current_src = Some(value.to_owned());
        }
        self.ops.push(DomOp::SetAttribute {
            node,
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    fn remove_attribute(&mut self, node: NodeKey, name: &str) {
        let Some(entry) = self.node_mut(node) else {
            return;
        };
        remove_entry(&mut entry.attrs, name);
        self.ops.push(DomOp::RemoveAttribute {
            node,
            name: name.to_owned(),
        });
    }

    fn set_style(&mut self, node: NodeKey, property: &str, value: &str) {
        let Some(entry) = self.node_mut(node) else {
            return;
        };
        upsert(&mut entry.styles, property, value);
        self.ops.push(DomOp::SetStyle {
            node,
            property: property.to_owned(),
            value: value.to_owned(),
        });
    }

    fn style(&self, node: NodeKey, property: &str) -> Option<String> {
        self.node(node)
            .and_then(|entry| lookup(&entry.styles, property))
            .map(str::to_owned)
    }

    fn bounding_rect(&self, node: NodeKey) -> Rect {
        self.document_rect(node).translated_y(-self.scroll_y)
    }

    fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    fn current_src(&self, node: NodeKey) -> Option<String> {
        self.node(node).and_then(|entry| entry.current_src.clone())
    }

    fn natural_size(&self, node: NodeKey) -> Option<Size> {
        self.node(node)
            .filter(|entry| entry.tag() == Some("img"))
            .and_then(|entry| entry.intrinsic)
    }

    fn video_size(&self, node: NodeKey) -> Option<Size> {
        self.node(node)
            .filter(|entry| entry.tag() == Some("video"))
            .and_then(|entry| entry.intrinsic)
    }

    fn load_media(&mut self, node: NodeKey) {
        self.ops.push(DomOp::LoadMedia(node));
    }

    fn request_animation_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.mint_handle());
        self.pending_frames.push(handle);
        handle
    }

    fn cancel_animation_frame(&mut self, handle: FrameHandle) {
        self.pending_frames.retain(|pending| *pending != handle);
    }

    fn request_idle_callback(&mut self, timeout: Duration) -> IdleHandle {
        let handle = IdleHandle(self.mint_handle());
        self.pending_idle.push((handle, timeout));
        handle
    }

    fn cancel_idle_callback(&mut self, handle: IdleHandle) {
        self.pending_idle.retain(|(pending, _)| *pending != handle);
    }

    fn create_watcher(&mut self, options: WatcherOptions) -> WatcherId {
        let id = WatcherId(self.mint_handle());
        self.watchers.create(id, options);
        id
    }

    fn observe(&mut self, watcher: WatcherId, node: NodeKey) {
        let Some(options) = self.watchers.options(watcher) else {
            return;
        };
        let entry = watchers::evaluate(
            node,
            self.document_rect(node),
            self.scroll_y,
            self.viewport.height,
            options,
        );
        if self.watchers.observe(watcher, node, entry.is_intersecting) {
            self.ops.push(DomOp::Observe { watcher, node });
            self.emit(PageEvent::Intersection {
                watcher,
                entries: vec![entry],
            });
        }
    }

    fn unobserve(&mut self, watcher: WatcherId, node: NodeKey) {
        if self.watchers.unobserve(watcher, node) {
            self.ops.push(DomOp::Unobserve { watcher, node });
        }
    }

    fn disconnect(&mut self, watcher: WatcherId) {
        if self.watchers.disconnect(watcher) {
            self.ops.push(DomOp::Disconnect(watcher));
        }
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn replace_location(&mut self, href: &str) {
        href.clone_into(&mut self.location);
        self.ops.push(DomOp::ReplaceLocation(href.to_owned()));
    }
}

impl DOMSubscriber for HeadlessDocument {
    fn apply_update(&mut self, update: DOMUpdate) -> Result<()> {
        match update {
            DOMUpdate::InsertElement {
                parent,
                node,
                tag,
                pos,
            } => {
                if self.ids.contains_key(&node) {
                    return Err(anyhow!("node {node:?} already exists"));
                }
                self.attach_new(parent, HeadlessNode::element(node, &tag), Some(pos))
                    .ok_or_else(|| anyhow!("unknown parent {parent:?}"))?;
            }
            DOMUpdate::InsertText {
                parent, node, pos, ..
            } => {
                let text_node = HeadlessNode {
                    key: node,
                    kind: NodeKind::Text,
                    ..HeadlessNode::default()
                };
                self.attach_new(parent, text_node, Some(pos))
                    .ok_or_else(|| anyhow!("unknown parent {parent:?}"))?;
            }
            DOMUpdate::SetAttr { node, name, value } => {
                if !self.ids.contains_key(&node) {
                    return Err(anyhow!("unknown node {node:?}"));
                }
                self.set_attribute(node, &name, &value);
            }
            DOMUpdate::RemoveNode { node } => self.remove_node(node),
            DOMUpdate::EndOfDocument => self.dom_content_loaded(),
        }
        Ok(())
    }
}
