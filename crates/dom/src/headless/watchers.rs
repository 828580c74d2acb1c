//! Proximity watcher bookkeeping for the headless document.

use std::collections::HashMap;

use crate::NodeKey;
use crate::document::{IntersectionEntry, WatcherId, WatcherOptions};
use crate::geometry::Rect;

struct Watcher {
    options: WatcherOptions,
    /// Observed targets with the last reported intersection state.
    observed: Vec<(NodeKey, bool)>,
}

#[derive(Default)]
pub(super) struct WatcherSet {
    watchers: HashMap<WatcherId, Watcher>,
}

impl WatcherSet {
    pub(super) fn create(&mut self, id: WatcherId, options: WatcherOptions) {
        self.watchers.insert(
            id,
            Watcher {
                options,
                observed: Vec::new(),
            },
        );
    }

    pub(super) fn options(&self, id: WatcherId) -> Option<WatcherOptions> {
        self.watchers.get(&id).map(|watcher| watcher.options)
    }

    /// Returns false when the watcher is gone or already observes `node`.
    pub(super) fn observe(&mut self, id: WatcherId, node: NodeKey, intersecting: bool) -> bool {
        let Some(watcher) = self.watchers.get_mut(&id) else {
            return false;
        };
        if watcher.observed.iter().any(|(target, _)| *target == node) {
            return false;
        }
        watcher.observed.push((node, intersecting));
        true
    }

    pub(super) fn unobserve(&mut self, id: WatcherId, node: NodeKey) -> bool {
        let Some(watcher) = self.watchers.get_mut(&id) else {
            return false;
        };
        let before = watcher.observed.len();
        watcher.observed.retain(|(target, _)| *target != node);
        watcher.observed.len() != before
    }

    pub(super) fn disconnect(&mut self, id: WatcherId) -> bool {
        self.watchers.remove(&id).is_some()
    }

    pub(super) fn forget_node(&mut self, node: NodeKey) {
        for watcher in self.watchers.values_mut() {
            watcher.observed.retain(|(target, _)| *target != node);
        }
    }

    pub(super) fn is_observed(&self, node: NodeKey) -> bool {
        self.watchers
            .values()
            .any(|watcher| watcher.observed.iter().any(|(target, _)| *target == node))
    }

    pub(super) fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Re-evaluate every target and return entries whose state flipped.
    pub(super) fn collect_changes<F>(&mut self, mut evaluate: F) -> Vec<(WatcherId, Vec<IntersectionEntry>)>
    where
        F: FnMut(NodeKey, WatcherOptions) -> IntersectionEntry,
    {
        let mut batches = Vec::new();
        for (id, watcher) in &mut self.watchers {
            let mut entries = Vec::new();
            for (target, last) in &mut watcher.observed {
                let entry = evaluate(*target, watcher.options);
                if entry.is_intersecting != *last {
                    *last = entry.is_intersecting;
                    entries.push(entry);
                }
            }
            if !entries.is_empty() {
                batches.push((*id, entries));
            }
        }
        batches
    }
}

/// Intersection of `rect` (document coordinates) with the viewport grown
/// vertically by the watcher margin.
pub(super) fn evaluate(
    target: NodeKey,
    rect: Rect,
    scroll_y: f64,
    viewport_height: f64,
    options: WatcherOptions,
) -> IntersectionEntry {
    let top = scroll_y - options.margin_px;
    let bottom = scroll_y + viewport_height + options.margin_px;
    let (is_intersecting, ratio) = if rect.height <= 0.0 {
        let inside = rect.top() >= top && rect.top() <= bottom;
        (inside, if inside { 1.0 } else { 0.0 })
    } else {
        let overlap = (rect.bottom().min(bottom) - rect.top().max(top)).max(0.0);
        let ratio = overlap / rect.height;
        (overlap > 0.0 && ratio >= options.threshold, ratio)
    };
    IntersectionEntry {
        target,
        is_intersecting,
        ratio,
    }
}
