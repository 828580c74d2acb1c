//! Deferred media state machine.
//!
//! ```text
//! Dormant --first intersecting entry--> Proximate --ready--> Loaded
//!                                           |
//!                                           +--error--> Failed (one direct retry)
//! ```
//!
//! The loader lives as long as the page. Each initialization pass calls
//! [`DeferredMediaLoader::begin_pass`], which swaps in a fresh proximity
//! watcher; registrations and in-flight loads carry over.

use std::collections::HashMap;
use std::sync::Arc;

use dom::{Document, IntersectionEntry, MediaSignal, NodeKey, WatcherId, WatcherOptions, describe};
use log::{debug, trace, warn};
use rhythm::{Diagnostic, DiagnosticSink, GridCell, sizer};
use serde::Serialize;

use crate::element::{MediaElement, media_for};
use crate::error::MediaError;
use crate::vault::{DEFAULT_PLACEHOLDER_PX, MediaRecord, MediaSourceVault};

/// Lifecycle of one deferred element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MediaState {
    /// Sources captured, waiting for proximity.
    Dormant,
    /// Sources restored, waiting for the ready signal.
    Proximate,
    Loaded,
    /// Load failed; the original source was reattached directly.
    Failed,
}

/// Terminal result of a load attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(NodeKey),
    Failed(MediaError),
}

/// What [`DeferredMediaLoader::register`] did with an element.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Registration {
    /// Dormant and observed by the current watcher.
    Observed,
    /// Already loading; left alone.
    InFlight,
    /// Already settled; re-sized against the current cell.
    Resized { height: f64 },
    /// No source to defer; sized immediately with the fallback ratio.
    Eager { height: f64 },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoaderOptions {
    pub watcher: WatcherOptions,
    pub placeholder_px: f64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            watcher: WatcherOptions::default(),
            placeholder_px: DEFAULT_PLACEHOLDER_PX,
        }
    }
}

struct Tracked {
    element: Box<dyn MediaElement>,
    record: MediaRecord,
    state: MediaState,
    /// The direct reload after a failure has failed as well.
    retry_failed: bool,
}

pub struct DeferredMediaLoader {
    vault: MediaSourceVault,
    watcher_options: WatcherOptions,
    watcher: Option<WatcherId>,
    cell: GridCell,
    tracked: HashMap<NodeKey, Tracked>,
    sink: Arc<dyn DiagnosticSink>,
}

fn size_with(doc: &mut dyn Document, element: &dyn MediaElement, cell: GridCell, intrinsic: bool) -> f64 {
    let size = if intrinsic {
        element.intrinsic_size(doc)
    } else {
        None
    };
    sizer::apply(doc, element.node(), size, cell)
}

impl DeferredMediaLoader {
    pub fn new(options: LoaderOptions, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            vault: MediaSourceVault::new(options.placeholder_px),
            watcher_options: options.watcher,
            watcher: None,
            cell: GridCell::default(),
            tracked: HashMap::new(),
            sink,
        }
    }

    /// Start an initialization pass: retire the previous watcher, create a
    /// new one and size everything from now on against `cell`.
    pub fn begin_pass(&mut self, doc: &mut dyn Document, cell: GridCell) {
        if let Some(previous) = self.watcher.take() {
            doc.disconnect(previous);
        }
        let watcher = doc.create_watcher(self.watcher_options);
        debug!("media pass with {watcher:?}, row {}px", cell.height);
        self.watcher = Some(watcher);
        self.cell = cell;
    }

    /// Bring `node` under management for the current pass.
    ///
    /// # Errors
    /// [`MediaError::UnsupportedElement`] if `node` is not an image or video.
    pub fn register(&mut self, doc: &mut dyn Document, node: NodeKey) -> Result<Registration, MediaError> {
        let cell = self.cell;
        if let Some(tracked) = self.tracked.get(&node) {
            return Ok(match tracked.state {
                MediaState::Dormant => {
                    if let Some(watcher) = self.watcher {
                        doc.observe(watcher, node);
                    }
                    Registration::Observed
                }
                MediaState::Proximate => Registration::InFlight,
                MediaState::Loaded => Registration::Resized {
                    height: size_with(doc, tracked.element.as_ref(), cell, true),
                },
                MediaState::Failed => Registration::Resized {
                    height: size_with(doc, tracked.element.as_ref(), cell, false),
                },
            });
        }

        let element = media_for(doc, node)?;
        match self.vault.capture(doc, element.as_ref()) {
            Ok(record) => {
                if let Some(watcher) = self.watcher {
                    doc.observe(watcher, node);
                }
                self.tracked.insert(
                    node,
                    Tracked {
                        element,
                        record,
                        state: MediaState::Dormant,
                        retry_failed: false,
                    },
                );
                Ok(Registration::Observed)
            }
            Err(err) => {
                debug!("loading eagerly: {err}");
                self.sink.emit(&Diagnostic::NoSourceFound {
                    node,
                    element: describe(doc, node),
                });
                Ok(Registration::Eager {
                    height: size_with(doc, element.as_ref(), cell, true),
                })
            }
        }
    }

    /// Handle proximity entries. Entries from a retired watcher and elements
    /// past `Dormant` are ignored. Returns how many loads were triggered.
    pub fn on_intersection(
        &mut self,
        doc: &mut dyn Document,
        watcher: WatcherId,
        entries: &[IntersectionEntry],
    ) -> usize {
        if self.watcher != Some(watcher) {
            trace!("ignoring entries from retired {watcher:?}");
            return 0;
        }
        let mut triggered = 0;
        for entry in entries.iter().filter(|entry| entry.is_intersecting) {
            let Some(tracked) = self.tracked.get_mut(&entry.target) else {
                continue;
            };
            if tracked.state != MediaState::Dormant {
                continue;
            }
            doc.unobserve(watcher, entry.target);
            tracked.state = MediaState::Proximate;
            tracked.record.restore(doc, tracked.element.as_ref());
            trace!("restored {}", describe(doc, entry.target));
            triggered += 1;
        }
        triggered
    }

    /// Handle a media signal for `node`. Returns the outcome when the signal
    /// settles a pending load.
    pub fn on_signal(&mut self, doc: &mut dyn Document, node: NodeKey, signal: &MediaSignal) -> Option<LoadOutcome> {
        let cell = self.cell;
        let tracked = self.tracked.get_mut(&node)?;
        match (tracked.state, signal) {
            (MediaState::Proximate, MediaSignal::Error(reason)) => {
                let src = tracked.record.original_src.clone();
                self.sink.emit(&Diagnostic::LoadFailed {
                    node,
                    element: describe(doc, node),
                    source: src.clone(),
                    error: reason.clone(),
                });
                tracked.element.attach_source(doc, &src, None);
                size_with(doc, tracked.element.as_ref(), cell, false);
                tracked.state = MediaState::Failed;
                Some(LoadOutcome::Failed(MediaError::LoadFailure {
                    src,
                    reason: reason.clone(),
                }))
            }
            (MediaState::Proximate, ready) if tracked.element.is_ready(ready) => {
                size_with(doc, tracked.element.as_ref(), cell, true);
                tracked.state = MediaState::Loaded;
                Some(LoadOutcome::Loaded(node))
            }
            (MediaState::Failed, MediaSignal::Error(reason)) if !tracked.retry_failed => {
                tracked.retry_failed = true;
                warn!("giving up on {}", describe(doc, node));
                self.sink.emit(&Diagnostic::RetryFailed {
                    node,
                    element: describe(doc, node),
                    source: tracked.record.original_src.clone(),
                    error: reason.clone(),
                });
                None
            }
            (state, other) => {
                trace!("ignoring {other:?} for {node:?} in {state:?}");
                None
            }
        }
    }

    /// Drop a torn-down element.
    pub fn forget(&mut self, doc: &mut dyn Document, node: NodeKey) -> bool {
        let Some(tracked) = self.tracked.remove(&node) else {
            return false;
        };
        if tracked.state == MediaState::Dormant
            && let Some(watcher) = self.watcher
        {
            doc.unobserve(watcher, node);
        }
        true
    }

    pub fn state(&self, node: NodeKey) -> Option<MediaState> {
        self.tracked.get(&node).map(|tracked| tracked.state)
    }

    pub fn record(&self, node: NodeKey) -> Option<&MediaRecord> {
        self.tracked.get(&node).map(|tracked| &tracked.record)
    }

    /// Watcher owned by the current pass.
    pub const fn watcher(&self) -> Option<WatcherId> {
        self.watcher
    }

    pub const fn cell(&self) -> GridCell {
        self.cell
    }

    /// Number of elements per state, in `Dormant, Proximate, Loaded, Failed` order.
    pub fn census(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for tracked in self.tracked.values() {
            let slot = match tracked.state {
                MediaState::Dormant => 0,
                MediaState::Proximate => 1,
                MediaState::Loaded => 2,
                MediaState::Failed => 3,
            };
            counts[slot] += 1;
        }
        counts
    }
}
