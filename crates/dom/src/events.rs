//! Platform callbacks delivered to the page event loop.

use crate::document::{FrameHandle, IdleHandle, IntersectionEntry, WatcherId};
use crate::NodeKey;

/// Completion signal raised by a media element after its source was attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaSignal {
    /// Image fully fetched and decoded (`load`).
    Decoded,
    /// First video frame available (`loadeddata`).
    FirstFrame,
    /// Network or decode failure.
    Error(String),
}

/// One callback from the platform. The page processes these strictly in order.
#[derive(Clone, Debug)]
pub enum PageEvent {
    /// Initial ready signal for the document.
    DomContentLoaded,
    /// Viewport size changed.
    Resize,
    /// A requested animation frame is running.
    AnimationFrame(FrameHandle),
    /// A requested idle callback is running; `timed_out` is set when the deadline forced it.
    Idle { handle: IdleHandle, timed_out: bool },
    /// Proximity watcher notification.
    Intersection {
        watcher: WatcherId,
        entries: Vec<IntersectionEntry>,
    },
    /// Media element completion or failure.
    Media { node: NodeKey, signal: MediaSignal },
    /// An injected script finished loading.
    ScriptLoaded(NodeKey),
    /// Node removed from the document by the page itself.
    Detached(NodeKey),
}
