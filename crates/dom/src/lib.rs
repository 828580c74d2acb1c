//! Platform DOM surface shared by the Gridline subsystems.
//!
//! The grid metric, the media loader and the alignment auditor never touch a
//! browser directly. They talk to a [`Document`], receive platform callbacks
//! as [`PageEvent`] values, and identify nodes with stable [`NodeKey`]s.
//! [`HeadlessDocument`] is an in-memory implementation used for tests and
//! headless embedding.

use anyhow::Result;
use serde::Serialize;

pub mod document;
pub use document::{
    Document, FrameHandle, IdleHandle, IntersectionEntry, WatcherId, WatcherOptions, describe,
};

pub mod events;
pub use events::{MediaSignal, PageEvent};

pub mod geometry;
pub use geometry::{Rect, Size};

/// CSS length resolution for probe and placeholder styles.
pub mod length;
pub use length::{LengthContext, resolve_length};

pub mod headless;
pub use headless::{DomOp, HeadlessDocument};

/// A 64-bit stable key for DOM nodes used to correlate asynchronous callbacks.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, PartialOrd, Ord, Serialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The document node key (always present).
    pub const ROOT: Self = Self(0);
}

/// A batchable update applied to a document mirror.
#[derive(Debug, Clone)]
pub enum DOMUpdate {
    InsertElement {
        parent: NodeKey,
        node: NodeKey,
        tag: String,
        pos: usize,
    },
    InsertText {
        parent: NodeKey,
        node: NodeKey,
        text: String,
        pos: usize,
    },
    SetAttr {
        node: NodeKey,
        name: String,
        value: String,
    },
    RemoveNode {
        node: NodeKey,
    },
    EndOfDocument,
}

/// A subscriber that receives `DOMUpdate` values and mirrors them into its own state.
pub trait DOMSubscriber {
    /// Apply a single `DOMUpdate` to the subscriber state.
    ///
    /// # Errors
    /// Returns an error when the update references an unknown node.
    fn apply_update(&mut self, update: DOMUpdate) -> Result<()>;

    /// Apply a batch of updates in order, stopping at the first failure.
    ///
    /// # Errors
    /// Propagates the first error returned by [`DOMSubscriber::apply_update`].
    fn apply_batch(&mut self, batch: Vec<DOMUpdate>) -> Result<()> {
        for update in batch {
            self.apply_update(update)?;
        }
        Ok(())
    }
}
