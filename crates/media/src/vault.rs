//! Moves media sources out of the way until they are needed.
//!
//! A captured element carries its sources in `data-src`/`data-srcset` and has
//! no live `src`, so the platform does not fetch it. That dormant marker is
//! also what makes [`MediaSourceVault::capture`] idempotent across passes.

use dom::{Document, NodeKey, describe};
use log::trace;
use serde::Serialize;

use crate::element::MediaElement;
use crate::error::MediaError;

pub const DORMANT_SRC: &str = "data-src";
pub const DORMANT_SRCSET: &str = "data-srcset";

/// Placeholder height keeping captured elements from collapsing.
pub const DEFAULT_PLACEHOLDER_PX: f64 = 50.0;

/// Sources stashed for a dormant element. `original_src` is never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MediaRecord {
    pub element: NodeKey,
    pub original_src: String,
    pub original_srcset: Option<String>,
}

impl MediaRecord {
    /// Read the record back from the dormant marker, if the element has one.
    pub fn from_marker(doc: &dyn Document, node: NodeKey) -> Option<Self> {
        let src = doc.attribute(node, DORMANT_SRC).unwrap_or_default();
        let srcset = doc
            .attribute(node, DORMANT_SRCSET)
            .filter(|srcset| !srcset.is_empty());
        if src.is_empty() && srcset.is_none() {
            return None;
        }
        Some(Self {
            element: node,
            original_src: src,
            original_srcset: srcset,
        })
    }

    /// Reattach the stashed sources to `element`, `srcset` first.
    pub fn restore(&self, doc: &mut dyn Document, element: &dyn MediaElement) {
        element.attach_source(doc, &self.original_src, self.original_srcset.as_deref());
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MediaSourceVault {
    placeholder_px: f64,
}

impl Default for MediaSourceVault {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_PX)
    }
}

impl MediaSourceVault {
    #[inline]
    #[must_use]
    pub const fn new(placeholder_px: f64) -> Self {
        Self { placeholder_px }
    }

    /// Strip the live sources from `element` and remember them.
    ///
    /// An element that already carries the dormant marker is returned as is,
    /// without touching the DOM again.
    ///
    /// # Errors
    /// [`MediaError::NoSourceFound`] when the element has nothing to load.
    /// The element is left untouched in that case.
    pub fn capture(
        &self,
        doc: &mut dyn Document,
        element: &dyn MediaElement,
    ) -> Result<MediaRecord, MediaError> {
        let node = element.node();
        if let Some(record) = MediaRecord::from_marker(doc, node) {
            if record.original_src.is_empty() {
                return Err(MediaError::NoSourceFound {
                    element: describe(doc, node),
                });
            }
            return Ok(record);
        }

        let Some(src) = element.active_source(doc) else {
            return Err(MediaError::NoSourceFound {
                element: describe(doc, node),
            });
        };
        let srcset = doc
            .attribute(node, "srcset")
            .filter(|srcset| !srcset.is_empty());

        doc.set_attribute(node, DORMANT_SRC, &src);
        if let Some(srcset) = &srcset {
            doc.set_attribute(node, DORMANT_SRCSET, srcset);
        }
        doc.remove_attribute(node, "src");
        if srcset.is_some() {
            doc.remove_attribute(node, "srcset");
        }
        doc.set_attribute(node, "loading", "lazy");
        doc.set_style(node, "min-height", &format!("{}px", self.placeholder_px));
        trace!("captured {} from {src}", describe(doc, node));

        Ok(MediaRecord {
            element: node,
            original_src: src,
            original_srcset: srcset,
        })
    }
}
