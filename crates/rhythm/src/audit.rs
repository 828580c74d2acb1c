//! Whole-tree alignment audit.
//!
//! Every rendered element under `<body>` must start on a multiple of half a
//! grid row. Elements that do not are tagged with [`OFF_GRID_CLASS`] so a
//! debug stylesheet can highlight them, and reported to the diagnostics sink.

use core::str::FromStr;
use std::sync::Arc;

use dom::{Document, NodeKey, describe};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::metric::GridMetric;
use crate::GridCell;

/// Class applied to misaligned elements.
pub const OFF_GRID_CLASS: &str = "off-grid";

/// Marker attribute used by [`DedupPolicy::OncePerElement`].
pub const REPORTED_MARKER: &str = "data-grid-reported";

/// Table internals inherit their row offsets and are not audited.
const IGNORED_TAGS: [&str; 6] = ["thead", "tbody", "tfoot", "tr", "td", "th"];

/// Debug overlay elements.
const DEBUG_CLASSES: [&str; 2] = ["debug-grid", "debug-toggle"];

/// Sub-pixel slack for layout engine rounding, in CSS pixels.
const ALIGNMENT_EPSILON_PX: f64 = 0.1;

/// How often a persistently misaligned element is reported.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Report on every audit pass it is still misaligned.
    #[default]
    EveryPass,
    /// Report once for the element's lifetime.
    OncePerElement,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "every" | "every_pass" => Ok(Self::EveryPass),
            "once" | "once_per_element" => Ok(Self::OncePerElement),
            other => Err(format!("unknown dedup policy `{other}`")),
        }
    }
}

/// Classification of one element in one pass.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct AlignmentVerdict {
    pub node: NodeKey,
    /// Absolute top offset in document coordinates.
    pub top: f64,
    /// `top` modulo half a row.
    pub remainder: f64,
    pub aligned: bool,
}

/// Remainder of `top` against half a row and whether it counts as aligned.
/// `None` for a degenerate cell.
pub fn classify(top: f64, cell: GridCell) -> Option<(f64, bool)> {
    if cell.is_degenerate() {
        return None;
    }
    let half = cell.half_height();
    let remainder = top.rem_euclid(half);
    let aligned = remainder <= ALIGNMENT_EPSILON_PX || half - remainder <= ALIGNMENT_EPSILON_PX;
    Some((remainder, aligned))
}

fn is_candidate(doc: &dyn Document, node: NodeKey) -> bool {
    let Some(tag) = doc.tag_name(node) else {
        return false;
    };
    if IGNORED_TAGS.contains(&tag.as_str()) {
        return false;
    }
    !DEBUG_CLASSES.iter().any(|class| doc.has_class(node, class))
}

/// Recomputes the grid and classifies every rendered element against it.
pub struct GridAuditor {
    metric: GridMetric,
    policy: DedupPolicy,
    sink: Arc<dyn DiagnosticSink>,
}

impl GridAuditor {
    pub fn new(metric: GridMetric, policy: DedupPolicy, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            metric,
            policy,
            sink,
        }
    }

    pub const fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Run one pass. Tags misaligned elements, clears stale tags on aligned
    /// ones and reports each misaligned element at most once.
    pub fn audit(&self, doc: &mut dyn Document) -> Vec<AlignmentVerdict> {
        let _span = info_span!("rhythm.audit").entered();
        let cell = self.metric.compute_cell(doc);
        if let Err(err) = cell.validate() {
            warn!("skipping alignment audit: {err}");
            return Vec::new();
        }
        let half = cell.half_height();
        let scroll_y = doc.scroll_y();
        let mut verdicts = Vec::new();

        for node in doc.descendants(doc.body()) {
            if !is_candidate(doc, node) {
                continue;
            }
            let rect = doc.bounding_rect(node);
            if rect.is_empty() {
                continue;
            }
            let top = rect.top() + scroll_y;
            let Some((remainder, aligned)) = classify(top, cell) else {
                continue;
            };
            if aligned {
                doc.remove_class(node, OFF_GRID_CLASS);
            } else {
                self.report(doc, node, top, remainder, half);
                doc.add_class(node, OFF_GRID_CLASS);
            }
            verdicts.push(AlignmentVerdict {
                node,
                top,
                remainder,
                aligned,
            });
        }

        let misaligned = verdicts.iter().filter(|verdict| !verdict.aligned).count();
        debug!(
            "alignment audit: {} elements, {misaligned} off-grid (row {}px)",
            verdicts.len(),
            cell.height
        );
        verdicts
    }

    fn report(&self, doc: &mut dyn Document, node: NodeKey, top: f64, remainder: f64, half: f64) {
        if self.policy == DedupPolicy::OncePerElement {
            if doc.attribute(node, REPORTED_MARKER).is_some() {
                return;
            }
            doc.set_attribute(node, REPORTED_MARKER, "");
        }
        self.sink.emit(&Diagnostic::Misaligned {
            node,
            element: describe(doc, node),
            top,
            remainder,
            expected_multiple: half,
        });
    }
}
