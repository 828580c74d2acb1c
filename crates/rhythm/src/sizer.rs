//! Grid-snapped media heights.
//!
//! The snapped value is written to the element's `height` property. Padding
//! based sizing is not supported.

use dom::{Document, NodeKey, Size};

use crate::GridCell;

/// Aspect ratio assumed when intrinsic dimensions are unknown.
pub const FALLBACK_ASPECT_RATIO: f64 = 2.0;

/// Round `raw` to the nearest multiple of `cell_height`. A degenerate cell
/// height leaves the value untouched.
#[must_use]
pub fn snap(raw: f64, cell_height: f64) -> f64 {
    if cell_height.is_finite() && cell_height > 0.0 {
        (raw / cell_height).round() * cell_height
    } else {
        raw
    }
}

/// Height for an element `width` pixels wide. Uses the intrinsic aspect
/// ratio when both intrinsic sides are positive, otherwise 2:1.
#[must_use]
pub fn target_height(width: f64, intrinsic: Option<Size>, cell: GridCell) -> f64 {
    let ratio = intrinsic
        .and_then(|size| size.aspect_ratio())
        .unwrap_or(FALLBACK_ASPECT_RATIO);
    snap(width / ratio, cell.height)
}

/// Compute and apply the snapped height of `node`. Returns the height set.
pub fn apply(doc: &mut dyn Document, node: NodeKey, intrinsic: Option<Size>, cell: GridCell) -> f64 {
    let width = doc.bounding_rect(node).width;
    let height = target_height(width, intrinsic, cell);
    doc.set_style(node, "height", &format!("{height}px"));
    height
}
