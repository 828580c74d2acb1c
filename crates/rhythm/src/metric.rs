//! Grid cell measurement through a hidden probe element.

use dom::Document;
use log::{trace, warn};

use crate::GridCell;

/// Custom property holding the page's line height.
pub const LINE_HEIGHT_PROPERTY: &str = "--line-height";

/// Line height used when the page does not define [`LINE_HEIGHT_PROPERTY`].
pub const DEFAULT_LINE_HEIGHT_REM: f64 = 1.5;

/// Measures the grid cell by laying out a probe `1ch` wide and one line tall.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridMetric {
    default_line_height_rem: f64,
}

impl GridMetric {
    #[must_use]
    pub const fn new(default_line_height_rem: f64) -> Self {
        Self {
            default_line_height_rem,
        }
    }

    /// Insert the probe, read its box, remove it.
    ///
    /// The probe is fixed-position and hidden so it neither shifts content
    /// nor scrolls the page. Repeated calls with unchanged CSS and viewport
    /// return the same cell.
    pub fn compute_cell(&self, doc: &mut dyn Document) -> GridCell {
        let body = doc.body();
        let probe = doc.create_element("div");
        doc.set_style(probe, "position", "fixed");
        doc.set_style(probe, "visibility", "hidden");
        doc.set_style(probe, "pointer-events", "none");
        doc.set_style(probe, "width", "1ch");
        doc.set_style(
            probe,
            "height",
            &format!(
                "var({LINE_HEIGHT_PROPERTY}, {}rem)",
                self.default_line_height_rem
            ),
        );
        doc.append_child(body, probe);
        let rect = doc.bounding_rect(probe);
        doc.remove_node(probe);

        let cell = GridCell::new(rect.width, rect.height);
        match cell.validate() {
            Ok(valid) => trace!("grid cell {}x{}", valid.width, valid.height),
            Err(err) => warn!("{err}; media heights will not be snapped"),
        }
        cell
    }
}

impl Default for GridMetric {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_HEIGHT_REM)
    }
}
