//! Vertical rhythm primitives.
//!
//! Everything on a Gridline page sits on a grid whose row height comes from
//! the `--line-height` custom property. This crate measures that grid
//! ([`GridMetric`]), snaps media heights onto it ([`sizer`]) and audits the
//! rendered tree for elements that fell off it ([`GridAuditor`]).

use serde::Serialize;

pub mod audit;
pub use audit::{AlignmentVerdict, DedupPolicy, GridAuditor, OFF_GRID_CLASS, classify};

pub mod diagnostics;
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink, RecordingSink};

mod error;
pub use error::GridError;

pub mod metric;
pub use metric::{DEFAULT_LINE_HEIGHT_REM, GridMetric, LINE_HEIGHT_PROPERTY};

pub mod sizer;

/// One grid cell: the width of a character and the height of a text line.
///
/// Produced once per layout pass and read-only afterwards. Never cache it
/// across resizes: zoom and viewport changes move the line height.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct GridCell {
    pub width: f64,
    pub height: f64,
}

impl GridCell {
    #[inline]
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A cell without usable height. Snapping degrades to raw sizes.
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.height.is_finite() && self.height > 0.0)
    }

    /// Half the row height, the granularity element tops must align to.
    #[inline]
    #[must_use]
    pub fn half_height(&self) -> f64 {
        self.height / 2.0
    }

    /// Return the cell, or the measurement failure when it is degenerate.
    ///
    /// # Errors
    /// [`GridError::MeasurementUnavailable`] for zero, negative or non-finite heights.
    pub fn validate(self) -> Result<Self, GridError> {
        if self.is_degenerate() {
            Err(GridError::MeasurementUnavailable {
                height: self.height,
            })
        } else {
            Ok(self)
        }
    }
}
