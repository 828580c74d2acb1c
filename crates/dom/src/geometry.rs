//! Rectangles and sizes in CSS pixels.

use serde::Serialize;

/// A border box in CSS pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top edge.
    #[inline]
    #[must_use]
    pub const fn top(&self) -> f64 {
        self.y
    }

    /// Bottom edge.
    #[inline]
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// True when the box has neither width nor height (not laid out).
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// Same box moved vertically by `delta`.
    #[inline]
    #[must_use]
    pub fn translated_y(self, delta: f64) -> Self {
        Self {
            y: self.y + delta,
            ..self
        }
    }
}

/// Intrinsic media dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[inline]
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width over height, only when both sides are positive.
    #[inline]
    #[must_use]
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0.0 && self.height > 0.0).then(|| self.width / self.height)
    }
}
