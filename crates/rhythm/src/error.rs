use thiserror::Error;

/// Failures of the grid measurement. Never fatal: callers fall back to
/// unsnapped sizes and skip the audit.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GridError {
    #[error("grid probe measured a degenerate line height ({height}px)")]
    MeasurementUnavailable { height: f64 },
}
