//! Fire-and-forget diagnostics channel.
//!
//! Alignment violations and media failures are reported here instead of being
//! returned to callers; nothing downstream acknowledges them.

use core::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex, PoisonError};

use dom::NodeKey;
use log::{error, warn};
use serde::Serialize;

/// One diagnostic record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Element top is not on a half-row boundary.
    Misaligned {
        node: NodeKey,
        element: String,
        top: f64,
        remainder: f64,
        expected_multiple: f64,
    },
    /// Deferred load failed; the original source was reapplied directly.
    LoadFailed {
        node: NodeKey,
        element: String,
        source: String,
        error: String,
    },
    /// The direct reload after a failure failed too. Not retried.
    RetryFailed {
        node: NodeKey,
        element: String,
        source: String,
        error: String,
    },
    /// Media element without a resolvable source; loaded eagerly.
    NoSourceFound { node: NodeKey, element: String },
}

impl Diagnostic {
    /// Node the diagnostic is about.
    pub const fn node(&self) -> NodeKey {
        match self {
            Self::Misaligned { node, .. }
            | Self::LoadFailed { node, .. }
            | Self::RetryFailed { node, .. }
            | Self::NoSourceFound { node, .. } => *node,
        }
    }

    /// Whether this is a load failure rather than a layout warning.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::LoadFailed { .. } | Self::RetryFailed { .. })
    }
}

impl Display for Diagnostic {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Misaligned {
                element,
                top,
                remainder,
                expected_multiple,
                ..
            } => write!(
                formatter,
                "Incorrect vertical offset for {element} at {top}px with remainder {remainder} when expecting divisible by {expected_multiple}"
            ),
            Self::LoadFailed {
                element,
                source,
                error,
                ..
            } => write!(formatter, "Failed to load media {element} from {source}: {error}"),
            Self::RetryFailed {
                element,
                source,
                error,
                ..
            } => write!(formatter, "Direct reload of {element} from {source} failed: {error}"),
            Self::NoSourceFound { element, .. } => write!(formatter, "No source found for media {element}"),
        }
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Routes diagnostics to the `log` facade: failures at error level,
/// layout problems at warn level.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogSink {
    /// Emit JSON records instead of prose.
    pub structured: bool,
}

impl DiagnosticSink for LogSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let line = if self.structured {
            serde_json::to_string(diagnostic).unwrap_or_else(|_| diagnostic.to_string())
        } else {
            diagnostic.to_string()
        };
        if diagnostic.is_failure() {
            error!(target: "gridline::diagnostics", "{line}");
        } else {
            warn!(target: "gridline::diagnostics", "{line}");
        }
    }
}

/// Keeps every diagnostic in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, in emission order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn misaligned() -> Diagnostic {
        Diagnostic::Misaligned {
            node: NodeKey(7),
            element: "p.lead".to_owned(),
            top: 30.0,
            remainder: 6.0,
            expected_multiple: 12.0,
        }
    }

    #[test]
    fn structured_form_is_tagged_json() {
        let value = serde_json::to_value(misaligned()).unwrap_or_default();
        assert_eq!(value["kind"], "misaligned");
        assert_eq!(value["node"], 7);
        assert_eq!(value["expected_multiple"], 12.0);
    }

    #[test]
    fn prose_names_the_element() {
        let text = misaligned().to_string();
        assert!(text.contains("p.lead"));
        assert!(text.contains("divisible by 12"));
        let failure = Diagnostic::LoadFailed {
            node: NodeKey(8),
            element: "img".to_owned(),
            source: "a.png".to_owned(),
            error: "404".to_owned(),
        };
        assert!(failure.is_failure());
        assert!(!misaligned().is_failure());
    }

    #[test]
    fn log_sink_accepts_both_forms() {
        let _ = env_logger::builder().is_test(true).try_init();
        LogSink { structured: true }.emit(&misaligned());
        LogSink::default().emit(&Diagnostic::NoSourceFound {
            node: NodeKey(9),
            element: "video".to_owned(),
        });
    }
}
