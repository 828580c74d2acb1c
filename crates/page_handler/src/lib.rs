//! Page lifecycle for Gridline.
//!
//! This crate wires the grid measurement, the deferred media loader and the
//! alignment audit to platform events, and owns the collaborators around
//! them: configuration, resize debouncing, the analytics queue, address
//! normalization and per-pass telemetry.

pub mod analytics;
pub use analytics::{AnalyticsBuffer, AnalyticsEvent, AnalyticsTransport, BufferState, DataLayer};

pub mod config;
pub use config::GridlineConfig;

mod page;
pub use page::GridPage;

pub mod scheduler;
pub mod telemetry;
pub mod url;
