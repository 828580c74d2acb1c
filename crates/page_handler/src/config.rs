//! Configuration settings for a Gridline page.
//!
//! This module defines the proximity watcher geometry, the grid defaults, the
//! audit reporting policy, analytics settings and the idle deadlines used to
//! schedule work. Configuration can be loaded from environment variables or
//! constructed programmatically.

use core::str::FromStr;
use core::time::Duration;
use std::env;

use dom::WatcherOptions;
use media::LoaderOptions;
use rhythm::{DEFAULT_LINE_HEIGHT_REM, DedupPolicy, GridMetric};

use crate::analytics::DEFAULT_BATCH_SIZE;

/// Runtime configuration for a Gridline page.
#[derive(Clone, Debug, PartialEq)]
pub struct GridlineConfig {
    /// Vertical margin added around the viewport when watching media, in pixels
    pub root_margin_px: f64,
    /// Fraction of a media element that must be inside the grown viewport
    pub threshold: f64,
    /// `min-height` given to dormant media, in pixels
    pub placeholder_px: f64,
    /// Line height used when `--line-height` is unset, in rem
    pub line_height_rem: f64,
    /// How often a persistently misaligned element is reported
    pub audit_dedup: DedupPolicy,
    /// Measurement id; analytics stay off without one
    pub analytics_id: Option<String>,
    /// Largest number of queued analytics events delivered per idle callback
    pub analytics_batch: usize,
    /// Whether to log per-pass counters
    pub telemetry_enabled: bool,
    pub init_deadline_ms: u64,
    pub analytics_deadline_ms: u64,
    pub script_deadline_ms: u64,
    pub flush_deadline_ms: u64,
}

impl Default for GridlineConfig {
    fn default() -> Self {
        Self::new(None, DedupPolicy::EveryPass, false)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}

impl GridlineConfig {
    /// Construct a configuration with the default geometry and deadlines.
    ///
    /// # Arguments
    ///
    /// * `analytics_id` - Measurement id, or `None` to disable analytics
    /// * `audit_dedup` - Reporting policy for misaligned elements
    /// * `telemetry_enabled` - Whether to log per-pass counters
    #[inline]
    #[must_use]
    pub fn new(analytics_id: Option<String>, audit_dedup: DedupPolicy, telemetry_enabled: bool) -> Self {
        Self {
            root_margin_px: 50.0,
            threshold: 0.01,
            placeholder_px: 50.0,
            line_height_rem: DEFAULT_LINE_HEIGHT_REM,
            audit_dedup,
            analytics_id: analytics_id.filter(|id| !id.is_empty()),
            analytics_batch: DEFAULT_BATCH_SIZE,
            telemetry_enabled,
            init_deadline_ms: 1000,
            analytics_deadline_ms: 3000,
            script_deadline_ms: 5000,
            flush_deadline_ms: 2000,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables, keeping the default for
    /// anything unset or unparsable:
    /// - `GRIDLINE_ROOT_MARGIN_PX`: proximity margin (default: 50)
    /// - `GRIDLINE_THRESHOLD`: proximity threshold, clamped to 0..=1 (default: 0.01)
    /// - `GRIDLINE_PLACEHOLDER_PX`: dormant media placeholder (default: 50)
    /// - `GRIDLINE_LINE_HEIGHT`: fallback line height in rem (default: 1.5)
    /// - `GRIDLINE_AUDIT_DEDUP`: `every` or `once` (default: every)
    /// - `GRIDLINE_ANALYTICS_ID`: measurement id (default: none)
    /// - `GRIDLINE_ANALYTICS_BATCH`: analytics batch size, at least 1 (default: 10)
    /// - `GRIDLINE_TELEMETRY`: set to "1" to log per-pass counters
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new(
            env::var("GRIDLINE_ANALYTICS_ID").ok(),
            env_parse("GRIDLINE_AUDIT_DEDUP").unwrap_or_default(),
            env::var("GRIDLINE_TELEMETRY").ok().as_deref() == Some("1"),
        );
        if let Some(margin) = env_parse::<f64>("GRIDLINE_ROOT_MARGIN_PX").filter(|px| px.is_finite()) {
            config.root_margin_px = margin;
        }
        if let Some(threshold) = env_parse::<f64>("GRIDLINE_THRESHOLD").filter(|ratio| ratio.is_finite()) {
            config.threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(placeholder) = env_parse::<f64>("GRIDLINE_PLACEHOLDER_PX").filter(|px| *px >= 0.0) {
            config.placeholder_px = placeholder;
        }
        if let Some(rem) = env_parse::<f64>("GRIDLINE_LINE_HEIGHT").filter(|rem| *rem > 0.0) {
            config.line_height_rem = rem;
        }
        if let Some(batch) = env_parse::<usize>("GRIDLINE_ANALYTICS_BATCH") {
            config.analytics_batch = batch.max(1);
        }
        config
    }

    #[inline]
    #[must_use]
    pub const fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            margin_px: self.root_margin_px,
            threshold: self.threshold,
        }
    }

    #[inline]
    #[must_use]
    pub const fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            watcher: self.watcher_options(),
            placeholder_px: self.placeholder_px,
        }
    }

    #[inline]
    #[must_use]
    pub const fn metric(&self) -> GridMetric {
        GridMetric::new(self.line_height_rem)
    }

    /// Deadline for the first initialization pass after `DOMContentLoaded`.
    #[inline]
    #[must_use]
    pub const fn init_deadline(&self) -> Duration {
        Duration::from_millis(self.init_deadline_ms)
    }

    /// Deadline for loading analytics after the first pass.
    #[inline]
    #[must_use]
    pub const fn analytics_deadline(&self) -> Duration {
        Duration::from_millis(self.analytics_deadline_ms)
    }

    /// Deadline for appending the tag script to `<head>`.
    #[inline]
    #[must_use]
    pub const fn script_deadline(&self) -> Duration {
        Duration::from_millis(self.script_deadline_ms)
    }

    /// Deadline for delivering one analytics batch.
    #[inline]
    #[must_use]
    pub const fn flush_deadline(&self) -> Duration {
        Duration::from_millis(self.flush_deadline_ms)
    }
}
