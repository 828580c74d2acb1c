//! Per-pass counters, logged as one JSON line when telemetry is enabled.

use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PassCounters {
    pub pass: u64,
    pub cell_height: f64,
    pub media_observed: u64,
    pub media_in_flight: u64,
    pub media_resized: u64,
    pub media_eager: u64,
    pub media_unsupported: u64,
    pub audited: u64,
    pub off_grid: u64,
    pub coalesced_resizes: u64,
}

pub fn pass_counters_json(counters: &PassCounters) -> String {
    serde_json::to_string(counters).unwrap_or_default()
}

pub fn maybe_emit(enabled: bool, json_line: &str) {
    if enabled {
        info!(target: "gridline::telemetry", "{json_line}");
    }
}
