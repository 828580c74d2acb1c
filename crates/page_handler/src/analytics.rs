//! Analytics command queue.
//!
//! Commands tracked before the tag script has loaded are buffered. Once it
//! reports loaded, the queue is delivered in FIFO batches, one batch per idle
//! callback, until it is empty. Nothing is ever dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};
use url::Url;

/// One tracked command: the arguments of a single `gtag(...)` call.
pub type AnalyticsEvent = Vec<Value>;

pub const DEFAULT_BATCH_SIZE: usize = 10;

const TAG_SCRIPT_BASE: &str = "https://www.googletagmanager.com/gtag/js";

/// Where delivered commands end up.
pub trait AnalyticsTransport {
    fn deliver(&mut self, event: AnalyticsEvent);
}

/// In-memory data layer. Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct DataLayer {
    entries: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl DataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every delivered command, in delivery order.
    pub fn entries(&self) -> Vec<AnalyticsEvent> {
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
}

impl AnalyticsTransport for DataLayer {
    fn deliver(&mut self, event: AnalyticsEvent) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// Accepting commands; no batch outstanding.
    Buffering,
    /// A batch has been taken and waits for its idle callback.
    Draining,
}

/// FIFO of tracked commands with a single consumer.
#[derive(Debug)]
pub struct AnalyticsBuffer {
    queue: VecDeque<AnalyticsEvent>,
    batch_size: usize,
    script_loaded: bool,
    state: BufferState,
}

impl Default for AnalyticsBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl AnalyticsBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_size: batch_size.max(1),
            script_loaded: false,
            state: BufferState::Buffering,
        }
    }

    /// Queue a command. Returns true when a drain can start right away.
    pub fn push(&mut self, event: AnalyticsEvent) -> bool {
        self.queue.push_back(event);
        self.can_drain()
    }

    /// The tag script finished loading. Returns true when a drain can start.
    pub fn mark_loaded(&mut self) -> bool {
        self.script_loaded = true;
        self.can_drain()
    }

    fn can_drain(&self) -> bool {
        self.script_loaded && self.state == BufferState::Buffering && !self.queue.is_empty()
    }

    /// Take the next batch and switch to `Draining`. `None` while the script
    /// is still loading, a batch is outstanding or the queue is empty.
    pub fn begin_batch(&mut self) -> Option<Vec<AnalyticsEvent>> {
        if !self.can_drain() {
            return None;
        }
        self.state = BufferState::Draining;
        let take = self.batch_size.min(self.queue.len());
        Some(self.queue.drain(..take).collect())
    }

    /// Deliver an outstanding batch in order and return to `Buffering`.
    /// Returns true when more commands are waiting.
    pub fn finish_batch(&mut self, transport: &mut dyn AnalyticsTransport, batch: Vec<AnalyticsEvent>) -> bool {
        for event in batch {
            transport.deliver(event);
        }
        self.state = BufferState::Buffering;
        !self.queue.is_empty()
    }

    pub const fn state(&self) -> BufferState {
        self.state
    }

    pub const fn is_loaded(&self) -> bool {
        self.script_loaded
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The two commands pushed straight to the data layer when analytics load.
pub fn bootstrap_commands(measurement_id: &str, timestamp_ms: u64) -> [AnalyticsEvent; 2] {
    [
        vec![json!("js"), json!(timestamp_ms)],
        vec![
            json!("config"),
            json!(measurement_id),
            json!({ "send_page_view": false, "transport_type": "beacon" }),
        ],
    ]
}

/// Address of the tag script for `measurement_id`.
///
/// # Errors
/// Only if the base address stops parsing, which would be a build defect.
pub fn tag_script_url(measurement_id: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(TAG_SCRIPT_BASE)?;
    url.query_pairs_mut().append_pair("id", measurement_id);
    Ok(url)
}
