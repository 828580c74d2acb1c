use core::time::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Error, anyhow};
use dom::{Document, FrameHandle, IdleHandle, MediaSignal, NodeKey, PageEvent};
use log::{debug, trace, warn};
use media::{DeferredMediaLoader, LoadOutcome, Registration};
use rhythm::{AlignmentVerdict, DiagnosticSink, GridAuditor, GridMetric};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::info_span;

use crate::analytics::{AnalyticsBuffer, AnalyticsEvent, AnalyticsTransport, bootstrap_commands, tag_script_url};
use crate::config::GridlineConfig;
use crate::scheduler::FrameDebouncer;
use crate::telemetry::{PassCounters, maybe_emit, pass_counters_json};
use crate::url::normalize_trailing_slash;

/// Work parked behind an idle callback.
#[derive(Debug)]
enum IdleTask {
    Initialize,
    LoadAnalytics,
    InjectScript,
    FlushAnalytics(Vec<AnalyticsEvent>),
}

/// A grid-aligned page driven by platform events.
///
/// Owns the document and the receiving end of its event channel. Nothing
/// happens until [`GridPage::pump`] (or [`GridPage::run`]) feeds events in:
///
/// * `DomContentLoaded` parks an initialization pass behind an idle callback;
///   the audit follows on the next animation frame.
/// * `Resize` is debounced onto one animation frame that re-initializes and
///   audits.
/// * proximity entries and media signals drive the deferred loader.
pub struct GridPage<D: Document> {
    doc: D,
    events: UnboundedReceiver<PageEvent>,
    config: GridlineConfig,
    metric: GridMetric,
    loader: DeferredMediaLoader,
    auditor: GridAuditor,
    debouncer: FrameDebouncer,
    audit_frames: HashSet<FrameHandle>,
    idle_tasks: HashMap<IdleHandle, IdleTask>,
    analytics: AnalyticsBuffer,
    transport: Box<dyn AnalyticsTransport>,
    script: Option<NodeKey>,
    analytics_scheduled: bool,
    passes: u64,
    counters: PassCounters,
    last_verdicts: Vec<AlignmentVerdict>,
}

impl<D: Document> GridPage<D> {
    pub fn new(
        doc: D,
        events: UnboundedReceiver<PageEvent>,
        config: GridlineConfig,
        sink: Arc<dyn DiagnosticSink>,
        transport: Box<dyn AnalyticsTransport>,
    ) -> Self {
        let metric = config.metric();
        Self {
            loader: DeferredMediaLoader::new(config.loader_options(), Arc::clone(&sink)),
            auditor: GridAuditor::new(metric, config.audit_dedup, sink),
            analytics: AnalyticsBuffer::new(config.analytics_batch),
            metric,
            doc,
            events,
            config,
            debouncer: FrameDebouncer::new(),
            audit_frames: HashSet::new(),
            idle_tasks: HashMap::new(),
            transport,
            script: None,
            analytics_scheduled: false,
            passes: 0,
            counters: PassCounters::default(),
            last_verdicts: Vec::new(),
        }
    }

    /// Drain and handle every queued event without blocking.
    ///
    /// # Errors
    /// When the platform dropped its end of the event channel.
    pub fn pump(&mut self) -> Result<usize, Error> {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) => {
                    return Err(anyhow!("page event channel closed after {handled} events"));
                }
            }
        }
    }

    /// Handle events as they arrive until the platform closes the channel.
    pub async fn run(&mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
        }
        debug!("page event channel closed after {} passes", self.passes);
    }

    /// Queue an analytics command, e.g. `["event", "share", {...}]`.
    pub fn track(&mut self, args: Vec<Value>) {
        if self.analytics.push(args) {
            self.start_flush();
        }
    }

    pub fn handle_event(&mut self, event: PageEvent) {
        trace!("page event {event:?}");
        match event {
            PageEvent::DomContentLoaded => {
                let handle = self.doc.request_idle_callback(self.config.init_deadline());
                self.idle_tasks.insert(handle, IdleTask::Initialize);
            }
            PageEvent::Resize => {
                self.debouncer.request(&mut self.doc);
            }
            PageEvent::AnimationFrame(handle) => {
                if self.debouncer.take(handle) {
                    self.initialize();
                    self.audit();
                } else if self.audit_frames.remove(&handle) {
                    self.audit();
                } else {
                    trace!("unclaimed frame {handle:?}");
                }
            }
            PageEvent::Idle { handle, timed_out } => {
                if let Some(task) = self.idle_tasks.remove(&handle) {
                    if timed_out {
                        debug!("idle deadline passed for {task:?}");
                    }
                    self.run_idle_task(task);
                }
            }
            PageEvent::Intersection { watcher, entries } => {
                self.loader.on_intersection(&mut self.doc, watcher, &entries);
            }
            PageEvent::Media { node, signal } => self.on_media(node, &signal),
            PageEvent::ScriptLoaded(node) => {
                if self.script == Some(node) && self.analytics.mark_loaded() {
                    self.start_flush();
                }
            }
            PageEvent::Detached(node) => {
                self.loader.forget(&mut self.doc, node);
            }
        }
    }

    fn on_media(&mut self, node: NodeKey, signal: &MediaSignal) {
        match self.loader.on_signal(&mut self.doc, node, signal) {
            Some(LoadOutcome::Loaded(loaded)) => debug!("media {loaded:?} loaded"),
            Some(LoadOutcome::Failed(err)) => debug!("media {node:?} fell back: {err}"),
            None => {}
        }
    }

    fn run_idle_task(&mut self, task: IdleTask) {
        match task {
            IdleTask::Initialize => {
                self.initialize();
                let frame = self.doc.request_animation_frame();
                self.audit_frames.insert(frame);
            }
            IdleTask::LoadAnalytics => self.load_analytics(),
            IdleTask::InjectScript => self.inject_script(),
            IdleTask::FlushAnalytics(batch) => {
                if self.analytics.finish_batch(self.transport.as_mut(), batch) {
                    self.start_flush();
                }
            }
        }
    }

    /// One initialization pass: measure the grid, swap the proximity watcher,
    /// bring every image and video under management and tidy the address.
    fn initialize(&mut self) {
        self.passes += 1;
        let _span = info_span!("page.initialize", pass = self.passes).entered();
        let cell = self.metric.compute_cell(&mut self.doc);
        self.loader.begin_pass(&mut self.doc, cell);
        self.counters = PassCounters {
            pass: self.passes,
            cell_height: cell.height,
            coalesced_resizes: self.debouncer.coalesced(),
            ..PassCounters::default()
        };

        let body = self.doc.body();
        let media: Vec<NodeKey> = self
            .doc
            .descendants(body)
            .into_iter()
            .filter(|node| matches!(self.doc.tag_name(*node).as_deref(), Some("img" | "video")))
            .collect();
        for node in media {
            match self.loader.register(&mut self.doc, node) {
                Ok(Registration::Observed) => self.counters.media_observed += 1,
                Ok(Registration::InFlight) => self.counters.media_in_flight += 1,
                Ok(Registration::Resized { .. }) => self.counters.media_resized += 1,
                Ok(Registration::Eager { .. }) => self.counters.media_eager += 1,
                Err(err) => {
                    warn!("{err}");
                    self.counters.media_unsupported += 1;
                }
            }
        }

        self.normalize_location();

        if self.passes == 1 && self.config.analytics_id.is_some() && !self.analytics_scheduled {
            self.analytics_scheduled = true;
            let handle = self.doc.request_idle_callback(self.config.analytics_deadline());
            self.idle_tasks.insert(handle, IdleTask::LoadAnalytics);
        }
    }

    fn audit(&mut self) {
        self.last_verdicts = self.auditor.audit(&mut self.doc);
        self.counters.audited = self.last_verdicts.len() as u64;
        self.counters.off_grid = self
            .last_verdicts
            .iter()
            .filter(|verdict| !verdict.aligned)
            .count() as u64;
        maybe_emit(self.config.telemetry_enabled, &pass_counters_json(&self.counters));
    }

    fn normalize_location(&mut self) {
        let href = self.doc.location();
        match normalize_trailing_slash(&href) {
            Ok(Some(normalized)) => self.doc.replace_location(&normalized),
            Ok(None) => {}
            Err(err) => warn!("leaving location {href} as is: {err}"),
        }
    }

    fn load_analytics(&mut self) {
        let Some(id) = self.config.analytics_id.clone() else {
            return;
        };
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        for command in bootstrap_commands(&id, timestamp_ms) {
            self.transport.deliver(command);
        }
        let handle = self.doc.request_idle_callback(self.config.script_deadline());
        self.idle_tasks.insert(handle, IdleTask::InjectScript);
    }

    fn inject_script(&mut self) {
        let Some(id) = self.config.analytics_id.as_deref() else {
            return;
        };
        let src = match tag_script_url(id) {
            Ok(url) => url,
            Err(err) => {
                warn!("analytics disabled: {err}");
                return;
            }
        };
        let script = self.doc.create_element("script");
        self.doc.set_attribute(script, "src", src.as_str());
        self.doc.set_attribute(script, "async", "");
        let head = self.doc.head();
        self.doc.append_child(head, script);
        self.script = Some(script);
    }

    fn start_flush(&mut self) {
        if let Some(batch) = self.analytics.begin_batch() {
            let handle = self.doc.request_idle_callback(self.config.flush_deadline());
            self.idle_tasks.insert(handle, IdleTask::FlushAnalytics(batch));
        }
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    pub const fn config(&self) -> &GridlineConfig {
        &self.config
    }

    pub const fn loader(&self) -> &DeferredMediaLoader {
        &self.loader
    }

    pub const fn analytics(&self) -> &AnalyticsBuffer {
        &self.analytics
    }

    /// Initialization passes run so far.
    pub const fn passes(&self) -> u64 {
        self.passes
    }

    /// Counters of the latest pass.
    pub const fn counters(&self) -> PassCounters {
        self.counters
    }

    /// Verdicts of the latest audit.
    pub fn last_verdicts(&self) -> &[AlignmentVerdict] {
        &self.last_verdicts
    }
}
