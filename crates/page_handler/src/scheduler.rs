use dom::{Document, FrameHandle};

/// Coalesces bursts of requests into one animation frame. Each request
/// cancels the frame still pending from the previous one.
#[derive(Debug, Default)]
pub struct FrameDebouncer {
    pending: Option<FrameHandle>,
    /// Number of frames cancelled because a newer request replaced them.
    coalesced_count: u64,
}

impl FrameDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the debounced frame, replacing any pending one.
    pub fn request(&mut self, doc: &mut dyn Document) -> FrameHandle {
        if let Some(previous) = self.pending.take() {
            doc.cancel_animation_frame(previous);
            self.coalesced_count = self.coalesced_count.saturating_add(1);
        }
        let handle = doc.request_animation_frame();
        self.pending = Some(handle);
        handle
    }

    /// Returns true and clears the pending slot if `handle` is the frame this
    /// debouncer is waiting for.
    pub fn take(&mut self, handle: FrameHandle) -> bool {
        if self.pending == Some(handle) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Return the number of requests absorbed by a later one during this session.
    pub fn coalesced(&self) -> u64 {
        self.coalesced_count
    }
}
