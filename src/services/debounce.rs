//! Rate limit for the full-series redraw path.

use std::time::{Duration, Instant};

/// Leading-edge debouncer with a trailing flush.
///
/// The first request in a quiet period runs immediately; requests inside the
/// interval are coalesced into one pending run that `flush` releases once the
/// interval has elapsed.
#[derive(Debug, Clone)]
pub struct RedrawDebouncer {
    interval: Duration,
    last_run: Option<Instant>,
    pending: bool,
}

impl RedrawDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            pending: false,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        match self.last_run {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Ask for a redraw. Returns `true` when it should run now.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.ready(now) {
            self.record_run(now);
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Release a coalesced request once the interval has passed.
    pub fn flush(&mut self, now: Instant) -> bool {
        if self.pending && self.ready(now) {
            self.record_run(now);
            true
        } else {
            false
        }
    }

    /// Note a redraw that ran outside `request`.
    pub fn record_run(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
