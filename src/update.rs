//! The polling loop that drives the tracker.

use crate::error::SyncResult;
use crate::tracker::{PollOutcome, SegmentTracker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Upper bound on how long a raised shutdown flag goes unnoticed while sleeping.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Calls [`SegmentTracker::poll`] at a fixed interval until asked to stop.
///
/// A poll in progress is never interrupted: the shutdown flag is only checked between polls.
pub struct UpdateLoop {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    max_ticks: Option<u64>,
}

impl UpdateLoop {
    /// Create a loop polling every `interval`, stopping once `shutdown` is raised.
    pub fn new(interval: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            interval,
            shutdown,
            max_ticks: None,
        }
    }

    /// Stop after `ticks` polls even if the flag is never raised.
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Run until shutdown (or the tick limit). Returns the number of polls performed.
    ///
    /// A poll error is returned immediately; transient index failures never surface here
    /// because the tracker reports them as [`PollOutcome::RebuildFailed`].
    pub fn run(&self, tracker: &mut SegmentTracker) -> SyncResult<u64> {
        let mut ticks = 0u64;
        while !self.should_stop(ticks) {
            let outcome = tracker.poll()?;
            ticks += 1;
            match outcome {
                PollOutcome::Unchanged => {}
                other => debug!(tick = ticks, outcome = ?other, "poll"),
            }
            if self.should_stop(ticks) {
                break;
            }
            self.sleep();
        }
        info!(ticks, "update loop stopped");
        Ok(ticks)
    }

    fn should_stop(&self, ticks: u64) -> bool {
        self.shutdown.load(Ordering::SeqCst) || self.max_ticks.is_some_and(|max| ticks >= max)
    }

    fn sleep(&self) {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
