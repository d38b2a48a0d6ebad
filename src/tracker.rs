//! WARC segment lifecycle tracking.
//!
//! ## Invariants
//!
//! - At most one open segment (`*.warc.gz.open`) stays in the recording directory. When more
//!   than one is observed, the most recently modified is kept and the rest are treated as
//!   abandoned: they are moved to the done directory with the open marker stripped.
//! - Closed segments (`*.warc.gz`) never stay in the recording directory once scanned; they
//!   are moved (never copied, never deleted) into the done directory.
//! - Whenever a segment is moved, the done index is rebuilt from the whole done directory.
//! - The recording index only ever describes the tracked open segment, or is empty.
//!
//! ## Failure posture
//!
//! - Index-build failures are transient: logged, retried on the next poll.
//! - A segment vanishing between the directory listing and its use is a race with the
//!   producer, recovered by scanning again.
//! - Any other filesystem error is returned; continuing with an unknown directory state would
//!   break the invariants above.

use crate::error::SyncResult;
use crate::formats::{classify, closed_name, Segment, SegmentState};
use crate::publish::IndexBuilder;
use crate::storage::{join, Directory, FileStamp};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A scan that raced with the producer is retried this many times before giving up on
/// catching up within one call (the next poll picks up where it left off).
const MAX_SCAN_PASSES: usize = 3;

/// Where segments and indexes live, relative to the directory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Directory the producer writes into.
    pub record_dir: String,
    /// Index of the open segment.
    pub record_index: String,
    /// Directory finished segments are moved to.
    pub done_dir: String,
    /// Index of everything in `done_dir`.
    pub done_index: String,
}

/// What a single [`SegmentTracker::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No open segment; the recording index is empty.
    Idle,
    /// The open segment has not changed since the last successful rebuild.
    Unchanged,
    /// The recording index was rebuilt from the open segment.
    Rebuilt,
    /// The rebuild failed; it will be retried on the next poll.
    RebuildFailed,
}

#[derive(Debug, Default)]
struct ScanPass {
    moved: usize,
    raced: bool,
    active: Option<String>,
}

/// Tracks the open segment and keeps both indexes consistent with the directories.
pub struct SegmentTracker {
    directory: Arc<dyn Directory>,
    builder: IndexBuilder,
    layout: Layout,
    active: Option<String>,
    last_stamp: Option<FileStamp>,
    done_index_stale: bool,
}

impl SegmentTracker {
    /// Prepare the directories and indexes and start tracking.
    ///
    /// Creates both directories if missing, empties the recording index (whatever it described
    /// belongs to a previous run) and creates an empty done index if there is none.
    pub fn open(builder: IndexBuilder, layout: Layout) -> SyncResult<Self> {
        let directory = builder.directory().clone();
        directory.create_dir_all(&layout.record_dir)?;
        directory.create_dir_all(&layout.done_dir)?;

        builder.clear(&layout.record_index)?;
        if !directory.exists(&layout.done_index) {
            builder.clear(&layout.done_index)?;
        }

        Ok(Self {
            directory,
            builder,
            layout,
            active: None,
            last_stamp: None,
            done_index_stale: false,
        })
    }

    /// The layout this tracker manages.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Path of the tracked open segment, if any.
    pub fn active(&self) -> Option<String> {
        self.active
            .as_deref()
            .map(|name| join(&self.layout.record_dir, name))
    }

    /// Scan the recording directory once, moving finished segments to the done directory.
    ///
    /// Returns the path of the open segment now being tracked, or `None`. The stored stamp is
    /// reset, so the next [`poll`](Self::poll) rebuilds the recording index.
    pub fn reconcile(&mut self) -> SyncResult<Option<String>> {
        let mut moved = 0;
        let mut active = None;
        for pass in 1..=MAX_SCAN_PASSES {
            let scan = self.scan_once()?;
            moved += scan.moved;
            active = scan.active;
            if !scan.raced {
                break;
            }
            debug!(pass, "segment changed during scan, rescanning");
        }

        if active != self.active {
            match &active {
                Some(name) => info!(segment = %name, "tracking open segment"),
                None => debug!("no open segment"),
            }
        }
        self.active = active;
        self.last_stamp = None;

        if moved > 0 {
            self.done_index_stale = true;
        }
        if self.done_index_stale {
            self.rebuild_done_index()?;
        }
        Ok(self.active())
    }

    /// Bring the recording index up to date with the open segment.
    ///
    /// A done index left stale by an earlier failed rebuild is retried here, once per call:
    /// either by the reconcile this poll runs anyway, or explicitly when the tracked segment
    /// is still in place.
    pub fn poll(&mut self) -> SyncResult<PollOutcome> {
        let (path, reconciled) = match self.active() {
            Some(path) => (path, false),
            None => match self.reconcile()? {
                Some(path) => (path, true),
                None => return self.go_idle(),
            },
        };

        let stamp = match self.directory.stat(&path) {
            Ok(stamp) => {
                if self.done_index_stale && !reconciled {
                    self.rebuild_done_index()?;
                }
                stamp
            }
            Err(e) if e.is_not_found() => {
                // Rotated away (closed or moved) since the last poll.
                debug!(segment = %path, "open segment disappeared");
                let Some(path) = self.reconcile()? else {
                    return self.go_idle();
                };
                match self.directory.stat(&path) {
                    Ok(stamp) => stamp,
                    Err(e) if e.is_not_found() => {
                        self.active = None;
                        return self.go_idle();
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        if self.last_stamp == Some(stamp) {
            return Ok(PollOutcome::Unchanged);
        }

        if self.builder.build(&self.layout.record_index, &[&path])? {
            self.last_stamp = Some(stamp);
            Ok(PollOutcome::Rebuilt)
        } else {
            Ok(PollOutcome::RebuildFailed)
        }
    }

    /// Final reconcile at controller teardown.
    ///
    /// If no segment is open any more, the recording index is removed: its absence means
    /// "nothing is being recorded". A recording index that is already gone is fine.
    pub fn shutdown(&mut self) -> SyncResult<()> {
        match self.reconcile()? {
            None => {
                self.directory.delete(&self.layout.record_index)?;
                info!(index = %self.layout.record_index, "recording finished, removed recording index");
            }
            Some(path) => {
                warn!(segment = %path, "segment still open at shutdown, keeping recording index");
            }
        }
        Ok(())
    }

    fn go_idle(&mut self) -> SyncResult<PollOutcome> {
        self.last_stamp = None;
        self.builder.clear(&self.layout.record_index)?;
        Ok(PollOutcome::Idle)
    }

    fn rebuild_done_index(&mut self) -> SyncResult<()> {
        if self
            .builder
            .build(&self.layout.done_index, &[&self.layout.done_dir])?
        {
            self.done_index_stale = false;
        }
        Ok(())
    }

    fn scan_once(&self) -> SyncResult<ScanPass> {
        let mut pass = ScanPass::default();
        let mut open = Vec::new();

        for name in self.directory.list_dir(&self.layout.record_dir)? {
            match classify(&name) {
                Some(SegmentState::Closed) => {
                    if self.relocate(&name, &name)? {
                        pass.moved += 1;
                    } else {
                        pass.raced = true;
                    }
                }
                Some(SegmentState::Open) => {
                    let path = join(&self.layout.record_dir, &name);
                    let stamp = match self.directory.stat(&path) {
                        Ok(stamp) => stamp,
                        Err(e) if e.is_not_found() => {
                            pass.raced = true;
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    open.push(Segment {
                        name,
                        stamp: Some(stamp),
                    });
                }
                None => {}
            }
        }

        open.sort_by(|a, b| a.recency_key().cmp(&b.recency_key()));
        pass.active = open.pop().map(|s| s.name);

        for stale in open {
            warn!(segment = %stale.name, "more than one open segment, closing the older one");
            if self.relocate(&stale.name, closed_name(&stale.name))? {
                pass.moved += 1;
            } else {
                pass.raced = true;
            }
        }
        Ok(pass)
    }

    /// Move `record_dir/name` to `done_dir/dest_name`. `Ok(false)` if the source vanished.
    fn relocate(&self, name: &str, dest_name: &str) -> SyncResult<bool> {
        let from = join(&self.layout.record_dir, name);
        let to = join(&self.layout.done_dir, dest_name);
        match self.directory.atomic_rename(&from, &to) {
            Ok(()) => {
                info!(from = %from, to = %to, "moved finished segment");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
