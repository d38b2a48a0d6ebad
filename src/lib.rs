//! `warcsync`: keeps the CDX indexes of a live WARC recording consistent with the files on disk.
//!
//! A recorder (producer) appends to one open segment, `<name>.warc.gz.open`, in a recording
//! directory and eventually closes it by dropping the `.open` marker. A replay service reads
//! the segments plus two sorted indexes: one for the open segment and one for everything that
//! is finished. This crate is the controller sitting between them:
//!
//! - tracking which segment is open and moving finished ones to the done directory (`tracker`)
//! - rebuilding indexes through an external indexing routine (`indexer`) and publishing them
//!   atomically (`publish`)
//! - polling for changes (`update`)
//! - starting and stopping the recorder and replay service (`supervisor`, `teardown`)
//!
//! Non-goal: reading WARC records, serving lookups, or sorting index lines. Those belong to
//! the recorder, the replay service and the indexer respectively.
//!
//! ## Contract (what readers can rely on)
//!
//! - An index file is only ever replaced by renaming a fully written temporary file over it,
//!   so a reader sees either the previous complete index or the new complete index.
//! - The recording index is empty whenever no segment is open, and absent after a clean
//!   shutdown with nothing left open.
//! - Segments are moved, never copied or deleted.
//!
//! Index files are written only by this process. Running two controllers against the same
//! configuration is not supported.

pub mod config;
pub mod controller;
pub mod error;
pub mod formats;
pub mod indexer;
pub mod logging;
pub mod publish;
pub mod storage;
pub mod supervisor;
pub mod teardown;
pub mod timestamp;
pub mod tracker;
pub mod update;

pub use error::{SyncError, SyncResult};
pub use publish::IndexBuilder;
pub use storage::{Directory, FsDirectory, MemoryDirectory};
pub use tracker::{Layout, PollOutcome, SegmentTracker};
