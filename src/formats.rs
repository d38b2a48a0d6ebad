//! Segment naming conventions.
//!
//! ## Public invariants
//!
//! - A finished segment is named `<stem>.warc.gz`.
//! - The segment the producer is appending to carries an extra `.open` marker:
//!   `<stem>.warc.gz.open`. Closing it means renaming it without the marker.
//! - Anything else in the recording directory is not ours and is left alone.

use crate::storage::FileStamp;

/// Suffix of a finished WARC segment.
pub const CLOSED_SUFFIX: &str = ".warc.gz";
/// Marker appended to a segment while it is still being written.
pub const OPEN_MARKER: &str = ".open";

/// Whether a segment is still being appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Filename carries the open marker.
    Open,
    /// Fully written.
    Closed,
}

/// Classify a file name; `None` for files that are not segments.
pub fn classify(name: &str) -> Option<SegmentState> {
    match name.strip_suffix(OPEN_MARKER) {
        Some(rest) if rest.ends_with(CLOSED_SUFFIX) && rest.len() > CLOSED_SUFFIX.len() => {
            Some(SegmentState::Open)
        }
        Some(_) => None,
        None if name.ends_with(CLOSED_SUFFIX) && name.len() > CLOSED_SUFFIX.len() => {
            Some(SegmentState::Closed)
        }
        None => None,
    }
}

/// Name a segment should have once it is finished.
pub fn closed_name(name: &str) -> &str {
    name.strip_suffix(OPEN_MARKER).unwrap_or(name)
}

/// A segment observed in the recording directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// File name (no directory).
    pub name: String,
    /// Last observed stamp, if the file could be stat'd.
    pub stamp: Option<FileStamp>,
}

impl Segment {
    /// Ordering key used to pick the active segment among several open ones:
    /// most recently modified wins, then the greatest name.
    pub(crate) fn recency_key(&self) -> (Option<std::time::SystemTime>, &str) {
        (self.stamp.map(|s| s.modified), self.name.as_str())
    }
}
