//! Shared helpers for integration tests.
//!
//! Lives under `tests/support/` so it is not compiled as a standalone test target.
#![allow(dead_code)]

pub mod faulty_directory;

pub use faulty_directory::FaultyDirectory;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use warcsync::indexer::Indexer;
use warcsync::storage::join;
use warcsync::{Directory, Layout, SyncResult};

/// The layout every test uses, relative to the backend root.
pub fn layout() -> Layout {
    Layout {
        record_dir: "rec".into(),
        record_index: "record.cdx".into(),
        done_dir: "done".into(),
        done_index: "done.cdx".into(),
    }
}

/// An in-process stand-in for the indexing routine: sorted union of the lines of all inputs.
///
/// Directory inputs are expanded one level.
pub fn line_indexer(calls: Arc<AtomicUsize>) -> Arc<dyn Indexer> {
    Arc::new(
        move |dir: &dyn Directory, inputs: &[&str], out: &str| -> SyncResult<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut lines = Vec::new();
            for input in inputs {
                let is_dir = match dir.file_path(input) {
                    Some(path) => path.is_dir(),
                    None => dir.stat(input).is_err(),
                };
                let files = if is_dir {
                    dir.list_dir(input)?
                        .into_iter()
                        .map(|n| join(input, &n))
                        .collect()
                } else {
                    vec![input.to_string()]
                };
                for f in files {
                    let mut buf = String::new();
                    dir.open_file(&f)?.read_to_string(&mut buf)?;
                    lines.extend(buf.lines().map(str::to_string));
                }
            }
            lines.sort();
            let mut w = dir.create_file(out)?;
            for l in lines {
                writeln!(w, "{l}")?;
            }
            w.flush()?;
            Ok(())
        },
    )
}

/// Read a whole file through a backend as UTF-8.
pub fn read_text(dir: &dyn Directory, path: &str) -> String {
    let mut buf = String::new();
    dir.open_file(path)
        .unwrap()
        .read_to_string(&mut buf)
        .unwrap();
    buf
}
