//! Atomic index publishing.
//!
//! The safe rule for anything a concurrent reader may open by name:
//!
//! 1) build the new content under a fresh temporary name next to the target,
//! 2) rename the temporary file over the target (one filesystem operation),
//! 3) on any failure before the rename, delete the temporary file and leave the target alone.
//!
//! Readers therefore observe either the previous complete index or the new complete index.

use crate::error::{SyncError, SyncResult};
use crate::indexer::Indexer;
use crate::storage::Directory;
use crate::timestamp::timestamp20;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds index files through an [`Indexer`] and publishes them atomically.
pub struct IndexBuilder {
    directory: Arc<dyn Directory>,
    indexer: Arc<dyn Indexer>,
}

impl IndexBuilder {
    /// Create a builder over a directory backend and an indexing routine.
    pub fn new(directory: impl Into<Arc<dyn Directory>>, indexer: Arc<dyn Indexer>) -> Self {
        Self {
            directory: directory.into(),
            indexer,
        }
    }

    /// The directory backend this builder publishes into.
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Rebuild `output` from `inputs`.
    ///
    /// Returns `Ok(false)` when the indexing routine failed or produced nothing; the failure is
    /// logged, the temporary file removed and `output` left untouched, so the caller can simply
    /// retry later. Errors from the final rename are not transient and are returned as `Err`.
    pub fn build(&self, output: &str, inputs: &[&str]) -> SyncResult<bool> {
        let temp = temp_name(output);

        if let Err(e) = self.run_indexer(&temp, inputs) {
            warn!(output, ?inputs, error = %e, "index build failed");
            if let Err(e) = self.directory.delete(&temp) {
                warn!(temp = %temp, error = %e, "failed to remove temporary index");
            }
            return Ok(false);
        }

        if let Err(e) = self.directory.atomic_rename(&temp, output) {
            let _ = self.directory.delete(&temp);
            return Err(e);
        }
        info!(output, ?inputs, "index published");
        Ok(true)
    }

    /// Replace `output` with an empty index. A file that is already empty is left as is.
    pub fn clear(&self, output: &str) -> SyncResult<()> {
        match self.directory.stat(output) {
            Ok(stamp) if stamp.len == 0 => return Ok(()),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let temp = temp_name(output);
        if let Err(e) = self.directory.create_file(&temp).and_then(|mut w| {
            w.flush()?;
            Ok(())
        }) {
            let _ = self.directory.delete(&temp);
            return Err(e);
        }
        if let Err(e) = self.directory.atomic_rename(&temp, output) {
            let _ = self.directory.delete(&temp);
            return Err(e);
        }
        debug!(output, "index cleared");
        Ok(())
    }

    fn run_indexer(&self, temp: &str, inputs: &[&str]) -> SyncResult<()> {
        self.indexer.index(&*self.directory, inputs, temp)?;
        if !self.directory.exists(temp) {
            return Err(SyncError::Indexer("indexer produced no output".into()));
        }
        Ok(())
    }
}

/// Temporary name colocated with `output`, so the final rename never crosses filesystems.
fn temp_name(output: &str) -> String {
    format!("{output}.tmp.{}", timestamp20())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDirectory;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn concat_indexer() -> Arc<dyn Indexer> {
        Arc::new(
            |dir: &dyn Directory, inputs: &[&str], out: &str| -> SyncResult<()> {
                let mut lines = Vec::new();
                for input in inputs {
                    let mut buf = String::new();
                    dir.open_file(input)?.read_to_string(&mut buf)?;
                    lines.extend(buf.lines().map(str::to_string));
                }
                lines.sort();
                let mut w = dir.create_file(out)?;
                for l in lines {
                    writeln!(w, "{l}")?;
                }
                Ok(())
            },
        )
    }

    #[test]
    fn build_publishes_sorted_output_and_leaves_no_temp() {
        let mem = MemoryDirectory::new();
        mem.atomic_write("rec/a.warc.gz.open", b"zeta\nalpha\n").unwrap();
        let dir: Arc<dyn Directory> = Arc::new(mem.clone());
        let builder = IndexBuilder::new(dir, concat_indexer());

        assert!(builder.build("record.cdx", &["rec/a.warc.gz.open"]).unwrap());
        assert_eq!(mem.read("record.cdx").unwrap(), b"alpha\nzeta\n");
        assert_eq!(mem.list_dir("").unwrap(), vec!["rec", "record.cdx"]);
    }

    #[test]
    fn failed_build_keeps_previous_index() {
        let mem = MemoryDirectory::new();
        mem.atomic_write("record.cdx", b"old\n").unwrap();
        let dir: Arc<dyn Directory> = Arc::new(mem.clone());
        let failing: Arc<dyn Indexer> = Arc::new(
            |dir: &dyn Directory, _inputs: &[&str], out: &str| -> SyncResult<()> {
                // Leave a partial file behind, then fail.
                dir.create_file(out)?.write_all(b"half")?;
                Err(SyncError::Indexer("boom".into()))
            },
        );
        let builder = IndexBuilder::new(dir, failing);

        assert!(!builder.build("record.cdx", &["rec/a.warc.gz.open"]).unwrap());
        assert_eq!(mem.read("record.cdx").unwrap(), b"old\n");
        assert_eq!(mem.list_dir("").unwrap(), vec!["record.cdx"]);
    }

    #[test]
    fn indexer_without_output_counts_as_failure() {
        let mem = MemoryDirectory::new();
        let dir: Arc<dyn Directory> = Arc::new(mem.clone());
        let silent: Arc<dyn Indexer> =
            Arc::new(|_: &dyn Directory, _: &[&str], _: &str| -> SyncResult<()> { Ok(()) });
        let builder = IndexBuilder::new(dir, silent);

        assert!(!builder.build("done.cdx", &["done"]).unwrap());
        assert!(!mem.exists("done.cdx"));
    }

    #[test]
    fn successive_builds_use_distinct_temp_names() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let (seen2, calls2) = (seen.clone(), calls.clone());
        let recording: Arc<dyn Indexer> = Arc::new(
            move |dir: &dyn Directory, _: &[&str], out: &str| -> SyncResult<()> {
                calls2.fetch_add(1, Ordering::SeqCst);
                seen2.lock().unwrap().push(out.to_string());
                dir.atomic_write(out, b"x\n")
            },
        );
        let mem = MemoryDirectory::new();
        let dir: Arc<dyn Directory> = Arc::new(mem);
        let builder = IndexBuilder::new(dir, recording);

        for _ in 0..50 {
            assert!(builder.build("record.cdx", &["rec/a.warc.gz.open"]).unwrap());
        }
        let mut names = seen.lock().unwrap().clone();
        assert_eq!(calls.load(Ordering::SeqCst), 50);
        assert!(names.iter().all(|n| n.starts_with("record.cdx.tmp.")));
        names.dedup();
        assert_eq!(names.len(), 50);
    }

    #[test]
    fn clear_empties_and_is_idempotent() {
        let mem = MemoryDirectory::new();
        mem.atomic_write("record.cdx", b"stale\n").unwrap();
        let dir: Arc<dyn Directory> = Arc::new(mem.clone());
        let builder = IndexBuilder::new(dir, concat_indexer());

        builder.clear("record.cdx").unwrap();
        assert_eq!(mem.read("record.cdx").unwrap(), b"");
        let stamp = mem.stat("record.cdx").unwrap();

        builder.clear("record.cdx").unwrap();
        assert_eq!(mem.stat("record.cdx").unwrap(), stamp);
    }

    #[test]
    fn clear_creates_missing_index() {
        let mem = MemoryDirectory::new();
        let dir: Arc<dyn Directory> = Arc::new(mem.clone());
        let builder = IndexBuilder::new(dir, concat_indexer());

        builder.clear("record.cdx").unwrap();
        assert_eq!(mem.read("record.cdx").unwrap(), b"");
    }
}
