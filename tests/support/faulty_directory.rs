//! Filesystem-backed `Directory` wrapper with targeted fault injection.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use warcsync::storage::{Directory, FileStamp, FsDirectory};
use warcsync::SyncResult;

/// Fault-injection configuration. Prefixes match against backend-relative paths.
#[derive(Default)]
pub struct FaultConfig {
    /// Fail renames whose destination starts with this prefix (permission denied).
    pub fail_rename_to: Option<String>,
    /// Fail `stat` on paths starting with this prefix (permission denied).
    pub fail_stat: Option<String>,
    /// For renames whose source starts with this prefix: delete the source first, as if the
    /// producer had moved it away, so the rename reports "not found". One-shot.
    pub vanish_before_rename: Option<String>,
    /// Count of rename calls attempted.
    pub rename_calls: usize,
}

/// A filesystem-backed `Directory` wrapper with targeted fault injection.
pub struct FaultyDirectory {
    inner: FsDirectory,
    cfg: Arc<Mutex<FaultConfig>>,
}

impl FaultyDirectory {
    /// Wrap an existing `FsDirectory`.
    pub fn new(inner: FsDirectory) -> Self {
        Self {
            inner,
            cfg: Arc::new(Mutex::new(FaultConfig::default())),
        }
    }

    /// Access the shared fault config (for toggling failpoints and reading counters).
    pub fn cfg(&self) -> Arc<Mutex<FaultConfig>> {
        self.cfg.clone()
    }
}

fn denied(what: &str) -> warcsync::SyncError {
    io::Error::new(io::ErrorKind::PermissionDenied, format!("injected {what} failure")).into()
}

fn matches(prefix: &Option<String>, path: &str) -> bool {
    prefix.as_deref().is_some_and(|p| path.starts_with(p))
}

impl Directory for FaultyDirectory {
    fn create_file(&self, path: &str) -> SyncResult<Box<dyn io::Write>> {
        self.inner.create_file(path)
    }

    fn open_file(&self, path: &str) -> SyncResult<Box<dyn io::Read>> {
        self.inner.open_file(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn delete(&self, path: &str) -> SyncResult<()> {
        self.inner.delete(path)
    }

    fn atomic_rename(&self, from: &str, to: &str) -> SyncResult<()> {
        let mut cfg = self.cfg.lock().unwrap();
        cfg.rename_calls += 1;
        if matches(&cfg.fail_rename_to, to) {
            return Err(denied("rename"));
        }
        if matches(&cfg.vanish_before_rename, from) {
            cfg.vanish_before_rename = None;
            self.inner.delete(from)?;
        }
        drop(cfg);
        self.inner.atomic_rename(from, to)
    }

    fn create_dir_all(&self, path: &str) -> SyncResult<()> {
        self.inner.create_dir_all(path)
    }

    fn list_dir(&self, path: &str) -> SyncResult<Vec<String>> {
        self.inner.list_dir(path)
    }

    fn stat(&self, path: &str) -> SyncResult<FileStamp> {
        let cfg = self.cfg.lock().unwrap();
        if matches(&cfg.fail_stat, path) {
            return Err(denied("stat"));
        }
        drop(cfg);
        self.inner.stat(path)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> SyncResult<()> {
        self.inner.atomic_write(path, data)
    }

    fn file_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.file_path(path)
    }
}
