//! Storage abstraction for the controller.
//!
//! Everything the tracker and the index builder do to the filesystem goes through
//! [`Directory`], so the lifecycle logic can be exercised against [`MemoryDirectory`] and
//! fault-injecting wrappers as well as the real filesystem.
//!
//! Vocabulary note:
//! - A **rename** within one filesystem is the only atomic publish primitive we rely on.
//!   Readers that open the target path see either the old inode or the new one.
//! - Paths are `/`-separated strings relative to the backend root. For [`FsDirectory`],
//!   absolute paths are honoured as-is (`root.join("/abs")` is `/abs`).

use crate::error::{SyncError, SyncResult};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tracing::warn;

/// What the controller knows about a file's content without reading it.
///
/// Two stamps compare equal only if both the modification time and the length match, so an
/// append that lands inside the same mtime tick is still seen as a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// Last modification time reported by the backend.
    pub modified: SystemTime,
    /// Length in bytes.
    pub len: u64,
}

/// Trait for directory-like storage backends.
pub trait Directory: Send + Sync {
    /// Create a new file for writing (overwriting if it exists).
    fn create_file(&self, path: &str) -> SyncResult<Box<dyn Write>>;
    /// Open an existing file for reading.
    fn open_file(&self, path: &str) -> SyncResult<Box<dyn Read>>;
    /// Return whether a path exists.
    fn exists(&self, path: &str) -> bool;
    /// Delete a file. Missing paths are not an error; directories are refused, since they may
    /// hold segments.
    fn delete(&self, path: &str) -> SyncResult<()>;
    /// Atomically rename/move a file, replacing `to` if it exists.
    fn atomic_rename(&self, from: &str, to: &str) -> SyncResult<()>;
    /// Create a directory (and parents if needed).
    fn create_dir_all(&self, path: &str) -> SyncResult<()>;
    /// List entry names in a directory, sorted. A missing directory lists as empty.
    fn list_dir(&self, path: &str) -> SyncResult<Vec<String>>;
    /// Modification stamp of a file; `MissingPath` if it does not exist.
    fn stat(&self, path: &str) -> SyncResult<FileStamp>;
    /// Atomically write bytes to a path.
    fn atomic_write(&self, path: &str, data: &[u8]) -> SyncResult<()>;
    /// Optional filesystem path for backends that support it.
    fn file_path(&self, path: &str) -> Option<PathBuf>;
}

/// Join a directory and an entry name using the backend path convention.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

fn refuse_dir(path: &Path) -> SyncError {
    SyncError::NotSupported(format!("refusing to delete directory {}", path.display()))
}

/// Filesystem-backed `Directory` rooted at a local path.
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Create (or open) a filesystem directory backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, path: &str) -> SyncResult<Box<dyn Write>> {
        let full_path = self.resolve_path(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Box::new(std::fs::File::create(full_path)?))
    }

    fn open_file(&self, path: &str) -> SyncResult<Box<dyn Read>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Err(SyncError::MissingPath(full_path));
        }
        Ok(Box::new(std::fs::File::open(full_path)?))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).exists()
    }

    fn delete(&self, path: &str) -> SyncResult<()> {
        let full_path = self.resolve_path(path);
        if full_path.is_dir() {
            return Err(refuse_dir(&full_path));
        }
        match std::fs::remove_file(full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn atomic_rename(&self, from: &str, to: &str) -> SyncResult<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);
        if let Some(parent) = to_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::rename(&from_path, to_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::MissingPath(from_path))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_dir_all(&self, path: &str) -> SyncResult<()> {
        std::fs::create_dir_all(self.resolve_path(path))?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> SyncResult<Vec<String>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&full_path)?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => out.push(name),
                // A lossy name would not rename back to the real file.
                Err(raw) => warn!(
                    dir = %full_path.display(),
                    name = ?raw,
                    "skipping entry whose name is not valid UTF-8"
                ),
            }
        }
        out.sort();
        Ok(out)
    }

    fn stat(&self, path: &str) -> SyncResult<FileStamp> {
        let full_path = self.resolve_path(path);
        let meta = match std::fs::metadata(&full_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::MissingPath(full_path));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(FileStamp {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> SyncResult<()> {
        let temp_path = format!("{path}.tmp");
        let full_temp_path = self.resolve_path(&temp_path);
        if let Some(parent) = full_temp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut temp_file = std::fs::File::create(&full_temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;

        let full_path = self.resolve_path(path);
        std::fs::rename(&full_temp_path, &full_path)?;
        Ok(())
    }

    fn file_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve_path(path))
    }
}

#[derive(Clone)]
struct MemFile {
    data: Vec<u8>,
    modified: SystemTime,
}

type MemFiles = Arc<RwLock<HashMap<String, MemFile>>>;

/// In-memory `Directory` used for tests.
///
/// Modification times come from a logical clock that advances on every write, so two writes
/// always produce distinct stamps.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    files: MemFiles,
    clock: Arc<AtomicU64>,
}

fn poisoned() -> SyncError {
    SyncError::LockFailed {
        resource: "memory directory".to_string(),
        reason: "lock poisoned".to_string(),
    }
}

fn tick(clock: &AtomicU64) -> SystemTime {
    let t = clock.fetch_add(1, Ordering::SeqCst) + 1;
    SystemTime::UNIX_EPOCH + Duration::from_micros(t)
}

impl MemoryDirectory {
    /// Create an empty in-memory directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a whole file (test convenience).
    pub fn read(&self, path: &str) -> SyncResult<Vec<u8>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| SyncError::MissingPath(PathBuf::from(path)))
    }
}

impl Directory for MemoryDirectory {
    fn create_file(&self, path: &str) -> SyncResult<Box<dyn Write>> {
        // Overwrite semantics: clear the file eagerly, then append in-place.
        let modified = tick(&self.clock);
        self.files.write().map_err(|_| poisoned())?.insert(
            path.to_string(),
            MemFile {
                data: Vec::new(),
                modified,
            },
        );

        Ok(Box::new(MemoryInPlaceWriter {
            files: self.files.clone(),
            clock: self.clock.clone(),
            path: path.to_string(),
        }))
    }

    fn open_file(&self, path: &str) -> SyncResult<Box<dyn Read>> {
        let data = self.read(path)?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    fn exists(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.files
            .read()
            .map(|f| f.contains_key(path) || f.keys().any(|k| k.starts_with(&prefix)))
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> SyncResult<()> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut files = self.files.write().map_err(|_| poisoned())?;
        if files.remove(path).is_none() && files.keys().any(|k| k.starts_with(&prefix)) {
            return Err(refuse_dir(Path::new(path)));
        }
        Ok(())
    }

    fn atomic_rename(&self, from: &str, to: &str) -> SyncResult<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let file = files
            .remove(from)
            .ok_or_else(|| SyncError::MissingPath(PathBuf::from(from)))?;
        files.insert(to.to_string(), file);
        Ok(())
    }

    fn create_dir_all(&self, _path: &str) -> SyncResult<()> {
        Ok(())
    }

    fn list_dir(&self, path: &str) -> SyncResult<Vec<String>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        let prefix = if path.is_empty() {
            "".to_string()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        let mut result: Vec<String> = files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        result.sort();
        result.dedup();
        Ok(result)
    }

    fn stat(&self, path: &str) -> SyncResult<FileStamp> {
        let files = self.files.read().map_err(|_| poisoned())?;
        let file = files
            .get(path)
            .ok_or_else(|| SyncError::MissingPath(PathBuf::from(path)))?;
        Ok(FileStamp {
            modified: file.modified,
            len: file.data.len() as u64,
        })
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> SyncResult<()> {
        let modified = tick(&self.clock);
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.insert(
            path.to_string(),
            MemFile {
                data: data.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn file_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

struct MemoryInPlaceWriter {
    files: MemFiles,
    clock: Arc<AtomicU64>,
    path: String,
}

impl Write for MemoryInPlaceWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let modified = tick(&self.clock);
        let mut files = self
            .files
            .write()
            .map_err(|_| std::io::Error::other("lock poisoned"))?;
        let entry = files.entry(self.path.clone()).or_insert_with(|| MemFile {
            data: Vec::new(),
            modified,
        });
        entry.data.extend_from_slice(buf);
        entry.modified = modified;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
