//! The external indexing routine.
//!
//! The controller never looks inside WARC records. Producing a sorted CDX index from one or
//! more segments (or a directory of them) is delegated to an [`Indexer`]; the controller only
//! decides *when* to index and *where* the result is published.

use crate::error::{SyncError, SyncResult};
use crate::storage::Directory;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Something that can write a sorted index of `inputs` to `output`.
///
/// Inputs may name single segment files or whole directories; interpreting them is up to the
/// implementation. Implementations must either write `output` completely and return `Ok`, or
/// return an error (a partial `output` is discarded by the caller).
pub trait Indexer: Send + Sync {
    /// Index `inputs` into `output` (both relative to `directory`).
    fn index(&self, directory: &dyn Directory, inputs: &[&str], output: &str) -> SyncResult<()>;
}

impl<F> Indexer for F
where
    F: Fn(&dyn Directory, &[&str], &str) -> SyncResult<()> + Send + Sync,
{
    fn index(&self, directory: &dyn Directory, inputs: &[&str], output: &str) -> SyncResult<()> {
        self(directory, inputs, output)
    }
}

/// Runs an external program as `<program> [args...] -s -p <output> <input>...`.
///
/// `-s` asks for sorted output and `-p` precedes the output path. The program's stdout and
/// stderr are inherited. A non-zero exit status is a failure.
#[derive(Debug, Clone)]
pub struct CommandIndexer {
    program: String,
    args: Vec<String>,
}

impl CommandIndexer {
    /// Build from a shell-style command line, e.g. `"cdx-indexer"` or `"python -m indexer"`.
    pub fn from_command_line(command_line: &str) -> SyncResult<Self> {
        let mut words = shell_words::split(command_line)
            .map_err(|e| SyncError::InvalidConfig(format!("indexer command: {e}")))?;
        if words.is_empty() {
            return Err(SyncError::InvalidConfig("indexer command is empty".into()));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    fn resolve(directory: &dyn Directory, path: &str) -> SyncResult<PathBuf> {
        directory.file_path(path).ok_or_else(|| {
            SyncError::NotSupported("CommandIndexer requires Directory::file_path()".into())
        })
    }
}

impl Indexer for CommandIndexer {
    fn index(&self, directory: &dyn Directory, inputs: &[&str], output: &str) -> SyncResult<()> {
        let output_path = Self::resolve(directory, output)?;
        let input_paths = inputs
            .iter()
            .map(|p| Self::resolve(directory, p))
            .collect::<SyncResult<Vec<_>>>()?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg("-s")
            .arg("-p")
            .arg(&output_path)
            .args(&input_paths)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| SyncError::Indexer(format!("failed to run {}: {e}", self.program)))?;

        if !status.success() {
            return Err(SyncError::Indexer(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}
