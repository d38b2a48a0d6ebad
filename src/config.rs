//! Controller configuration.
//!
//! The configuration file is YAML and may be shared with other tools (the replay service
//! reads the same file), so only the `recorder` block is interpreted here and unknown
//! top-level keys are ignored. Inside that block every field is typed and validated before
//! anything is started.
//!
//! ```yaml
//! recorder:
//!   record_dir: ./recording/
//!   record_index: ./recording.cdx
//!   done_dir: ./done/
//!   done_index: ./done.cdx
//!   recorder_exec: warcprox --dir ./recording/
//!   replay_exec: wayback
//!   indexer_exec: cdx-indexer   # optional
//!   update_freq: 1              # seconds, optional
//!   dedup_db: ./dedup.db        # optional
//! ```

use crate::error::{SyncError, SyncResult};
use crate::tracker::Layout;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default indexing program; invoked as `cdx-indexer -s -p <out> <in>...`.
pub const DEFAULT_INDEXER: &str = "cdx-indexer";

fn default_indexer() -> String {
    DEFAULT_INDEXER.to_string()
}

fn default_update_freq() -> f64 {
    1.0
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    recorder: RecorderConfig,
}

/// The `recorder` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    /// Directory the recorder writes open segments into.
    pub record_dir: String,
    /// Index of the open segment.
    #[serde(alias = "record_cdx")]
    pub record_index: String,
    /// Directory finished segments are moved into.
    pub done_dir: String,
    /// Index of all finished segments.
    #[serde(alias = "done_cdx")]
    pub done_index: String,
    /// Command line of the recording producer.
    pub recorder_exec: String,
    /// Command line of the replay service.
    #[serde(alias = "pywb_exec")]
    pub replay_exec: String,
    /// Command line of the indexing routine.
    #[serde(default = "default_indexer")]
    pub indexer_exec: String,
    /// Poll interval in seconds.
    #[serde(default = "default_update_freq")]
    pub update_freq: f64,
    /// Deduplication database used by the recorder.
    #[serde(default)]
    pub dedup_db: Option<String>,
    /// Seconds a child gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl RecorderConfig {
    /// Parse and validate the `recorder` block of a YAML document.
    pub fn from_yaml_str(yaml: &str, origin: &Path) -> SyncResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml).map_err(|source| SyncError::Config {
            path: origin.to_path_buf(),
            source,
        })?;
        file.recorder.validate()?;
        Ok(file.recorder)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let yaml = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::MissingPath(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml_str(&yaml, path)
    }

    /// Check the fields that serde cannot.
    pub fn validate(&self) -> SyncResult<()> {
        let required = [
            ("record_dir", &self.record_dir),
            ("record_index", &self.record_index),
            ("done_dir", &self.done_dir),
            ("done_index", &self.done_index),
            ("recorder_exec", &self.recorder_exec),
            ("replay_exec", &self.replay_exec),
            ("indexer_exec", &self.indexer_exec),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::InvalidConfig(format!("recorder.{field} is empty")));
            }
        }

        if !self.update_freq.is_finite() || self.update_freq <= 0.0 {
            return Err(SyncError::InvalidConfig(format!(
                "recorder.update_freq must be a positive number of seconds, got {}",
                self.update_freq
            )));
        }

        let trimmed = |p: &str| p.trim_end_matches('/').to_string();
        if trimmed(&self.record_dir) == trimmed(&self.done_dir) {
            return Err(SyncError::InvalidConfig(
                "recorder.record_dir and recorder.done_dir must differ".into(),
            ));
        }
        if self.record_index == self.done_index {
            return Err(SyncError::InvalidConfig(
                "recorder.record_index and recorder.done_index must differ".into(),
            ));
        }
        Ok(())
    }

    /// Interval between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_freq)
    }

    /// Grace period between SIGTERM and SIGKILL for children.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Directory and index locations for the tracker.
    pub fn layout(&self) -> Layout {
        Layout {
            record_dir: self.record_dir.clone(),
            record_index: self.record_index.clone(),
            done_dir: self.done_dir.clone(),
            done_index: self.done_index.clone(),
        }
    }
}

/// Directory relative config paths are resolved against: the config file's own directory.
pub fn base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
