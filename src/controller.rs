//! Process-level wiring: startup, the update loop, and teardown.

use crate::config::RecorderConfig;
use crate::error::SyncResult;
use crate::indexer::{CommandIndexer, Indexer};
use crate::publish::IndexBuilder;
use crate::storage::{Directory, FsDirectory};
use crate::supervisor::SupervisedChild;
use crate::teardown::Teardown;
use crate::tracker::SegmentTracker;
use crate::update::UpdateLoop;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Options given on the command line rather than in the config file.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// Delete the dedup database before starting the recorder.
    pub flush_dedup: bool,
}

/// Raise `flag` on SIGTERM and SIGINT instead of terminating the process.
pub fn install_signal_handlers(flag: &Arc<AtomicBool>) -> SyncResult<()> {
    for sig in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        signal_hook::flag::register(sig, flag.clone())?;
    }
    Ok(())
}

/// Best-effort removal of the dedup database file. A missing file is fine; a path naming a
/// directory is refused and logged.
pub fn flush_dedup(directory: &dyn Directory, dedup_db: Option<&str>) {
    let Some(path) = dedup_db else {
        warn!("--flush-dedup given but recorder.dedup_db is not configured");
        return;
    };
    info!(path, "removing dedup database");
    if let Err(e) = directory.delete(path) {
        warn!(path, error = %e, "failed to remove dedup database");
    }
}

/// One controller instance for one configuration.
pub struct Controller {
    config: RecorderConfig,
    base_dir: PathBuf,
    indexer: Option<Arc<dyn Indexer>>,
}

impl Controller {
    /// Relative paths in `config` resolve against `base_dir`.
    pub fn new(config: RecorderConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            indexer: None,
        }
    }

    /// Use an in-process indexing routine instead of `indexer_exec`.
    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Run until `shutdown` is raised or a fatal error occurs.
    ///
    /// Startup order: tracker (directories, indexes), dedup flush, recorder, replay service.
    /// Whatever was started is released in reverse order on every exit path, so the tracker's
    /// final scan runs after both children are gone.
    pub fn run(self, options: &StartupOptions, shutdown: Arc<AtomicBool>) -> SyncResult<()> {
        let directory: Arc<dyn Directory> = Arc::new(FsDirectory::new(&self.base_dir)?);
        let indexer: Arc<dyn Indexer> = match self.indexer {
            Some(indexer) => indexer,
            None => Arc::new(CommandIndexer::from_command_line(
                &self.config.indexer_exec,
            )?),
        };
        let builder = IndexBuilder::new(directory.clone(), indexer);

        let mut teardown = Teardown::new();

        let tracker = Rc::new(RefCell::new(SegmentTracker::open(
            builder,
            self.config.layout(),
        )?));
        {
            let tracker = tracker.clone();
            teardown.push("tracker", move || {
                let mut tracker = tracker.borrow_mut();
                tracker.shutdown()
            });
        }

        if options.flush_dedup {
            flush_dedup(&*directory, self.config.dedup_db.as_deref());
        }

        let grace = self.config.shutdown_grace();
        for command in [&self.config.recorder_exec, &self.config.replay_exec] {
            let mut child = SupervisedChild::spawn(command, grace)?;
            teardown.push(format!("child {}", child.name()), move || {
                child.cleanup();
                Ok(())
            });
        }

        let update = UpdateLoop::new(self.config.poll_interval(), shutdown);
        let result = update.run(&mut tracker.borrow_mut());

        info!("shutting down");
        teardown.run();
        result.map(|_| ())
    }
}
