//! Supervised child processes (the recorder and the replay service).
//!
//! The controller does not monitor or restart children. It only guarantees that every child
//! it started has exited before the controller itself does.

use crate::error::{SyncError, SyncResult};
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A long-running child process that is terminated on [`cleanup`](Self::cleanup) or drop.
pub struct SupervisedChild {
    name: String,
    child: Option<Child>,
    grace: Duration,
}

impl SupervisedChild {
    /// Start `command_line` (split with shell quoting rules), inheriting stdout and stderr.
    ///
    /// `grace` is how long [`cleanup`](Self::cleanup) waits after SIGTERM before SIGKILL.
    pub fn spawn(command_line: &str, grace: Duration) -> SyncResult<Self> {
        let words = shell_words::split(command_line)
            .map_err(|e| SyncError::InvalidConfig(format!("command {command_line:?}: {e}")))?;
        let Some((program, args)) = words.split_first() else {
            return Err(SyncError::InvalidConfig("empty command line".into()));
        };
        let name = program.clone();

        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| SyncError::Process {
                name: name.clone(),
                reason: format!("failed to start: {e}"),
            })?;
        info!(name = %name, pid = child.id(), "started child process");

        Ok(Self {
            name,
            child: Some(child),
            grace,
        })
    }

    /// Short name (the program) used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, until the child has been cleaned up.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Terminate the child and wait for it.
    ///
    /// Sends SIGTERM, waits up to the grace period, then kills. Safe to call more than once
    /// and after the child has exited on its own; never fails.
    pub fn cleanup(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(name = %self.name, %status, "child already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(name = %self.name, error = %e, "failed to query child status"),
        }

        info!(name = %self.name, "shutting down child process");
        if let Err(e) = terminate(&child) {
            warn!(name = %self.name, error = %e, "failed to send SIGTERM");
        }

        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(name = %self.name, %status, "child process exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL_INTERVAL),
                Ok(None) => {
                    warn!(name = %self.name, grace = ?self.grace, "child ignored SIGTERM, killing");
                    break;
                }
                Err(e) => {
                    warn!(name = %self.name, error = %e, "failed to wait for child, killing");
                    break;
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for SupervisedChild {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(unix)]
fn terminate(child: &Child) -> SyncResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id()).map_err(|_| SyncError::Process {
        name: child.id().to_string(),
        reason: "pid out of range".into(),
    })?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| SyncError::Process {
        name: pid.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn terminate(_child: &Child) -> SyncResult<()> {
    Err(SyncError::NotSupported(
        "graceful termination requires unix signals".into(),
    ))
}
