//! Ordered release of long-lived resources.
//!
//! Each resource the controller acquires (the tracker, each child process) registers one
//! release action here. Actions run exactly once, in reverse registration order, on every
//! exit path: normal return, signal-triggered shutdown, or an error unwinding out of the loop.

use crate::error::SyncResult;
use tracing::{debug, warn};

type ReleaseFn = Box<dyn FnOnce() -> SyncResult<()>>;

/// A LIFO list of release actions.
#[derive(Default)]
pub struct Teardown {
    actions: Vec<(String, ReleaseFn)>,
}

impl Teardown {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release action; it runs before everything registered earlier.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        release: impl FnOnce() -> SyncResult<()> + 'static,
    ) {
        self.actions.push((name.into(), Box::new(release)));
    }

    /// Run all pending actions, newest first. Errors are logged, never returned.
    pub fn run(&mut self) {
        while let Some((name, release)) = self.actions.pop() {
            debug!(resource = %name, "releasing");
            if let Err(e) = release() {
                warn!(resource = %name, error = %e, "release failed");
            }
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_in_reverse_order_exactly_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut td = Teardown::new();
        for name in ["tracker", "recorder", "replay"] {
            let log = log.clone();
            td.push(name, move || {
                log.borrow_mut().push(name);
                Ok(())
            });
        }
        td.run();
        td.run();
        drop(td);
        assert_eq!(*log.borrow(), vec!["replay", "recorder", "tracker"]);
    }

    #[test]
    fn failing_action_does_not_stop_the_rest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut td = Teardown::new();
        let l1 = log.clone();
        td.push("first", move || {
            l1.borrow_mut().push("first");
            Ok(())
        });
        td.push("broken", || Err(SyncError::NotSupported("nope".into())));

        td.run();
        td.run();
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn drop_runs_pending_actions() {
        let ran = Rc::new(RefCell::new(false));
        {
            let mut td = Teardown::new();
            let ran = ran.clone();
            td.push("tracker", move || {
                *ran.borrow_mut() = true;
                Ok(())
            });
        }
        assert!(*ran.borrow());
    }
}
