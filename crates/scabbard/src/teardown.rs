//! Deferred cleanup actions with ordered, failure-tolerant execution.

use std::fmt;

use crate::error::{Error, Result, TeardownFailures};

/// A deferred cleanup step, run once when its transaction ends.
pub type TeardownFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Ordered queue of cleanup actions for one transaction.
///
/// Actions run in reverse-registration order. Every action is attempted:
/// a failure is caught, reported through `tracing::error!`, and recorded,
/// and the remaining actions still run. After the full pass, the recorded
/// failures are returned together as a [`TeardownFailures`] value.
#[derive(Default)]
pub struct TeardownQueue {
    actions: Vec<TeardownFn>,
}

impl TeardownQueue {
    /// Registers a cleanup action.
    pub fn push(&mut self, action: impl FnOnce() -> Result<()> + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Number of registered actions not yet run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the queue holds no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs and drains every registered action, newest first.
    ///
    /// # Errors
    ///
    /// Returns the collected failures after all actions were attempted.
    pub fn run(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for action in std::mem::take(&mut self.actions).into_iter().rev() {
            if let Err(error) = action() {
                tracing::error!(%error, "teardown action failed; remaining actions still run");
                failures.push(error);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(TeardownFailures::new(failures)))
        }
    }
}

impl fmt::Debug for TeardownQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownQueue")
            .field("actions", &self.actions.len())
            .finish()
    }
}
