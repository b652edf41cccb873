//! Subprocess abstraction layer
//!
//! A trait-based wrapper over external process execution, used by the git
//! gateway and the worktree coordinator's init commands. The
//! [`ProcessRunner`] trait has a production tokio implementation and a mock
//! for unit tests, so everything above this layer can be exercised without a
//! real repository.
//!
//! Deadlines and cancellation are enforced here: every [`ProcessCommand`]
//! carries an optional timeout and an optional cancellation token, and the
//! tokio runner races the child process against both.

pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::MockProcessRunner;
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};

use std::sync::Arc;

/// Shared handle to a process runner.
///
/// Cloning is cheap; all clones execute through the same runner, which is
/// what lets tests swap in a [`MockProcessRunner`] for the whole tree of
/// components at once.
#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Production manager backed by the tokio process runner.
    pub fn production() -> Self {
        Self::new(Arc::new(TokioProcessRunner))
    }

    /// Mock manager for tests; returns the mock so expectations can be set.
    #[cfg(test)]
    pub fn mock() -> (Self, MockProcessRunner) {
        let mock = MockProcessRunner::new();
        let runner = Arc::new(mock.clone()) as Arc<dyn ProcessRunner>;
        (Self::new(runner), mock)
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }
}
